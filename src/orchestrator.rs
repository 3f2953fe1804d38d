//! Job orchestration: drives one job through every pipeline stage.
//!
//! ```text
//! queued → extracting → generating_scripts → fetching_images
//!        → generating_audio → ready_for_rendering → creating_video → completed
//!                          (any non-terminal) → failed
//! ```
//!
//! Per-page stages absorb their own failures into [`SoftMiss`] records on
//! the page. Only extraction, storage and rendering errors escape
//! [`Orchestrator::execute`]; [`Orchestrator::run`] turns those into a
//! `failed` status carrying the error message.

use crate::config::JobOptions;
use crate::error::{Pdf2VideoError, SoftMiss};
use crate::model::{JobPatch, JobStatus, Outcome, Page};
use crate::pipeline::assemble::VideoAssembler;
use crate::pipeline::assets::AssetResolver;
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::narrate::Narrator;
use crate::pipeline::script::ScriptRewriter;
use crate::progress::ProgressCallback;
use crate::storage::{Storage, StorageArea};
use crate::store::JobStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// The pipeline components one job runs through.
#[derive(Clone)]
pub struct Stages {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub rewriter: ScriptRewriter,
    pub assets: AssetResolver,
    pub narrator: Narrator,
    pub assembler: VideoAssembler,
}

/// Sequences [`Stages`] for a job and records its progress in a [`JobStore`].
pub struct Orchestrator {
    stages: Stages,
    store: Arc<dyn JobStore>,
    storage: Storage,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        stages: Stages,
        store: Arc<dyn JobStore>,
        storage: Storage,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            stages,
            store,
            storage,
            progress,
        }
    }

    /// Run `job_id` to completion or failure.
    ///
    /// The job must already exist in the store with its upload saved. On
    /// error the job is moved to `failed` before the error is returned.
    pub async fn run(&self, job_id: &str, options: &JobOptions) -> Result<PathBuf, Pdf2VideoError> {
        let span = info_span!("job", job_id = %job_id);
        let result = self.execute(job_id, options).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(artifact) => {
                if let Some(cb) = &self.progress {
                    cb.on_job_complete(job_id, artifact);
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!("Job failed: {}", message);
                if let Err(store_err) = self.store.upsert(job_id, JobPatch::failed(message.clone())) {
                    error!("Could not record failure: {}", store_err);
                }
                if let Some(cb) = &self.progress {
                    cb.on_job_failed(job_id, &message);
                }
            }
        });
        result
    }

    /// The stage sequence. Any `Err` is fatal to the job.
    pub async fn execute(&self, job_id: &str, options: &JobOptions) -> Result<PathBuf, Pdf2VideoError> {
        let start = Instant::now();

        // ── Extraction ───────────────────────────────────────────────────
        self.enter(job_id, JobStatus::Extracting)?;
        let bytes = self.storage.read_upload(job_id).await?;
        let image_dir = self.storage.ensure_dir(job_id, StorageArea::Images).await?;
        let extractor = Arc::clone(&self.stages.extractor);
        let mut pages = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &image_dir))
            .await
            .map_err(|e| Pdf2VideoError::Internal(format!("Extraction task panicked: {}", e)))??;
        let total = pages.len();
        info!("Extracted {} pages", total);
        self.store.save_pages(job_id, &pages)?;

        // ── Scripts ──────────────────────────────────────────────────────
        self.enter(job_id, JobStatus::GeneratingScripts)?;
        for (idx, page) in pages.iter_mut().enumerate() {
            let outcome = self
                .stages
                .rewriter
                .rewrite(page.title.as_deref(), &page.text, page.number)
                .await;
            let script = self.absorb(job_id, page, outcome);
            page.script = Some(script);
            self.page_done(job_id, JobStatus::GeneratingScripts, idx, total)?;
        }
        self.store.save_pages(job_id, &pages)?;

        // ── Backgrounds ──────────────────────────────────────────────────
        self.enter(job_id, JobStatus::FetchingImages)?;
        let image_dir = self.storage.ensure_dir(job_id, StorageArea::Images).await?;
        for (idx, page) in pages.iter_mut().enumerate() {
            let outcome = self.stages.assets.resolve_background(page, &image_dir).await;
            page.background = self.absorb(job_id, page, outcome);
            self.page_done(job_id, JobStatus::FetchingImages, idx, total)?;
        }
        self.store.save_pages(job_id, &pages)?;

        // ── Narration ────────────────────────────────────────────────────
        self.enter(job_id, JobStatus::GeneratingAudio)?;
        let audio_dir = self.storage.ensure_dir(job_id, StorageArea::Audio).await?;
        for (idx, page) in pages.iter_mut().enumerate() {
            let outcome = self
                .stages
                .narrator
                .synthesize(page.narration_text(), page.number, &options.voice, &audio_dir)
                .await;
            page.audio = self.absorb(job_id, page, outcome);
            self.page_done(job_id, JobStatus::GeneratingAudio, idx, total)?;
        }
        self.store.save_pages(job_id, &pages)?;

        let degraded = pages.iter().map(|p| p.degradations.len()).sum::<usize>();
        if degraded > 0 {
            warn!("{} soft misses across {} pages", degraded, total);
        }

        // ── Rendering ────────────────────────────────────────────────────
        self.enter(job_id, JobStatus::ReadyForRendering)?;
        self.enter(job_id, JobStatus::CreatingVideo)?;
        let frames_dir = self.storage.ensure_dir(job_id, StorageArea::Frames).await?;
        let segments_dir = self.storage.ensure_dir(job_id, StorageArea::Segments).await?;
        let output = self.storage.artifact_path(job_id);
        let artifact = self
            .stages
            .assembler
            .assemble(&pages, options, &frames_dir, &segments_dir, &output)
            .await?;

        let job = self.store.upsert(job_id, JobPatch::completed(artifact.clone()))?;
        self.notify_stage(job_id, job.status, job.progress);
        info!(
            "Job completed in {:.1}s: {}",
            start.elapsed().as_secs_f64(),
            artifact.display()
        );
        Ok(artifact)
    }

    fn enter(&self, job_id: &str, status: JobStatus) -> Result<(), Pdf2VideoError> {
        let job = self.store.upsert(job_id, JobPatch::stage(status))?;
        info!("{} ({:.0}%)", job.current_step, job.progress);
        self.notify_stage(job_id, status, job.progress);
        Ok(())
    }

    fn notify_stage(&self, job_id: &str, status: JobStatus, progress: f32) {
        if let Some(cb) = &self.progress {
            cb.on_stage(job_id, status, progress);
        }
    }

    /// Advance progress linearly from this stage's value toward the next one.
    fn page_done(&self, job_id: &str, status: JobStatus, idx: usize, total: usize) -> Result<(), Pdf2VideoError> {
        let progress = page_progress(status, idx + 1, total);
        let step = format!("{} ({}/{})", status.step_label(), idx + 1, total);
        self.store.upsert(job_id, JobPatch::progress(progress, step))?;
        if let Some(cb) = &self.progress {
            cb.on_page(job_id, status, idx + 1, total);
        }
        Ok(())
    }

    fn absorb<T>(&self, job_id: &str, page: &mut Page, outcome: Outcome<T>) -> T {
        if let (Some(cb), Some(reason)) = (&self.progress, outcome.reason()) {
            cb.on_soft_miss(job_id, reason);
        }
        page.absorb(outcome)
    }
}

/// Progress after `done` of `total` pages inside `status`.
pub fn page_progress(status: JobStatus, done: usize, total: usize) -> f32 {
    let start = status.progress().unwrap_or(0.0);
    let end = status
        .next()
        .and_then(JobStatus::progress)
        .unwrap_or(start);
    if total == 0 {
        return start;
    }
    let fraction = done.min(total) as f32 / total as f32;
    // Stop short of the next stage's value so entering it still moves the bar.
    start + (end - start) * fraction * 0.95
}

/// Soft misses recorded on `pages`, in page order.
pub fn soft_misses(pages: &[Page]) -> Vec<&SoftMiss> {
    pages.iter().flat_map(|p| p.degradations.iter()).collect()
}
