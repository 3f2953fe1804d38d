//! Service entry points: submit a document, poll its status, fetch the video.
//!
//! A [`Converter`] owns the job store, the storage tree and a bounded pool
//! of job slots. [`Converter::submit`] validates the upload, records the job
//! as `queued` and returns immediately; the job itself runs on a tokio task
//! once a slot is free.

use crate::chat::DocumentChat;
use crate::config::{ConversionConfig, JobOptions};
use crate::error::Pdf2VideoError;
use crate::model::{Job, JobPatch, JobSnapshot, JobStatus};
use crate::orchestrator::{Orchestrator, Stages};
use crate::pipeline::assemble::VideoAssembler;
use crate::pipeline::assets::AssetResolver;
use crate::pipeline::extract::{check_pdf_magic, DocumentExtractor, PdfiumExtractor};
use crate::pipeline::frame::FrameComposer;
use crate::pipeline::narrate::Narrator;
use crate::pipeline::script::ScriptRewriter;
use crate::services::elevenlabs::ElevenLabsEngine;
use crate::services::ffmpeg::Ffmpeg;
use crate::services::llm::{DisabledTextGenerator, LlmTextGenerator};
use crate::services::unsplash::UnsplashClient;
use crate::services::{ImageSearch, MediaProbe, SpeechEngine, TextGenerator, VideoEncoder};
use crate::storage::{validate_job_id, Storage};
use crate::store::{InMemoryJobStore, JobStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The external capabilities a converter drives.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageSearch>,
    pub speech: Arc<dyn SpeechEngine>,
    pub encoder: Arc<dyn VideoEncoder>,
    /// Used to measure narration when the speech engine reports no timing.
    pub probe: Option<Arc<dyn MediaProbe>>,
}

impl Services {
    /// pdfium, edgequake-llm, Unsplash, ElevenLabs and ffmpeg, configured
    /// from `config`.
    ///
    /// Without a resolvable LLM provider scripts fall back to page text.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let text: Arc<dyn TextGenerator> = match LlmTextGenerator::from_config(config) {
            Ok(gen) => Arc::new(gen),
            Err(e) => {
                warn!("Script generation disabled: {}", e);
                Arc::new(DisabledTextGenerator::new(e.to_string()))
            }
        };
        let ffmpeg = Arc::new(Ffmpeg::from_config(config));

        Self {
            extractor: Arc::new(PdfiumExtractor::new(
                config.max_bullet_points,
                config.render_snapshots,
                config.snapshot_max_pixels,
            )),
            text,
            images: Arc::new(UnsplashClient::new(
                config.unsplash_access_key.clone(),
                config.download_timeout_secs,
            )),
            speech: Arc::new(ElevenLabsEngine::new(
                config.elevenlabs_api_key.clone(),
                config.api_timeout_secs,
            )),
            encoder: ffmpeg.clone(),
            probe: Some(ffmpeg),
        }
    }
}

/// A submitted job.
pub struct JobHandle {
    job_id: String,
    task: JoinHandle<Result<PathBuf, Pdf2VideoError>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the job to finish and return its artifact path.
    pub async fn wait(self) -> Result<PathBuf, Pdf2VideoError> {
        self.task
            .await
            .map_err(|e| Pdf2VideoError::Internal(format!("Job task failed: {}", e)))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Document-to-video conversion service.
pub struct Converter {
    config: ConversionConfig,
    storage: Storage,
    store: Arc<dyn JobStore>,
    orchestrator: Arc<Orchestrator>,
    slots: Arc<Semaphore>,
    text: Arc<dyn TextGenerator>,
}

impl Converter {
    /// A converter backed by the production adapters and an in-memory store.
    pub fn from_config(config: ConversionConfig) -> Self {
        let services = Services::from_config(&config);
        Self::with_services(config, services)
    }

    pub fn with_services(config: ConversionConfig, services: Services) -> Self {
        Self::with_store(config, services, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_store(config: ConversionConfig, services: Services, store: Arc<dyn JobStore>) -> Self {
        let storage = Storage::new(&config.storage_root);

        let mut rewriter = ScriptRewriter::new(Arc::clone(&services.text))
            .with_sampling(config.temperature, config.max_tokens);
        if let Some(ref template) = config.script_prompt {
            rewriter = rewriter.with_template(template.clone());
        }
        let mut narrator =
            Narrator::new(services.speech).with_words_per_minute(config.words_per_minute);
        if let Some(probe) = services.probe {
            narrator = narrator.with_probe(probe);
        }
        let assembler = VideoAssembler::new(
            services.encoder,
            FrameComposer::new(config.frame_width, config.frame_height),
        )
        .with_timing(config.min_segment_secs, config.fade_secs)
        .with_title_overlay(config.title_overlay);

        let stages = Stages {
            extractor: services.extractor,
            rewriter,
            assets: AssetResolver::standard(services.images),
            narrator,
            assembler,
        };
        let orchestrator = Orchestrator::new(
            stages,
            Arc::clone(&store),
            storage.clone(),
            config.progress_callback.clone(),
        );

        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
            storage,
            store,
            orchestrator: Arc::new(orchestrator),
            text: services.text,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Q&A and summaries sharing this converter's text generator.
    pub fn chat(&self) -> DocumentChat {
        DocumentChat::from_config(Arc::clone(&self.text), &self.config)
    }

    /// Accept a document for conversion.
    ///
    /// Returns once the job is recorded as `queued` and its upload saved;
    /// the conversion runs in the background. `job_id` defaults to a UUID.
    ///
    /// # Errors
    /// Rejected before any job exists: empty, oversized or non-PDF input, a
    /// malformed or already-used job id. A failed upload write marks the
    /// new job `failed` and is returned.
    pub async fn submit(
        &self,
        job_id: Option<String>,
        bytes: Vec<u8>,
        options: JobOptions,
    ) -> Result<JobHandle, Pdf2VideoError> {
        if bytes.len() > self.config.max_upload_bytes {
            return Err(Pdf2VideoError::UploadTooLarge {
                size: bytes.len(),
                max: self.config.max_upload_bytes,
            });
        }
        check_pdf_magic(&bytes)?;

        let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        validate_job_id(&job_id)?;
        self.store.insert(Job::queued(&job_id))?;

        if let Err(e) = self.storage.save_upload(&job_id, &bytes).await {
            let _ = self
                .store
                .upsert(&job_id, JobPatch::failed(e.to_string()));
            return Err(e);
        }
        info!("Job {} queued ({} bytes)", job_id, bytes.len());
        drop(bytes);

        let slots = Arc::clone(&self.slots);
        let orchestrator = Arc::clone(&self.orchestrator);
        let id = job_id.clone();
        let task = tokio::spawn(async move {
            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|e| Pdf2VideoError::Internal(format!("job slots closed: {}", e)))?;
            debug!("Job {} acquired a slot", id);
            orchestrator.run(&id, &options).await
        });

        Ok(JobHandle { job_id, task })
    }

    /// Current status of `job_id`.
    ///
    /// A job unknown to the store whose video exists on disk (e.g. after a
    /// restart) reports `completed` at 100%.
    pub async fn get_status(&self, job_id: &str) -> Result<JobSnapshot, Pdf2VideoError> {
        if let Some(job) = self.store.get(job_id) {
            return Ok(job.snapshot());
        }
        if validate_job_id(job_id).is_ok() && self.storage.find_artifact(job_id).await.is_some() {
            return Ok(JobSnapshot {
                job_id: job_id.to_string(),
                status: JobStatus::Completed,
                progress: 100.0,
                current_step: JobStatus::Completed.step_label().to_string(),
                error: None,
                updated_at: None,
            });
        }
        Err(Pdf2VideoError::JobNotFound {
            job_id: job_id.to_string(),
        })
    }

    /// Path of the finished video, if it exists on disk.
    pub async fn get_artifact(&self, job_id: &str) -> Option<PathBuf> {
        if let Some(path) = self.store.get(job_id).and_then(|j| j.artifact) {
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                return Some(path);
            }
        }
        if validate_job_id(job_id).is_err() {
            return None;
        }
        self.storage.find_artifact(job_id).await
    }
}
