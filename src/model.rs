//! Data model: jobs, pages, audio clips and per-stage outcomes.
//!
//! A [`Job`] is one document-to-video conversion. Its [`JobStatus`] walks a
//! fixed linear path; `failed` is reachable from any non-terminal state and
//! nothing leaves a terminal state. [`Job::apply`] is the only place a job
//! is mutated, so every writer goes through the same transition checks.

use crate::error::{Pdf2VideoError, SoftMiss};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Job status ───────────────────────────────────────────────────────────

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    GeneratingScripts,
    FetchingImages,
    GeneratingAudio,
    ReadyForRendering,
    CreatingVideo,
    Completed,
    Failed,
}

impl JobStatus {
    /// Every non-failed status in pipeline order.
    pub const PIPELINE: [JobStatus; 8] = [
        JobStatus::Queued,
        JobStatus::Extracting,
        JobStatus::GeneratingScripts,
        JobStatus::FetchingImages,
        JobStatus::GeneratingAudio,
        JobStatus::ReadyForRendering,
        JobStatus::CreatingVideo,
        JobStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::GeneratingScripts => "generating_scripts",
            JobStatus::FetchingImages => "fetching_images",
            JobStatus::GeneratingAudio => "generating_audio",
            JobStatus::ReadyForRendering => "ready_for_rendering",
            JobStatus::CreatingVideo => "creating_video",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Progress percentage reported on entering this status.
    ///
    /// `Failed` has no canonical value; a failing job keeps its last progress.
    pub fn progress(self) -> Option<f32> {
        match self {
            JobStatus::Queued => Some(0.0),
            JobStatus::Extracting => Some(10.0),
            JobStatus::GeneratingScripts => Some(20.0),
            JobStatus::FetchingImages => Some(35.0),
            JobStatus::GeneratingAudio => Some(50.0),
            JobStatus::ReadyForRendering => Some(65.0),
            JobStatus::CreatingVideo => Some(70.0),
            JobStatus::Completed => Some(100.0),
            JobStatus::Failed => None,
        }
    }

    /// Human-readable step label shown to pollers.
    pub fn step_label(self) -> &'static str {
        match self {
            JobStatus::Queued => "Waiting to start",
            JobStatus::Extracting => "Extracting content from PDF",
            JobStatus::GeneratingScripts => "Writing narration scripts",
            JobStatus::FetchingImages => "Finding background images",
            JobStatus::GeneratingAudio => "Generating narration audio",
            JobStatus::ReadyForRendering => "Ready for rendering",
            JobStatus::CreatingVideo => "Rendering video",
            JobStatus::Completed => "Video ready",
            JobStatus::Failed => "Conversion failed",
        }
    }

    /// The status that follows this one on the happy path.
    pub fn next(self) -> Option<JobStatus> {
        let idx = Self::PIPELINE.iter().position(|s| *s == self)?;
        Self::PIPELINE.get(idx + 1).copied()
    }

    /// Whether a job in `self` may move to `to`.
    ///
    /// Staying in the same non-terminal status is allowed (progress updates
    /// inside a stage); otherwise only the next pipeline status or `Failed`.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == self || to == JobStatus::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Job ──────────────────────────────────────────────────────────────────

/// One conversion request and its tracked lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub current_step: String,
    /// 0–100, non-decreasing.
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Durable path of the finished video, set on completion.
    pub artifact: Option<PathBuf>,
}

impl Job {
    /// A freshly submitted job.
    pub fn queued(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            current_step: JobStatus::Queued.step_label().to_string(),
            progress: 0.0,
            created_at: now,
            updated_at: now,
            error: None,
            artifact: None,
        }
    }

    /// Merge `patch` into this job, enforcing the state machine.
    ///
    /// Progress never decreases: a lower value in the patch is ignored.
    pub fn apply(&mut self, patch: JobPatch) -> Result<(), Pdf2VideoError> {
        if let Some(to) = patch.status {
            if !self.status.can_transition_to(to) {
                return Err(Pdf2VideoError::InvalidTransition {
                    job_id: self.id.clone(),
                    from: self.status,
                    to,
                });
            }
            if to != self.status {
                self.status = to;
                if patch.current_step.is_none() {
                    self.current_step = to.step_label().to_string();
                }
                if let Some(p) = to.progress() {
                    self.progress = self.progress.max(p);
                }
            }
        } else if self.status.is_terminal() {
            return Err(Pdf2VideoError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: self.status,
            });
        }

        if let Some(p) = patch.progress {
            self.progress = self.progress.max(p.clamp(0.0, 100.0));
        }
        if let Some(step) = patch.current_step {
            self.current_step = step;
        }
        if patch.error.is_some() {
            self.error = patch.error;
        }
        if patch.artifact.is_some() {
            self.artifact = patch.artifact;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The read-only view handed to status pollers.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            current_step: self.current_step.clone(),
            error: self.error.clone(),
            updated_at: Some(self.updated_at),
        }
    }
}

/// A partial update to a [`Job`], merged by [`Job::apply`].
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<f32>,
    pub current_step: Option<String>,
    pub error: Option<String>,
    pub artifact: Option<PathBuf>,
}

impl JobPatch {
    /// Enter `status` with its canonical label and progress.
    pub fn stage(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Move to `failed`, recording `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Move to `completed` with the durable artifact path.
    pub fn completed(artifact: PathBuf) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            artifact: Some(artifact),
            ..Default::default()
        }
    }

    /// Progress update inside the current stage.
    pub fn progress(progress: f32, step: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            current_step: Some(step.into()),
            ..Default::default()
        }
    }
}

/// Status as reported by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f32,
    pub current_step: String,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ── Pages ────────────────────────────────────────────────────────────────

/// A narration clip on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// One unit of source content and its derived assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed, contiguous within a job.
    pub number: usize,
    pub title: Option<String>,
    pub text: String,
    pub bullet_points: Vec<String>,
    /// Embedded images in the order they appear on the page.
    pub images: Vec<PathBuf>,
    /// Rasterised page, shown as a card over the background.
    pub snapshot: Option<PathBuf>,
    pub script: Option<String>,
    pub background: Option<PathBuf>,
    pub audio: Option<AudioClip>,
    pub degradations: Vec<SoftMiss>,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            ..Default::default()
        }
    }

    /// The script if one was generated, else the original text.
    pub fn narration_text(&self) -> &str {
        self.script.as_deref().unwrap_or(&self.text)
    }

    pub fn audio_duration(&self) -> f64 {
        self.audio.as_ref().map(|a| a.duration_secs).unwrap_or(0.0)
    }

    /// Record the outcome of a stage, returning its value.
    pub fn absorb<T>(&mut self, outcome: Outcome<T>) -> T {
        match outcome {
            Outcome::Ready(v) => v,
            Outcome::Degraded { fallback, reason } => {
                self.degradations.push(reason);
                fallback
            }
        }
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────

/// Result of a per-page stage that never fails the job.
///
/// `Degraded` carries the value the pipeline continues with (original text,
/// no image, no audio) and the reason it is not the real thing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    Degraded { fallback: T, reason: SoftMiss },
}

impl<T> Outcome<T> {
    pub fn degraded(fallback: T, reason: SoftMiss) -> Self {
        Outcome::Degraded { fallback, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Ready(v) => v,
            Outcome::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Ready(v) => v,
            Outcome::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn reason(&self) -> Option<&SoftMiss> {
        match self {
            Outcome::Ready(_) => None,
            Outcome::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_string(&JobStatus::ReadyForRendering).unwrap();
        assert_eq!(json, "\"ready_for_rendering\"");
        assert_eq!(JobStatus::GeneratingScripts.to_string(), "generating_scripts");
    }

    #[test]
    fn pipeline_progress_is_increasing() {
        let values: Vec<f32> = JobStatus::PIPELINE
            .iter()
            .filter_map(|s| s.progress())
            .collect();
        assert_eq!(values.len(), JobStatus::PIPELINE.len());
        assert!(values.windows(2).all(|w| w[0] < w[1]), "{values:?}");
    }

    #[test]
    fn transitions_are_linear() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Extracting));
        assert!(JobStatus::Extracting.can_transition_to(JobStatus::Extracting));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::FetchingImages));
        assert!(!JobStatus::GeneratingAudio.can_transition_to(JobStatus::Extracting));
        assert!(JobStatus::CreatingVideo.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn failed_reachable_from_any_non_terminal() {
        for s in JobStatus::PIPELINE.iter().filter(|s| !s.is_terminal()) {
            assert!(s.can_transition_to(JobStatus::Failed), "{s}");
        }
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn apply_walks_the_pipeline() {
        let mut job = Job::queued("j1");
        for status in JobStatus::PIPELINE.iter().skip(1) {
            job.apply(JobPatch::stage(*status)).unwrap();
            assert_eq!(job.status, *status);
            assert_eq!(job.current_step, status.step_label());
        }
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn apply_rejects_skipping_stages() {
        let mut job = Job::queued("j1");
        let err = job
            .apply(JobPatch::stage(JobStatus::CreatingVideo))
            .unwrap_err();
        assert!(matches!(err, Pdf2VideoError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = Job::queued("j1");
        job.apply(JobPatch::stage(JobStatus::Extracting)).unwrap();
        job.apply(JobPatch::progress(15.0, "page 1")).unwrap();
        job.apply(JobPatch::progress(12.0, "page 2")).unwrap();
        assert_eq!(job.progress, 15.0);
        assert_eq!(job.current_step, "page 2");
    }

    #[test]
    fn failure_keeps_progress_and_message() {
        let mut job = Job::queued("j1");
        job.apply(JobPatch::stage(JobStatus::Extracting)).unwrap();
        job.apply(JobPatch::failed("document has no pages")).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 10.0);
        assert_eq!(job.error.as_deref(), Some("document has no pages"));
        assert!(job.apply(JobPatch::progress(50.0, "late")).is_err());
    }

    #[test]
    fn page_absorbs_degraded_outcome() {
        let mut page = Page::new(2, "Hello world");
        let outcome: Outcome<Option<AudioClip>> = Outcome::degraded(
            None,
            SoftMiss::NarrationFailed {
                page: 2,
                detail: "boom".into(),
            },
        );
        assert!(outcome.is_degraded());
        page.audio = page.absorb(outcome);
        assert!(page.audio.is_none());
        assert_eq!(page.degradations.len(), 1);
        assert_eq!(page.audio_duration(), 0.0);
    }

    #[test]
    fn narration_text_prefers_script() {
        let mut page = Page::new(1, "original");
        assert_eq!(page.narration_text(), "original");
        page.script = Some("rewritten".into());
        assert_eq!(page.narration_text(), "rewritten");
    }
}
