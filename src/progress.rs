//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator drives a job. Callers can forward them to a
//! broadcast channel, a WebSocket or a terminal progress bar; the job store
//! remains the source of truth for polling.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2video::{ConversionConfig, JobProgressCallback, JobStatus};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl JobProgressCallback for Printer {
//!     fn on_stage(&self, job_id: &str, status: JobStatus, progress: f32) {
//!         eprintln!("{job_id}: {status} ({progress:.0}%)");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn JobProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::SoftMiss;
use crate::model::JobStatus;
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as a job moves through its stages.
///
/// Implementations must be `Send + Sync`: several jobs run concurrently and
/// each reports from its own task. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// The job entered `status`.
    fn on_stage(&self, job_id: &str, status: JobStatus, progress: f32) {
        let _ = (job_id, status, progress);
    }

    /// A page finished inside a per-page stage.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: pages in the document
    fn on_page(&self, job_id: &str, status: JobStatus, page_num: usize, total_pages: usize) {
        let _ = (job_id, status, page_num, total_pages);
    }

    /// A page was degraded but the job continues.
    fn on_soft_miss(&self, job_id: &str, miss: &SoftMiss) {
        let _ = (job_id, miss);
    }

    fn on_job_complete(&self, job_id: &str, artifact: &Path) {
        let _ = (job_id, artifact);
    }

    fn on_job_failed(&self, job_id: &str, error: &str) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
