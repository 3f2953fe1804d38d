//! Error types for the edgequake-pdf2video library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Pdf2VideoError`] is **fatal**: the job cannot proceed (unreadable
//!   document, storage unavailable, encoder crash). The orchestrator records
//!   the message on the job and moves it to `failed`.
//!
//! * [`SoftMiss`] is **non-fatal**: one page lost its rewritten script, its
//!   background image or its narration. The page keeps a degraded value and
//!   the miss is recorded on the page so callers can report it.
//!
//! * [`ServiceError`] is what an external capability adapter (LLM, image
//!   search, speech engine) returns. Pipeline stages turn these into
//!   [`SoftMiss`] values; the chat API turns them into
//!   [`Pdf2VideoError::Generation`].

use crate::model::JobStatus;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2video library.
#[derive(Debug, Error)]
pub enum Pdf2VideoError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The uploaded document is empty.
    #[error("Uploaded document is empty")]
    EmptyUpload,

    /// The uploaded document exceeds the configured size limit.
    #[error("Uploaded document is {size} bytes, the limit is {max} bytes")]
    UploadTooLarge { size: usize, max: usize },

    /// The uploaded bytes do not start with the `%PDF` magic.
    #[error("Uploaded document is not a PDF\nFirst bytes: {magic:?}")]
    NotAPdf { magic: [u8; 4] },

    /// Job ids become directory names, so they are restricted.
    #[error("Invalid job id '{job_id}': use 1-128 characters from [A-Za-z0-9_-]")]
    InvalidJobId { job_id: String },

    // ── Job errors ────────────────────────────────────────────────────────
    #[error("Job '{job_id}' already exists")]
    JobAlreadyExists { job_id: String },

    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// A status update tried to move a job backwards or out of a terminal state.
    #[error("Job '{job_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The document could not be opened or has no pages.
    #[error("Extraction failed: {detail}")]
    Extraction { detail: String },

    /// Frame rendering or video encoding failed.
    #[error("{}", render_message(.page, .detail))]
    Render { page: Option<usize>, detail: String },

    /// Scratch or output storage could not be read or written.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Capability errors ─────────────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A text-generation call made outside the pipeline failed.
    #[error("Text generation failed: {0}")]
    Generation(#[from] ServiceError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn render_message(page: &Option<usize>, detail: &str) -> String {
    match page {
        Some(p) => format!("Rendering failed on page {}: {}", p, detail),
        None => format!("Rendering failed: {}", detail),
    }
}

impl Pdf2VideoError {
    /// Shorthand for a [`Pdf2VideoError::Storage`] at `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Pdf2VideoError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn render(page: Option<usize>, detail: impl Into<String>) -> Self {
        Pdf2VideoError::Render {
            page,
            detail: detail.into(),
        }
    }
}

/// A non-fatal, per-page degradation.
///
/// Recorded on [`crate::model::Page::degradations`] and carried by
/// [`crate::model::Outcome::Degraded`]. The job continues.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftMiss {
    /// Script generation failed; the original page text is narrated instead.
    #[error("Page {page}: script generation failed, using original text: {detail}")]
    ScriptFallback { page: usize, detail: String },

    /// The page has no title to search stock photos with.
    #[error("Page {page}: no title to search images for")]
    NoImageQuery { page: usize },

    /// The image search provider errored.
    #[error("Page {page}: image search failed: {detail}")]
    ImageSearchFailed { page: usize, detail: String },

    /// The search succeeded but returned nothing.
    #[error("Page {page}: no image found for '{query}'")]
    NoImageFound { page: usize, query: String },

    #[error("Page {page}: image download failed: {detail}")]
    ImageDownloadFailed { page: usize, detail: String },

    /// No embedded image exists to fall back on.
    #[error("Page {page}: no embedded image to fall back on")]
    NoEmbeddedImage { page: usize },

    /// Speech synthesis failed; the segment is silent.
    #[error("Page {page}: narration failed: {detail}")]
    NarrationFailed { page: usize, detail: String },
}

impl SoftMiss {
    /// The 1-indexed page this miss belongs to.
    pub fn page(&self) -> usize {
        match self {
            SoftMiss::ScriptFallback { page, .. }
            | SoftMiss::NoImageQuery { page }
            | SoftMiss::ImageSearchFailed { page, .. }
            | SoftMiss::NoImageFound { page, .. }
            | SoftMiss::ImageDownloadFailed { page, .. }
            | SoftMiss::NoEmbeddedImage { page }
            | SoftMiss::NarrationFailed { page, .. } => *page,
        }
    }
}

/// Errors returned by external capability adapters.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The call did not finish within its deadline.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request could not be sent or the connection dropped.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered, but not with something usable.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The capability has no credentials or endpoint.
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Request(format!("timeout: {}", e))
        } else if let Some(status) = e.status() {
            ServiceError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_display_with_page() {
        let e = Pdf2VideoError::render(Some(3), "ffmpeg exited with 1");
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("ffmpeg exited with 1"));
    }

    #[test]
    fn render_display_without_page() {
        let e = Pdf2VideoError::render(None, "concat failed");
        assert_eq!(e.to_string(), "Rendering failed: concat failed");
    }

    #[test]
    fn invalid_transition_display() {
        let e = Pdf2VideoError::InvalidTransition {
            job_id: "abc".into(),
            from: JobStatus::Completed,
            to: JobStatus::Extracting,
        };
        let msg = e.to_string();
        assert!(msg.contains("completed"), "got: {msg}");
        assert!(msg.contains("extracting"), "got: {msg}");
    }

    #[test]
    fn soft_miss_reports_page() {
        let miss = SoftMiss::NarrationFailed {
            page: 2,
            detail: "quota".into(),
        };
        assert_eq!(miss.page(), 2);
        assert!(miss.to_string().contains("quota"));
    }

    #[test]
    fn soft_miss_serialises_with_kind_tag() {
        let miss = SoftMiss::NoImageQuery { page: 4 };
        let json = serde_json::to_string(&miss).unwrap();
        assert_eq!(json, r#"{"kind":"no_image_query","page":4}"#);
    }

    #[test]
    fn service_error_converts_into_generation() {
        let e: Pdf2VideoError = ServiceError::Timeout { secs: 30 }.into();
        assert!(e.to_string().contains("30s"));
    }
}
