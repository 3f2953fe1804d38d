//! # edgequake-pdf2video
//!
//! Turn PDF documents into narrated teaching videos.
//!
//! Each page becomes one video segment: its text is rewritten by an LLM as a
//! short spoken script, a background photo is found for its title, the
//! script is narrated, and the page is rendered over the photo. Segments are
//! joined into a single MP4.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract   pages, titles, bullets, embedded images (pdfium)
//!  ├─ 2. Script    teacher-style narration per page (edgequake-llm)
//!  ├─ 3. Images    stock photo by title, else first embedded image
//!  ├─ 4. Audio     text-to-speech per page, duration resolved
//!  └─ 5. Video     frame per page, encode segments, concat (ffmpeg)
//! ```
//!
//! Stages 2–4 never fail a job: a page that loses its script, image or
//! narration keeps a degraded value and records a [`SoftMiss`]. Extraction,
//! storage and rendering errors fail the job.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2video::{ConversionConfig, Converter, JobOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLM provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     // Stock photos and narration from UNSPLASH_ACCESS_KEY / ELEVENLABS_API_KEY.
//!     let config = ConversionConfig::builder_from_env().build()?;
//!     let converter = Converter::from_config(config);
//!
//!     let bytes = std::fs::read("lecture.pdf")?;
//!     let handle = converter.submit(None, bytes, JobOptions::default()).await?;
//!     let status = converter.get_status(handle.job_id()).await?;
//!     eprintln!("{}: {}", status.job_id, status.status);
//!
//!     let video = handle.wait().await?;
//!     println!("{}", video.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `pdf2video` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | on      | Embeds the pdfium shared library at compile time |
//!
//! ## External Tools
//!
//! Rendering shells out to `ffmpeg` (and `ffprobe` to measure narration);
//! both must be on `PATH` or configured via
//! [`ConversionConfigBuilder::ffmpeg_path`] / [`ConversionConfigBuilder::ffprobe_path`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod chunk;
pub mod config;
pub mod converter;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod services;
pub mod storage;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{DocumentChat, SummaryLength};
pub use chunk::{Chunk, Chunker};
pub use config::{ConversionConfig, ConversionConfigBuilder, JobOptions, VideoQuality, DEFAULT_VOICE_ID};
pub use converter::{Converter, JobHandle, Services};
pub use error::{Pdf2VideoError, ServiceError, SoftMiss};
pub use model::{AudioClip, Job, JobPatch, JobSnapshot, JobStatus, Outcome, Page};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{Storage, StorageArea};
pub use store::{InMemoryJobStore, JobStore};
