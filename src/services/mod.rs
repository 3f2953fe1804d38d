//! External capabilities the pipeline consumes.
//!
//! Each capability is a trait so the orchestrator can be driven by real
//! vendors in production and by in-process fakes in tests:
//!
//! | Trait | Production adapter |
//! |-------|--------------------|
//! | [`TextGenerator`] | [`llm::LlmTextGenerator`] (edgequake-llm) |
//! | [`ImageSearch`]   | [`unsplash::UnsplashClient`] |
//! | [`SpeechEngine`]  | [`elevenlabs::ElevenLabsEngine`] |
//! | [`VideoEncoder`], [`MediaProbe`] | [`ffmpeg::Ffmpeg`] |

pub mod elevenlabs;
pub mod ffmpeg;
pub mod llm;
pub mod unsplash;

use crate::error::{Pdf2VideoError, ServiceError};
use crate::pipeline::assemble::SegmentPlan;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

// ── Text generation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completion request: optional system prompt plus conversation turns.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationRequest {
    /// A single user prompt with no system message.
    pub fn prompt(prompt: impl Into<String>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            system: None,
            turns: vec![Turn::user(prompt)],
            temperature,
            max_tokens,
        }
    }
}

/// `generate(prompt) -> text`; may fail or time out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;
}

// ── Image search ─────────────────────────────────────────────────────────

/// Top search result for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHit {
    pub image_url: String,
    /// Endpoint to ping when the image is used (provider usage accounting).
    pub download_location: Option<String>,
    pub photographer: Option<String>,
    pub attribution_url: Option<String>,
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Best match for `query`, or `None` if nothing matched.
    async fn search(&self, query: &str) -> Result<Option<ImageHit>, ServiceError>;

    /// Download the hit's image to `dest`.
    async fn download(&self, hit: &ImageHit, dest: &Path) -> Result<(), ServiceError>;

    /// Report that the image was used. Best effort.
    async fn notify_download(&self, hit: &ImageHit) -> Result<(), ServiceError>;
}

// ── Speech ───────────────────────────────────────────────────────────────

/// Synthesised narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Speech {
    pub audio: Vec<u8>,
    /// File extension matching the audio encoding, e.g. `mp3`.
    pub extension: String,
    /// Set by engines that report timing.
    pub duration_secs: Option<f64>,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Speech, ServiceError>;
}

// ── Video ────────────────────────────────────────────────────────────────

/// Encodes page segments and joins them.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode one still-image segment described by `plan` into `output`.
    async fn encode_segment(&self, plan: &SegmentPlan, output: &Path) -> Result<(), Pdf2VideoError>;

    /// Concatenate `segments` in order into `output`.
    ///
    /// `scratch` is a job-owned directory for intermediate files.
    async fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<(), Pdf2VideoError>;
}

/// Reads the duration of a media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ServiceError>;
}
