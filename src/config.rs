//! Configuration types for document-to-video conversion.
//!
//! Service-wide behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Things a caller picks per upload
//! (voice, quality, effects) live in [`JobOptions`] and travel with the job.

use crate::error::Pdf2VideoError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// ElevenLabs "Rachel", the narration voice used when none is requested.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use edgequake_pdf2video::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .storage_root("./storage")
///     .max_concurrent_jobs(4)
///     .min_segment_secs(3.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Root directory holding `uploads/`, `temp/` and `outputs/`. Default: `./storage`.
    pub storage_root: PathBuf,

    /// Jobs allowed to run at the same time. Default: 2.
    ///
    /// Each job runs ffmpeg at the end, which saturates several cores on its
    /// own; more than a handful of parallel jobs only adds contention.
    pub max_concurrent_jobs: usize,

    /// Largest accepted upload in bytes. Default: 50 MB.
    pub max_upload_bytes: usize,

    // ── Script generation ────────────────────────────────────────────────
    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for script rewriting. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens per generated script. Default: 500.
    ///
    /// 500 tokens is roughly 60 seconds of speech, the upper end of what a
    /// single slide should take.
    pub max_tokens: usize,

    /// Extra attempts on a failed LLM call before the page falls back to its
    /// original text. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for LLM, image search and speech requests. Default: 60.
    pub api_timeout_secs: u64,

    /// Timeout for downloading a chosen image. Default: 30.
    pub download_timeout_secs: u64,

    /// Custom teacher-script prompt template. If None, uses the built-in one.
    pub script_prompt: Option<String>,

    // ── Remote assets ────────────────────────────────────────────────────
    /// Unsplash access key. Without it stock-photo search is a soft miss.
    pub unsplash_access_key: Option<String>,

    /// ElevenLabs API key. Without it narration is a soft miss.
    pub elevenlabs_api_key: Option<String>,

    /// Speaking rate used to estimate clip duration. Default: 150.
    pub words_per_minute: f64,

    // ── Extraction ───────────────────────────────────────────────────────
    /// Bullet points kept per page. Default: 5.
    pub max_bullet_points: usize,

    /// Rasterise each page and show it over the background. Default: true.
    pub render_snapshots: bool,

    /// Longest edge of a rasterised page snapshot. Default: 1600.
    pub snapshot_max_pixels: u32,

    // ── Rendering ────────────────────────────────────────────────────────
    /// Shortest a page segment may be, in seconds. Default: 3.0.
    pub min_segment_secs: f64,

    /// Length of fade in/out effects, in seconds. Default: 0.5.
    pub fade_secs: f64,

    /// Output frame rate. Default: 24.
    pub fps: u32,

    /// Output frame size. Default: 1920×1080.
    pub frame_width: u32,
    pub frame_height: u32,

    /// Draw the page title at the top of each segment. Default: true.
    pub title_overlay: bool,

    /// ffmpeg binary. Default: `ffmpeg` from PATH.
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary. Default: `ffprobe` from PATH.
    pub ffprobe_path: PathBuf,

    // ── Chat retrieval ───────────────────────────────────────────────────
    /// Characters per chunk. Default: 2000.
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks. Default: 200.
    pub chunk_overlap: usize,

    /// Chunks handed to the model per question. Default: 5.
    pub max_chunks: usize,

    /// Character budget for the assembled context. Default: 10 000.
    pub max_context_chars: usize,

    /// Optional per-job progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./storage"),
            max_concurrent_jobs: 2,
            max_upload_bytes: 50 * 1024 * 1024,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 500,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 30,
            script_prompt: None,
            unsplash_access_key: None,
            elevenlabs_api_key: None,
            words_per_minute: 150.0,
            max_bullet_points: 5,
            render_snapshots: true,
            snapshot_max_pixels: 1600,
            min_segment_secs: 3.0,
            fade_secs: 0.5,
            fps: 24,
            frame_width: 1920,
            frame_height: 1080,
            title_overlay: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            chunk_size: 2000,
            chunk_overlap: 200,
            max_chunks: 5,
            max_context_chars: 10_000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("storage_root", &self.storage_root)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("unsplash", &self.unsplash_access_key.as_ref().map(|_| "<redacted>"))
            .field("elevenlabs", &self.elevenlabs_api_key.as_ref().map(|_| "<redacted>"))
            .field("min_segment_secs", &self.min_segment_secs)
            .field("fade_secs", &self.fade_secs)
            .field("fps", &self.fps)
            .field("frame", &format_args!("{}x{}", self.frame_width, self.frame_height))
            .field("title_overlay", &self.title_overlay)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus API keys from `UNSPLASH_ACCESS_KEY` / `ELEVENLABS_API_KEY`.
    pub fn builder_from_env() -> ConversionConfigBuilder {
        let mut builder = Self::builder();
        if let Some(key) = non_empty_env("UNSPLASH_ACCESS_KEY") {
            builder = builder.unsplash_access_key(key);
        }
        if let Some(key) = non_empty_env("ELEVENLABS_API_KEY") {
            builder = builder.elevenlabs_api_key(key);
        }
        builder
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn script_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.script_prompt = Some(prompt.into());
        self
    }

    pub fn unsplash_access_key(mut self, key: impl Into<String>) -> Self {
        self.config.unsplash_access_key = Some(key.into());
        self
    }

    pub fn elevenlabs_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.elevenlabs_api_key = Some(key.into());
        self
    }

    pub fn words_per_minute(mut self, wpm: f64) -> Self {
        self.config.words_per_minute = wpm.clamp(60.0, 400.0);
        self
    }

    pub fn max_bullet_points(mut self, n: usize) -> Self {
        self.config.max_bullet_points = n;
        self
    }

    pub fn render_snapshots(mut self, v: bool) -> Self {
        self.config.render_snapshots = v;
        self
    }

    pub fn snapshot_max_pixels(mut self, px: u32) -> Self {
        self.config.snapshot_max_pixels = px.max(100);
        self
    }

    pub fn min_segment_secs(mut self, secs: f64) -> Self {
        self.config.min_segment_secs = secs.max(0.5);
        self
    }

    pub fn fade_secs(mut self, secs: f64) -> Self {
        self.config.fade_secs = secs.max(0.0);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps.clamp(1, 120);
        self
    }

    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.config.frame_width = width;
        self.config.frame_height = height;
        self
    }

    pub fn title_overlay(mut self, v: bool) -> Self {
        self.config.title_overlay = v;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffprobe_path = path.into();
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn chunk_overlap(mut self, n: usize) -> Self {
        self.config.chunk_overlap = n;
        self
    }

    pub fn max_chunks(mut self, n: usize) -> Self {
        self.config.max_chunks = n.max(1);
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.max_context_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2VideoError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(Pdf2VideoError::InvalidConfig(
                "chunk_size must be ≥ 1".into(),
            ));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.frame_width < 16 || c.frame_height < 16 {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "frame size {}x{} is too small",
                c.frame_width, c.frame_height
            )));
        }
        // libx264 with yuv420p rejects odd dimensions.
        if c.frame_width % 2 != 0 || c.frame_height % 2 != 0 {
            return Err(Pdf2VideoError::InvalidConfig(format!(
                "frame size {}x{} must have even dimensions",
                c.frame_width, c.frame_height
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(Pdf2VideoError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Per-job options ──────────────────────────────────────────────────────

/// Choices made per submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Speech engine voice id.
    pub voice: String,
    pub quality: VideoQuality,
    /// Fade every segment in and out.
    pub include_animations: bool,
    /// Fade between adjacent segments.
    pub include_transitions: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE_ID.to_string(),
            quality: VideoQuality::default(),
            include_animations: true,
            include_transitions: true,
        }
    }
}

/// Output quality tier, mapped to a target video bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl VideoQuality {
    /// ffmpeg `-b:v` value.
    pub fn bitrate(self) -> &'static str {
        match self {
            VideoQuality::High => "5000k",
            VideoQuality::Medium => "2500k",
            VideoQuality::Low => "1000k",
        }
    }
}

impl FromStr for VideoQuality {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(VideoQuality::High),
            "medium" => Ok(VideoQuality::Medium),
            "low" => Ok(VideoQuality::Low),
            other => Err(Pdf2VideoError::InvalidConfig(format!(
                "unknown video quality '{}': expected high, medium or low",
                other
            ))),
        }
    }
}
