//! CLI binary for edgequake-pdf2video.
//!
//! A thin shim over the library crate: maps flags to `ConversionConfig`,
//! submits one job and renders its progress.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2video::pipeline::extract::{DocumentExtractor, PdfiumExtractor};
use edgequake_pdf2video::{
    ConversionConfig, Converter, JobOptions, JobProgressCallback, JobStatus, ProgressCallback,
    SoftMiss, SummaryLength, VideoQuality, DEFAULT_VOICE_ID,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders job progress as a percentage bar with one log line per stage.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
    misses: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Queued");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
            misses: AtomicUsize::new(0),
        })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_stage(&self, _job_id: &str, status: JobStatus, progress: f32) {
        self.bar.set_position(progress as u64);
        self.bar.set_prefix(status.step_label());
        self.bar.set_message("");
        if status != JobStatus::Completed {
            self.bar.println(format!(
                "{} {}  {}",
                cyan("◆"),
                bold(status.step_label()),
                dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
            ));
        }
    }

    fn on_page(&self, _job_id: &str, _status: JobStatus, page_num: usize, total_pages: usize) {
        self.bar.set_message(format!("page {page_num}/{total_pages}"));
    }

    fn on_soft_miss(&self, _job_id: &str, miss: &SoftMiss) {
        self.misses.fetch_add(1, Ordering::SeqCst);
        let mut msg = miss.to_string();
        if msg.chars().count() > 100 {
            msg = msg.chars().take(99).collect::<String>() + "\u{2026}";
        }
        self.bar.println(format!("  {} {}", yellow("⚠"), dim(&msg)));
    }

    fn on_job_complete(&self, _job_id: &str, artifact: &Path) {
        self.bar.finish_and_clear();
        let misses = self.misses.load(Ordering::SeqCst);
        eprintln!(
            "{} Video ready in {:.1}s{}  →  {}",
            green("✔"),
            self.started.elapsed().as_secs_f64(),
            if misses > 0 {
                format!("  ({misses} degraded assets)")
            } else {
                String::new()
            },
            bold(&artifact.display().to_string())
        );
    }

    fn on_job_failed(&self, _job_id: &str, error: &str) {
        self.bar.abandon();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a lecture, copy the video next to it
  pdf2video lecture.pdf -o lecture.mp4

  # Faster, smaller render without effects
  pdf2video --quality low --no-animations --no-transitions slides.pdf

  # Different ElevenLabs voice and a longer minimum per slide
  pdf2video --voice EXAVITQu4vr4xnJ6H9JT --min-segment 5 deck.pdf

  # Ask a question about a document (no video)
  pdf2video --ask "What are the three laws?" physics.pdf

  # Summarise a document
  pdf2video --summary detailed report.pdf

  # Machine-readable final status
  pdf2video --json lecture.pdf > status.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (script writing, chat)
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  UNSPLASH_ACCESS_KEY     Stock photo search; without it pages use embedded images
  ELEVENLABS_API_KEY      Narration; without it segments are silent
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download

REQUIREMENTS:
  ffmpeg and ffprobe on PATH (or --ffmpeg / --ffprobe).
"#;

/// Turn a PDF into a narrated teaching video.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2video",
    version,
    about = "Turn a PDF into a narrated teaching video",
    long_about = "Extracts every page of a PDF, rewrites it as a spoken teaching script with an \
LLM, finds a background photo, narrates it with text-to-speech and renders all pages into one MP4.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file.
    input: PathBuf,

    /// Copy the finished video to this path.
    #[arg(short, long, env = "PDF2VIDEO_OUTPUT")]
    output: Option<PathBuf>,

    /// Job id (letters, digits, '-' and '_'). Default: random UUID.
    #[arg(long)]
    job_id: Option<String>,

    /// Video quality: high (5000k), medium (2500k), low (1000k).
    #[arg(long, env = "PDF2VIDEO_QUALITY", default_value = "high")]
    quality: VideoQuality,

    /// ElevenLabs voice id.
    #[arg(long, env = "PDF2VIDEO_VOICE", default_value = DEFAULT_VOICE_ID)]
    voice: String,

    /// Do not fade each segment in and out.
    #[arg(long)]
    no_animations: bool,

    /// Do not fade between adjacent segments.
    #[arg(long)]
    no_transitions: bool,

    /// Do not draw page titles on the video.
    #[arg(long)]
    no_title_overlay: bool,

    /// Root directory for uploads, scratch files and outputs.
    #[arg(long, env = "PDF2VIDEO_STORAGE", default_value = "./storage")]
    storage_dir: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Shortest segment per page, in seconds.
    #[arg(long, env = "PDF2VIDEO_MIN_SEGMENT", default_value_t = 3.0)]
    min_segment: f64,

    /// Retries per LLM call.
    #[arg(long, env = "PDF2VIDEO_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call API timeout in seconds.
    #[arg(long, env = "PDF2VIDEO_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// ffmpeg binary.
    #[arg(long, env = "PDF2VIDEO_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary.
    #[arg(long, env = "PDF2VIDEO_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Answer a question about the document instead of making a video.
    #[arg(long, conflicts_with = "summary")]
    ask: Option<String>,

    /// Summarise the document (brief, standard, detailed) instead of making a video.
    #[arg(long)]
    summary: Option<SummaryLength>,

    /// Keep the job's upload and scratch files after completion.
    #[arg(long)]
    keep_scratch: bool,

    /// Print the final job status as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2VIDEO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2VIDEO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2VIDEO_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdfium(cli.quiet)?;

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let chat_mode = cli.ask.is_some() || cli.summary.is_some();
    let progress_cb: Option<ProgressCallback> = if show_progress && !chat_mode {
        Some(CliProgressCallback::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::from_config(config);

    // ── Chat modes ───────────────────────────────────────────────────────
    if chat_mode {
        let text = document_text(&converter, bytes).await?;
        let chat = converter.chat();
        let answer = match cli.ask {
            Some(ref question) => chat.ask(&text, &[], question).await,
            None => chat.summarize(&text, cli.summary.unwrap_or_default()).await,
        }
        .context("Generation failed")?;
        println!("{answer}");
        return Ok(());
    }

    // ── Conversion ───────────────────────────────────────────────────────
    let options = JobOptions {
        voice: cli.voice.clone(),
        quality: cli.quality,
        include_animations: !cli.no_animations,
        include_transitions: !cli.no_transitions,
    };
    let handle = converter
        .submit(cli.job_id.clone(), bytes, options)
        .await
        .context("Submission rejected")?;
    let job_id = handle.job_id().to_string();
    if !cli.quiet && !show_progress && !cli.json {
        eprintln!("Job {} queued", job_id);
    }

    let result = handle.wait().await;
    let status = converter
        .get_status(&job_id)
        .await
        .context("Failed to read job status")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&status).context("Failed to serialise status")?;
        println!("{json}");
    }

    let artifact = result.context("Conversion failed")?;

    if let Some(ref dest) = cli.output {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::copy(&artifact, dest)
            .await
            .with_context(|| format!("Failed to copy video to {}", dest.display()))?;
        if !cli.quiet && !cli.json {
            eprintln!("{}  →  {}", green("✔"), bold(&dest.display().to_string()));
        }
    } else if !cli.quiet && !show_progress && !cli.json {
        eprintln!("Video: {}", artifact.display());
    }

    if !cli.keep_scratch {
        converter
            .storage()
            .cleanup_job(&job_id, true)
            .await
            .context("Failed to clean up job scratch files")?;
    }

    Ok(())
}

/// Make sure the pdfium shared library can be loaded.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    // Already cached (or embedded with `bundled`): nothing to show.
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if !quiet {
        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        dl_bar.set_prefix("PDF engine");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        })
        .context("Failed to download PDFium engine")?;

        dl_bar.finish_with_message("ready ✓");
    } else {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
    }

    Ok(())
}

/// Plain text of every page, for chat and summaries.
async fn document_text(converter: &Converter, bytes: Vec<u8>) -> Result<String> {
    let config = converter.config();
    let extractor = PdfiumExtractor::new(config.max_bullet_points, false, config.snapshot_max_pixels);
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let dir = scratch.path().to_path_buf();

    let pages = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &dir))
        .await
        .context("Extraction task panicked")?
        .context("Failed to extract document")?;

    Ok(pages
        .iter()
        .map(|p| p.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder_from_env()
        .storage_root(&cli.storage_dir)
        .min_segment_secs(cli.min_segment)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .title_overlay(!cli.no_title_overlay)
        .ffmpeg_path(&cli.ffmpeg)
        .ffprobe_path(&cli.ffprobe);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
