//! ffmpeg/ffprobe subprocess adapter.
//!
//! Every segment is encoded with the same codec parameters (libx264
//! yuv420p at a fixed fps, AAC stereo 44.1 kHz) so the concat demuxer can
//! join them with stream copy. Silent pages get an `anullsrc` track for the
//! same reason.

use super::{MediaProbe, VideoEncoder};
use crate::config::ConversionConfig;
use crate::error::{Pdf2VideoError, ServiceError};
use crate::pipeline::assemble::SegmentPlan;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

const STDERR_TAIL_LINES: usize = 12;
const SILENT_AUDIO: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Runs the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    fps: u32,
    width: u32,
    height: u32,
    /// Caps concurrent ffmpeg processes across jobs.
    processes: Option<Arc<Semaphore>>,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            fps: 24,
            width: 1920,
            height: 1080,
            processes: None,
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
            .with_output(config.fps, config.frame_width, config.frame_height)
            .with_max_processes(config.max_concurrent_jobs)
    }

    pub fn with_output(mut self, fps: u32, width: u32, height: u32) -> Self {
        self.fps = fps.max(1);
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_max_processes(mut self, n: usize) -> Self {
        self.processes = Some(Arc::new(Semaphore::new(n.max(1))));
        self
    }

    async fn run(&self, program: &Path, args: &[String]) -> Result<Output, std::io::Error> {
        let _permit = match &self.processes {
            Some(sem) => Some(
                sem.acquire()
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))?,
            ),
            None => None,
        };
        debug!("Running {} {}", program.display(), args.join(" "));
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn run_ffmpeg(&self, page: Option<usize>, args: &[String]) -> Result<(), Pdf2VideoError> {
        let output = self.run(&self.ffmpeg_path, args).await.map_err(|e| {
            Pdf2VideoError::render(
                page,
                format!("could not run {}: {}", self.ffmpeg_path.display(), e),
            )
        })?;
        if !output.status.success() {
            return Err(Pdf2VideoError::render(
                page,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for Ffmpeg {
    async fn encode_segment(&self, plan: &SegmentPlan, output: &Path) -> Result<(), Pdf2VideoError> {
        let args = segment_args(plan, self.fps, output);
        self.run_ffmpeg(Some(plan.page_number), &args).await
    }

    async fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<(), Pdf2VideoError> {
        if segments.is_empty() {
            return Err(Pdf2VideoError::render(None, "no segments to concatenate"));
        }
        let list = scratch.join("concat.txt");
        tokio::fs::write(&list, concat_list(segments))
            .await
            .map_err(|e| Pdf2VideoError::storage(&list, e))?;

        let args = vec![
            "-y".to_string(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(&list),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ];
        self.run_ffmpeg(None, &args).await
    }
}

#[async_trait]
impl MediaProbe for Ffmpeg {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ServiceError> {
        let args = vec![
            "-v".to_string(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            path_arg(path),
        ];
        let output = self.run(&self.ffprobe_path, &args).await?;
        if !output.status.success() {
            return Err(ServiceError::Malformed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

// ── Argument building ────────────────────────────────────────────────────

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// ffmpeg arguments for one still-image segment.
pub(crate) fn segment_args(plan: &SegmentPlan, fps: u32, output: &Path) -> Vec<String> {
    let duration = format!("{:.3}", plan.duration_secs);
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        path_arg(&plan.frame),
    ];

    match &plan.audio {
        Some(audio) => {
            args.push("-i".to_string());
            args.push(path_arg(audio));
        }
        None => {
            args.extend(["-f".to_string(), "lavfi".to_string(), "-i".to_string(), SILENT_AUDIO.to_string()]);
        }
    }

    args.extend([
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-t".to_string(),
        duration,
        "-vf".to_string(),
        video_filters(plan),
    ]);

    if plan.audio.is_some() {
        args.push("-af".to_string());
        args.push(audio_filters(plan));
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-b:v".to_string(),
        plan.bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        path_arg(output),
    ]);
    args
}

fn video_filters(plan: &SegmentPlan) -> String {
    let mut filters = Vec::new();
    let fade = plan.effective_fade();
    if plan.fade_in && fade > 0.0 {
        filters.push(format!("fade=t=in:st=0:d={:.3}", fade));
    }
    if plan.fade_out && fade > 0.0 {
        filters.push(format!(
            "fade=t=out:st={:.3}:d={:.3}",
            plan.duration_secs - fade,
            fade
        ));
    }
    if let Some(title) = plan.title.as_deref().filter(|t| !t.trim().is_empty()) {
        filters.push(format!(
            "drawtext=text='{}':expansion=none:fontcolor=white:fontsize=h/18:x=(w-text_w)/2:y=h/14:box=1:boxcolor=black@0.45:boxborderw=20",
            escape_drawtext(title)
        ));
    }
    filters.push("format=yuv420p".into());
    filters.join(",")
}

fn audio_filters(plan: &SegmentPlan) -> String {
    let mut filters = vec!["apad".to_string()];
    let fade = plan.effective_fade();
    if plan.fade_in && fade > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={:.3}", fade));
    }
    if plan.fade_out && fade > 0.0 {
        filters.push(format!(
            "afade=t=out:st={:.3}:d={:.3}",
            plan.duration_secs - fade,
            fade
        ));
    }
    filters.join(",")
}

/// Escape text for a single-quoted `drawtext` value.
///
/// The filtergraph parser keeps the quoted text verbatim and the option
/// parser then unescapes it once, so only `\` and `:` need a backslash.
/// `%` is left alone: the filter runs with `expansion=none`. A literal `'`
/// cannot appear inside the quotes, so it becomes `’`.
pub(crate) fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            '\'' => out.push('\u{2019}'),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Body of a concat-demuxer list file.
pub(crate) fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| {
            let abs = std::path::absolute(p).unwrap_or_else(|_| p.clone());
            format!("file '{}'\n", path_arg(&abs).replace('\'', "'\\''"))
        })
        .collect()
}

fn parse_duration(stdout: &str) -> Result<f64, ServiceError> {
    let value = stdout.trim();
    value
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ServiceError::Malformed(format!("unexpected ffprobe duration '{}'", value)))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
