//! Video assembly: pages → one MP4.
//!
//! For every page, in ascending page number: compose a frame, plan a
//! segment of `max(audio, floor)` seconds, encode it. Then concatenate the
//! segments and move the result to its durable path. Any failure here is
//! fatal to the job; a skipped segment would shift every later page.
//!
//! ## Atomic output
//!
//! The concatenated file is written inside the job's scratch tree and only
//! moved to the output path after ffmpeg exits cleanly. A rename is atomic on
//! one filesystem; across devices the file is copied into a temporary file
//! next to the destination and persisted (renamed) from there.

use crate::config::{JobOptions, VideoQuality};
use crate::error::Pdf2VideoError;
use crate::model::Page;
use crate::pipeline::frame::FrameComposer;
use crate::services::VideoEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the encoder needs for one page segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub page_number: usize,
    pub frame: PathBuf,
    /// `None` encodes a silent track.
    pub audio: Option<PathBuf>,
    pub duration_secs: f64,
    pub fade_in: bool,
    pub fade_out: bool,
    pub fade_secs: f64,
    /// Drawn at the top of the frame when set.
    pub title: Option<String>,
    pub bitrate: &'static str,
}

impl SegmentPlan {
    /// Fade length, clamped to half the segment.
    pub fn effective_fade(&self) -> f64 {
        self.fade_secs.min(self.duration_secs / 2.0).max(0.0)
    }
}

/// Displayed duration of a segment: the audio length, never below `floor`.
pub fn segment_duration(audio_secs: f64, floor: f64) -> f64 {
    audio_secs.max(floor)
}

/// Plans, encodes and joins page segments.
#[derive(Clone)]
pub struct VideoAssembler {
    encoder: Arc<dyn VideoEncoder>,
    composer: FrameComposer,
    min_segment_secs: f64,
    fade_secs: f64,
    title_overlay: bool,
}

impl VideoAssembler {
    pub fn new(encoder: Arc<dyn VideoEncoder>, composer: FrameComposer) -> Self {
        Self {
            encoder,
            composer,
            min_segment_secs: 3.0,
            fade_secs: 0.5,
            title_overlay: true,
        }
    }

    pub fn with_timing(mut self, min_segment_secs: f64, fade_secs: f64) -> Self {
        self.min_segment_secs = min_segment_secs;
        self.fade_secs = fade_secs;
        self
    }

    pub fn with_title_overlay(mut self, enabled: bool) -> Self {
        self.title_overlay = enabled;
        self
    }

    /// Segment plans for `pages`, sorted by page number.
    ///
    /// `include_animations` fades every segment in and out;
    /// `include_transitions` fades only across segment boundaries.
    pub fn plan(&self, pages: &[Page], options: &JobOptions, frames_dir: &Path) -> Vec<SegmentPlan> {
        let mut ordered: Vec<&Page> = pages.iter().collect();
        ordered.sort_by_key(|p| p.number);
        let last = ordered.len().saturating_sub(1);

        ordered
            .into_iter()
            .enumerate()
            .map(|(idx, page)| SegmentPlan {
                page_number: page.number,
                frame: frames_dir.join(format!("page_{}.png", page.number)),
                audio: page.audio.as_ref().map(|a| a.path.clone()),
                duration_secs: segment_duration(page.audio_duration(), self.min_segment_secs),
                fade_in: options.include_animations || (options.include_transitions && idx > 0),
                fade_out: options.include_animations || (options.include_transitions && idx < last),
                fade_secs: self.fade_secs,
                title: if self.title_overlay {
                    page.title.clone()
                } else {
                    None
                },
                bitrate: options.quality.bitrate(),
            })
            .collect()
    }

    /// Render `pages` into `output`.
    ///
    /// `frames_dir` and `segments_dir` are job-owned scratch directories;
    /// the concatenated file lives in `segments_dir` until it is moved.
    pub async fn assemble(
        &self,
        pages: &[Page],
        options: &JobOptions,
        frames_dir: &Path,
        segments_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf, Pdf2VideoError> {
        if pages.is_empty() {
            return Err(Pdf2VideoError::render(None, "no pages to render"));
        }

        let plans = self.plan(pages, options, frames_dir);
        let mut segments = Vec::with_capacity(plans.len());

        for plan in &plans {
            let page = pages
                .iter()
                .find(|p| p.number == plan.page_number)
                .ok_or_else(|| Pdf2VideoError::Internal(format!("page {} vanished", plan.page_number)))?;
            self.render_frame(page, &plan.frame).await?;

            let segment = segments_dir.join(format!("segment_{:04}.mp4", plan.page_number));
            debug!(
                "Page {}: encoding {:.2}s segment (audio={})",
                plan.page_number,
                plan.duration_secs,
                plan.audio.is_some()
            );
            self.encoder.encode_segment(plan, &segment).await?;
            segments.push(segment);
        }

        let joined = segments_dir.join("joined.mp4");
        self.encoder.concat(&segments, &joined, segments_dir).await?;
        move_into_place(&joined, output).await?;

        info!(
            "Assembled {} segments ({} quality) into {}",
            segments.len(),
            quality_name(options.quality),
            output.display()
        );
        Ok(output.to_path_buf())
    }

    async fn render_frame(&self, page: &Page, frame: &Path) -> Result<(), Pdf2VideoError> {
        let composer = self.composer;
        let number = page.number;
        let background = page.background.clone();
        let snapshot = page.snapshot.clone();
        let frame = frame.to_path_buf();

        tokio::task::spawn_blocking(move || {
            composer.render_to(number, background.as_deref(), snapshot.as_deref(), &frame)
        })
        .await
        .map_err(|e| Pdf2VideoError::Internal(format!("Frame task panicked: {}", e)))?
    }
}

fn quality_name(q: VideoQuality) -> &'static str {
    match q {
        VideoQuality::High => "high",
        VideoQuality::Medium => "medium",
        VideoQuality::Low => "low",
    }
}

/// Move `from` to `to` without exposing a partial file at `to`.
pub async fn move_into_place(from: &Path, to: &Path) -> Result<(), Pdf2VideoError> {
    let parent = to
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| Pdf2VideoError::storage(&parent, e))?;

    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    // Different filesystem: copy next to the destination, then rename.
    let from = from.to_path_buf();
    let to = to.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| Pdf2VideoError::storage(&parent, e))?;
        let mut src = std::fs::File::open(&from).map_err(|e| Pdf2VideoError::storage(&from, e))?;
        std::io::copy(&mut src, tmp.as_file_mut()).map_err(|e| Pdf2VideoError::storage(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Pdf2VideoError::storage(tmp.path(), e))?;
        tmp.persist(&to)
            .map_err(|e| Pdf2VideoError::storage(&to, e.error))?;
        // Scratch copy is cleaned up with the job tree if this fails.
        let _ = std::fs::remove_file(&from);
        Ok::<(), Pdf2VideoError>(())
    })
    .await
    .map_err(|e| Pdf2VideoError::Internal(format!("Move task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AudioClip;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEncoder {
        plans: Mutex<Vec<SegmentPlan>>,
    }

    #[async_trait]
    impl VideoEncoder for RecordingEncoder {
        async fn encode_segment(&self, plan: &SegmentPlan, output: &Path) -> Result<(), Pdf2VideoError> {
            self.plans.lock().unwrap().push(plan.clone());
            tokio::fs::write(output, b"segment").await.unwrap();
            Ok(())
        }

        async fn concat(&self, segments: &[PathBuf], output: &Path, _scratch: &Path) -> Result<(), Pdf2VideoError> {
            tokio::fs::write(output, format!("{} segments", segments.len()))
                .await
                .unwrap();
            Ok(())
        }
    }

    fn page(number: usize, audio_secs: Option<f64>) -> Page {
        let mut p = Page::new(number, "text");
        p.title = Some(format!("Page {number}"));
        p.audio = audio_secs.map(|d| AudioClip {
            path: PathBuf::from(format!("/a/page_{number}.mp3")),
            duration_secs: d,
        });
        p
    }

    fn assembler() -> VideoAssembler {
        VideoAssembler::new(Arc::new(RecordingEncoder::default()), FrameComposer::new(32, 18))
    }

    #[test]
    fn audio_longer_than_floor_wins() {
        assert_eq!(segment_duration(7.4, 3.0), 7.4);
        assert_eq!(segment_duration(0.0, 3.0), 3.0);
        assert_eq!(segment_duration(1.2, 3.0), 3.0);
    }

    #[test]
    fn plans_are_sorted_by_page_number() {
        let pages = vec![page(3, None), page(1, Some(4.0)), page(2, Some(7.4))];
        let plans = assembler().plan(&pages, &JobOptions::default(), Path::new("/f"));
        let numbers: Vec<usize> = plans.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(plans[1].duration_secs, 7.4);
        assert_eq!(plans[2].duration_secs, 3.0);
        assert!(plans[2].audio.is_none());
        assert_eq!(plans[0].frame, PathBuf::from("/f/page_1.png"));
    }

    #[test]
    fn transitions_only_fade_inner_boundaries() {
        let pages = vec![page(1, None), page(2, None), page(3, None)];
        let options = JobOptions {
            include_animations: false,
            include_transitions: true,
            ..Default::default()
        };
        let plans = assembler().plan(&pages, &options, Path::new("/f"));
        assert!(!plans[0].fade_in && plans[0].fade_out);
        assert!(plans[1].fade_in && plans[1].fade_out);
        assert!(plans[2].fade_in && !plans[2].fade_out);
    }

    #[test]
    fn no_effects_and_no_overlay() {
        let pages = vec![page(1, None)];
        let options = JobOptions {
            include_animations: false,
            include_transitions: false,
            ..Default::default()
        };
        let plans = assembler()
            .with_title_overlay(false)
            .plan(&pages, &options, Path::new("/f"));
        assert!(!plans[0].fade_in && !plans[0].fade_out);
        assert!(plans[0].title.is_none());
    }

    #[test]
    fn fade_is_clamped_to_half_segment() {
        let plan = SegmentPlan {
            page_number: 1,
            frame: PathBuf::new(),
            audio: None,
            duration_secs: 0.6,
            fade_in: true,
            fade_out: true,
            fade_secs: 0.5,
            title: None,
            bitrate: "1000k",
        };
        assert_eq!(plan.effective_fade(), 0.3);
    }

    #[tokio::test]
    async fn assemble_moves_output_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        let segments = dir.path().join("segments");
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::create_dir_all(&segments).unwrap();
        let output = dir.path().join("out").join("video.mp4");

        let encoder = Arc::new(RecordingEncoder::default());
        let assembler = VideoAssembler::new(encoder.clone(), FrameComposer::new(32, 18));
        let pages = vec![page(2, None), page(1, Some(5.0))];
        let path = assembler
            .assemble(&pages, &JobOptions::default(), &frames, &segments, &output)
            .await
            .unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "2 segments");
        assert!(!segments.join("joined.mp4").exists());
        assert!(frames.join("page_1.png").exists());
        assert_eq!(encoder.plans.lock().unwrap()[0].page_number, 1);
    }

    #[tokio::test]
    async fn move_into_place_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.mp4");
        std::fs::write(&from, b"video").unwrap();
        let to = dir.path().join("nested").join("b.mp4");
        move_into_place(&from, &to).await.unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"video");
        assert!(!from.exists());
    }
}
