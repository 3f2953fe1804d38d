//! Still-frame compositing for one page segment.
//!
//! Layers, bottom to top:
//! 1. background image cover-fitted to the frame, blurred and darkened, or
//!    a dark vertical gradient when the page has no usable background
//! 2. the rasterised page (if any), scaled to fit and framed as a card
//!
//! The title is not drawn here; ffmpeg's `drawtext` adds it during encode
//! so the frame stays reusable when overlays are disabled.
//!
//! All work is CPU-bound; callers run it in `spawn_blocking`.

use crate::error::Pdf2VideoError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage};
use std::path::Path;
use tracing::{debug, warn};

const GRADIENT_TOP: [u8; 3] = [30, 41, 59];
const GRADIENT_BOTTOM: [u8; 3] = [15, 23, 42];
const DARKEN: i32 = -70;
const BLUR_SIGMA: f32 = 3.0;
/// Background is blurred at 1/BLUR_DOWNSCALE resolution, then scaled back up.
const BLUR_DOWNSCALE: u32 = 4;
const CARD_BORDER: u32 = 8;
const CARD_MAX_WIDTH: f32 = 0.8;
const CARD_MAX_HEIGHT: f32 = 0.72;

/// Composes fixed-size frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameComposer {
    pub width: u32,
    pub height: u32,
}

impl FrameComposer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Compose a frame for a page and write it to `output` as PNG.
    ///
    /// Unreadable inputs degrade to the placeholder or no card; only the
    /// final write can fail.
    pub fn render_to(
        &self,
        page: usize,
        background: Option<&Path>,
        snapshot: Option<&Path>,
        output: &Path,
    ) -> Result<(), Pdf2VideoError> {
        let frame = self.compose(page, background, snapshot);
        DynamicImage::ImageRgba8(frame)
            .to_rgb8()
            .save(output)
            .map_err(|e| Pdf2VideoError::render(Some(page), format!("writing frame: {}", e)))?;
        debug!("Page {}: frame written to {}", page, output.display());
        Ok(())
    }

    pub fn compose(&self, page: usize, background: Option<&Path>, snapshot: Option<&Path>) -> RgbaImage {
        let mut frame = match background.map(image::open) {
            Some(Ok(img)) => self.backdrop(&img),
            Some(Err(e)) => {
                warn!("Page {}: unreadable background, using placeholder: {}", page, e);
                self.placeholder()
            }
            None => self.placeholder(),
        };

        if let Some(path) = snapshot {
            match image::open(path) {
                Ok(img) => self.overlay_card(&mut frame, &img),
                Err(e) => warn!("Page {}: unreadable snapshot, skipping card: {}", page, e),
            }
        }
        frame
    }

    /// Cover-fit, blur and darken.
    fn backdrop(&self, img: &DynamicImage) -> RgbaImage {
        let small_w = (self.width / BLUR_DOWNSCALE).max(1);
        let small_h = (self.height / BLUR_DOWNSCALE).max(1);
        let small = img.resize_to_fill(small_w, small_h, FilterType::Triangle);
        let blurred = small.blur(BLUR_SIGMA);
        let full = blurred.resize_exact(self.width, self.height, FilterType::Triangle);
        imageops::colorops::brighten(&full.to_rgba8(), DARKEN)
    }

    /// Dark vertical gradient.
    pub fn placeholder(&self) -> RgbaImage {
        let h = self.height.max(2) - 1;
        ImageBuffer::from_fn(self.width, self.height, |_, y| {
            let t = y as f32 / h as f32;
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            Rgba([
                mix(GRADIENT_TOP[0], GRADIENT_BOTTOM[0]),
                mix(GRADIENT_TOP[1], GRADIENT_BOTTOM[1]),
                mix(GRADIENT_TOP[2], GRADIENT_BOTTOM[2]),
                255,
            ])
        })
    }

    /// Centre `card` on `frame` inside a white border.
    fn overlay_card(&self, frame: &mut RgbaImage, card: &DynamicImage) {
        let max_w = (self.width as f32 * CARD_MAX_WIDTH) as u32;
        let max_h = (self.height as f32 * CARD_MAX_HEIGHT) as u32;
        let inner_w = max_w.saturating_sub(2 * CARD_BORDER).max(1);
        let inner_h = max_h.saturating_sub(2 * CARD_BORDER).max(1);
        let scaled = card.resize(inner_w, inner_h, FilterType::Lanczos3).to_rgba8();

        let bordered_w = scaled.width() + 2 * CARD_BORDER;
        let bordered_h = scaled.height() + 2 * CARD_BORDER;
        let mut bordered = RgbaImage::from_pixel(bordered_w, bordered_h, Rgba([255, 255, 255, 255]));
        imageops::overlay(&mut bordered, &scaled, CARD_BORDER as i64, CARD_BORDER as i64);

        let x = (self.width as i64 - bordered_w as i64) / 2;
        let y = (self.height as i64 - bordered_h as i64) / 2;
        imageops::overlay(frame, &bordered, x, y);
    }
}
