//! Page extraction: PDF bytes → ordered [`Page`] records.
//!
//! pdfium does the parsing; everything after "raw text and image files per
//! page" is plain Rust ([`pages_from_raw`]) so the title and bullet
//! heuristics can be tested without a PDF.
//!
//! ## Blocking
//!
//! pdfium keeps thread-local state and is CPU-bound. [`DocumentExtractor`]
//! is a synchronous trait; the orchestrator calls it from
//! `tokio::task::spawn_blocking`.

use crate::error::Pdf2VideoError;
use crate::model::Page;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Leading markers that make a line a bullet point.
const BULLET_MARKERS: [char; 3] = ['-', '•', '*'];

/// Parses a document into pages, saving embedded images under `image_dir`.
///
/// `image_dir` is owned by the caller's job for the duration of the call.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], image_dir: &Path) -> Result<Vec<Page>, Pdf2VideoError>;
}

/// Text and image files pulled from one page, before heuristics run.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub text: String,
    pub images: Vec<PathBuf>,
    pub snapshot: Option<PathBuf>,
}

/// [`DocumentExtractor`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    max_bullet_points: usize,
    render_snapshots: bool,
    snapshot_max_pixels: u32,
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self {
            max_bullet_points: 5,
            render_snapshots: true,
            snapshot_max_pixels: 1600,
        }
    }
}

impl PdfiumExtractor {
    pub fn new(max_bullet_points: usize, render_snapshots: bool, snapshot_max_pixels: u32) -> Self {
        Self {
            max_bullet_points,
            render_snapshots,
            snapshot_max_pixels,
        }
    }

    fn extract_raw(&self, bytes: &[u8], image_dir: &Path) -> Result<Vec<RawPage>, Pdf2VideoError> {
        let pdfium = pdfium_auto::bind_pdfium_silent()
            .map_err(|e| Pdf2VideoError::PdfiumBindingFailed(e.to_string()))?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| Pdf2VideoError::Extraction {
                detail: format!("cannot open document: {:?}", e),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.snapshot_max_pixels as i32)
            .set_maximum_height(self.snapshot_max_pixels as i32);

        let mut raw = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let number = idx + 1;

            // An unreadable text layer is an empty page, not a broken document.
            let text = match page.text() {
                Ok(t) => t.all(),
                Err(e) => {
                    warn!("Page {}: no text layer ({:?})", number, e);
                    String::new()
                }
            };

            let mut images = Vec::new();
            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                let image = match image_object.get_raw_image() {
                    Ok(img) => img,
                    Err(e) => {
                        debug!("Page {}: skipping unreadable image ({:?})", number, e);
                        continue;
                    }
                };
                let path = image_dir.join(format!("page_{}_img_{}.png", number, images.len() + 1));
                match image.save(&path) {
                    Ok(()) => images.push(path),
                    Err(e) => warn!("Page {}: could not save embedded image: {}", number, e),
                }
            }

            let snapshot = if self.render_snapshots {
                let path = image_dir.join(format!("page_{}.png", number));
                match page.render_with_config(&render_config) {
                    Ok(bitmap) => match bitmap.as_image().save(&path) {
                        Ok(()) => Some(path),
                        Err(e) => {
                            warn!("Page {}: could not save snapshot: {}", number, e);
                            None
                        }
                    },
                    Err(e) => {
                        warn!("Page {}: rasterisation failed ({:?})", number, e);
                        None
                    }
                }
            } else {
                None
            };

            debug!(
                "Page {}: {} chars, {} images, snapshot={}",
                number,
                text.len(),
                images.len(),
                snapshot.is_some()
            );
            raw.push(RawPage {
                text,
                images,
                snapshot,
            });
        }
        Ok(raw)
    }
}

impl DocumentExtractor for PdfiumExtractor {
    fn extract(&self, bytes: &[u8], image_dir: &Path) -> Result<Vec<Page>, Pdf2VideoError> {
        check_pdf_magic(bytes)?;
        std::fs::create_dir_all(image_dir).map_err(|e| Pdf2VideoError::storage(image_dir, e))?;
        let raw = self.extract_raw(bytes, image_dir)?;
        pages_from_raw(raw, self.max_bullet_points)
    }
}

/// Reject input that does not start with `%PDF`.
pub fn check_pdf_magic(bytes: &[u8]) -> Result<(), Pdf2VideoError> {
    if bytes.is_empty() {
        return Err(Pdf2VideoError::EmptyUpload);
    }
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(Pdf2VideoError::NotAPdf { magic });
    }
    Ok(())
}

// ── Heuristics ───────────────────────────────────────────────────────────

/// Number raw pages 1..P and apply the title and bullet heuristics.
///
/// Zero pages is an extraction error: there is nothing to narrate.
pub fn pages_from_raw(raw: Vec<RawPage>, max_bullet_points: usize) -> Result<Vec<Page>, Pdf2VideoError> {
    if raw.is_empty() {
        return Err(Pdf2VideoError::Extraction {
            detail: "document has no pages".into(),
        });
    }

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(idx, r)| {
            let text = clean_text(&r.text);
            let mut page = Page::new(idx + 1, text);
            page.title = detect_title(&page.text);
            page.bullet_points = detect_bullets(&page.text, max_bullet_points);
            page.images = r.images;
            page.snapshot = r.snapshot;
            page
        })
        .collect())
}

/// Trim every line, drop blank lines and NUL bytes.
pub fn clean_text(text: &str) -> String {
    text.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First non-blank line.
pub fn detect_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Lines after the title that start with a bullet marker, marker stripped.
pub fn detect_bullets(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .skip(1)
        .filter_map(|l| l.strip_prefix(BULLET_MARKERS))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawPage {
        RawPage {
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn pages_are_numbered_contiguously() {
        let pages = pages_from_raw(vec![raw("a"), raw(""), raw("c")], 5).unwrap();
        let numbers: Vec<usize> = pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(pages[1].text.is_empty());
        assert!(pages[1].title.is_none());
    }

    #[test]
    fn zero_pages_is_extraction_error() {
        let err = pages_from_raw(Vec::new(), 5).unwrap_err();
        assert!(matches!(err, Pdf2VideoError::Extraction { .. }));
    }

    #[test]
    fn clean_text_drops_blank_lines_and_nul() {
        assert_eq!(clean_text("  Title \n\n\0 body  \n   \n"), "Title\nbody");
    }

    #[test]
    fn title_is_first_non_blank_line() {
        assert_eq!(detect_title("\n  \nIntro to Cells\nmore").as_deref(), Some("Intro to Cells"));
        assert_eq!(detect_title("   \n"), None);
    }

    #[test]
    fn bullets_skip_title_and_strip_markers() {
        let text = "- Title looks like a bullet\nplain line\n- one\n• two\n* three\n-\n- four";
        let bullets = detect_bullets(text, 3);
        assert_eq!(bullets, vec!["one", "two", "three"]);
    }

    #[test]
    fn images_and_snapshot_carried_through() {
        let r = RawPage {
            text: "T".into(),
            images: vec![PathBuf::from("/x/page_1_img_1.png")],
            snapshot: Some(PathBuf::from("/x/page_1.png")),
        };
        let pages = pages_from_raw(vec![r], 5).unwrap();
        assert_eq!(pages[0].images.len(), 1);
        assert!(pages[0].snapshot.is_some());
    }

    #[test]
    fn magic_check() {
        assert!(check_pdf_magic(b"%PDF-1.7\n...").is_ok());
        assert!(matches!(check_pdf_magic(b""), Err(Pdf2VideoError::EmptyUpload)));
        match check_pdf_magic(b"PK\x03\x04zip") {
            Err(Pdf2VideoError::NotAPdf { magic }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
