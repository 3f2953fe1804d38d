//! Background image resolution.
//!
//! An ordered list of [`BackgroundStrategy`] values is tried until one
//! produces an image. The standard order is stock-photo search by page title,
//! then the first image embedded in the page. Every miss is soft: the page
//! can always render on a placeholder.

use crate::error::SoftMiss;
use crate::model::{Outcome, Page};
use crate::services::ImageSearch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One way of obtaining a background image for a page.
#[async_trait]
pub trait BackgroundStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce an image for `page`, writing any download into `dir`.
    async fn attempt(&self, page: &Page, dir: &Path) -> Result<PathBuf, SoftMiss>;
}

// ── Stock photo ──────────────────────────────────────────────────────────

/// Search a stock-photo provider for the page title and download the top hit.
pub struct StockPhotoStrategy {
    search: Arc<dyn ImageSearch>,
}

impl StockPhotoStrategy {
    pub fn new(search: Arc<dyn ImageSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl BackgroundStrategy for StockPhotoStrategy {
    fn name(&self) -> &'static str {
        "stock_photo"
    }

    async fn attempt(&self, page: &Page, dir: &Path) -> Result<PathBuf, SoftMiss> {
        let n = page.number;
        let query = page
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SoftMiss::NoImageQuery { page: n })?;

        let hit = self
            .search
            .search(query)
            .await
            .map_err(|e| SoftMiss::ImageSearchFailed {
                page: n,
                detail: e.to_string(),
            })?
            .ok_or_else(|| SoftMiss::NoImageFound {
                page: n,
                query: query.to_string(),
            })?;

        let dest = dir.join(format!("page_{}.jpg", n));
        self.search
            .download(&hit, &dest)
            .await
            .map_err(|e| SoftMiss::ImageDownloadFailed {
                page: n,
                detail: e.to_string(),
            })?;

        // Usage accounting never affects the page.
        let search = Arc::clone(&self.search);
        tokio::spawn(async move {
            if let Err(e) = search.notify_download(&hit).await {
                debug!("Download notification failed: {}", e);
            }
        });

        Ok(dest)
    }
}

// ── Embedded image ───────────────────────────────────────────────────────

/// Use the first image extracted from the page itself.
#[derive(Debug, Default)]
pub struct EmbeddedImageStrategy;

#[async_trait]
impl BackgroundStrategy for EmbeddedImageStrategy {
    fn name(&self) -> &'static str {
        "embedded_image"
    }

    async fn attempt(&self, page: &Page, _dir: &Path) -> Result<PathBuf, SoftMiss> {
        page.images
            .first()
            .cloned()
            .ok_or(SoftMiss::NoEmbeddedImage { page: page.number })
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

/// Tries strategies in order; the first success wins.
#[derive(Clone)]
pub struct AssetResolver {
    strategies: Vec<Arc<dyn BackgroundStrategy>>,
}

impl AssetResolver {
    pub fn new(strategies: Vec<Arc<dyn BackgroundStrategy>>) -> Self {
        Self { strategies }
    }

    /// Stock photo first, embedded image second.
    pub fn standard(search: Arc<dyn ImageSearch>) -> Self {
        Self::new(vec![
            Arc::new(StockPhotoStrategy::new(search)),
            Arc::new(EmbeddedImageStrategy),
        ])
    }

    /// `Ready` only when the first strategy wins. A later win, or no image
    /// at all, is `Degraded` with the first strategy's miss as the reason.
    pub async fn resolve_background(&self, page: &Page, dir: &Path) -> Outcome<Option<PathBuf>> {
        let mut first_miss: Option<SoftMiss> = None;

        for (idx, strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(page, dir).await {
                Ok(path) => {
                    info!(
                        "Page {}: background from {} ({})",
                        page.number,
                        strategy.name(),
                        path.display()
                    );
                    return match first_miss {
                        Some(reason) if idx > 0 => Outcome::degraded(Some(path), reason),
                        _ => Outcome::Ready(Some(path)),
                    };
                }
                Err(miss) => {
                    debug!("Page {}: {} missed: {}", page.number, strategy.name(), miss);
                    first_miss.get_or_insert(miss);
                }
            }
        }

        match first_miss {
            Some(reason) => {
                info!("Page {}: no background image", page.number);
                Outcome::degraded(None, reason)
            }
            None => Outcome::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::ImageHit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Search fake: `Some(url)` returns a hit, `None` returns no results,
    /// `fail` makes every search error out.
    struct FakeSearch {
        url: Option<&'static str>,
        fail: bool,
        downloads: AtomicUsize,
    }

    impl FakeSearch {
        fn hit() -> Self {
            Self {
                url: Some("https://img.example/a.jpg"),
                fail: false,
                downloads: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                url: None,
                fail: true,
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageSearch for FakeSearch {
        async fn search(&self, _query: &str) -> Result<Option<ImageHit>, ServiceError> {
            if self.fail {
                return Err(ServiceError::Http {
                    status: 403,
                    body: "rate limited".into(),
                });
            }
            Ok(self.url.map(|u| ImageHit {
                image_url: u.into(),
                download_location: None,
                photographer: None,
                attribution_url: None,
            }))
        }

        async fn download(&self, _hit: &ImageHit, dest: &Path) -> Result<(), ServiceError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, b"jpeg").await?;
            Ok(())
        }

        async fn notify_download(&self, _hit: &ImageHit) -> Result<(), ServiceError> {
            Err(ServiceError::Request("notify is best effort".into()))
        }
    }

    fn page(title: Option<&str>, images: &[&str]) -> Page {
        let mut p = Page::new(1, "text");
        p.title = title.map(str::to_string);
        p.images = images.iter().map(PathBuf::from).collect();
        p
    }

    #[tokio::test]
    async fn remote_wins_over_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::standard(Arc::new(FakeSearch::hit()));
        let p = page(Some("Volcanoes"), &["/x/page_1_img_1.png"]);
        let outcome = resolver.resolve_background(&p, dir.path()).await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.into_value(), Some(dir.path().join("page_1.jpg")));
    }

    #[tokio::test]
    async fn search_error_falls_back_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::standard(Arc::new(FakeSearch::failing()));
        let p = page(Some("Volcanoes"), &["/x/page_1_img_1.png", "/x/page_1_img_2.png"]);
        let outcome = resolver.resolve_background(&p, dir.path()).await;
        assert!(matches!(
            outcome.reason(),
            Some(SoftMiss::ImageSearchFailed { page: 1, .. })
        ));
        assert_eq!(outcome.into_value(), Some(PathBuf::from("/x/page_1_img_1.png")));
    }

    #[tokio::test]
    async fn no_title_and_no_images_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(FakeSearch::hit());
        let resolver = AssetResolver::standard(search.clone());
        let outcome = resolver.resolve_background(&page(None, &[]), dir.path()).await;
        assert_eq!(outcome.value(), &None);
        assert!(matches!(outcome.reason(), Some(SoftMiss::NoImageQuery { page: 1 })));
        assert_eq!(search.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_result_is_soft_miss() {
        let dir = tempfile::tempdir().unwrap();
        let search = FakeSearch {
            url: None,
            fail: false,
            downloads: AtomicUsize::new(0),
        };
        let resolver = AssetResolver::standard(Arc::new(search));
        let outcome = resolver
            .resolve_background(&page(Some("Nothing"), &[]), dir.path())
            .await;
        assert!(matches!(
            outcome.reason(),
            Some(SoftMiss::NoImageFound { query, .. }) if query == "Nothing"
        ));
        assert!(outcome.value().is_none());
    }

    #[tokio::test]
    async fn no_strategies_is_ready_none() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(Vec::new());
        let outcome = resolver.resolve_background(&page(Some("T"), &[]), dir.path()).await;
        assert_eq!(outcome, Outcome::Ready(None));
    }
}
