//! Unsplash stock-photo search.
//!
//! Search and usage-accounting calls carry `Authorization: Client-ID {key}`.
//! Downloads go straight to the CDN URL from the search result and are
//! streamed to a `.part` file that is renamed into place once complete,
//! so a dropped connection never leaves a truncated image at `dest`.

use super::{ImageHit, ImageSearch};
use crate::error::ServiceError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.unsplash.com";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`ImageSearch`] over the Unsplash REST API.
pub struct UnsplashClient {
    http: reqwest::Client,
    access_key: Option<String>,
    base_url: String,
    download_timeout: Duration,
}

impl UnsplashClient {
    /// A client without a key answers every search with
    /// [`ServiceError::NotConfigured`].
    pub fn new(access_key: Option<String>, download_timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_key: access_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            download_timeout: Duration::from_secs(download_timeout_secs),
        }
    }

    /// Point the client at another API host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> Result<String, ServiceError> {
        self.access_key
            .as_ref()
            .map(|k| format!("Client-ID {}", k))
            .ok_or_else(|| ServiceError::NotConfigured("UNSPLASH_ACCESS_KEY is not set".into()))
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    links: Option<PhotoLinks>,
    #[serde(default)]
    user: Option<PhotoUser>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct PhotoLinks {
    download_location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoUser {
    name: Option<String>,
    links: Option<UserLinks>,
}

#[derive(Debug, Deserialize)]
struct UserLinks {
    html: Option<String>,
}

fn first_hit(response: SearchResponse) -> Option<ImageHit> {
    let photo = response.results.into_iter().next()?;
    let (photographer, attribution_url) = match photo.user {
        Some(user) => (user.name, user.links.and_then(|l| l.html)),
        None => (None, None),
    };
    Some(ImageHit {
        image_url: photo.urls.regular,
        download_location: photo.links.and_then(|l| l.download_location),
        photographer,
        attribution_url,
    })
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    async fn search(&self, query: &str) -> Result<Option<ImageHit>, ServiceError> {
        let auth = self.auth_header()?;
        let response = self
            .http
            .get(format!("{}/search/photos", self.base_url))
            .query(&[
                ("query", query),
                ("orientation", "landscape"),
                ("per_page", "1"),
                ("order_by", "relevant"),
            ])
            .header(reqwest::header::AUTHORIZATION, auth)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        let hit = first_hit(parsed);
        match &hit {
            Some(h) => debug!("Unsplash hit for '{}': {}", query, h.image_url),
            None => debug!("Unsplash returned no results for '{}'", query),
        }
        Ok(hit)
    }

    async fn download(&self, hit: &ImageHit, dest: &Path) -> Result<(), ServiceError> {
        let response = self
            .http
            .get(&hit.image_url)
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body: format!("image download from {}", hit.image_url),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = dest.with_extension("part");
        let file = tokio::fs::File::create(&part).await?;
        let written = save_body(response.bytes_stream(), file, &part, dest).await?;

        info!("Downloaded image ({} bytes) to {}", written, dest.display());
        Ok(())
    }

    async fn notify_download(&self, hit: &ImageHit) -> Result<(), ServiceError> {
        let Some(location) = hit.download_location.as_deref() else {
            return Ok(());
        };
        let auth = self.auth_header()?;
        let response = self
            .http
            .get(location)
            .header(reqwest::header::AUTHORIZATION, auth)
            .timeout(NOTIFY_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!("Unsplash download event returned HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Stream `body` through `file` (open on `part`), then rename `part` to
/// `dest`. `part` is removed on any read, write or rename failure.
async fn save_body<S, B, E, W>(body: S, mut file: W, part: &Path, dest: &Path) -> Result<usize, ServiceError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ServiceError>,
    W: AsyncWrite + Unpin,
{
    let copied = write_body(body, &mut file).await;
    drop(file);
    let result = match copied {
        Ok(written) => tokio::fs::rename(part, dest)
            .await
            .map(|()| written)
            .map_err(ServiceError::from),
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(part).await;
    }
    result
}

async fn write_body<S, B, E, W>(body: S, file: &mut W) -> Result<usize, ServiceError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ServiceError>,
    W: AsyncWrite + Unpin,
{
    let mut body = std::pin::pin!(body);
    let mut written = 0usize;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::into)?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len();
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "total": 1,
        "results": [{
            "id": "abc",
            "urls": { "raw": "https://images.example/raw", "regular": "https://images.example/regular" },
            "links": { "html": "https://unsplash.example/p/abc", "download_location": "https://api.example/photos/abc/download" },
            "user": { "name": "Ada Lovelace", "links": { "html": "https://unsplash.example/@ada" } }
        }]
    }"#;

    #[test]
    fn parses_first_result() {
        let parsed: SearchResponse = serde_json::from_str(SAMPLE).unwrap();
        let hit = first_hit(parsed).unwrap();
        assert_eq!(hit.image_url, "https://images.example/regular");
        assert_eq!(
            hit.download_location.as_deref(),
            Some("https://api.example/photos/abc/download")
        );
        assert_eq!(hit.photographer.as_deref(), Some("Ada Lovelace"));
        assert_eq!(hit.attribution_url.as_deref(), Some("https://unsplash.example/@ada"));
    }

    #[test]
    fn empty_results_is_none() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"total":0,"results":[]}"#).unwrap();
        assert!(first_hit(parsed).is_none());
    }

    #[tokio::test]
    async fn search_without_key_is_not_configured() {
        let client = UnsplashClient::new(None, 30);
        let err = client.search("volcano").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let client = UnsplashClient::new(Some("  ".into()), 30);
        assert!(client.auth_header().is_err());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = UnsplashClient::new(Some("k".into()), 30).with_base_url("http://localhost:9/");
        assert_eq!(client.base_url, "http://localhost:9");
    }

    fn chunks(items: Vec<Result<&'static [u8], ServiceError>>) -> impl Stream<Item = Result<&'static [u8], ServiceError>> {
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn saved_body_is_renamed_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("bg.part");
        let dest = dir.path().join("bg.jpg");
        let file = tokio::fs::File::create(&part).await.unwrap();

        let written = save_body(chunks(vec![Ok(&b"abc"[..]), Ok(&b"def"[..])]), file, &part, &dest)
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdef");
        assert!(!part.exists());
    }

    #[tokio::test]
    async fn dropped_stream_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("bg.part");
        let dest = dir.path().join("bg.jpg");
        let file = tokio::fs::File::create(&part).await.unwrap();

        let body = chunks(vec![Ok(&b"abc"[..]), Err(ServiceError::Request("connection reset".into()))]);
        let err = save_body(body, file, &part, &dest).await.unwrap_err();
        assert!(matches!(err, ServiceError::Request(_)));
        assert!(!part.exists());
        assert!(!dest.exists());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_write_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("bg.part");
        let dest = dir.path().join("bg.jpg");
        std::fs::write(&part, b"").unwrap();
        // Every write to /dev/full fails with ENOSPC.
        let full = tokio::fs::OpenOptions::new()
            .write(true)
            .open("/dev/full")
            .await
            .unwrap();

        let err = save_body(chunks(vec![Ok(&b"abc"[..])]), full, &part, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
        assert!(!part.exists());
        assert!(!dest.exists());
    }
}
