//! Filesystem storage for uploads, per-job scratch trees and outputs.
//!
//! Layout under the configured root:
//!
//! ```text
//! uploads/{job}/source.pdf
//! temp/{job}/{images,audio,frames,segments}/…
//! outputs/{job}/video_{job}.mp4
//! ```
//!
//! Every job owns its own directories; nothing here is shared across jobs.

use crate::error::Pdf2VideoError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const UPLOAD_FILE: &str = "source.pdf";

/// Logical storage area for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Upload,
    /// Job scratch root.
    Temp,
    Images,
    Audio,
    Frames,
    Segments,
    Output,
}

/// Job-scoped directories rooted at one base directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `area` for `job_id`; does not touch the filesystem.
    pub fn job_dir(&self, job_id: &str, area: StorageArea) -> PathBuf {
        let temp = self.root.join("temp").join(job_id);
        match area {
            StorageArea::Upload => self.root.join("uploads").join(job_id),
            StorageArea::Temp => temp,
            StorageArea::Images => temp.join("images"),
            StorageArea::Audio => temp.join("audio"),
            StorageArea::Frames => temp.join("frames"),
            StorageArea::Segments => temp.join("segments"),
            StorageArea::Output => self.root.join("outputs").join(job_id),
        }
    }

    /// Create `area` for `job_id` if absent and return its path.
    pub async fn ensure_dir(&self, job_id: &str, area: StorageArea) -> Result<PathBuf, Pdf2VideoError> {
        let dir = self.job_dir(job_id, area);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Pdf2VideoError::storage(&dir, e))?;
        Ok(dir)
    }

    pub async fn save_upload(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf, Pdf2VideoError> {
        let dir = self.ensure_dir(job_id, StorageArea::Upload).await?;
        let path = dir.join(UPLOAD_FILE);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Pdf2VideoError::storage(&path, e))?;
        debug!("Saved {} byte upload to {}", bytes.len(), path.display());
        Ok(path)
    }

    pub async fn read_upload(&self, job_id: &str) -> Result<Vec<u8>, Pdf2VideoError> {
        let path = self.job_dir(job_id, StorageArea::Upload).join(UPLOAD_FILE);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Pdf2VideoError::storage(&path, e))
    }

    /// Canonical location of the finished video.
    pub fn artifact_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id, StorageArea::Output)
            .join(format!("video_{}.mp4", job_id))
    }

    /// The finished video, if it exists.
    pub async fn find_artifact(&self, job_id: &str) -> Option<PathBuf> {
        let path = self.artifact_path(job_id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Remove a job's upload and scratch tree, and its output unless kept.
    pub async fn cleanup_job(&self, job_id: &str, keep_output: bool) -> Result<(), Pdf2VideoError> {
        let mut areas = vec![StorageArea::Temp, StorageArea::Upload];
        if !keep_output {
            areas.push(StorageArea::Output);
        }
        for area in areas {
            let dir = self.job_dir(job_id, area);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Pdf2VideoError::storage(&dir, e)),
            }
        }
        Ok(())
    }

    /// Remove upload and scratch directories not modified within `max_age`.
    ///
    /// Returns how many job directories were removed. Failures on a single
    /// directory are logged and skipped.
    pub async fn cleanup_older_than(&self, max_age: Duration) -> Result<usize, Pdf2VideoError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for area in ["uploads", "temp"] {
            let base = self.root.join(area);
            let mut entries = match tokio::fs::read_dir(&base).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Pdf2VideoError::storage(&base, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Pdf2VideoError::storage(&base, e))?
            {
                let path = entry.path();
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                let stale = meta.is_dir()
                    && meta.modified().map(|m| m < cutoff).unwrap_or(false);
                if !stale {
                    continue;
                }
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => {
                        info!("Cleaned up old directory: {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
                }
            }
        }

        Ok(removed)
    }
}

/// Job ids become directory names: 1–128 chars of `[A-Za-z0-9_-]`.
pub fn validate_job_id(job_id: &str) -> Result<(), Pdf2VideoError> {
    let ok = !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Pdf2VideoError::InvalidJobId {
            job_id: job_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn job_dirs_are_job_scoped() {
        let storage = Storage::new("/data");
        assert_eq!(
            storage.job_dir("j1", StorageArea::Upload),
            PathBuf::from("/data/uploads/j1")
        );
        assert_eq!(
            storage.job_dir("j1", StorageArea::Audio),
            PathBuf::from("/data/temp/j1/audio")
        );
        assert_eq!(
            storage.artifact_path("j1"),
            PathBuf::from("/data/outputs/j1/video_j1.mp4")
        );
    }

    #[test]
    fn job_id_validation() {
        assert!(validate_job_id("abc-123_X").is_ok());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id("a/b").is_err());
        assert!(validate_job_id(&"x".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn upload_round_trip() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::new(tmp.path());
        storage.save_upload("j1", b"%PDF-1.4 data").await.unwrap();
        let bytes = storage.read_upload("j1").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 data");
    }

    #[test]
    fn missing_upload_is_storage_error() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::new(tmp.path());
        let err = tokio_test::block_on(storage.read_upload("nope")).unwrap_err();
        assert!(matches!(err, Pdf2VideoError::Storage { .. }));
    }

    #[tokio::test]
    async fn find_artifact_requires_file() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::new(tmp.path());
        assert!(storage.find_artifact("j1").await.is_none());
        storage.ensure_dir("j1", StorageArea::Output).await.unwrap();
        tokio::fs::write(storage.artifact_path("j1"), b"mp4").await.unwrap();
        assert_eq!(
            storage.find_artifact("j1").await,
            Some(storage.artifact_path("j1"))
        );
    }

    #[tokio::test]
    async fn cleanup_job_keeps_output_when_asked() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::new(tmp.path());
        storage.save_upload("j1", b"%PDF").await.unwrap();
        storage.ensure_dir("j1", StorageArea::Frames).await.unwrap();
        storage.ensure_dir("j1", StorageArea::Output).await.unwrap();

        storage.cleanup_job("j1", true).await.unwrap();
        assert!(!storage.job_dir("j1", StorageArea::Temp).exists());
        assert!(!storage.job_dir("j1", StorageArea::Upload).exists());
        assert!(storage.job_dir("j1", StorageArea::Output).exists());

        storage.cleanup_job("j1", false).await.unwrap();
        assert!(!storage.job_dir("j1", StorageArea::Output).exists());
    }

    #[tokio::test]
    async fn cleanup_older_than_spares_fresh_dirs() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::new(tmp.path());
        storage.save_upload("fresh", b"%PDF").await.unwrap();

        let removed = storage
            .cleanup_older_than(Duration::from_secs(7 * 24 * 3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let removed = storage.cleanup_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!storage.job_dir("fresh", StorageArea::Upload).exists());
    }
}
