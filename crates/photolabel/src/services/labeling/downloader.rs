//! Fetches one photo and writes it to the mirrors.

use std::sync::Arc;

use tracing::{debug, warn};

use super::error::LabelingResult;
use crate::models::{BufferedCandidate, PhotoRef};
use crate::source::{photo_filename, ImageSource};
use crate::storage::FileMirror;

/// Resolves, downloads and mirrors photos for the prefetch buffer.
pub struct ImageDownloader {
    source: Arc<dyn ImageSource>,
    primary: Arc<dyn FileMirror>,
    backup: Option<Arc<dyn FileMirror>>,
    preferred_size: String,
}

impl ImageDownloader {
    pub fn new(
        source: Arc<dyn ImageSource>,
        primary: Arc<dyn FileMirror>,
        backup: Option<Arc<dyn FileMirror>>,
        preferred_size: impl Into<String>,
    ) -> Self {
        Self {
            source,
            primary,
            backup,
            preferred_size: preferred_size.into(),
        }
    }

    pub fn source(&self) -> Arc<dyn ImageSource> {
        self.source.clone()
    }

    /// Download `photo` into `session_dir` on every mirror.
    ///
    /// The primary write must succeed. A failed backup write is logged
    /// and the candidate points at the primary copy instead.
    pub async fn fetch(
        &self,
        photo: &PhotoRef,
        session_dir: &str,
    ) -> LabelingResult<BufferedCandidate> {
        let link = self
            .source
            .resolve_download_link(&photo.photo_id, &self.preferred_size)
            .await?;
        let data = self.source.download(&link).await?;
        let logical_path = format!(
            "{}/{}",
            session_dir,
            photo_filename(&photo.photo_id, &link.size_label)
        );

        let local_path = self.primary.store(&data, &logical_path).await?;
        let remote_path = match self.backup {
            Some(ref backup) => match backup.store(&data, &logical_path).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        "Backup to {} failed for {}: {}",
                        backup.name(),
                        logical_path,
                        e
                    );
                    local_path.clone()
                }
            },
            None => local_path.clone(),
        };

        debug!(
            "Fetched {} at {} ({} bytes, {})",
            photo.photo_id,
            photo.position,
            data.len(),
            link.size_label
        );

        Ok(BufferedCandidate {
            photo_id: photo.photo_id.clone(),
            position: photo.position,
            size_label: link.size_label,
            logical_path,
            local_path,
            remote_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cursor;
    use crate::testing::{FakeSource, MemoryMirror};

    fn photo(id: &str) -> PhotoRef {
        PhotoRef {
            photo_id: id.to_string(),
            position: Cursor::new(0, 1),
        }
    }

    #[tokio::test]
    async fn test_fetch_stores_on_both_mirrors() {
        let source = Arc::new(FakeSource::new(&[&["A"]]));
        let primary = Arc::new(MemoryMirror::new("local"));
        let backup = Arc::new(MemoryMirror::new("gcs"));
        let downloader =
            ImageDownloader::new(source, primary.clone(), Some(backup.clone()), "Large");

        let candidate = downloader.fetch(&photo("A"), "cats/images").await.unwrap();

        assert_eq!(candidate.logical_path, "cats/images/A_Large.jpg");
        assert_eq!(candidate.local_path, "mem://local/cats/images/A_Large.jpg");
        assert_eq!(candidate.remote_path, "mem://gcs/cats/images/A_Large.jpg");
        assert_eq!(candidate.position, Cursor::new(0, 1));
        assert_eq!(
            backup.retrieve("cats/images/A_Large.jpg").await.unwrap(),
            b"image-A".to_vec()
        );
    }

    #[tokio::test]
    async fn test_backup_failure_falls_back_to_local() {
        let source = Arc::new(FakeSource::new(&[&["A"]]));
        let primary = Arc::new(MemoryMirror::new("local"));
        let backup = Arc::new(MemoryMirror::new("gcs"));
        backup.set_failing(true);
        let downloader = ImageDownloader::new(source, primary, Some(backup.clone()), "Original");

        let candidate = downloader.fetch(&photo("A"), "cats/images").await.unwrap();

        assert_eq!(candidate.remote_path, candidate.local_path);
        assert!(backup.paths().is_empty());
    }

    #[tokio::test]
    async fn test_primary_failure_fails_fetch() {
        let source = Arc::new(FakeSource::new(&[&["A"]]));
        let primary = Arc::new(MemoryMirror::new("local"));
        primary.set_failing(true);
        let downloader = ImageDownloader::new(source, primary, None, "Original");

        assert!(downloader.fetch(&photo("A"), "cats/images").await.is_err());
    }

    #[tokio::test]
    async fn test_download_failure_fails_fetch() {
        let source = Arc::new(FakeSource::new(&[&["A"]]));
        source.fail_downloads("A", 1);
        let primary = Arc::new(MemoryMirror::new("local"));
        let downloader = ImageDownloader::new(source, primary.clone(), None, "Original");

        assert!(downloader.fetch(&photo("A"), "cats/images").await.is_err());
        assert!(primary.paths().is_empty());
    }
}
