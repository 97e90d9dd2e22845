//! File mirrors: byte blobs stored at logical paths.
//!
//! The local filesystem mirror is always present; a remote object-store
//! mirror can be layered on top as a backup.

mod gcs;
mod local;

pub use gcs::GcsMirror;
pub use local::LocalMirror;

use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;

/// Error type for mirror operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned {status} for {path}")]
    Remote { status: u16, path: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid logical path: {0}")]
    InvalidPath(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A place to put and fetch blobs by logical path.
///
/// Implementations are interchangeable: the same logical path stored in
/// any mirror retrieves the same bytes.
#[async_trait]
pub trait FileMirror: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Store bytes and return a reference to them (a path or URL).
    async fn store(&self, data: &[u8], logical_path: &str) -> StorageResult<String>;

    /// Store a local file's contents.
    async fn store_file(&self, local_path: &Path, logical_path: &str) -> StorageResult<String> {
        let data = tokio::fs::read(local_path).await?;
        self.store(&data, logical_path).await
    }

    /// Fetch the bytes stored at a logical path.
    async fn retrieve(&self, logical_path: &str) -> StorageResult<Vec<u8>>;

    /// Fetch into a local file, creating parent directories.
    async fn retrieve_file(&self, logical_path: &str, local_path: &Path) -> StorageResult<()> {
        let data = self.retrieve(logical_path).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }
}

/// Reject absolute paths, `..` and empty paths.
pub fn validate_logical_path(logical_path: &str) -> StorageResult<()> {
    let path = Path::new(logical_path);
    let valid = !logical_path.is_empty()
        && !logical_path.starts_with('/')
        && path.components().all(|c| matches!(c, Component::Normal(_)));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(logical_path.to_string()))
    }
}

/// The primary (local) mirror and the optional backup configured in settings.
pub fn mirrors_from_settings(
    settings: &Settings,
) -> StorageResult<(Arc<dyn FileMirror>, Option<Arc<dyn FileMirror>>)> {
    let primary: Arc<dyn FileMirror> = Arc::new(LocalMirror::new(&settings.images_dir));
    let backup = match settings.mirror.gcs {
        Some(ref gcs) => {
            let mirror: Arc<dyn FileMirror> = Arc::new(GcsMirror::from_config(
                gcs,
                &settings.user_agent,
                std::time::Duration::from_secs(settings.request_timeout),
            )?);
            Some(mirror)
        }
        None => None,
    };
    Ok((primary, backup))
}
