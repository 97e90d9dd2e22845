//! Filesystem mirror rooted at a directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_logical_path, FileMirror, StorageError, StorageResult};

/// Stores blobs as files under `root`.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a logical path.
    pub fn resolve(&self, logical_path: &str) -> StorageResult<PathBuf> {
        validate_logical_path(logical_path)?;
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            std::env::current_dir()?.join(&self.root)
        };
        Ok(root.join(logical_path))
    }
}

#[async_trait]
impl FileMirror for LocalMirror {
    fn name(&self) -> &str {
        "local"
    }

    /// Write through a temporary sibling and rename, so readers never see
    /// a half-written file.
    async fn store(&self, data: &[u8], logical_path: &str) -> StorageResult<String> {
        let path = self.resolve(logical_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, data).await?;
        tokio::fs::rename(&partial, &path).await?;

        Ok(path.display().to_string())
    }

    async fn retrieve(&self, logical_path: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(logical_path)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(logical_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
