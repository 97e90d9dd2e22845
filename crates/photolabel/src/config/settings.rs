//! Runtime settings.

use std::fs;
use std::path::PathBuf;

use crate::repository::util::is_postgres_url;
use crate::repository::{DbContext, DieselError, Repositories};

use super::sections::{FlickrConfig, LabelingConfig, MirrorConfig};
use super::DEFAULT_DATABASE_FILENAME;

/// Default local mirror subdirectory name.
pub(crate) const IMAGES_SUBDIR: &str = "images";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var or the `database_url` config field.
    pub database_url: Option<String>,
    /// Root of the local image mirror.
    pub images_dir: PathBuf,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub flickr: FlickrConfig,
    pub labeling: LabelingConfig,
    pub mirror: MirrorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photolabel");

        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings rooted at a data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            images_dir: data_dir.join(IMAGES_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: concat!("photolabel/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: 30,
            flickr: FlickrConfig::default(),
            labeling: LabelingConfig::default(),
            mirror: MirrorConfig::default(),
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data and images directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [("data", &self.data_dir), ("images", &self.images_dir)] {
            tracing::debug!("Ensuring {} directory {}", label, dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> Result<DbContext, DieselError> {
        DbContext::from_url(&self.database_url())
    }

    /// Create bundled repositories for all database operations.
    pub fn repositories(&self) -> Result<Repositories, DieselError> {
        Ok(Repositories::new(self.create_db_context()?))
    }

    /// Create a database context and verify the connection works.
    pub async fn create_db_context_validated(&self) -> Result<DbContext, String> {
        let ctx = self
            .create_db_context()
            .map_err(|e| format!("Failed to create database context: {}", e))?;
        ctx.test_connection()
            .await
            .map_err(|e| format!("Failed to connect to database: {}", e))?;
        Ok(ctx)
    }
}
