//! Configuration loading and merging logic.

use std::path::{Path, PathBuf};

use crate::repository::util::{redact_url_password, validate_database_url};

use super::{Config, Settings};

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--target flag).
    pub target: Option<PathBuf>,
}

/// Look for a config file inside the target directory.
fn find_config_in_dir(dir: &Path) -> Option<PathBuf> {
    ["toml", "yaml", "yml", "json"]
        .iter()
        .map(|ext| dir.join(format!("photolabel.{}", ext)))
        .find(|path| path.exists())
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Target split into a data directory and, for `.db` files, a database filename.
struct ResolvedTarget {
    data_dir: PathBuf,
    database_filename: Option<String>,
}

impl ResolvedTarget {
    fn from_path(path: &Path) -> Self {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            current_dir().join(path)
        };

        let is_db_file = path
            .extension()
            .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3");

        if is_db_file {
            Self {
                data_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
                database_filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            }
        } else {
            Self {
                data_dir: path,
                database_filename: None,
            }
        }
    }
}

async fn load_file_config(
    options: &LoadOptions,
    target: Option<&ResolvedTarget>,
) -> Result<Config, String> {
    // Priority 1: explicit --config
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path).await;
    }

    // Priority 2: config inside the target directory
    if let Some(target) = target {
        if let Some(config_path) = find_config_in_dir(&target.data_dir) {
            tracing::debug!("Found config in target dir: {}", config_path.display());
            return Config::load_from_path(&config_path).await;
        }
    }

    // Priority 3: auto-discover via prefer
    Ok(Config::load().await)
}

/// Load settings with default options.
pub async fn load_settings() -> Result<(Settings, Config), String> {
    load_settings_with_options(LoadOptions::default()).await
}

/// Load settings with explicit options.
///
/// Precedence, lowest first: defaults, config file, `--target`, environment.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), String> {
    let database_url = env_non_empty("DATABASE_URL");
    if let Some(ref url) = database_url {
        validate_database_url(url).map_err(|e| {
            format!(
                "{}\n\nEither use a build with the 'postgres' feature, \
                 use a sqlite: URL, or unset DATABASE_URL",
                e
            )
        })?;
    }

    let target = options.target.as_deref().map(ResolvedTarget::from_path);
    let config = load_file_config(&options, target.as_ref()).await?;

    let base_dir = if options.use_cwd {
        current_dir()
    } else {
        config.base_dir().unwrap_or_else(current_dir)
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(target) = target {
        settings.images_dir = match config.images_dir {
            Some(ref images_dir) => config.resolve_path(images_dir, &base_dir),
            None => target.data_dir.join(super::settings::IMAGES_SUBDIR),
        };
        settings.data_dir = target.data_dir;
        if let Some(filename) = target.database_filename {
            settings.database_filename = filename;
        }
    }

    if let Some(url) = database_url {
        tracing::debug!(
            "Using DATABASE_URL from environment: {}",
            redact_url_password(&url)
        );
        settings.database_url = Some(url);
    }

    if let Some(path) = env_non_empty("LOCAL_DOWNLOAD_PATH") {
        settings.images_dir = config.resolve_path(&path, &current_dir());
    }

    settings.flickr = settings.flickr.with_env_overrides();
    settings.mirror = settings.mirror.with_env_overrides();
    settings.labeling.validate()?;

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_db_file_splits_directory() {
        let target = ResolvedTarget::from_path(Path::new("/srv/labels/run.db"));
        assert_eq!(target.data_dir, PathBuf::from("/srv/labels"));
        assert_eq!(target.database_filename.as_deref(), Some("run.db"));

        let target = ResolvedTarget::from_path(Path::new("/srv/labels"));
        assert_eq!(target.data_dir, PathBuf::from("/srv/labels"));
        assert!(target.database_filename.is_none());
    }

    #[tokio::test]
    async fn test_target_dir_config_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("photolabel.toml"),
            "database = \"team.db\"\n\n[labeling]\npage_size = 7\n",
        )
        .await
        .unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            target: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(config.source_path.is_some());
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.database_filename, "team.db");
        assert_eq!(settings.images_dir, dir.path().join("images"));
        assert_eq!(settings.labeling.page_size, 7);
    }

    #[tokio::test]
    async fn test_invalid_labeling_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[labeling]\nbuffer_size = 0\n")
            .await
            .unwrap();

        let err = load_settings_with_options(LoadOptions {
            config_path: Some(path),
            ..Default::default()
        })
        .await
        .unwrap_err();

        assert!(err.contains("buffer_size"));
    }
}
