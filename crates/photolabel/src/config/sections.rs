//! Per-concern configuration sections shared by the config file and settings.

use std::env;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for new searches.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default number of prefetched candidates.
pub const DEFAULT_BUFFER_SIZE: usize = 5;

/// Default rendition requested from the image source.
pub const DEFAULT_PREFERRED_SIZE: &str = "Original";

const DEFAULT_USER_ID: i64 = 1;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Flickr API credentials. Only the key is needed for the read-only calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct FlickrConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub api_key: Option<String>,
}

impl FlickrConfig {
    pub fn is_default(&self) -> bool {
        self.api_key.is_none()
    }

    /// Apply `FLICKR_API_KEY`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_non_empty("FLICKR_API_KEY") {
            self.api_key = Some(key);
        }
        self
    }
}

/// Knobs for searches and the labeling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct LabelingConfig {
    /// Photos per upstream page. Fixed per search once it exists.
    #[serde(default = "default_page_size")]
    #[prefer(default = "50")]
    pub page_size: u32,
    /// Look-ahead buffer capacity.
    #[serde(default = "default_buffer_size")]
    #[prefer(default = "5")]
    pub buffer_size: usize,
    /// Size label to download, falling back to the largest available.
    #[serde(default = "default_preferred_size")]
    #[prefer(default = "Original")]
    pub preferred_size: String,
    /// Fixed recency bound (epoch seconds) for new searches.
    /// When unset, new searches use "one day ago".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub max_taken_date: Option<i64>,
    /// User id recorded when the caller does not supply one.
    #[serde(default = "default_user_id")]
    #[prefer(default = "1")]
    pub default_user_id: i64,
    /// Initial delay before retrying a failed fill. Doubles per failure.
    #[serde(default = "default_retry_delay_ms")]
    #[prefer(default = "1000")]
    pub retry_delay_ms: u64,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_preferred_size() -> String {
    DEFAULT_PREFERRED_SIZE.to_string()
}

fn default_user_id() -> i64 {
    DEFAULT_USER_ID
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            preferred_size: default_preferred_size(),
            max_taken_date: None,
            default_user_id: DEFAULT_USER_ID,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl LabelingConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Recency bound to record for a search created at `now`.
    pub fn recency_bound(&self, now: DateTime<Utc>) -> i64 {
        self.max_taken_date
            .unwrap_or_else(|| (now - Duration::days(1)).timestamp())
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("labeling.page_size must be at least 1".to_string());
        }
        if self.buffer_size == 0 {
            return Err("labeling.buffer_size must be at least 1".to_string());
        }
        if self.preferred_size.trim().is_empty() {
            return Err("labeling.preferred_size must not be empty".to_string());
        }
        Ok(())
    }
}

/// Google Cloud Storage bucket used as the backup mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct GcsConfig {
    pub bucket: String,
    /// Prepended to every object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub prefix: Option<String>,
    /// OAuth bearer token for the JSON API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub access_token: Option<String>,
    /// API base URL; defaults to `https://storage.googleapis.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub endpoint: Option<String>,
}

/// Mirrors beyond the local images directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct MirrorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub gcs: Option<GcsConfig>,
}

impl MirrorConfig {
    pub fn is_default(&self) -> bool {
        self.gcs.is_none()
    }

    /// Apply `GCP_BUCKET`, `GCS_UPLOAD_PREFIX` and `GCS_ACCESS_TOKEN`.
    ///
    /// Prefix and token only apply once a bucket is known.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(bucket) = env_non_empty("GCP_BUCKET") {
            self.gcs.get_or_insert_with(GcsConfig::default).bucket = bucket;
        }
        if let Some(gcs) = self.gcs.as_mut() {
            if let Some(prefix) = env_non_empty("GCS_UPLOAD_PREFIX") {
                gcs.prefix = Some(prefix);
            }
            if let Some(token) = env_non_empty("GCS_ACCESS_TOKEN") {
                gcs.access_token = Some(token);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_labeling_defaults() {
        let config = LabelingConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.buffer_size, 5);
        assert_eq!(config.preferred_size, "Original");
        assert!(config.validate().is_ok());
        assert!(config.is_default());
    }

    #[test]
    fn test_recency_bound_defaults_to_one_day_ago() {
        let now = Utc.with_ymd_and_hms(2022, 8, 18, 10, 0, 0).unwrap();
        let config = LabelingConfig::default();
        assert_eq!(config.recency_bound(now), now.timestamp() - 86_400);

        let fixed = LabelingConfig {
            max_taken_date: Some(1_600_000_000),
            ..Default::default()
        };
        assert_eq!(fixed.recency_bound(now), 1_600_000_000);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = LabelingConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LabelingConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_labeling_section_keeps_defaults() {
        let config: LabelingConfig = toml::from_str("page_size = 2").unwrap();
        assert_eq!(config.page_size, 2);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.default_user_id, 1);
    }

    #[test]
    fn test_flickr_section_holds_only_the_key() {
        let config: FlickrConfig = toml::from_str("api_key = \"abc\"").unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert!(!config.is_default());

        let empty: FlickrConfig = toml::from_str("").unwrap();
        assert!(empty.is_default());
        assert_eq!(toml::to_string(&empty).unwrap(), "");
    }
}
