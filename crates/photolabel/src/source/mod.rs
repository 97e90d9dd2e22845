//! External image source port.
//!
//! A source answers paged text searches with ordered photo ids and turns a
//! photo id into a downloadable rendition.

pub mod flickr;

pub use flickr::FlickrClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Search;

/// Error type for image source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("No sizes available for photo {0}")]
    NoSizes(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Parameters that identify one paged result sequence upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub page_size: u32,
    /// Upper bound (epoch seconds) on photo recency.
    pub recency_bound: i64,
}

impl From<&Search> for SearchQuery {
    fn from(search: &Search) -> Self {
        Self {
            text: search.query.clone(),
            page_size: search.page_size,
            recency_bound: search.recency_bound,
        }
    }
}

/// One available rendition of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub label: String,
    pub width: u64,
    pub height: u64,
    pub source: String,
}

impl PhotoSize {
    pub fn area(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }
}

/// A resolved rendition: where to fetch it and which size it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub url: String,
    pub size_label: String,
}

/// Trait for paged photo search backends.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Photo ids on page `page_idx` (0-based), in upstream order.
    ///
    /// An empty result means there are no more pages.
    async fn search(&self, query: &SearchQuery, page_idx: u32) -> SourceResult<Vec<String>>;

    /// Resolve `preferred_size`, or the largest rendition if it is missing.
    async fn resolve_download_link(
        &self,
        photo_id: &str,
        preferred_size: &str,
    ) -> SourceResult<DownloadLink>;

    /// Fetch the bytes behind a resolved link.
    async fn download(&self, link: &DownloadLink) -> SourceResult<Vec<u8>>;
}

/// Pick the rendition labelled `preferred`, else the one with the largest pixel area.
///
/// The first exact match wins, and among equal areas the earliest listed wins.
pub fn select_size<'a>(sizes: &'a [PhotoSize], preferred: &str) -> Option<&'a PhotoSize> {
    if let Some(exact) = sizes.iter().find(|s| s.label == preferred) {
        return Some(exact);
    }

    sizes.iter().fold(None, |best: Option<&PhotoSize>, size| match best {
        Some(b) if b.area() >= size.area() => Some(b),
        _ => Some(size),
    })
}

/// File name for a downloaded rendition, e.g. `123_Large_Square.jpg`.
pub fn photo_filename(photo_id: &str, size_label: &str) -> String {
    format!("{}_{}.jpg", photo_id, size_label.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(label: &str, width: u64, height: u64) -> PhotoSize {
        PhotoSize {
            label: label.to_string(),
            width,
            height,
            source: format!("https://live.example/{}.jpg", label),
        }
    }

    #[test]
    fn test_select_exact_label() {
        let sizes = vec![size("Small", 240, 160), size("Original", 100, 100)];
        assert_eq!(select_size(&sizes, "Original").unwrap().label, "Original");
    }

    #[test]
    fn test_select_falls_back_to_largest_area() {
        let sizes = vec![
            size("Small", 240, 160),
            size("Large", 1024, 683),
            size("Medium", 500, 333),
        ];
        assert_eq!(select_size(&sizes, "Original").unwrap().label, "Large");
    }

    #[test]
    fn test_select_tie_keeps_first() {
        let sizes = vec![size("Wide", 200, 100), size("Tall", 100, 200)];
        assert_eq!(select_size(&sizes, "Original").unwrap().label, "Wide");
    }

    #[test]
    fn test_select_empty() {
        assert!(select_size(&[], "Original").is_none());
    }

    #[test]
    fn test_photo_filename() {
        assert_eq!(photo_filename("52", "Original"), "52_Original.jpg");
        assert_eq!(photo_filename("52", "Large Square"), "52_Large_Square.jpg");
    }
}
