//! Search and pagination cursor models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the next unconsumed photo in a paged search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub page_idx: u32,
    pub image_idx: u32,
}

impl Cursor {
    /// The first position of any search.
    pub const START: Cursor = Cursor {
        page_idx: 0,
        image_idx: 0,
    };

    pub fn new(page_idx: u32, image_idx: u32) -> Self {
        Self {
            page_idx,
            image_idx,
        }
    }

    /// The position after this one.
    ///
    /// Rolls over to the start of the next page once `image_idx` reaches
    /// `page_size`.
    pub fn advance(self, page_size: u32) -> Self {
        let image_idx = self.image_idx + 1;
        if image_idx >= page_size {
            Self::new(self.page_idx + 1, 0)
        } else {
            Self::new(self.page_idx, image_idx)
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_idx, self.image_idx)
    }
}

/// A durable search: one query, its page size, and how far labeling has got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub id: i32,
    /// Normalized query text. Unique across searches.
    pub query: String,
    /// Immutable once the search has been created.
    pub page_size: u32,
    /// Upper bound (epoch seconds) on upstream photo recency.
    pub recency_bound: i64,
    /// Next unconsumed position.
    pub cursor: Cursor,
    pub first_search_time: DateTime<Utc>,
    pub last_search_time: DateTime<Utc>,
}

impl Search {
    /// Directory (relative to a mirror root) that holds this search's images.
    pub fn session_dir(&self) -> String {
        let slug: String = self
            .query
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}/images", slug)
    }
}

/// Normalize raw query text into a search identity.
///
/// Trims, collapses internal whitespace and lowercases, so "  Snowy
/// Mountains" and "snowy mountains" resolve to the same search.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
