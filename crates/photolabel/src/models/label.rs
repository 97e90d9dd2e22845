use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cursor;

/// A label applied to one upstream photo. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub photo_id: String,
    pub image_path: String,
    pub label: i64,
    pub user_id: i64,
    pub search_id: i32,
    /// Where the photo was encountered in its search.
    pub position: Cursor,
    pub collected_at: DateTime<Utc>,
}

/// Number of labels grouped by some key (label value or user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub key: i64,
    pub count: i64,
}
