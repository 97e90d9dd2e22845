use serde::{Deserialize, Serialize};

use super::Cursor;

/// A photo id at a position of a search's result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub photo_id: String,
    pub position: Cursor,
}

/// A downloaded, not-yet-labeled photo waiting in the look-ahead buffer.
///
/// Lives in memory only. Losing one on a crash is harmless because the
/// durable cursor never moves past an unlabeled candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedCandidate {
    pub photo_id: String,
    pub position: Cursor,
    /// Size label of the downloaded rendition (e.g. "Original", "Large").
    pub size_label: String,
    /// Path relative to the mirror roots.
    pub logical_path: String,
    /// Reference returned by the primary (local) mirror.
    pub local_path: String,
    /// Reference returned by the backup mirror, or the local one if there is none.
    pub remote_path: String,
}
