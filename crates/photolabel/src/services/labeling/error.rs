//! Labeling error types.

use thiserror::Error;

use crate::repository::{DieselError, ProgressError};
use crate::source::SourceError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum LabelingError {
    #[error("search '{query}' was started with page size {stored}; it cannot be resumed with page size {requested}")]
    SearchMismatch {
        query: String,
        stored: u32,
        requested: u32,
    },

    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("no image is ready to label")]
    NoActiveImage,

    #[error("the previous label is still being processed")]
    Busy,

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("image source error: {0}")]
    Source(#[from] SourceError),

    #[error("mirror error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ProgressError> for LabelingError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::Database(e) => LabelingError::Database(e),
            ProgressError::SearchMismatch {
                query,
                stored,
                requested,
            } => LabelingError::SearchMismatch {
                query,
                stored,
                requested,
            },
            ProgressError::InvalidSearch(query) => LabelingError::InvalidSearch(query),
        }
    }
}

impl LabelingError {
    /// Errors the labeler can act on. Everything else is transient and
    /// shows up as "still loading".
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            LabelingError::SearchMismatch { .. }
                | LabelingError::InvalidSearch(_)
                | LabelingError::NoActiveImage
                | LabelingError::Busy
        )
    }
}

pub type LabelingResult<T> = Result<T, LabelingError>;
