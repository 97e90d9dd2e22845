//! Service layer for labeling and label export.

pub mod export;
pub mod labeling;

pub use export::{ExportError, LabelExporter};
pub use labeling::{
    ImageDownloader, LabelOutcome, LabelingError, LabelingSession, SessionState, SessionStatus,
};
