//! Domain models for searches, labels and buffered candidates.

mod candidate;
mod label;
mod search;

pub use candidate::{BufferedCandidate, PhotoRef};
pub use label::{LabelCount, LabelRecord};
pub use search::{normalize_query, Cursor, Search};
