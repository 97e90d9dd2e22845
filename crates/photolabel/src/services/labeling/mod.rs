//! Interactive labeling: stream, prefetch buffer and session.
//!
//! A [`LabelingSession`] walks a search's upstream results through a
//! [`PhotoStream`], keeps a few downloaded candidates ready in a
//! [`PrefetchBuffer`] and commits each label together with the search
//! cursor, so a restart resumes exactly after the last labeled photo.

mod downloader;
mod error;
mod prefetch;
mod session;
mod stream;

pub use downloader::ImageDownloader;
pub use error::{LabelingError, LabelingResult};
pub use prefetch::{BufferConfig, PrefetchBuffer, MAX_RETRY_DELAY};
pub use session::{LabelOutcome, LabelingSession, SessionState, SessionStatus};
pub use stream::PhotoStream;


#[cfg(test)]
pub(crate) async fn test_progress() -> (crate::repository::DieselProgressRepository, tempfile::TempDir) {
    use crate::repository::{run_migrations, DbPool, DieselProgressRepository};

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("labels.db").display());
    run_migrations(&url).await.unwrap();
    (DieselProgressRepository::new(DbPool::from_url(&url).unwrap()), dir)
}
