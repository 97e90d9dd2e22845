//! Durable search progress: pagination cursors and label records.
//!
//! A cursor only moves inside the same transaction that writes the label
//! responsible for the move, so the two can never disagree after a crash.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use super::models::{NewImage, NewSearch, SearchRecord};
use super::parse_datetime;
use super::pool::{DbPool, DieselError};
use crate::models::{Cursor, Search};
use crate::schema::{images, searches};
use crate::with_conn;

/// Failures of the progress store beyond plain database errors.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error(transparent)]
    Database(#[from] DieselError),
    #[error("search '{query}' uses page size {stored}, cannot resume with {requested}")]
    SearchMismatch {
        query: String,
        stored: u32,
        requested: u32,
    },
    #[error("search '{0}' could not be resolved")]
    InvalidSearch(String),
}

fn to_index(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Convert a database record to a domain model.
impl From<SearchRecord> for Search {
    fn from(record: SearchRecord) -> Self {
        Search {
            id: record.id,
            query: record.query,
            page_size: to_index(record.per_page),
            recency_bound: record.recency_bound,
            cursor: Cursor::new(
                to_index(record.last_page_idx),
                to_index(record.last_image_idx),
            ),
            first_search_time: parse_datetime(&record.first_search_time),
            last_search_time: parse_datetime(&record.last_search_time),
        }
    }
}

/// Owns the `searches` cursors and the label writes that advance them.
#[derive(Clone)]
pub struct DieselProgressRepository {
    pool: DbPool,
}

impl DieselProgressRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Look up a search by its normalized query, creating it at `(0, 0)` if absent.
    ///
    /// An existing search gets its last-touched time refreshed. Resuming
    /// with a different page size fails with [`ProgressError::SearchMismatch`]
    /// and changes nothing. Two callers racing on a new query both end up
    /// with the same row: the losing insert is ignored and re-reads it.
    pub async fn resolve_or_create_search(
        &self,
        query: &str,
        page_size: u32,
        recency_bound: i64,
    ) -> Result<Search, ProgressError> {
        if query.trim().is_empty() {
            return Err(ProgressError::InvalidSearch(query.to_string()));
        }
        let query = query.to_string();
        let now = Utc::now().to_rfc3339();

        let resolved: Result<Search, ProgressError> = with_conn!(self.pool, conn, {
            conn.transaction(|conn| {
                let query = query.clone();
                let now = now.clone();
                Box::pin(async move {
                    let inserted = diesel::insert_into(searches::table)
                        .values(&NewSearch {
                            query: &query,
                            per_page: to_column(page_size),
                            recency_bound,
                            last_page_idx: 0,
                            last_image_idx: 0,
                            first_search_time: &now,
                            last_search_time: &now,
                        })
                        .on_conflict(searches::query)
                        .do_nothing()
                        .execute(conn)
                        .await?;

                    let record: Option<SearchRecord> = searches::table
                        .filter(searches::query.eq(&query))
                        .first(conn)
                        .await
                        .optional()?;

                    let Some(record) = record else {
                        return Err(ProgressError::InvalidSearch(query));
                    };

                    if record.per_page != to_column(page_size) {
                        return Err(ProgressError::SearchMismatch {
                            query,
                            stored: to_index(record.per_page),
                            requested: page_size,
                        });
                    }

                    if inserted == 0 {
                        diesel::update(searches::table.find(record.id))
                            .set(searches::last_search_time.eq(&now))
                            .execute(conn)
                            .await?;
                    }

                    let mut search = Search::from(record);
                    search.last_search_time = parse_datetime(&now);
                    Ok::<Search, ProgressError>(search)
                })
            })
            .await
        });

        let search = resolved?;
        debug!(
            "Resolved search '{}' (id {}) at {}",
            search.query, search.id, search.cursor
        );
        Ok(search)
    }

    /// Check whether a photo already has a label, from any search.
    pub async fn is_labeled(&self, photo_id: &str) -> Result<bool, DieselError> {
        with_conn!(self.pool, conn, {
            diesel::select(diesel::dsl::exists(images::table.find(photo_id)))
                .get_result::<bool>(&mut conn)
                .await
        })
    }

    /// Record a label and move the search's cursor past `position`.
    ///
    /// Both writes commit together. Returns `false` when the photo was
    /// already labeled; the cursor still advances in that case. A commit
    /// behind the stored cursor leaves the cursor where it is.
    pub async fn commit_label(
        &self,
        user_id: i64,
        photo_id: &str,
        image_path: &str,
        label: i64,
        search: &Search,
        position: Cursor,
    ) -> Result<bool, ProgressError> {
        let next = position.advance(search.page_size);
        let now = Utc::now().to_rfc3339();
        let search_id = search.id;
        let query = search.query.clone();
        let image = NewImage {
            flickr_id: photo_id.to_string(),
            image_path: image_path.to_string(),
            label,
            user_id,
            search_id,
            page_idx: to_column(position.page_idx),
            image_idx: to_column(position.image_idx),
            collected_at: now.clone(),
        };

        let committed: Result<bool, ProgressError> = with_conn!(self.pool, conn, {
            conn.transaction(|conn| {
                let image = image.clone();
                let now = now.clone();
                let query = query.clone();
                Box::pin(async move {
                    let next_page = to_column(next.page_idx);
                    let next_image = to_column(next.image_idx);
                    // The stored cursor never moves backwards.
                    let updated = diesel::update(
                        searches::table.find(search_id).filter(
                            searches::last_page_idx.lt(next_page).or(searches::last_page_idx
                                .eq(next_page)
                                .and(searches::last_image_idx.le(next_image))),
                        ),
                    )
                    .set((
                        searches::last_page_idx.eq(next_page),
                        searches::last_image_idx.eq(next_image),
                        searches::last_search_time.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        let exists = diesel::select(diesel::dsl::exists(
                            searches::table.find(search_id),
                        ))
                        .get_result::<bool>(conn)
                        .await?;
                        if !exists {
                            return Err(ProgressError::InvalidSearch(query));
                        }
                        debug!("Cursor for '{}' is already past {}", query, next);
                    }

                    let inserted = diesel::insert_into(images::table)
                        .values(&image)
                        .on_conflict(images::flickr_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;

                    Ok::<bool, ProgressError>(inserted > 0)
                })
            })
            .await
        });

        let newly_labeled = committed?;
        debug!(
            "Committed label {} for {} at {}; cursor now {}{}",
            label,
            photo_id,
            position,
            next,
            if newly_labeled { "" } else { " (already labeled)" }
        );
        Ok(newly_labeled)
    }

    /// Get a search by ID.
    pub async fn get_search(&self, id: i32) -> Result<Option<Search>, DieselError> {
        with_conn!(self.pool, conn, {
            searches::table
                .find(id)
                .first::<SearchRecord>(&mut conn)
                .await
                .optional()
                .map(|record| record.map(Search::from))
        })
    }

    /// Get a search by its normalized query text.
    pub async fn find_search(&self, query: &str) -> Result<Option<Search>, DieselError> {
        with_conn!(self.pool, conn, {
            searches::table
                .filter(searches::query.eq(query))
                .first::<SearchRecord>(&mut conn)
                .await
                .optional()
                .map(|record| record.map(Search::from))
        })
    }

    /// All searches, most recently touched first.
    pub async fn list_searches(&self) -> Result<Vec<Search>, DieselError> {
        with_conn!(self.pool, conn, {
            searches::table
                .order((searches::last_search_time.desc(), searches::id.desc()))
                .load::<SearchRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Search::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations::run_migrations;
    use tempfile::TempDir;

    async fn setup() -> (DieselProgressRepository, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("progress.db").display());
        run_migrations(&url).await.unwrap();
        let repo = DieselProgressRepository::new(DbPool::from_url(&url).unwrap());
        (repo, dir)
    }

    #[tokio::test]
    async fn test_resolve_creates_search_at_start() {
        let (repo, _dir) = setup().await;

        let search = repo
            .resolve_or_create_search("mountains", 2, 1_660_730_319)
            .await
            .unwrap();

        assert_eq!(search.query, "mountains");
        assert_eq!(search.page_size, 2);
        assert_eq!(search.recency_bound, 1_660_730_319);
        assert_eq!(search.cursor, Cursor::START);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let (repo, _dir) = setup().await;

        let first = repo.resolve_or_create_search("lakes", 3, 100).await.unwrap();
        repo.commit_label(1, "p1", "lakes/images/p1.jpg", 1, &first, Cursor::START)
            .await
            .unwrap();

        let second = repo.resolve_or_create_search("lakes", 3, 999).await.unwrap();

        assert_eq!(first.id, second.id);
        // Cursor is preserved and the stored recency bound wins.
        assert_eq!(second.cursor, Cursor::new(0, 1));
        assert_eq!(second.recency_bound, 100);
        assert!(second.last_search_time >= first.last_search_time);
        assert_eq!(repo.list_searches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_rejects_page_size_change() {
        let (repo, _dir) = setup().await;

        let original = repo.resolve_or_create_search("forests", 2, 0).await.unwrap();
        let err = repo
            .resolve_or_create_search("forests", 5, 0)
            .await
            .unwrap_err();

        match err {
            ProgressError::SearchMismatch {
                query,
                stored,
                requested,
            } => {
                assert_eq!(query, "forests");
                assert_eq!(stored, 2);
                assert_eq!(requested, 5);
            }
            other => panic!("expected SearchMismatch, got {other:?}"),
        }

        let unchanged = repo.find_search("forests").await.unwrap().unwrap();
        assert_eq!(unchanged.last_search_time, original.last_search_time);
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_query() {
        let (repo, _dir) = setup().await;

        let err = repo.resolve_or_create_search("  ", 2, 0).await.unwrap_err();

        assert!(matches!(err, ProgressError::InvalidSearch(_)));
        assert!(repo.list_searches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_queries_resolve_concurrently() {
        let (repo, _dir) = setup().await;

        let (a, b) = tokio::join!(
            repo.resolve_or_create_search("rivers", 2, 0),
            repo.resolve_or_create_search("deserts", 2, 0),
        );

        assert_ne!(a.unwrap().id, b.unwrap().id);
    }

    #[tokio::test]
    async fn test_commit_label_advances_cursor_and_inserts() {
        let (repo, _dir) = setup().await;
        let search = repo.resolve_or_create_search("boats", 2, 0).await.unwrap();

        assert!(!repo.is_labeled("42").await.unwrap());
        let inserted = repo
            .commit_label(7, "42", "boats/images/42_Original.jpg", 1, &search, Cursor::new(0, 1))
            .await
            .unwrap();

        assert!(inserted);
        assert!(repo.is_labeled("42").await.unwrap());
        let stored = repo.get_search(search.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor, Cursor::new(1, 0));
    }

    #[tokio::test]
    async fn test_commit_label_is_insert_if_absent() {
        let (repo, _dir) = setup().await;
        let search = repo.resolve_or_create_search("birds", 4, 0).await.unwrap();

        let first = repo
            .commit_label(1, "99", "a.jpg", 1, &search, Cursor::new(0, 0))
            .await
            .unwrap();
        let second = repo
            .commit_label(2, "99", "b.jpg", 0, &search, Cursor::new(0, 1))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let labels = crate::repository::DieselLabelRepository::new(repo.pool.clone());
        let record = labels.get("99").await.unwrap().unwrap();
        assert_eq!(record.label, 1);
        assert_eq!(record.user_id, 1);
        assert_eq!(labels.count_labels().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commits_insert_once() {
        let (repo, _dir) = setup().await;
        let search_a = repo.resolve_or_create_search("cats", 2, 0).await.unwrap();
        let search_b = repo.resolve_or_create_search("kittens", 2, 0).await.unwrap();

        let repo_a = repo.clone();
        let repo_b = repo.clone();
        let a = tokio::spawn(async move {
            repo_a
                .commit_label(1, "777", "cats/777.jpg", 1, &search_a, Cursor::START)
                .await
        });
        let b = tokio::spawn(async move {
            repo_b
                .commit_label(2, "777", "kittens/777.jpg", 0, &search_b, Cursor::START)
                .await
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert!(a ^ b, "exactly one commit should insert");
        let labels = crate::repository::DieselLabelRepository::new(repo.pool.clone());
        assert_eq!(labels.count_labels().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_label_for_missing_search_fails() {
        let (repo, _dir) = setup().await;
        let mut search = repo.resolve_or_create_search("ghosts", 2, 0).await.unwrap();
        search.id += 100;

        let err = repo
            .commit_label(1, "1", "x.jpg", 1, &search, Cursor::START)
            .await
            .unwrap_err();

        assert!(matches!(err, ProgressError::InvalidSearch(_)));
        assert!(!repo.is_labeled("1").await.unwrap());
    }

    #[tokio::test]
    async fn test_late_commit_does_not_move_cursor_back() {
        let (repo, _dir) = setup().await;
        let search = repo.resolve_or_create_search("trains", 2, 0).await.unwrap();

        repo.commit_label(1, "t3", "t3.jpg", 1, &search, Cursor::new(1, 0))
            .await
            .unwrap();
        let late = repo
            .commit_label(2, "t1", "t1.jpg", 0, &search, Cursor::new(0, 0))
            .await
            .unwrap();

        assert!(late);
        assert!(repo.is_labeled("t1").await.unwrap());
        let stored = repo.get_search(search.id).await.unwrap().unwrap();
        assert_eq!(stored.cursor, Cursor::new(1, 1));
    }
}
