//! Restartable walk over a search's paged results.

use std::sync::Arc;

use tracing::debug;

use crate::models::{Cursor, PhotoRef, Search};
use crate::source::{ImageSource, SearchQuery, SourceResult};

/// Yields `(photo_id, position)` pairs page by page, starting at a cursor.
///
/// The position only moves on [`advance`](Self::advance), so a failed
/// download of the peeked photo leaves it to be peeked again. Pages are
/// cached until fully consumed. Short pages are followed by the next
/// page as usual; the walk ends only on an empty page.
pub struct PhotoStream {
    source: Arc<dyn ImageSource>,
    query: SearchQuery,
    position: Cursor,
    page: Option<Vec<String>>,
    exhausted: bool,
}

impl PhotoStream {
    pub fn new(source: Arc<dyn ImageSource>, search: &Search) -> Self {
        Self {
            source,
            query: SearchQuery::from(search),
            position: search.cursor,
            page: None,
            exhausted: false,
        }
    }

    /// Position of the next photo to be yielded.
    pub fn position(&self) -> Cursor {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The photo at the current position, fetching pages as needed.
    pub async fn peek(&mut self) -> SourceResult<Option<PhotoRef>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            let ids = match self.page {
                Some(ref ids) => ids,
                None => {
                    let ids = self
                        .source
                        .search(&self.query, self.position.page_idx)
                        .await?;
                    if ids.is_empty() {
                        debug!(
                            "'{}' has no results on page {}",
                            self.query.text,
                            self.position.page_idx
                        );
                        self.exhausted = true;
                        return Ok(None);
                    }
                    &*self.page.insert(ids)
                }
            };

            if let Some(id) = ids.get(self.position.image_idx as usize) {
                return Ok(Some(PhotoRef {
                    photo_id: id.clone(),
                    position: self.position,
                }));
            }
            self.position = Cursor::new(self.position.page_idx + 1, 0);
            self.page = None;
        }
    }

    /// Move past the current position.
    pub fn advance(&mut self) {
        self.position = self.position.advance(self.query.page_size);
        if self.position.image_idx == 0 {
            self.page = None;
        }
    }

    /// Peek and advance in one step.
    pub async fn next(&mut self) -> SourceResult<Option<PhotoRef>> {
        let photo = self.peek().await?;
        if photo.is_some() {
            self.advance();
        }
        Ok(photo)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::testing::FakeSource;

    fn search_at(cursor: Cursor, page_size: u32) -> Search {
        Search {
            id: 1,
            query: "mountains".to_string(),
            page_size,
            recency_bound: 0,
            cursor,
            first_search_time: Utc::now(),
            last_search_time: Utc::now(),
        }
    }

    async fn collect(stream: &mut PhotoStream) -> Vec<(String, Cursor)> {
        let mut out = Vec::new();
        while let Some(photo) = stream.next().await.unwrap() {
            out.push((photo.photo_id, photo.position));
        }
        out
    }

    #[tokio::test]
    async fn test_walks_pages_in_order() {
        let source = Arc::new(FakeSource::new(&[&["A", "B"], &["C", "D"], &["E"]]));
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::START, 2));

        let photos = collect(&mut stream).await;

        assert_eq!(
            photos,
            vec![
                ("A".to_string(), Cursor::new(0, 0)),
                ("B".to_string(), Cursor::new(0, 1)),
                ("C".to_string(), Cursor::new(1, 0)),
                ("D".to_string(), Cursor::new(1, 1)),
                ("E".to_string(), Cursor::new(2, 0)),
            ]
        );
        assert!(stream.is_exhausted());
        // Only the empty page 3 ends the walk.
        assert_eq!(source.searched_pages(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_short_page_mid_results_continues() {
        let source = Arc::new(FakeSource::new(&[&["A", "B"], &["C"], &["D", "E"]]));
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::START, 2));

        let ids: Vec<String> = collect(&mut stream)
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_resumes_past_end_of_short_page() {
        // A label on the last photo of a short page leaves the cursor at (1, 1).
        let source = Arc::new(FakeSource::new(&[&["A", "B"], &["C"], &["D", "E"]]));
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::new(1, 1), 2));

        let photos = collect(&mut stream).await;

        assert_eq!(
            photos,
            vec![
                ("D".to_string(), Cursor::new(2, 0)),
                ("E".to_string(), Cursor::new(2, 1)),
            ]
        );
        assert_eq!(source.searched_pages(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_resumes_mid_page() {
        let source = Arc::new(FakeSource::new(&[&["A", "B"], &["C", "D"]]));
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::new(1, 1), 2));

        let photos = collect(&mut stream).await;

        assert_eq!(photos, vec![("D".to_string(), Cursor::new(1, 1))]);
        assert_eq!(source.searched_pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_peek_does_not_advance() {
        let source = Arc::new(FakeSource::new(&[&["A", "B"]]));
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::START, 2));

        let first = stream.peek().await.unwrap().unwrap();
        let again = stream.peek().await.unwrap().unwrap();

        assert_eq!(first, again);
        assert_eq!(stream.position(), Cursor::START);
        // The page is cached between peeks.
        assert_eq!(source.searched_pages(), vec![0]);
    }

    #[tokio::test]
    async fn test_search_failure_keeps_position() {
        let source = Arc::new(FakeSource::new(&[&["A"]]));
        source.fail_searches(1);
        let mut stream = PhotoStream::new(source.clone(), &search_at(Cursor::START, 1));

        assert!(stream.peek().await.is_err());
        assert_eq!(stream.position(), Cursor::START);
        assert_eq!(stream.next().await.unwrap().unwrap().photo_id, "A");
    }

    #[tokio::test]
    async fn test_empty_first_page_is_exhausted() {
        let source = Arc::new(FakeSource::new(&[]));
        let mut stream = PhotoStream::new(source, &search_at(Cursor::START, 50));

        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.is_exhausted());
    }
}
