//! Bounded look-ahead buffer of downloaded candidates.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::downloader::ImageDownloader;
use super::error::{LabelingError, LabelingResult};
use super::stream::PhotoStream;
use crate::config::LabelingConfig;
use crate::models::BufferedCandidate;
use crate::repository::DieselProgressRepository;

/// Upper bound on the retry backoff.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Sizing and retry behaviour of a [`PrefetchBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub capacity: usize,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl From<&LabelingConfig> for BufferConfig {
    fn from(config: &LabelingConfig) -> Self {
        Self {
            capacity: config.buffer_size.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retry_delay: MAX_RETRY_DELAY,
        }
    }
}

struct QueueState {
    items: VecDeque<BufferedCandidate>,
    exhausted: bool,
    closed: bool,
    last_error: Option<String>,
    fill_scheduled: bool,
}

/// Everything a fill pass mutates. Held behind an async lock so only one
/// pass consumes the stream at a time.
struct Filler {
    stream: PhotoStream,
    downloader: Arc<ImageDownloader>,
    progress: DieselProgressRepository,
    session_dir: String,
    seen: RecentIds,
}

/// The last `limit` photo ids handed to the queue.
///
/// An id older than the window has left the queue and been labeled, so
/// the labeled check catches any later repeat of it.
struct RecentIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    limit: usize,
}

impl RecentIds {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(limit),
            ids: HashSet::with_capacity(limit),
            limit,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.limit {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

struct Shared {
    config: BufferConfig,
    queue: Mutex<QueueState>,
    ready: Notify,
    filler: tokio::sync::Mutex<Filler>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// FIFO of up to `capacity` downloaded candidates, in stream order.
///
/// Filling happens in background tasks. A candidate only enters the queue
/// once its bytes are on the primary mirror, and the stream only moves
/// past a photo once it is queued or known to be labeled, so failures
/// are retried on the same photo instead of skipping it.
#[derive(Clone)]
pub struct PrefetchBuffer {
    shared: Arc<Shared>,
}

impl PrefetchBuffer {
    pub fn new(
        config: BufferConfig,
        stream: PhotoStream,
        downloader: Arc<ImageDownloader>,
        progress: DieselProgressRepository,
        session_dir: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(QueueState {
                    items: VecDeque::with_capacity(config.capacity),
                    exhausted: false,
                    closed: false,
                    last_error: None,
                    fill_scheduled: false,
                }),
                ready: Notify::new(),
                filler: tokio::sync::Mutex::new(Filler {
                    stream,
                    downloader,
                    progress,
                    session_dir: session_dir.into(),
                    seen: RecentIds::new(config.capacity + 1),
                }),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, QueueState> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    pub fn len(&self) -> usize {
        self.queue().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The upstream stream has no more photos. Queued items may remain.
    pub fn is_exhausted(&self) -> bool {
        self.queue().exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.queue().closed
    }

    /// Most recent fill failure, cleared by the next successful download.
    pub fn last_error(&self) -> Option<String> {
        self.queue().last_error.clone()
    }

    fn needs_fill(&self) -> bool {
        let queue = self.queue();
        !queue.closed && !queue.exhausted && queue.items.len() < self.shared.config.capacity
    }

    fn record_failure(&self, err: LabelingError) -> LabelingError {
        self.queue().last_error = Some(err.to_string());
        err
    }

    /// Download candidates until the queue is full or the stream ends.
    ///
    /// Returns how many candidates were added. Stops at the first error
    /// without advancing past the failed photo.
    pub async fn fill(&self) -> LabelingResult<usize> {
        let mut filler = self.shared.filler.lock().await;
        let mut added = 0;

        while self.needs_fill() {
            let photo = match filler.stream.peek().await {
                Ok(Some(photo)) => photo,
                Ok(None) => {
                    self.queue().exhausted = true;
                    self.shared.ready.notify_waiters();
                    debug!("Stream exhausted at {}", filler.stream.position());
                    break;
                }
                Err(e) => return Err(self.record_failure(e.into())),
            };

            if filler.seen.contains(&photo.photo_id) {
                debug!("Skipping {} at {}: already buffered", photo.photo_id, photo.position);
                filler.stream.advance();
                continue;
            }
            match filler.progress.is_labeled(&photo.photo_id).await {
                Ok(true) => {
                    debug!("Skipping {} at {}: already labeled", photo.photo_id, photo.position);
                    filler.stream.advance();
                    continue;
                }
                Ok(false) => {}
                Err(e) => return Err(self.record_failure(e.into())),
            }

            let candidate = match filler.downloader.fetch(&photo, &filler.session_dir).await {
                Ok(candidate) => candidate,
                Err(e) => return Err(self.record_failure(e)),
            };
            filler.stream.advance();
            filler.seen.insert(candidate.photo_id.clone());

            {
                let mut queue = self.queue();
                if queue.closed {
                    break;
                }
                queue.items.push_back(candidate);
                queue.last_error = None;
            }
            added += 1;
            self.shared.ready.notify_waiters();
        }

        Ok(added)
    }

    /// Start a background fill unless one is already running or nothing is needed.
    pub fn spawn_fill(&self) {
        {
            let mut queue = self.queue();
            if queue.closed
                || queue.exhausted
                || queue.fill_scheduled
                || queue.items.len() >= self.shared.config.capacity
            {
                return;
            }
            queue.fill_scheduled = true;
        }

        let buffer = self.clone();
        let handle = tokio::spawn(async move { buffer.fill_with_retry().await });

        let mut tasks = self
            .shared
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn fill_with_retry(&self) {
        let config = self.shared.config;
        let mut delay = config.retry_delay;

        loop {
            match self.fill().await {
                Ok(_) => {
                    let mut queue = self.queue();
                    if queue.closed
                        || queue.exhausted
                        || queue.items.len() >= config.capacity
                    {
                        queue.fill_scheduled = false;
                        return;
                    }
                    delay = config.retry_delay;
                }
                Err(e) => {
                    if self.is_closed() {
                        return;
                    }
                    warn!("Prefetch failed, retrying in {:?}: {}", delay, e);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(config.max_retry_delay);
                }
            }
        }
    }

    /// Take the next queued candidate without waiting.
    pub fn try_pop(&self) -> Option<BufferedCandidate> {
        let candidate = self.queue().items.pop_front();
        if candidate.is_some() {
            self.spawn_fill();
        }
        candidate
    }

    /// Wait for the next candidate.
    ///
    /// Returns `None` once the stream is exhausted and the queue drained,
    /// or when the buffer is closed.
    pub async fn pop_head(&self) -> Option<BufferedCandidate> {
        loop {
            let notified = self.shared.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (candidate, finished) = {
                let mut queue = self.queue();
                let candidate = queue.items.pop_front();
                (candidate, queue.closed || queue.exhausted)
            };

            match candidate {
                Some(candidate) => {
                    self.spawn_fill();
                    return Some(candidate);
                }
                None if finished => return None,
                None => {
                    self.spawn_fill();
                    notified.await;
                }
            }
        }
    }

    /// Drop queued candidates, stop background fills and wake waiters.
    pub fn close(&self) {
        {
            let mut queue = self.queue();
            queue.closed = true;
            queue.items.clear();
        }
        self.shared.ready.notify_waiters();

        let mut tasks = self
            .shared
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cursor, Search};
    use crate::services::labeling::test_progress;
    use crate::source::ImageSource;
    use crate::testing::{FakeSource, MemoryMirror};

    struct Fixture {
        buffer: PrefetchBuffer,
        source: Arc<FakeSource>,
        progress: DieselProgressRepository,
        search: Search,
        _dir: tempfile::TempDir,
    }

    async fn fixture(pages: &[&[&str]], page_size: u32, capacity: usize) -> Fixture {
        let (progress, dir) = test_progress().await;
        let search = progress
            .resolve_or_create_search("cats", page_size, 0)
            .await
            .unwrap();
        let source = Arc::new(FakeSource::new(pages));
        let buffer = buffer_for(&search, source.clone(), &progress, capacity);
        Fixture {
            buffer,
            source,
            progress,
            search,
            _dir: dir,
        }
    }

    fn buffer_for(
        search: &Search,
        source: Arc<FakeSource>,
        progress: &DieselProgressRepository,
        capacity: usize,
    ) -> PrefetchBuffer {
        let source: Arc<dyn ImageSource> = source;
        let downloader = Arc::new(ImageDownloader::new(
            source.clone(),
            Arc::new(MemoryMirror::new("local")),
            None,
            "Original",
        ));
        PrefetchBuffer::new(
            BufferConfig {
                capacity,
                retry_delay: Duration::from_millis(5),
                max_retry_delay: Duration::from_millis(20),
            },
            PhotoStream::new(source, search),
            downloader,
            progress.clone(),
            search.session_dir(),
        )
    }

    fn ids(candidates: &[BufferedCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.photo_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fill_stops_at_capacity() {
        let f = fixture(&[&["A", "B", "C"], &["D", "E", "F"]], 3, 2).await;

        assert_eq!(f.buffer.fill().await.unwrap(), 2);
        assert_eq!(f.buffer.len(), 2);
        assert_eq!(f.source.downloaded(), vec!["A", "B"]);

        // Already full.
        assert_eq!(f.buffer.fill().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_head_yields_stream_order_then_none() {
        let f = fixture(&[&["A", "B"], &["C"]], 2, 2).await;

        let mut popped = Vec::new();
        while let Some(candidate) = f.buffer.pop_head().await {
            popped.push(candidate);
        }

        assert_eq!(ids(&popped), vec!["A", "B", "C"]);
        assert_eq!(popped[2].position, Cursor::new(1, 0));
        assert!(f.buffer.is_exhausted());
    }

    #[tokio::test]
    async fn test_failed_download_is_retried_not_skipped() {
        let f = fixture(&[&["A", "B", "C"]], 3, 3).await;
        f.source.fail_downloads("B", 2);

        assert!(f.buffer.fill().await.is_err());
        assert_eq!(f.buffer.len(), 1);
        assert!(f.buffer.last_error().is_some());

        let mut popped = Vec::new();
        while let Some(candidate) = f.buffer.pop_head().await {
            popped.push(candidate);
        }

        assert_eq!(ids(&popped), vec!["A", "B", "C"]);
        assert!(f.buffer.last_error().is_none());
    }

    #[tokio::test]
    async fn test_skips_already_labeled() {
        let f = fixture(&[&["A", "B", "C"]], 3, 3).await;
        f.progress
            .commit_label(1, "B", "elsewhere/B.jpg", 1, &f.search, Cursor::START)
            .await
            .unwrap();

        f.buffer.fill().await.unwrap();

        assert_eq!(f.source.downloaded(), vec!["A", "C"]);
        assert_eq!(f.buffer.try_pop().unwrap().photo_id, "A");
        let c = f.buffer.try_pop().unwrap();
        assert_eq!((c.photo_id.as_str(), c.position), ("C", Cursor::new(0, 2)));
    }

    #[tokio::test]
    async fn test_skips_ids_repeated_upstream() {
        let f = fixture(&[&["A", "B"], &["B", "C"]], 2, 4).await;

        f.buffer.fill().await.unwrap();

        assert_eq!(f.source.downloaded(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_recent_ids_keep_a_bounded_window() {
        let mut recent = RecentIds::new(2);
        for id in ["A", "B", "B", "C"] {
            recent.insert(id.to_string());
        }

        assert_eq!(recent.len(), 2);
        assert!(!recent.contains("A"));
        assert!(recent.contains("B") && recent.contains("C"));
    }

    #[tokio::test]
    async fn test_seen_ids_stay_bounded_while_draining() {
        let f = fixture(&[&["A", "B"], &["C", "D"], &["E", "F"]], 2, 1).await;

        while let Some(candidate) = f.buffer.pop_head().await {
            f.progress
                .commit_label(1, &candidate.photo_id, "x.jpg", 1, &f.search, candidate.position)
                .await
                .unwrap();
        }

        assert_eq!(f.source.downloaded(), vec!["A", "B", "C", "D", "E", "F"]);
        assert!(f.buffer.shared.filler.lock().await.seen.len() <= 2);
    }

    #[tokio::test]
    async fn test_concurrent_fills_download_each_photo_once() {
        let f = fixture(&[&["A", "B", "C", "D"]], 4, 4).await;

        let (a, b) = tokio::join!(f.buffer.fill(), f.buffer.fill());

        assert_eq!(a.unwrap() + b.unwrap(), 4);
        assert_eq!(f.source.downloaded(), vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let f = fixture(&[&["A"]], 1, 1).await;
        f.source.hold_downloads();

        let waiter = {
            let buffer = f.buffer.clone();
            tokio::spawn(async move { buffer.pop_head().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.buffer.close();

        assert!(waiter.await.unwrap().is_none());
        assert!(f.buffer.is_closed());
        assert!(f.buffer.try_pop().is_none());
    }
}
