//! The labeling session state machine.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::downloader::ImageDownloader;
use super::error::{LabelingError, LabelingResult};
use super::prefetch::{BufferConfig, PrefetchBuffer};
use super::stream::PhotoStream;
use crate::config::{LabelingConfig, Settings};
use crate::models::{normalize_query, BufferedCandidate, Cursor, Search};
use crate::repository::DieselProgressRepository;
use crate::source::{FlickrClient, ImageSource};
use crate::storage::mirrors_from_settings;

/// Where the session is in its lifecycle.
///
/// `Loading` covers both "waiting for the first image" and "waiting for
/// the next image after a label".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Loading,
    Active,
    Exhausted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Exhausted => "exhausted",
        }
    }
}

/// Result of a committed label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelOutcome {
    pub photo_id: String,
    /// False when another session had already labeled this photo.
    pub newly_labeled: bool,
    /// The search's durable cursor after the commit.
    pub cursor: Cursor,
}

/// Snapshot of the session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub query: Option<String>,
    pub search_id: Option<i32>,
    pub user_id: Option<i64>,
    pub head: Option<BufferedCandidate>,
    pub cursor: Option<Cursor>,
    /// Labels committed by this session.
    pub labeled: u64,
    pub buffered: usize,
    pub last_error: Option<String>,
}

struct ActiveSearch {
    search: Search,
    user_id: i64,
    buffer: PrefetchBuffer,
    head: Option<BufferedCandidate>,
    committed: u64,
}

struct Inner {
    state: SessionState,
    /// Bumped on every start and end so stale background work is ignored.
    generation: u64,
    active: Option<ActiveSearch>,
    advance: Option<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        if inner.state != state {
            debug!("Session {} -> {}", inner.state.as_str(), state.as_str());
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }
}

/// One labeler working through one search at a time.
///
/// `start` resolves (or resumes) a search and begins prefetching. Once a
/// photo is downloaded the session is `Active` and `label` commits a
/// value for it, durably moving the search cursor past it in the same
/// transaction. The next head comes straight from the buffer when one is
/// ready, otherwise the session goes back to `Loading` until it is.
pub struct LabelingSession {
    progress: DieselProgressRepository,
    downloader: Arc<ImageDownloader>,
    config: LabelingConfig,
    /// Serializes start and end.
    control: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

impl LabelingSession {
    pub fn new(
        progress: DieselProgressRepository,
        downloader: Arc<ImageDownloader>,
        config: LabelingConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            progress,
            downloader,
            config,
            control: tokio::sync::Mutex::new(()),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    generation: 0,
                    active: None,
                    advance: None,
                }),
                state_tx,
            }),
        }
    }

    /// Wire up the Flickr source and the configured mirrors.
    pub fn from_settings(
        settings: &Settings,
        progress: DieselProgressRepository,
    ) -> LabelingResult<Self> {
        let source: Arc<dyn ImageSource> = Arc::new(FlickrClient::from_settings(settings)?);
        let (primary, backup) = mirrors_from_settings(settings)?;
        let downloader = ImageDownloader::new(
            source,
            primary,
            backup,
            settings.labeling.preferred_size.clone(),
        );
        Ok(Self::new(
            progress,
            Arc::new(downloader),
            settings.labeling.clone(),
        ))
    }

    pub fn config(&self) -> &LabelingConfig {
        &self.config
    }

    /// Begin labeling `raw_query`, resuming its cursor if it was seen before.
    ///
    /// Any running session is ended first. A page-size conflict with the
    /// stored search is reported before anything is torn down, so the
    /// current session keeps going.
    pub async fn start(&self, raw_query: &str, user_id: i64) -> LabelingResult<Search> {
        let query = normalize_query(raw_query);
        if query.is_empty() {
            return Err(LabelingError::InvalidSearch(raw_query.trim().to_string()));
        }

        let _control = self.control.lock().await;

        let search = self
            .progress
            .resolve_or_create_search(
                &query,
                self.config.page_size,
                self.config.recency_bound(Utc::now()),
            )
            .await?;

        self.end_locked();

        let stream = PhotoStream::new(self.downloader.source(), &search);
        let buffer = PrefetchBuffer::new(
            BufferConfig::from(&self.config),
            stream,
            self.downloader.clone(),
            self.progress.clone(),
            search.session_dir(),
        );

        {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.active = Some(ActiveSearch {
                search: search.clone(),
                user_id,
                buffer: buffer.clone(),
                head: None,
                committed: 0,
            });
            self.shared.set_state(&mut inner, SessionState::Loading);
            buffer.spawn_fill();
            self.spawn_advance(&mut inner);
        }

        info!(
            "Started search '{}' (id {}) at {} for user {}",
            search.query, search.id, search.cursor, user_id
        );
        Ok(search)
    }

    /// Wait in the background for the buffer's next candidate and make it the head.
    fn spawn_advance(&self, inner: &mut Inner) {
        let Some(ref active) = inner.active else {
            return;
        };
        let buffer = active.buffer.clone();
        let generation = inner.generation;
        let shared = self.shared.clone();

        if let Some(task) = inner.advance.take() {
            task.abort();
        }

        inner.advance = Some(tokio::spawn(async move {
            let head = buffer.pop_head().await;

            let mut inner = shared.lock();
            if inner.generation != generation {
                return;
            }
            match head {
                Some(candidate) => {
                    debug!("Head is now {} at {}", candidate.photo_id, candidate.position);
                    if let Some(ref mut active) = inner.active {
                        active.head = Some(candidate);
                    }
                    shared.set_state(&mut inner, SessionState::Active);
                }
                None => {
                    info!("No more photos for this search");
                    shared.set_state(&mut inner, SessionState::Exhausted);
                }
            }
        }));
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// The photo awaiting a label, if the session is `Active`.
    pub fn current_image(&self) -> Option<BufferedCandidate> {
        let inner = self.shared.lock();
        if inner.state != SessionState::Active {
            return None;
        }
        inner.active.as_ref().and_then(|active| active.head.clone())
    }

    /// Commit `value` for the current head and move on to the next photo.
    pub async fn label(&self, value: i64) -> LabelingResult<LabelOutcome> {
        let (generation, search, user_id, candidate) = {
            let mut inner = self.shared.lock();
            match inner.state {
                SessionState::Loading => return Err(LabelingError::Busy),
                SessionState::Idle | SessionState::Exhausted => {
                    return Err(LabelingError::NoActiveImage)
                }
                SessionState::Active => {}
            }

            let generation = inner.generation;
            let Some(ref mut active) = inner.active else {
                return Err(LabelingError::NoActiveImage);
            };
            let Some(candidate) = active.head.take() else {
                return Err(LabelingError::NoActiveImage);
            };
            let taken = (generation, active.search.clone(), active.user_id, candidate);
            self.shared.set_state(&mut inner, SessionState::Loading);
            taken
        };

        let committed = self
            .progress
            .commit_label(
                user_id,
                &candidate.photo_id,
                &candidate.remote_path,
                value,
                &search,
                candidate.position,
            )
            .await;

        let mut inner = self.shared.lock();
        let newly_labeled = match committed {
            Ok(newly_labeled) => newly_labeled,
            Err(e) => {
                if inner.generation == generation {
                    if let Some(ref mut active) = inner.active {
                        active.head = Some(candidate);
                    }
                    self.shared.set_state(&mut inner, SessionState::Active);
                }
                return Err(e.into());
            }
        };

        let outcome = LabelOutcome {
            cursor: candidate.position.advance(search.page_size),
            photo_id: candidate.photo_id,
            newly_labeled,
        };
        if inner.generation != generation {
            return Ok(outcome);
        }

        let next = match inner.active {
            Some(ref mut active) => {
                active.search.cursor = outcome.cursor;
                active.committed += 1;
                active.buffer.try_pop()
            }
            None => None,
        };
        match next {
            Some(candidate) => {
                if let Some(ref mut active) = inner.active {
                    active.head = Some(candidate);
                }
                self.shared.set_state(&mut inner, SessionState::Active);
            }
            None => self.spawn_advance(&mut inner),
        }

        Ok(outcome)
    }

    /// Stop the current session. Safe to call when nothing is running.
    pub async fn end(&self) {
        let _control = self.control.lock().await;
        self.end_locked();
    }

    fn end_locked(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(task) = inner.advance.take() {
            task.abort();
        }
        if let Some(active) = inner.active.take() {
            active.buffer.close();
            info!(
                "Ended search '{}' after {} labels",
                active.search.query, active.committed
            );
        }
        self.shared.set_state(&mut inner, SessionState::Idle);
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.shared.lock();
        let active = inner.active.as_ref();
        SessionStatus {
            state: inner.state,
            query: active.map(|a| a.search.query.clone()),
            search_id: active.map(|a| a.search.id),
            user_id: active.map(|a| a.user_id),
            head: match inner.state {
                SessionState::Active => active.and_then(|a| a.head.clone()),
                _ => None,
            },
            cursor: active.map(|a| a.search.cursor),
            labeled: active.map(|a| a.committed).unwrap_or(0),
            buffered: active.map(|a| a.buffer.len()).unwrap_or(0),
            last_error: active.and_then(|a| a.buffer.last_error()),
        }
    }

    /// Wait until the session is no longer `Loading` and return the new state.
    pub async fn wait_for_head(&self) -> SessionState {
        let mut rx = self.shared.state_tx.subscribe();
        let settled = rx
            .wait_for(|state| *state != SessionState::Loading)
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }
}

impl Drop for LabelingSession {
    fn drop(&mut self) {
        self.end_locked();
    }
}
