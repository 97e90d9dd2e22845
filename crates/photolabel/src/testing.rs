//! In-memory fakes of the image source and file mirror ports.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::source::{DownloadLink, ImageSource, SearchQuery, SourceError, SourceResult};
use crate::storage::{validate_logical_path, FileMirror, StorageError, StorageResult};

/// Paged search results held in memory.
///
/// Pages past the last configured one are empty. Downloads can be made
/// to fail a set number of times per photo, or held until released.
pub struct FakeSource {
    pages: Mutex<Vec<Vec<String>>>,
    download_failures: Mutex<HashMap<String, usize>>,
    search_failures: Mutex<usize>,
    hold: watch::Sender<bool>,
    searched: Mutex<Vec<u32>>,
    downloaded: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(pages: &[&[&str]]) -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            pages: Mutex::new(
                pages
                    .iter()
                    .map(|page| page.iter().map(|id| id.to_string()).collect())
                    .collect(),
            ),
            download_failures: Mutex::new(HashMap::new()),
            search_failures: Mutex::new(0),
            hold,
            searched: Mutex::new(Vec::new()),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `times` downloads of `photo_id` fail.
    pub fn fail_downloads(&self, photo_id: &str, times: usize) {
        self.download_failures
            .lock()
            .unwrap()
            .insert(photo_id.to_string(), times);
    }

    /// Make the next `times` searches fail.
    pub fn fail_searches(&self, times: usize) {
        *self.search_failures.lock().unwrap() = times;
    }

    /// Block downloads until [`release_downloads`](Self::release_downloads).
    pub fn hold_downloads(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_downloads(&self) {
        self.hold.send_replace(false);
    }

    /// Page indices requested so far, in order.
    pub fn searched_pages(&self) -> Vec<u32> {
        self.searched.lock().unwrap().clone()
    }

    /// Photo ids successfully downloaded so far, in order.
    pub fn downloaded(&self) -> Vec<String> {
        self.downloaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSource for FakeSource {
    async fn search(&self, _query: &SearchQuery, page_idx: u32) -> SourceResult<Vec<String>> {
        {
            let mut failures = self.search_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SourceError::Unavailable("injected search failure".to_string()));
            }
        }
        self.searched.lock().unwrap().push(page_idx);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(page_idx as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_download_link(
        &self,
        photo_id: &str,
        preferred_size: &str,
    ) -> SourceResult<DownloadLink> {
        Ok(DownloadLink {
            url: format!("fake://{}", photo_id),
            size_label: preferred_size.to_string(),
        })
    }

    async fn download(&self, link: &DownloadLink) -> SourceResult<Vec<u8>> {
        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|hold| !*hold).await;

        let photo_id = link.url.trim_start_matches("fake://").to_string();
        {
            let mut failures = self.download_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&photo_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::Unavailable(format!(
                        "injected download failure for {}",
                        photo_id
                    )));
                }
            }
        }
        self.downloaded.lock().unwrap().push(photo_id.clone());
        Ok(format!("image-{}", photo_id).into_bytes())
    }
}

/// Mirror that keeps blobs in a map. Can be switched to fail every write.
pub struct MemoryMirror {
    name: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<bool>,
}

impl MemoryMirror {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Logical paths stored so far, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl FileMirror for MemoryMirror {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, data: &[u8], logical_path: &str) -> StorageResult<String> {
        validate_logical_path(logical_path)?;
        if *self.failing.lock().unwrap() {
            return Err(StorageError::Remote {
                status: 503,
                path: logical_path.to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(logical_path.to_string(), data.to_vec());
        Ok(format!("mem://{}/{}", self.name, logical_path))
    }

    async fn retrieve(&self, logical_path: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(logical_path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(logical_path.to_string()))
    }
}
