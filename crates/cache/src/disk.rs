//! On-disk document cache.
//!
//! Remote documents are stored as one file per cache key inside the cache
//! directory. Downloads stream into a temporary file next to the final entry
//! and are renamed into place on success, so a reader never observes a
//! partial document. Writers to the same key are serialized.

use crate::fetch::{Downloader, FetchRequest, UreqDownloader};
use crate::{CacheConfig, CacheError, PdfSource};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

const PARTIAL_SUFFIX: &str = ".part";

/// Counters for monitoring cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resolutions served from a fresh cached copy
    pub hits: u64,
    /// Resolutions that needed a download
    pub misses: u64,
    /// Bytes written by successful downloads
    pub bytes_downloaded: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Resolves document sources to local files, downloading remote ones.
pub struct DocumentCache {
    config: CacheConfig,
    downloader: Arc<dyn Downloader>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<CacheStats>,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("cache_dir", &self.config.cache_dir)
            .field("stats", &self.stats())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentCache {
    /// Cache using the blocking HTTP downloader.
    pub fn new(config: CacheConfig) -> Self {
        let downloader = Arc::new(UreqDownloader::new(&config));
        Self::with_downloader(config, downloader)
    }

    pub fn with_downloader(config: CacheConfig, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            config,
            downloader,
            key_locks: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    /// Path the cached copy of `source` lives at, whether or not it exists.
    pub fn cached_path(&self, source: &PdfSource) -> Result<PathBuf, CacheError> {
        Ok(self.config.cache_dir.join(source.cache_key(&self.config.extension)?))
    }

    /// Whether a cached copy exists and has not outlived its expiration.
    pub fn is_fresh(&self, source: &PdfSource) -> bool {
        match self.cached_path(source) {
            Ok(path) => entry_is_fresh(&path, source.max_age(), SystemTime::now()),
            Err(_) => false,
        }
    }

    /// Local path for `source`, downloading it first when needed.
    pub fn resolve(&self, source: &PdfSource) -> Result<PathBuf, CacheError> {
        self.resolve_with_progress(source, &mut |_| {})
    }

    /// Like [`resolve`](Self::resolve), reporting download percentages.
    ///
    /// Local sources are returned as-is. A remote source is served from the
    /// cache when caching is enabled and the copy is fresh; otherwise it is
    /// downloaded and replaces any existing entry.
    pub fn resolve_with_progress(
        &self,
        source: &PdfSource,
        progress: &mut dyn FnMut(u8),
    ) -> Result<PathBuf, CacheError> {
        if source.is_empty() {
            return Err(CacheError::InvalidSource);
        }
        if !source.is_remote() {
            return Ok(source.local_path());
        }

        let key = source.cache_key(&self.config.extension)?;
        let path = self.config.cache_dir.join(&key);

        if source.cache && entry_is_fresh(&path, source.max_age(), SystemTime::now()) {
            lock(&self.stats).hits += 1;
            log::debug!("cache hit for {} at {}", source.uri, path.display());
            return Ok(path);
        }

        let key_lock = self.key_lock(&key);
        let result = {
            let _writer = lock(&key_lock);

            // Another writer may have finished while this one waited.
            if source.cache && entry_is_fresh(&path, source.max_age(), SystemTime::now()) {
                lock(&self.stats).hits += 1;
                Ok(path)
            } else {
                lock(&self.stats).misses += 1;
                self.download(source, &path, progress).map(|_| path)
            }
        };

        self.release_key_lock(&key, key_lock);
        result
    }

    fn download(
        &self,
        source: &PdfSource,
        path: &Path,
        progress: &mut dyn FnMut(u8),
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.config.cache_dir)?;

        let mut partial = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.config.cache_dir)?;

        let request =
            FetchRequest { url: &source.uri, method: &source.method, headers: &source.headers };

        log::info!("downloading {} into {}", source.uri, path.display());
        let bytes = match self.downloader.fetch(&request, partial.as_file_mut(), progress) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("download of {} failed: {}", source.uri, err);
                return Err(err);
            }
        };

        partial.as_file_mut().flush()?;
        partial.as_file().sync_all()?;
        partial.persist(path).map_err(|err| CacheError::Io(err.error))?;

        lock(&self.stats).bytes_downloaded += bytes;
        log::info!("cached {} bytes for {}", bytes, source.uri);
        Ok(())
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.key_locks).entry(key.to_string()).or_default())
    }

    fn release_key_lock(&self, key: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = lock(&self.key_locks);
        drop(key_lock);
        // Clones are only taken and dropped under the map lock.
        if locks.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(key);
        }
    }

    /// Removes the cached copy of `source`. Returns whether a file was removed.
    pub fn clear(&self, source: &PdfSource) -> Result<bool, CacheError> {
        let path = self.cached_path(source)?;
        remove_if_present(&path)
    }

    /// Removes every cache entry with the configured extension.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entries()? {
            if remove_if_present(&path)? {
                removed += 1;
            }
        }
        log::info!("cleared {} cached documents from {}", removed, self.cache_dir().display());
        Ok(removed)
    }

    /// Total bytes of entries with the configured extension.
    pub fn size(&self) -> Result<u64, CacheError> {
        let mut total = 0;
        for path in self.entries()? {
            match fs::metadata(&path) {
                Ok(meta) => total += meta.len(),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(total)
    }

    /// Deletes temporary download files older than `older_than`, left behind
    /// by interrupted processes.
    pub fn sweep_partials(&self, older_than: Duration) -> Result<usize, CacheError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for path in self.files()? {
            let is_partial = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
            if !is_partial {
                continue;
            }

            let age = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= older_than && remove_if_present(&path)? {
                log::debug!("removed stale partial download {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entries(&self) -> Result<Vec<PathBuf>, CacheError> {
        let extension = self.config.extension.as_str();
        Ok(self
            .files()?
            .into_iter()
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(extension))
            .collect())
    }

    fn files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let dir = match fs::read_dir(&self.config.cache_dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        for entry in dir {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}

fn entry_is_fresh(path: &Path, max_age: Option<u64>, now: SystemTime) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    match max_age {
        None => true,
        Some(secs) => match meta.modified() {
            Ok(modified) => {
                // A modification time in the future counts as age zero.
                let age = now.duration_since(modified).unwrap_or_default();
                age < Duration::from_secs(secs)
            }
            Err(_) => false,
        },
    }
}

fn remove_if_present(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
