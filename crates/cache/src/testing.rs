//! Scripted downloaders for tests.

use crate::fetch::{copy_with_progress, Downloader, FetchRequest};
use crate::CacheError;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves the same body for every request and counts calls.
#[derive(Debug)]
pub struct StaticDownloader {
    body: Vec<u8>,
    delay: Duration,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl StaticDownloader {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body, delay: Duration::ZERO, calls: AtomicUsize::new(0), urls: Mutex::new(Vec::new()) }
    }

    /// Sleeps before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }
}

impl Downloader for StaticDownloader {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u8),
    ) -> Result<u64, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(request.url.to_string());
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut reader = Cursor::new(self.body.as_slice());
        copy_with_progress(&mut reader, sink, Some(self.body.len() as u64), progress)
            .map_err(CacheError::Io)
    }
}

/// Writes some bytes and then fails like a dropped connection.
#[derive(Debug)]
pub struct FailingDownloader {
    bytes_before_failure: usize,
    calls: AtomicUsize,
}

impl FailingDownloader {
    pub fn after_bytes(bytes_before_failure: usize) -> Self {
        Self { bytes_before_failure, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Downloader for FailingDownloader {
    fn fetch(
        &self,
        _request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u8),
    ) -> Result<u64, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sink.write_all(&vec![0u8; self.bytes_before_failure])?;
        progress(10);
        Err(CacheError::Network("connection reset".to_string()))
    }
}
