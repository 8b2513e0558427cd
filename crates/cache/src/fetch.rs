//! HTTP downloads with percentage progress.

use crate::{CacheConfig, CacheError};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

const CHUNK_SIZE: usize = 64 * 1024;

/// One download to perform.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub headers: &'a BTreeMap<String, String>,
}

/// Transport used by [`crate::DocumentCache`] for remote sources.
pub trait Downloader: Send + Sync {
    /// Streams the response body into `sink`, returning the byte count.
    ///
    /// `progress` receives whole percentages, and only when the response
    /// declares its length.
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u8),
    ) -> Result<u64, CacheError>;
}

/// Blocking HTTP downloader backed by a shared `ureq` agent.
pub struct UreqDownloader {
    agent: ureq::Agent,
}

impl UreqDownloader {
    pub fn new(config: &CacheConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl Downloader for UreqDownloader {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u8),
    ) -> Result<u64, CacheError> {
        let mut call = self.agent.request(request.method, request.url);
        for (name, value) in request.headers {
            call = call.set(name, value);
        }

        let response = call.call().map_err(|err| match err {
            ureq::Error::Status(status, _) => {
                CacheError::Http { status, url: request.url.to_string() }
            }
            ureq::Error::Transport(transport) => CacheError::Network(transport.to_string()),
        })?;

        let total = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        log::debug!("downloading {} ({:?} bytes)", request.url, total);

        let mut reader = response.into_reader();
        copy_with_progress(&mut reader, sink, total, progress).map_err(CacheError::Io)
    }
}

/// Copies `reader` into `writer`, reporting `floor(written / total * 100)`
/// whenever the percentage changes. Nothing is reported for an unknown or
/// zero length.
pub fn copy_with_progress(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    total: Option<u64>,
    progress: &mut dyn FnMut(u8),
) -> io::Result<u64> {
    let total = total.filter(|total| *total > 0);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    let mut last_reported = None;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        written += read as u64;

        if let Some(total) = total {
            let percent = (written.saturating_mul(100) / total).min(100) as u8;
            if last_reported != Some(percent) {
                last_reported = Some(percent);
                progress(percent);
            }
        }
    }

    writer.flush()?;
    Ok(written)
}
