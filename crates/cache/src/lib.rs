//! Document cache for remote PDF sources.
//!
//! Resolves a [`PdfSource`] to a local file. Remote documents are downloaded
//! once into a cache directory keyed by an explicit file name or the md5 of
//! the URI, and reused until they expire.

pub mod config;
pub mod disk;
pub mod fetch;
pub mod source;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{CacheConfig, ConfigError};
pub use disk::{CacheStats, DocumentCache};
pub use fetch::{copy_with_progress, Downloader, FetchRequest, UreqDownloader};
pub use source::PdfSource;

use std::io;

/// Errors from resolving or maintaining cached documents.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid PDF source")]
    InvalidSource,
    #[error("invalid cache file name: {0:?}")]
    InvalidFileName(String),
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
