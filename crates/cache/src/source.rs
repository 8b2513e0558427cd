//! Document source descriptors.

use crate::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where a document comes from and how its cached copy is treated.
///
/// Deserializes from either a bare string (`"https://…/file.pdf"`) or a
/// structured object with the optional keys below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceRepr", rename_all = "camelCase")]
pub struct PdfSource {
    pub uri: String,
    /// Reuse an existing cached copy when fresh.
    pub cache: bool,
    /// Explicit cache file name instead of the hashed URI.
    pub cache_file_name: Option<String>,
    /// Seconds a cached copy stays fresh after download. `None` or zero never expires.
    pub expiration: Option<u64>,
    pub method: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceRepr {
    Uri(String),
    #[serde(rename_all = "camelCase")]
    Full {
        uri: String,
        #[serde(default = "default_cache")]
        cache: bool,
        #[serde(default, alias = "cache_file_name")]
        cache_file_name: Option<String>,
        #[serde(default)]
        expiration: Option<u64>,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

fn default_cache() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

impl From<SourceRepr> for PdfSource {
    fn from(repr: SourceRepr) -> Self {
        match repr {
            SourceRepr::Uri(uri) => PdfSource::new(uri),
            SourceRepr::Full { uri, cache, cache_file_name, expiration, method, headers } => {
                PdfSource { uri, cache, cache_file_name, expiration, method, headers }
            }
        }
    }
}

impl From<&str> for PdfSource {
    fn from(uri: &str) -> Self {
        PdfSource::new(uri)
    }
}

impl From<String> for PdfSource {
    fn from(uri: String) -> Self {
        PdfSource::new(uri)
    }
}

impl PdfSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cache: true,
            cache_file_name: None,
            expiration: None,
            method: default_method(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_file_name(mut self, name: impl Into<String>) -> Self {
        self.cache_file_name = Some(name.into());
        self
    }

    pub fn with_expiration(mut self, seconds: u64) -> Self {
        self.expiration = Some(seconds);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.uri.trim().is_empty()
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.uri.trim_start().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Filesystem path of a local source, without any `file://` prefix.
    pub fn local_path(&self) -> PathBuf {
        let uri = self.uri.trim();
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }

    /// Seconds the cached copy stays fresh, if it expires at all.
    pub fn max_age(&self) -> Option<u64> {
        self.expiration.filter(|secs| *secs > 0)
    }

    /// Cache file name: the explicit override, or the md5 of the URI with
    /// `extension` appended.
    pub fn cache_key(&self, extension: &str) -> Result<String, CacheError> {
        match &self.cache_file_name {
            Some(name) => {
                let valid = !name.is_empty()
                    && name != "."
                    && name != ".."
                    && !name.contains(['/', '\\']);
                if valid {
                    Ok(name.clone())
                } else {
                    Err(CacheError::InvalidFileName(name.clone()))
                }
            }
            None => Ok(format!("{:x}.{extension}", md5::compute(self.uri.as_bytes()))),
        }
    }
}
