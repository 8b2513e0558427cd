//! Cache configuration.
//!
//! Configuration can be loaded from a TOML file, environment variables, or
//! created programmatically.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXTENSION: &str = "pdf";

/// Configuration for the document cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding one file per cache key
    pub cache_dir: PathBuf,
    /// Extension (without dot) given to hashed entries and used by `clear_all`/`size`
    pub extension: String,
    /// User agent sent with downloads
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
            extension: DEFAULT_EXTENSION.to_string(),
            user_agent: format!("pdfview/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// On-disk form. Every key is optional; missing keys keep their defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cache_dir: Option<PathBuf>,
    extension: Option<String>,
    user_agent: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

impl CacheConfig {
    pub fn with_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/pdfview/documents
    /// - Linux: ~/.cache/pdfview/documents
    /// - Windows: %LOCALAPPDATA%\pdfview\documents
    pub fn default_cache_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("pdfview").join("documents")
        } else {
            PathBuf::from("cache/documents")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PDFVIEW_CACHE_DIR`: cache directory path
    /// - `PDFVIEW_CONNECT_TIMEOUT_SECS`: connect timeout in seconds (default: 15)
    /// - `PDFVIEW_READ_TIMEOUT_SECS`: read timeout in seconds (default: 60)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlays environment variables onto this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("PDFVIEW_CACHE_DIR") {
            self.cache_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("PDFVIEW_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout = parse_secs("PDFVIEW_CONNECT_TIMEOUT_SECS", &val)?;
        }

        if let Ok(val) = std::env::var("PDFVIEW_READ_TIMEOUT_SECS") {
            self.read_timeout = parse_secs("PDFVIEW_READ_TIMEOUT_SECS", &val)?;
        }

        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// cache_dir = "/path/to/cache"
    /// extension = "pdf"
    /// connect_timeout_secs = 15
    /// read_timeout_secs = 60
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let mut config = Self::default();

        if let Some(dir) = file.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(extension) = file.extension {
            if extension.is_empty() || extension.contains(['.', '/', '\\']) {
                return Err(ConfigError::InvalidValue("extension".to_string()));
            }
            config.extension = extension;
        }
        if let Some(user_agent) = file.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            cache_dir: Some(self.cache_dir.clone()),
            extension: Some(self.extension.clone()),
            user_agent: Some(self.user_agent.clone()),
            connect_timeout_secs: Some(self.connect_timeout.as_secs()),
            read_timeout_secs: Some(self.read_timeout.as_secs()),
        };
        Ok(toml::to_string(&file)?)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
