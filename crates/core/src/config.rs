//! View configuration.

use pdfview_render::RasterPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use viewer_core::{DEFAULT_MAXIMUM_ZOOM, DEFAULT_ZOOM_DURATION};

/// Settings for a [`crate::PdfView`].
///
/// Loadable from TOML; every key is optional.
///
/// ```toml
/// maximum_zoom = 4.0
/// enable_antialiasing = false
///
/// [raster]
/// levels_of_detail = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Absolute upper bound on the zoom scale. Never below the fit scale.
    pub maximum_zoom: f32,

    pub enable_antialiasing: bool,

    /// Screen pixels per layout unit.
    pub device_pixel_density: f32,

    /// Tile and level-of-detail settings.
    pub raster: RasterPolicy,

    /// Length of double-tap zoom animations.
    pub animation_duration_ms: u64,

    /// Directory for decrypted copies of password-protected documents.
    /// The system temp directory when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            maximum_zoom: DEFAULT_MAXIMUM_ZOOM,
            enable_antialiasing: true,
            device_pixel_density: 1.0,
            raster: RasterPolicy::default(),
            animation_duration_ms: DEFAULT_ZOOM_DURATION.as_millis() as u64,
            temp_dir: None,
        }
    }
}

impl ViewerConfig {
    pub fn with_maximum_zoom(mut self, maximum_zoom: f32) -> Self {
        self.maximum_zoom = maximum_zoom;
        self
    }

    pub fn with_antialiasing(mut self, enabled: bool) -> Self {
        self.enable_antialiasing = enabled;
        self
    }

    pub fn with_device_pixel_density(mut self, density: f32) -> Self {
        self.device_pixel_density = density;
        self
    }

    pub fn with_raster_policy(mut self, raster: RasterPolicy) -> Self {
        self.raster = raster;
        self
    }

    pub fn with_animation_duration(mut self, duration: Duration) -> Self {
        self.animation_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_temp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Raster policy with the view-level density and antialiasing applied.
    pub fn effective_raster_policy(&self) -> RasterPolicy {
        self.raster
            .with_device_pixel_density(self.device_pixel_density)
            .with_antialias(self.enable_antialiasing)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml(&contents)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}
