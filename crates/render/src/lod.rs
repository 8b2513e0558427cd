//! Raster resolution policy.
//!
//! A page is rasterized at a base scale of `device_pixel_density * base_multiplier`
//! pixels per point, reduced so the longer page side never exceeds
//! `max_dimension` pixels. Zooming picks a discrete level around that base;
//! level `n` rasterizes at `base * 2^n`. Zoom changes inside a level reuse the
//! tiles already rasterized for it.

use pdf_engine::PageSize;
use serde::{Deserialize, Serialize};

/// Default tile edge in pixels
pub const TILE_SIZE: u32 = 512;

/// Longest raster side at the base level
pub const MAX_RASTER_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterPolicy {
    pub device_pixel_density: f32,
    pub base_multiplier: f32,
    pub max_dimension: u32,
    pub tile_size: u32,
    /// Levels available below and including the base level.
    pub levels_of_detail: u32,
    /// Levels available above the base level.
    pub levels_of_detail_bias: u32,
    pub antialias: bool,
}

impl Default for RasterPolicy {
    fn default() -> Self {
        Self {
            device_pixel_density: 1.0,
            base_multiplier: 2.0,
            max_dimension: MAX_RASTER_DIMENSION,
            tile_size: TILE_SIZE,
            levels_of_detail: 2,
            levels_of_detail_bias: 8,
            antialias: true,
        }
    }
}

impl RasterPolicy {
    pub fn with_device_pixel_density(mut self, density: f32) -> Self {
        self.device_pixel_density = density;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_levels(mut self, levels_of_detail: u32, bias: u32) -> Self {
        self.levels_of_detail = levels_of_detail;
        self.levels_of_detail_bias = bias;
        self
    }

    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn effective_tile_size(&self) -> u32 {
        self.tile_size.max(16)
    }

    fn density(&self) -> f32 {
        positive_or(self.device_pixel_density, 1.0)
    }

    /// Pixels per point used for the base level of `page`.
    pub fn base_raster_scale(&self, page: PageSize) -> f32 {
        let natural = self.density() * positive_or(self.base_multiplier, 2.0);
        let longest = page.longest_side();
        if !(longest > 0.0 && longest.is_finite()) {
            return natural;
        }

        let ceiling = self.max_dimension.max(1) as f32;
        if longest * natural > ceiling {
            ceiling / longest
        } else {
            natural
        }
    }

    /// Page size in pixels at the base raster scale.
    pub fn page_pixel_size(&self, page: PageSize) -> (u32, u32) {
        pixel_size(page, self.base_raster_scale(page))
    }

    pub fn min_level(&self) -> i32 {
        1 - self.levels_of_detail.max(1) as i32
    }

    pub fn max_level(&self) -> i32 {
        self.levels_of_detail_bias.min(16) as i32
    }

    /// Sharpest level not finer than needed for `display_scale` screen units
    /// per point, clamped to the available range.
    pub fn level_for(&self, page: PageSize, display_scale: f32) -> i32 {
        let needed = display_scale * self.density();
        if !(needed > 0.0 && needed.is_finite()) {
            return 0;
        }

        let ratio = needed / self.base_raster_scale(page);
        let level = ratio.log2().ceil();
        if level.is_finite() {
            (level as i32).clamp(self.min_level(), self.max_level())
        } else {
            0
        }
    }

    pub fn level_scale(&self, page: PageSize, level: i32) -> f32 {
        self.base_raster_scale(page) * 2f32.powi(level)
    }
}

pub(crate) fn pixel_size(page: PageSize, scale: f32) -> (u32, u32) {
    let width = (page.width_pt * scale).round().max(1.0) as u32;
    let height = (page.height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value > 0.0 && value.is_finite() {
        value
    } else {
        fallback
    }
}
