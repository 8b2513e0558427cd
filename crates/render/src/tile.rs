//! Tile geometry
//!
//! Divides a page raster at a given level into fixed-size tiles. Edge tiles
//! are clipped to the page, so they may be smaller than the tile size.

use crate::lod::{pixel_size, RasterPolicy};
use pdf_engine::{ClipRect, PageSize, RgbaImage};
use viewer_core::Rect;

/// Tile identity within one document session.
///
/// (col, row) = (0, 0) is the top-left tile of the page at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub page_index: u32,
    pub level: i32,
    pub col: u32,
    pub row: u32,
}

impl TileKey {
    pub fn new(page_index: u32, level: i32, col: u32, row: u32) -> Self {
        Self { page_index, level, col, row }
    }
}

/// Rasterized tile owned by the tile scheduler.
#[derive(Debug, Clone)]
pub struct Tile {
    pub key: TileKey,
    /// Area of the page this tile covers, in page points.
    pub document_rect: Rect,
    /// Pixels per point of `image`.
    pub raster_scale: f32,
    pub image: RgbaImage,
    /// Set when rasterization failed and the tile holds background only.
    pub blank: bool,
}

impl Tile {
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_opaque(&self) -> bool {
        self.image.pixels().all(|pixel| pixel.0[3] == 255)
    }
}

/// Pixel position and size of a tile inside the level raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePixels {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Tile layout of one page at one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub level: i32,
    pub raster_scale: f32,
    pub raster_width: u32,
    pub raster_height: u32,
    pub tile_size: u32,
    pub columns: u32,
    pub rows: u32,
}

impl TileGrid {
    pub fn new(policy: &RasterPolicy, page: PageSize, level: i32) -> Self {
        let raster_scale = policy.level_scale(page, level);
        let (raster_width, raster_height) = pixel_size(page, raster_scale);
        let tile_size = policy.effective_tile_size();

        Self {
            level,
            raster_scale,
            raster_width,
            raster_height,
            tile_size,
            columns: raster_width.div_ceil(tile_size),
            rows: raster_height.div_ceil(tile_size),
        }
    }

    pub fn tile_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }

    pub fn tile_pixels(&self, col: u32, row: u32) -> Option<TilePixels> {
        if col >= self.columns || row >= self.rows {
            return None;
        }

        let x = col * self.tile_size;
        let y = row * self.tile_size;
        Some(TilePixels {
            x,
            y,
            width: self.tile_size.min(self.raster_width - x),
            height: self.tile_size.min(self.raster_height - y),
        })
    }

    pub fn document_rect(&self, col: u32, row: u32) -> Option<Rect> {
        let pixels = self.tile_pixels(col, row)?;
        Some(Rect::new(
            pixels.x as f32 / self.raster_scale,
            pixels.y as f32 / self.raster_scale,
            pixels.width as f32 / self.raster_scale,
            pixels.height as f32 / self.raster_scale,
        ))
    }

    pub fn clip_rect(&self, col: u32, row: u32) -> Option<ClipRect> {
        self.document_rect(col, row)
            .map(|rect| ClipRect::new(rect.x, rect.y, rect.width, rect.height))
    }

    /// Column and row ranges of the tiles intersecting `rect` (page points).
    pub fn covering(&self, rect: Rect) -> Option<(std::ops::Range<u32>, std::ops::Range<u32>)> {
        if rect.is_empty() || self.columns == 0 || self.rows == 0 {
            return None;
        }

        let span = self.tile_size as f32 / self.raster_scale;
        let first_col = (rect.x / span).floor().max(0.0) as u32;
        let first_row = (rect.y / span).floor().max(0.0) as u32;
        let end_col = ((rect.right() / span).ceil().max(0.0) as u32).min(self.columns);
        let end_row = ((rect.bottom() / span).ceil().max(0.0) as u32).min(self.rows);

        (first_col < end_col && first_row < end_row)
            .then_some((first_col..end_col, first_row..end_row))
    }
}
