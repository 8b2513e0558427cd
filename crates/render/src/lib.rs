//! Tiled page rasterization.
//!
//! Pages are rasterized in fixed-size tiles at a level of detail chosen from
//! the current zoom. Only tiles covering the visible part of the page are
//! kept; bitmaps of released tiles are recycled through a bounded pool.

pub mod compose;
pub mod lod;
pub mod pool;
pub mod scheduler;
pub mod tile;

pub use compose::compose;
pub use lod::{RasterPolicy, MAX_RASTER_DIMENSION, TILE_SIZE};
pub use pool::{BufferPool, DEFAULT_POOL_CAPACITY};
pub use scheduler::{TileCompletion, TileJob, TilePlan, TileScheduler, TileStats};
pub use tile::{Tile, TileGrid, TileKey, TilePixels};
