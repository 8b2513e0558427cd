//! Demand-driven tile scheduling.
//!
//! [`TileScheduler::plan`] turns the current transform into the set of tiles
//! the viewport needs. Tiles that are still needed are kept, everything else
//! goes back to the buffer pool right away, and the missing tiles come back
//! as [`TileJob`]s. A job can run anywhere; its [`TileCompletion`] is handed
//! back through [`TileScheduler::accept`], which drops it if the page or
//! policy changed meanwhile or if the tile is no longer wanted.

use crate::lod::RasterPolicy;
use crate::pool::BufferPool;
use crate::tile::{Tile, TileGrid, TileKey};
use pdf_engine::{DocumentHandle, PageSize, PdfEngine, RenderRequest, RgbaImage};
use pdfview_scheduler::{Generation, Stamp};
use std::collections::{HashMap, HashSet};
use viewer_core::{Layout, Rect, Size, ViewportTransform};

/// One tile waiting to be rasterized. Owns its target bitmap.
#[derive(Debug)]
pub struct TileJob {
    pub key: TileKey,
    pub stamp: Stamp,
    pub request: RenderRequest,
    pub document_rect: Rect,
    buffer: RgbaImage,
}

impl TileJob {
    /// Rasterizes the tile. The engine is only borrowed for this call.
    pub fn rasterize<E: PdfEngine + ?Sized>(
        mut self,
        engine: &E,
        handle: DocumentHandle,
    ) -> TileCompletion {
        let error = if self.stamp.is_current() {
            engine.render_into(handle, self.request, &mut self.buffer).err().map(|err| err.to_string())
        } else {
            None
        };

        TileCompletion {
            key: self.key,
            stamp: self.stamp,
            document_rect: self.document_rect,
            raster_scale: self.request.scale,
            image: self.buffer,
            error,
        }
    }
}

#[derive(Debug)]
pub struct TileCompletion {
    pub key: TileKey,
    pub stamp: Stamp,
    pub document_rect: Rect,
    pub raster_scale: f32,
    pub image: RgbaImage,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct TilePlan {
    pub level: i32,
    pub required: Vec<TileKey>,
    pub jobs: Vec<TileJob>,
}

impl TilePlan {
    fn empty() -> Self {
        Self { level: 0, required: Vec::new(), jobs: Vec::new() }
    }

    pub fn is_settled(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileStats {
    pub resident: usize,
    pub in_flight: usize,
    pub rasterized: u64,
    pub failed: u64,
    pub discarded: u64,
    pub released: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PageTarget {
    index: u32,
    size: PageSize,
}

pub struct TileScheduler {
    policy: RasterPolicy,
    generation: Generation,
    page: Option<PageTarget>,
    level: i32,
    tiles: HashMap<TileKey, Tile>,
    required: HashSet<TileKey>,
    in_flight: HashSet<TileKey>,
    pool: BufferPool,
    warned_generation: Option<u64>,
    stats: TileStats,
}

impl TileScheduler {
    pub fn new(policy: RasterPolicy) -> Self {
        Self::with_pool(policy, BufferPool::default())
    }

    pub fn with_pool(policy: RasterPolicy, pool: BufferPool) -> Self {
        Self {
            policy,
            generation: Generation::new(),
            page: None,
            level: 0,
            tiles: HashMap::new(),
            required: HashSet::new(),
            in_flight: HashSet::new(),
            pool,
            warned_generation: None,
            stats: TileStats::default(),
        }
    }

    pub fn policy(&self) -> &RasterPolicy {
        &self.policy
    }

    /// Replaces the raster policy. Existing tiles are dropped when it changes.
    pub fn set_policy(&mut self, policy: RasterPolicy) {
        if policy != self.policy {
            self.policy = policy;
            self.clear();
        }
    }

    /// Points the scheduler at a page. Switching pages drops every tile.
    pub fn set_page(&mut self, page_index: u32, size: PageSize) {
        let target = PageTarget { index: page_index, size };
        if self.page != Some(target) {
            self.clear();
            self.page = Some(target);
        }
    }

    pub fn page_index(&self) -> Option<u32> {
        self.page.map(|page| page.index)
    }

    /// Releases every tile and invalidates outstanding jobs.
    pub fn clear(&mut self) {
        self.generation.advance();
        for (_, tile) in self.tiles.drain() {
            self.stats.released += 1;
            self.pool.release(tile.image);
        }
        self.required.clear();
        self.in_flight.clear();
    }

    /// Forgets the current page as well as its tiles.
    pub fn reset(&mut self) {
        self.clear();
        self.page = None;
    }

    pub fn plan(&mut self, transform: &ViewportTransform, viewport: Size) -> TilePlan {
        let Some(page) = self.page else {
            return TilePlan::empty();
        };

        let layout = Layout::new(viewport, Size::new(page.size.width_pt, page.size.height_pt));
        let level = self.policy.level_for(page.size, transform.scale);
        let grid = TileGrid::new(&self.policy, page.size, level);
        self.level = level;

        let mut required = Vec::new();
        if let Some((cols, rows)) =
            transform.visible_document_rect(layout).and_then(|visible| grid.covering(visible))
        {
            for row in rows {
                for col in cols.clone() {
                    required.push(TileKey::new(page.index, level, col, row));
                }
            }
        }

        self.required = required.iter().copied().collect();

        let stale: Vec<TileKey> =
            self.tiles.keys().filter(|key| !self.required.contains(key)).copied().collect();
        for key in stale {
            if let Some(tile) = self.tiles.remove(&key) {
                self.stats.released += 1;
                self.pool.release(tile.image);
            }
        }

        let stamp = self.generation.stamp();
        let mut jobs = Vec::new();
        for key in &required {
            if self.tiles.contains_key(key) || self.in_flight.contains(key) {
                continue;
            }
            let (Some(pixels), Some(document_rect), Some(clip)) = (
                grid.tile_pixels(key.col, key.row),
                grid.document_rect(key.col, key.row),
                grid.clip_rect(key.col, key.row),
            ) else {
                continue;
            };

            self.in_flight.insert(*key);
            jobs.push(TileJob {
                key: *key,
                stamp: stamp.clone(),
                request: RenderRequest {
                    page_index: page.index,
                    scale: grid.raster_scale,
                    clip: Some(clip),
                    antialias: self.policy.antialias,
                },
                document_rect,
                buffer: self.pool.acquire(pixels.width, pixels.height),
            });
        }

        TilePlan { level, required, jobs }
    }

    /// Stores a finished tile. Returns `false` when the completion was stale
    /// and its bitmap went back to the pool.
    pub fn accept(&mut self, completion: TileCompletion) -> bool {
        let TileCompletion { key, stamp, document_rect, raster_scale, mut image, error } = completion;

        let current = stamp.is_current() && stamp.matches(&self.generation.stamp());
        if current {
            self.in_flight.remove(&key);
        }

        if !current || !self.required.contains(&key) || self.tiles.contains_key(&key) {
            self.stats.discarded += 1;
            self.pool.release(image);
            return false;
        }

        let blank = error.is_some();
        if let Some(error) = error {
            self.stats.failed += 1;
            image.pixels_mut().for_each(|pixel| *pixel = pdf_engine::PAPER);
            if self.warned_generation != Some(stamp.value()) {
                self.warned_generation = Some(stamp.value());
                log::warn!(
                    "rasterizing page {} failed, showing blank tiles: {error}",
                    key.page_index
                );
            }
        } else {
            self.stats.rasterized += 1;
        }

        self.tiles.insert(key, Tile { key, document_rect, raster_scale, image, blank });
        true
    }

    /// Gives up on a job that was never run, so the tile is planned again.
    /// Jobs from an earlier generation only return their bitmap.
    pub fn abandon(&mut self, job: TileJob) {
        if job.stamp.matches(&self.generation.stamp()) {
            self.in_flight.remove(&job.key);
        }
        self.pool.release(job.buffer);
    }

    /// Runs a plan's jobs on the calling thread. Returns how many tiles were stored.
    pub fn rasterize_now<E: PdfEngine + ?Sized>(
        &mut self,
        engine: &E,
        handle: DocumentHandle,
        plan: TilePlan,
    ) -> usize {
        plan.jobs
            .into_iter()
            .map(|job| job.rasterize(engine, handle))
            .fold(0, |stored, completion| stored + usize::from(self.accept(completion)))
    }

    /// Tiles for the current required set, in row-major order.
    pub fn visible_tiles(&self) -> Vec<&Tile> {
        let mut tiles: Vec<&Tile> =
            self.required.iter().filter_map(|key| self.tiles.get(key)).collect();
        tiles.sort_by_key(|tile| (tile.key.row, tile.key.col));
        tiles
    }

    pub fn is_complete(&self) -> bool {
        self.required.iter().all(|key| self.tiles.contains_key(key))
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn stats(&self) -> TileStats {
        TileStats { resident: self.tiles.len(), in_flight: self.in_flight.len(), ..self.stats }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
