//! The PDF view controller.
//!
//! [`PdfView`] is what a host UI binds to. Property setters and gestures run
//! synchronously on the host thread and never block: document resolution,
//! opening, unlocking and tile rasterization are handed to an [`Executor`],
//! and their results come back over a channel that [`PdfView::pump`] drains.
//! Every result carries the stamp of the attempt that produced it, so work
//! for a source or page that has since changed is dropped on arrival.

use crate::config::ViewerConfig;
use crate::error::{FailureKind, ViewerError};
use crate::events::ViewerEvent;
use crate::session::{DocumentSession, PageDescriptor, SessionState};
use crate::unlock::{open_document, OpenedDocument, SharedEngine};
use image::Rgba;
use pdf_engine::{DocumentHandle, RgbaImage};
use pdfview_cache::{DocumentCache, PdfSource};
use pdfview_render::{compose, Tile, TileCompletion, TileJob, TileScheduler, TileStats};
use pdfview_scheduler::{Executor, Stamp, TaskPriority};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::Arc;
use std::time::Instant;
use viewer_core::{Clock, Layout, Point, Size, SystemClock, ViewportTransform, ZoomAnimation};

enum Completion {
    Progress { stamp: Stamp, percent: u8 },
    Unlocking { stamp: Stamp },
    Loaded { stamp: Stamp, result: Result<OpenedDocument, ViewerError> },
    Tile(TileCompletion),
    Abandoned(TileJob),
}

struct RunningZoom {
    animation: ZoomAnimation,
    started: Instant,
}

pub struct PdfView {
    config: ViewerConfig,
    engine: SharedEngine,
    cache: Arc<DocumentCache>,
    executor: Arc<dyn Executor>,
    clock: Box<dyn Clock + Send>,

    session: DocumentSession,
    tiles: TileScheduler,
    source: Option<PdfSource>,
    password: String,

    viewport: Size,
    transform: ViewportTransform,
    zoom: Option<RunningZoom>,

    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    events: Vec<ViewerEvent>,
}

impl std::fmt::Debug for PdfView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfView")
            .field("state", &self.session.state())
            .field("source", &self.source)
            .field("viewport", &self.viewport)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

impl PdfView {
    pub fn new(
        config: ViewerConfig,
        engine: SharedEngine,
        cache: Arc<DocumentCache>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        let tiles = TileScheduler::new(config.effective_raster_policy());
        let transform = ViewportTransform { max_scale: config.maximum_zoom, ..Default::default() };

        Self {
            config,
            engine,
            cache,
            executor,
            clock: Box::new(SystemClock),
            session: DocumentSession::new(),
            tiles,
            source: None,
            password: String::new(),
            viewport: Size::new(0.0, 0.0),
            transform,
            zoom: None,
            completions_tx,
            completions_rx,
            events: Vec::new(),
        }
    }

    /// Replaces the time source used by zoom animations.
    pub fn with_clock(mut self, clock: impl Clock + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // Properties

    /// Selects the document to show. Setting the current source again is a
    /// no-op; anything else abandons the current document and starts loading.
    pub fn set_source(&mut self, source: impl Into<PdfSource>) {
        let source = source.into();
        if self.source.as_ref() == Some(&source) {
            return;
        }
        self.source = Some(source);
        self.start_load();
    }

    /// Requested page, 0-based. Clamped to the document; remembered until a
    /// load completes when no document is ready yet.
    pub fn set_page(&mut self, page: u32) {
        let selection = self.session.select_page(&*self.engine, page);

        match selection {
            None => log::debug!("page {page} pending until the document is ready"),
            Some(Ok(selection)) => {
                self.show_page(selection.page);
                if selection.changed {
                    self.emit_page_loaded(selection.page);
                    self.events.push(ViewerEvent::PageChanged { page: selection.page.index });
                }
            }
            Some(Err(err)) => self.report_failure(err),
        }
    }

    pub fn set_maximum_zoom(&mut self, maximum_zoom: f32) {
        self.config.maximum_zoom = maximum_zoom;
        if let Some(layout) = self.layout() {
            self.transform =
                self.transform.with_scale_limits(layout, self.transform.min_scale, maximum_zoom);
            self.schedule_tiles();
        } else {
            self.transform.max_scale = maximum_zoom;
        }
    }

    /// Affects rasterization only; existing tiles are redrawn.
    pub fn set_enable_antialiasing(&mut self, enabled: bool) {
        self.config.enable_antialiasing = enabled;
        self.apply_raster_policy();
    }

    pub fn set_device_pixel_density(&mut self, density: f32) {
        self.config.device_pixel_density = density;
        self.apply_raster_policy();
    }

    /// Supplies the password for encrypted documents. A new password retries
    /// a load that is in progress or failed for want of a password.
    pub fn set_password(&mut self, password: impl Into<String>) {
        let password = password.into();
        if password == self.password {
            return;
        }
        self.password = password;

        let retry = matches!(
            self.session.state(),
            SessionState::Loading
                | SessionState::Unlocking
                | SessionState::Failed(FailureKind::PasswordRequired | FailureKind::InvalidPassword)
        );
        if retry && self.source.is_some() {
            self.start_load();
        }
    }

    /// Viewport size in screen units. Recomputes the fit scale; the current
    /// zoom is kept within the new limits.
    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        let previous = self.viewport;
        self.viewport = Size::new(width, height);

        let Some(layout) = self.layout() else {
            return;
        };

        self.zoom = None;
        self.transform = if previous.is_positive() {
            self.transform.with_scale_limits(layout, layout.fit_scale(), self.config.maximum_zoom)
        } else {
            ViewportTransform::fit(layout, self.config.maximum_zoom)
        };
        self.schedule_tiles();
    }

    // Gestures

    /// Zooms by `scale_delta` around `focus`. Returns whether the view moved.
    pub fn pinch(&mut self, focus: Point, scale_delta: f32) -> bool {
        let Some(layout) = self.layout() else {
            return false;
        };
        self.zoom = None;
        let next = self.transform.apply_pinch(layout, focus, scale_delta);
        self.update_transform(next)
    }

    pub fn pan(&mut self, dx: f32, dy: f32) -> bool {
        let Some(layout) = self.layout() else {
            return false;
        };
        self.zoom = None;
        let next = self.transform.apply_pan(layout, dx, dy);
        self.update_transform(next)
    }

    /// Starts an animated zoom toward the double-tap target around `point`.
    /// Frames are applied by [`tick`](Self::tick).
    pub fn double_tap(&mut self, point: Point) -> bool {
        let Some(layout) = self.layout() else {
            return false;
        };

        let target = self.transform.double_tap_target();
        let animation = ZoomAnimation::new(
            self.transform,
            layout,
            target,
            point,
            self.config.animation_duration(),
        );
        self.zoom = Some(RunningZoom { animation, started: self.clock.now() });
        true
    }

    /// Applies the current frame of a running zoom animation. Returns
    /// whether a frame was applied.
    pub fn tick(&mut self) -> bool {
        let Some(zoom) = &self.zoom else {
            return false;
        };

        let elapsed = self.clock.now().saturating_duration_since(zoom.started);
        let frame = zoom.animation.frame_at(elapsed);
        if zoom.animation.is_finished_at(elapsed) {
            self.zoom = None;
        }
        self.update_transform(frame);
        true
    }

    pub fn is_animating(&self) -> bool {
        self.zoom.is_some()
    }

    pub fn reset_zoom(&mut self) {
        if let Some(layout) = self.layout() {
            self.zoom = None;
            self.update_transform(viewer_core::reset_zoom(layout, self.config.maximum_zoom));
        }
    }

    // Navigation

    pub fn go_to_page(&mut self, page: u32) {
        self.set_page(page);
    }

    pub fn next_page(&mut self) -> bool {
        match (self.current_page(), self.page_count()) {
            (Some(current), Some(count)) if current + 1 < count => {
                self.set_page(current + 1);
                true
            }
            _ => false,
        }
    }

    pub fn previous_page(&mut self) -> bool {
        match self.current_page() {
            Some(current) if current > 0 => {
                self.set_page(current - 1);
                true
            }
            _ => false,
        }
    }

    // Completions and events

    /// Applies finished background work. Returns whether anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        let mut abandoned = false;
        while let Ok(completion) = self.completions_rx.try_recv() {
            match completion {
                Completion::Abandoned(job) => {
                    self.tiles.abandon(job);
                    abandoned = true;
                }
                completion => changed |= self.apply(completion),
            }
        }
        if abandoned {
            self.schedule_tiles();
        }
        changed
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Releases the document, its tiles and any decrypted copy. Work still
    /// in flight is discarded when it completes.
    pub fn close(&mut self) {
        self.zoom = None;
        self.tiles.reset();
        self.session.close(&*self.engine);
        self.source = None;
        // Completions already queued belong to the closed session.
        self.pump();
    }

    // Queries

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn source(&self) -> Option<&PdfSource> {
        self.source.as_ref()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> Option<u32> {
        self.session.page_count()
    }

    /// Page currently shown, 0-based.
    pub fn current_page(&self) -> Option<u32> {
        self.session.page().map(|page| page.index)
    }

    pub fn page(&self) -> Option<PageDescriptor> {
        self.session.page()
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    /// Viewport and page geometry, once both are known.
    pub fn layout(&self) -> Option<Layout> {
        let page = self.session.page()?;
        Some(Layout::new(self.viewport, Size::new(page.size.width_pt, page.size.height_pt)))
    }

    pub fn visible_tiles(&self) -> Vec<&Tile> {
        self.tiles.visible_tiles()
    }

    pub fn is_render_complete(&self) -> bool {
        self.session.is_ready() && self.tiles.is_complete()
    }

    pub fn tile_stats(&self) -> TileStats {
        self.tiles.stats()
    }

    pub fn decrypted_path(&self) -> Option<PathBuf> {
        self.session.decrypted_path().map(|path| path.to_path_buf())
    }

    /// Draws the visible tiles into a viewport-sized image.
    pub fn snapshot(&self, background: Rgba<u8>) -> Option<RgbaImage> {
        let layout = self.layout()?;
        layout
            .viewport
            .is_positive()
            .then(|| compose(self.tiles.visible_tiles(), &self.transform, layout, background))
    }

    // Internals

    fn start_load(&mut self) {
        self.zoom = None;
        self.tiles.reset();
        let stamp = self.session.begin_loading(&*self.engine);

        let source = match self.source.clone() {
            Some(source) if !source.is_empty() => source,
            _ => {
                let err = self.session.fail(ViewerError::EmptySource);
                self.report_failure(err);
                return;
            }
        };

        log::debug!("loading {}", source.uri);
        let task = LoadTask {
            stamp,
            source,
            password: self.password.clone(),
            temp_dir: self.config.temp_dir(),
            engine: Arc::clone(&self.engine),
            cache: Arc::clone(&self.cache),
            completions: self.completions_tx.clone(),
        };
        self.executor.spawn(TaskPriority::Load, Box::new(move || task.run()));
    }

    fn apply(&mut self, completion: Completion) -> bool {
        match completion {
            Completion::Progress { stamp, percent } => {
                let loading = self.session.state() == SessionState::Loading;
                if loading && stamp.matches(&self.session.stamp()) {
                    self.events.push(ViewerEvent::DownloadProgress { percent });
                    true
                } else {
                    false
                }
            }
            Completion::Unlocking { stamp } => self.session.mark_unlocking(&stamp),
            Completion::Loaded { stamp, result } => {
                let outcome = self.session.complete(&stamp, result, &*self.engine);
                match outcome {
                    None => false,
                    Some(Ok(ready)) => {
                        self.events.push(ViewerEvent::PageCount { count: ready.page_count });
                        self.show_page(ready.page);
                        self.emit_page_loaded(ready.page);
                        true
                    }
                    Some(Err(err)) => {
                        self.report_failure(err);
                        true
                    }
                }
            }
            Completion::Tile(tile) => self.tiles.accept(tile),
            Completion::Abandoned(job) => {
                self.tiles.abandon(job);
                false
            }
        }
    }

    fn show_page(&mut self, page: PageDescriptor) {
        self.zoom = None;
        self.tiles.set_page(page.index, page.size);
        if let Some(layout) = self.layout() {
            self.transform = ViewportTransform::fit(layout, self.config.maximum_zoom);
        }
        self.schedule_tiles();
    }

    fn emit_page_loaded(&mut self, page: PageDescriptor) {
        let (width, height) = self.tiles.policy().page_pixel_size(page.size);
        self.events.push(ViewerEvent::LoadComplete { page: page.index + 1, width, height });
    }

    fn report_failure(&mut self, err: ViewerError) {
        log::warn!("{err}");
        self.tiles.reset();
        if err.is_password_required() {
            self.events.push(ViewerEvent::PasswordRequired);
        }
        self.events.push(ViewerEvent::Error { message: err.message() });
    }

    fn update_transform(&mut self, next: ViewportTransform) -> bool {
        if next == self.transform {
            return false;
        }
        self.transform = next;
        self.schedule_tiles();
        true
    }

    fn apply_raster_policy(&mut self) {
        self.tiles.set_policy(self.config.effective_raster_policy());
        self.schedule_tiles();
    }

    fn schedule_tiles(&mut self) {
        let Some(handle) = self.session.handle() else {
            return;
        };
        if !self.session.is_ready() || !self.viewport.is_positive() {
            return;
        }

        let plan = self.tiles.plan(&self.transform, self.viewport);
        for job in plan.jobs {
            let task = TileTask {
                job: Some(job),
                engine: Arc::clone(&self.engine),
                handle,
                completions: self.completions_tx.clone(),
            };
            self.executor.spawn(TaskPriority::Visible, Box::new(move || task.run()));
        }
    }
}

/// Rasterizes one tile off the host thread. A task dropped by its executor
/// without running hands the job back so the tile is no longer in flight.
struct TileTask {
    job: Option<TileJob>,
    engine: SharedEngine,
    handle: DocumentHandle,
    completions: Sender<Completion>,
}

impl TileTask {
    fn run(mut self) {
        if let Some(job) = self.job.take() {
            let completion = job.rasterize(&*self.engine, self.handle);
            // The view may be gone; the bitmap is simply dropped.
            let _ = self.completions.send(Completion::Tile(completion));
        }
    }
}

impl Drop for TileTask {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            let _ = self.completions.send(Completion::Abandoned(job));
        }
    }
}

impl Drop for PdfView {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve, open and unlock one source off the host thread.
struct LoadTask {
    stamp: Stamp,
    source: PdfSource,
    password: String,
    temp_dir: PathBuf,
    engine: SharedEngine,
    cache: Arc<DocumentCache>,
    completions: Sender<Completion>,
}

impl LoadTask {
    fn run(self) {
        if !self.stamp.is_current() {
            return;
        }

        let path = {
            let completions = &self.completions;
            let stamp = &self.stamp;
            let mut progress = |percent: u8| {
                let _ = completions.send(Completion::Progress { stamp: stamp.clone(), percent });
            };
            self.cache.resolve_with_progress(&self.source, &mut progress)
        };

        let result = match path {
            Err(err) => Err(ViewerError::DownloadFailed(err)),
            Ok(_) if !self.stamp.is_current() => return,
            Ok(path) => {
                let mut unlocking = || {
                    let _ = self.completions.send(Completion::Unlocking { stamp: self.stamp.clone() });
                };
                let password = (!self.password.is_empty()).then_some(self.password.as_str());
                open_document(&self.engine, &path, password, &self.temp_dir, &mut unlocking)
            }
        };

        let loaded = Completion::Loaded { stamp: self.stamp, result };
        if let Err(SendError(Completion::Loaded { result: Ok(opened), .. })) =
            self.completions.send(loaded)
        {
            // Nobody is listening anymore; do not leak the handle.
            if let Err(err) = self.engine.close(opened.handle) {
                log::warn!("closing orphaned document failed: {err}");
            }
        }
    }
}
