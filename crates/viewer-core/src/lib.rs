//! Viewport geometry for a single zoomable page.
//!
//! The page is drawn centered in the viewport and offset by a translate; all
//! functions here are pure and never produce non-finite values from finite
//! input.

mod animation;

pub use animation::{Clock, Frames, ManualClock, SystemClock, ZoomAnimation, DEFAULT_ZOOM_DURATION};

/// Scale a double tap zooms into from the fit scale.
pub const COMFORTABLE_ZOOM: f32 = 2.5;

pub const DEFAULT_MAXIMUM_ZOOM: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_positive(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        let rect = Rect::new(x, y, right - x, bottom - y);
        (!rect.is_empty()).then_some(rect)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }
}

/// Scale at which the whole page fits inside the viewport.
///
/// Returns `1.0` for degenerate input instead of propagating NaN or infinity.
pub fn fit_scale(viewport: Size, page: Size) -> f32 {
    if !viewport.is_positive() || !page.is_positive() {
        return 1.0;
    }

    let scale = (viewport.width / page.width).min(viewport.height / page.height);
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Viewport and page sizes the transform is interpreted against. Page sizes
/// are in page points, viewport sizes in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layout {
    pub viewport: Size,
    pub page: Size,
}

impl Layout {
    pub const fn new(viewport: Size, page: Size) -> Self {
        Self { viewport, page }
    }

    pub fn fit_scale(&self) -> f32 {
        fit_scale(self.viewport, self.page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
            min_scale: 1.0,
            max_scale: DEFAULT_MAXIMUM_ZOOM,
        }
    }
}

impl ViewportTransform {
    /// The reset transform: fit scale, no translate.
    pub fn fit(layout: Layout, maximum_zoom: f32) -> Self {
        let min_scale = layout.fit_scale();
        Self {
            scale: min_scale,
            translate_x: 0.0,
            translate_y: 0.0,
            min_scale,
            max_scale: effective_max(min_scale, maximum_zoom),
        }
    }

    /// Screen position of the page's top-left corner.
    pub fn content_origin(&self, layout: Layout) -> Point {
        let scaled = layout.page.scaled(self.scale);
        Point::new(
            (layout.viewport.width - scaled.width) / 2.0 + self.translate_x,
            (layout.viewport.height - scaled.height) / 2.0 + self.translate_y,
        )
    }

    pub fn screen_to_document(&self, layout: Layout, screen: Point) -> Point {
        let origin = self.content_origin(layout);
        let scale = safe_scale(self.scale);
        Point::new((screen.x - origin.x) / scale, (screen.y - origin.y) / scale)
    }

    pub fn document_to_screen(&self, layout: Layout, document: Point) -> Point {
        let origin = self.content_origin(layout);
        Point::new(origin.x + document.x * self.scale, origin.y + document.y * self.scale)
    }

    /// Part of the page currently inside the viewport, in page space.
    pub fn visible_document_rect(&self, layout: Layout) -> Option<Rect> {
        if !layout.viewport.is_positive() || !layout.page.is_positive() {
            return None;
        }

        let top_left = self.screen_to_document(layout, Point::new(0.0, 0.0));
        let bottom_right = self
            .screen_to_document(layout, Point::new(layout.viewport.width, layout.viewport.height));

        let visible = Rect::new(
            top_left.x,
            top_left.y,
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        );
        visible.intersection(&Rect::new(0.0, 0.0, layout.page.width, layout.page.height))
    }

    /// Pins each axis to zero when the content is narrower than the viewport,
    /// otherwise limits translate to the content overhang.
    pub fn clamp_translation(mut self, layout: Layout) -> Self {
        let scaled = layout.page.scaled(self.scale);
        self.translate_x = clamp_axis(self.translate_x, scaled.width, layout.viewport.width);
        self.translate_y = clamp_axis(self.translate_y, scaled.height, layout.viewport.height);
        self
    }

    /// Replaces the scale limits and pulls the scale and translate back inside them.
    pub fn with_scale_limits(mut self, layout: Layout, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = safe_scale(min_scale);
        self.max_scale = effective_max(self.min_scale, max_scale);
        self.scale = self.scale.clamp(self.min_scale, self.max_scale);
        self.clamp_translation(layout)
    }

    /// Scales by `scale_delta` around `focus`, keeping the page point under
    /// `focus` stationary. Returns `self` unchanged when the clamped scale
    /// does not move.
    pub fn apply_pinch(&self, layout: Layout, focus: Point, scale_delta: f32) -> Self {
        if !scale_delta.is_finite() || scale_delta <= 0.0 {
            return *self;
        }

        let scale = (self.scale * scale_delta).clamp(self.min_scale, self.max_scale);
        if scale == self.scale {
            return *self;
        }

        let anchor = self.screen_to_document(layout, focus);
        self.anchored_at(layout, scale, focus, anchor).clamp_translation(layout)
    }

    pub fn apply_pan(&self, layout: Layout, dx: f32, dy: f32) -> Self {
        let mut next = *self;
        if dx.is_finite() {
            next.translate_x += dx;
        }
        if dy.is_finite() {
            next.translate_y += dy;
        }
        next.clamp_translation(layout)
    }

    /// Scale a double tap should animate to: back to fit when zoomed in,
    /// otherwise the comfortable reading scale capped by the maximum.
    pub fn double_tap_target(&self) -> f32 {
        if self.scale > self.min_scale {
            self.min_scale
        } else {
            COMFORTABLE_ZOOM.min(self.max_scale).max(self.min_scale)
        }
    }

    pub fn is_at_minimum(&self) -> bool {
        self.scale <= self.min_scale
    }

    /// Transform at `scale` with `anchor` (page space) placed under `focus`
    /// (screen space). Not clamped.
    pub(crate) fn anchored_at(&self, layout: Layout, scale: f32, focus: Point, anchor: Point) -> Self {
        let scaled = layout.page.scaled(scale);
        let centered_x = (layout.viewport.width - scaled.width) / 2.0;
        let centered_y = (layout.viewport.height - scaled.height) / 2.0;

        Self {
            scale,
            translate_x: focus.x - centered_x - anchor.x * scale,
            translate_y: focus.y - centered_y - anchor.y * scale,
            ..*self
        }
    }
}

pub fn reset_zoom(layout: Layout, maximum_zoom: f32) -> ViewportTransform {
    ViewportTransform::fit(layout, maximum_zoom)
}

fn clamp_axis(translate: f32, content: f32, viewport: f32) -> f32 {
    let overhang = (content - viewport) / 2.0;
    if overhang <= 0.0 || !translate.is_finite() {
        0.0
    } else {
        translate.clamp(-overhang, overhang)
    }
}

fn safe_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn effective_max(min_scale: f32, maximum_zoom: f32) -> f32 {
    if maximum_zoom.is_finite() {
        maximum_zoom.max(min_scale)
    } else {
        DEFAULT_MAXIMUM_ZOOM.max(min_scale)
    }
}
