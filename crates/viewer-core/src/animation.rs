use crate::{Layout, Point, ViewportTransform};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_ZOOM_DURATION: Duration = Duration::from_millis(250);

/// Time source for animations. Frames are pulled by the caller; nothing
/// here sleeps or spawns.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset_nanos: Arc::new(AtomicU64::new(0)) }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Interpolated zoom from a start transform to a target scale.
///
/// The animation is a pure function of elapsed time, so it can be sampled
/// any number of times and restarted by asking for fresh [`Frames`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomAnimation {
    start: ViewportTransform,
    target_scale: f32,
    focus: Point,
    anchor: Point,
    layout: Layout,
    duration: Duration,
}

impl ZoomAnimation {
    pub fn new(
        start: ViewportTransform,
        layout: Layout,
        target_scale: f32,
        focus: Point,
        duration: Duration,
    ) -> Self {
        let target_scale = if target_scale.is_finite() {
            target_scale.clamp(start.min_scale, start.max_scale)
        } else {
            start.scale
        };

        Self {
            start,
            target_scale,
            focus,
            anchor: start.screen_to_document(layout, focus),
            layout,
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target_scale(&self) -> f32 {
        self.target_scale
    }

    pub fn is_finished_at(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }

    pub fn frame_at(&self, elapsed: Duration) -> ViewportTransform {
        let fraction = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        };
        let eased = accelerate_decelerate(fraction);
        let scale = self.start.scale + (self.target_scale - self.start.scale) * eased;

        let frame = if self.target_scale <= self.start.min_scale {
            // Zooming out to fit: translation follows the same eased fraction
            // back to center instead of tracking the focus.
            ViewportTransform {
                scale,
                translate_x: self.start.translate_x * (1.0 - eased),
                translate_y: self.start.translate_y * (1.0 - eased),
                ..self.start
            }
        } else {
            self.start.anchored_at(self.layout, scale, self.focus, self.anchor)
        };

        frame.clamp_translation(self.layout)
    }

    pub fn final_frame(&self) -> ViewportTransform {
        self.frame_at(self.duration)
    }

    /// Frames sampled from `clock`, starting now. Ends after the frame at or
    /// past the duration.
    pub fn frames<C: Clock>(&self, clock: C) -> Frames<C> {
        let started = clock.now();
        Frames { animation: *self, clock, started, done: false }
    }
}

/// Cosine ease: starts and ends slowly, half way at half time.
fn accelerate_decelerate(fraction: f32) -> f32 {
    if fraction <= 0.0 {
        0.0
    } else if fraction >= 1.0 {
        1.0
    } else {
        ((fraction + 1.0) * PI).cos() / 2.0 + 0.5
    }
}

pub struct Frames<C> {
    animation: ZoomAnimation,
    clock: C,
    started: Instant,
    done: bool,
}

impl<C: Clock> Frames<C> {
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }
}

impl<C: Clock> Iterator for Frames<C> {
    type Item = ViewportTransform;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let elapsed = self.elapsed();
        self.done = self.animation.is_finished_at(elapsed);
        Some(self.animation.frame_at(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size;

    fn layout() -> Layout {
        Layout::new(Size::new(1000.0, 1000.0), Size::new(500.0, 1000.0))
    }

    #[test]
    fn frames_interpolate_to_target() {
        let layout = layout();
        let start = ViewportTransform::fit(layout, 5.0);
        let animation =
            ZoomAnimation::new(start, layout, 2.5, Point::new(500.0, 500.0), DEFAULT_ZOOM_DURATION);

        assert_eq!(animation.frame_at(Duration::ZERO).scale, start.scale);
        let middle = animation.frame_at(Duration::from_millis(125)).scale;
        assert!((middle - 1.75).abs() < 1e-3);
        assert_eq!(animation.final_frame().scale, 2.5);
    }

    #[test]
    fn progress_starts_and_ends_slowly() {
        let layout = layout();
        let start = ViewportTransform::fit(layout, 5.0);
        let animation =
            ZoomAnimation::new(start, layout, 3.0, Point::new(500.0, 500.0), DEFAULT_ZOOM_DURATION);
        let progress = |ms| (animation.frame_at(Duration::from_millis(ms)).scale - 1.0) / 2.0;

        assert!(progress(25) < 0.1);
        assert!(progress(225) > 0.9);
        assert!((progress(125) - 0.5).abs() < 1e-3);
        assert!((progress(50) + progress(200) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn zoom_out_translation_follows_scale_progress() {
        let layout = layout();
        let zoomed = ViewportTransform::fit(layout, 5.0)
            .apply_pinch(layout, Point::new(900.0, 900.0), 3.0);
        let animation = ZoomAnimation::new(
            zoomed,
            layout,
            zoomed.min_scale,
            Point::new(900.0, 900.0),
            DEFAULT_ZOOM_DURATION,
        );

        let frame = animation.frame_at(Duration::from_millis(50));
        let progress = (zoomed.scale - frame.scale) / (zoomed.scale - zoomed.min_scale);
        let expected_y = zoomed.translate_y * (1.0 - progress);
        assert!(progress > 0.0 && progress < 0.5);
        assert!((frame.translate_y - expected_y).abs() < 1e-2, "{} vs {expected_y}", frame.translate_y);
    }

    #[test]
    fn zoom_in_keeps_focus_anchored_each_frame() {
        let layout = layout();
        let start = ViewportTransform::fit(layout, 5.0);
        let focus = Point::new(500.0, 500.0);
        let anchor = start.screen_to_document(layout, focus);
        let animation = ZoomAnimation::new(start, layout, 2.5, focus, DEFAULT_ZOOM_DURATION);

        for ms in [0, 50, 100, 200, 250] {
            let frame = animation.frame_at(Duration::from_millis(ms));
            assert!(frame.document_to_screen(layout, anchor).distance_to(focus) < 1e-3);
        }
    }

    #[test]
    fn zoom_out_to_minimum_recenters() {
        let layout = layout();
        let zoomed = ViewportTransform::fit(layout, 5.0)
            .apply_pinch(layout, Point::new(900.0, 900.0), 3.0);
        assert!(zoomed.translate_y != 0.0);

        let animation = ZoomAnimation::new(
            zoomed,
            layout,
            zoomed.min_scale,
            Point::new(900.0, 900.0),
            DEFAULT_ZOOM_DURATION,
        );
        let end = animation.final_frame();

        assert_eq!(end.scale, zoomed.min_scale);
        assert_eq!((end.translate_x, end.translate_y), (0.0, 0.0));
    }

    #[test]
    fn manual_clock_drives_frames_and_restarts() {
        let layout = layout();
        let start = ViewportTransform::fit(layout, 5.0);
        let animation =
            ZoomAnimation::new(start, layout, 2.0, Point::new(500.0, 500.0), DEFAULT_ZOOM_DURATION);
        let clock = ManualClock::new();

        let mut frames = animation.frames(&clock);
        assert_eq!(frames.next().map(|f| f.scale), Some(1.0));
        clock.advance(Duration::from_millis(300));
        assert_eq!(frames.next().map(|f| f.scale), Some(2.0));
        assert!(frames.next().is_none());

        let mut restarted = animation.frames(&clock);
        assert_eq!(restarted.next().map(|f| f.scale), Some(1.0));
    }

    #[test]
    fn target_is_clamped_to_scale_limits() {
        let layout = layout();
        let start = ViewportTransform::fit(layout, 2.0);
        let animation =
            ZoomAnimation::new(start, layout, 9.0, Point::new(0.0, 0.0), Duration::ZERO);

        assert_eq!(animation.target_scale(), 2.0);
        assert_eq!(animation.frame_at(Duration::ZERO).scale, 2.0);
    }
}
