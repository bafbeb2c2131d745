//! Surface lifecycle
//!
//! Owns the camera, the render backend and the frame clock. The platform
//! layer feeds it visibility, resize and animation-frame timestamps; the
//! manager decides whether a frame runs and calls the [`FrameHooks`] around
//! each draw.
//!
//! ```text
//! Uninitialized --visible--> Running <--visible/foreground-- Paused
//!                               |----hidden/offscreen------->|
//! any --dispose--> Disposed (terminal)
//! ```

pub mod camera;
pub mod debounce;

pub use camera::Camera;
pub use debounce::Debouncer;

use crate::config::{SizeMode, SurfaceOptions};
use crate::consts::RESIZE_DEBOUNCE_MS;
use crate::renderer::{InstanceSet, RenderBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Running,
    Paused,
    Disposed,
}

/// Surface dimensions and the world extents visible through the camera
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
    pub world_width: f32,
    pub world_height: f32,
    pub ratio: f32,
    pub pixel_ratio: f32,
}

impl SurfaceSize {
    /// Backing-store size in physical pixels
    pub fn physical(&self) -> (u32, u32) {
        let w = (self.width * self.pixel_ratio).round().max(1.0) as u32;
        let h = (self.height * self.pixel_ratio).round().max(1.0) as u32;
        (w, h)
    }

    /// Physical size scaled down uniformly so neither side exceeds `max_dimension`
    pub fn physical_within(&self, max_dimension: u32) -> (u32, u32) {
        let (w, h) = self.physical();
        fit_extent(w, h, max_dimension)
    }
}

/// Shrink `width` x `height` to fit a square texture limit, keeping the aspect ratio
pub fn fit_extent(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width.max(1), height.max(1));
    }
    let fit = |v: u32| ((v as u64 * max_dimension as u64 / longest as u64) as u32).clamp(1, max_dimension);
    (fit(width), fit(height))
}

/// Frame timing in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameState {
    pub elapsed: f32,
    pub delta: f32,
}

/// What the host reports about the mount point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostMetrics {
    pub width: f32,
    pub height: f32,
    pub device_pixel_ratio: f32,
}

/// Synchronous callbacks the manager drives
pub trait FrameHooks {
    fn before_render(&mut self, frame: &FrameState);
    fn after_render(&mut self, _frame: &FrameState) {}
    fn after_resize(&mut self, size: &SurfaceSize);
    /// What to draw this frame
    fn scene(&self) -> Option<&InstanceSet>;
}

pub struct SurfaceManager<B: RenderBackend> {
    pub camera: Camera,
    options: SurfaceOptions,
    size: SurfaceSize,
    backend: Option<B>,
    lifecycle: Lifecycle,
    intersecting: bool,
    document_hidden: bool,
    last_tick_ms: Option<f64>,
    frame: FrameState,
    debouncer: Debouncer,
    resizing: bool,
    resize_count: u64,
}

impl<B: RenderBackend> SurfaceManager<B> {
    pub fn new(options: SurfaceOptions, backend: B) -> Self {
        Self {
            camera: Camera::new(&options),
            options,
            size: SurfaceSize::default(),
            backend: Some(backend),
            lifecycle: Lifecycle::Uninitialized,
            intersecting: false,
            document_hidden: false,
            last_tick_ms: None,
            frame: FrameState::default(),
            debouncer: Debouncer::new(RESIZE_DEBOUNCE_MS),
            resizing: false,
            resize_count: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }

    pub fn size(&self) -> &SurfaceSize {
        &self.size
    }

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    /// Completed resize recomputes
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Intersection with the viewport changed.
    ///
    /// Returns true when the frame loop has to be (re)scheduled.
    pub fn set_intersecting(&mut self, intersecting: bool, now_ms: f64) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.intersecting = intersecting;
        if intersecting && !self.document_hidden {
            self.start(now_ms)
        } else {
            self.stop();
            false
        }
    }

    /// Document visibility changed. Only matters while on screen.
    pub fn set_document_hidden(&mut self, hidden: bool, now_ms: f64) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.document_hidden = hidden;
        if !self.intersecting {
            return false;
        }
        if hidden {
            self.stop();
            false
        } else {
            self.start(now_ms)
        }
    }

    fn start(&mut self, now_ms: f64) -> bool {
        if self.is_running() {
            return false;
        }
        self.lifecycle = Lifecycle::Running;
        self.last_tick_ms = Some(now_ms);
        log::info!("Ballpit surface running");
        true
    }

    fn stop(&mut self) {
        if self.is_running() {
            self.lifecycle = Lifecycle::Paused;
            self.last_tick_ms = None;
            log::info!("Ballpit surface paused");
        }
    }

    /// Run one frame if running. Returns the frame timing when the loop
    /// should continue, `None` when it should stop.
    pub fn tick<H: FrameHooks>(&mut self, now_ms: f64, hooks: &mut H) -> Option<FrameState> {
        if !self.is_running() {
            return None;
        }
        let delta = self
            .last_tick_ms
            .map_or(0.0, |last| ((now_ms - last) / 1000.0).max(0.0)) as f32;
        self.last_tick_ms = Some(now_ms);
        self.frame.delta = delta;
        self.frame.elapsed += delta;
        let frame = self.frame;

        hooks.before_render(&frame);
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.draw(&self.camera, hooks.scene()) {
                log::warn!("Render error: {:?}", e);
            }
        }
        hooks.after_render(&frame);
        Some(frame)
    }

    /// Note a resize signal; the recompute happens in [`Self::flush_resize`]
    /// once the debounce window has passed. Returns the deadline.
    pub fn request_resize(&mut self, now_ms: f64) -> Option<f64> {
        if self.is_disposed() {
            return None;
        }
        Some(self.debouncer.signal(now_ms))
    }

    /// Recompute if a debounced resize is due. Stale timers are no-ops.
    pub fn flush_resize<H: FrameHooks>(
        &mut self,
        now_ms: f64,
        metrics: HostMetrics,
        hooks: &mut H,
    ) -> bool {
        if self.is_disposed() || self.resizing || !self.debouncer.ready(now_ms) {
            return false;
        }
        self.resize(metrics, hooks)
    }

    /// Recompute sizes immediately
    pub fn resize<H: FrameHooks>(&mut self, metrics: HostMetrics, hooks: &mut H) -> bool {
        if self.is_disposed() || self.resizing {
            return false;
        }
        let (width, height) = match self.options.size {
            SizeMode::Fixed { width, height } => (width, height),
            SizeMode::Parent | SizeMode::Window => (metrics.width, metrics.height),
        };
        if !(width > 0.0 && height > 0.0) {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return false;
        }
        self.resizing = true;

        self.size.width = width;
        self.size.height = height;
        self.size.ratio = width / height;
        self.camera.set_aspect(self.size.ratio);
        let world = self.camera.world_size();
        self.size.world_width = world.x;
        self.size.world_height = world.y;
        self.size.pixel_ratio = self.clamp_pixel_ratio(metrics.device_pixel_ratio);

        if let Some(backend) = self.backend.as_mut() {
            backend.resize(&self.size);
        }
        hooks.after_resize(&self.size);

        self.resize_count += 1;
        self.resizing = false;
        log::debug!(
            "Resized to {}x{} (world {:.2}x{:.2}, fov {:.1}, dpr {})",
            width,
            height,
            world.x,
            world.y,
            self.camera.fov,
            self.size.pixel_ratio
        );
        true
    }

    fn clamp_pixel_ratio(&self, ratio: f32) -> f32 {
        match (self.options.min_pixel_ratio, self.options.max_pixel_ratio) {
            (_, Some(max)) if ratio > max => max,
            (Some(min), _) if ratio < min => min,
            _ => ratio,
        }
    }

    /// Stop the loop and release the backend. Returns false if already
    /// disposed, so callers detach their listeners exactly once.
    pub fn dispose(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.stop();
        self.debouncer.cancel();
        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
        self.lifecycle = Lifecycle::Disposed;
        log::info!("Ballpit surface disposed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NullBackend;

    #[derive(Default)]
    struct Hooks {
        before: u32,
        after: u32,
        resizes: Vec<SurfaceSize>,
        deltas: Vec<f32>,
    }

    impl FrameHooks for Hooks {
        fn before_render(&mut self, frame: &FrameState) {
            self.before += 1;
            self.deltas.push(frame.delta);
        }
        fn after_render(&mut self, _frame: &FrameState) {
            self.after += 1;
        }
        fn after_resize(&mut self, size: &SurfaceSize) {
            self.resizes.push(*size);
        }
        fn scene(&self) -> Option<&InstanceSet> {
            None
        }
    }

    fn metrics(width: f32, height: f32) -> HostMetrics {
        HostMetrics {
            width,
            height,
            device_pixel_ratio: 2.0,
        }
    }

    fn manager() -> SurfaceManager<NullBackend> {
        SurfaceManager::new(SurfaceOptions::default(), NullBackend::default())
    }

    #[test]
    fn test_starts_uninitialized_and_idle() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        assert_eq!(m.lifecycle(), Lifecycle::Uninitialized);
        assert!(m.tick(0.0, &mut hooks).is_none());
        assert_eq!(hooks.before, 0);
    }

    #[test]
    fn test_visibility_transitions() {
        let mut m = manager();
        assert!(m.set_intersecting(true, 0.0));
        assert_eq!(m.lifecycle(), Lifecycle::Running);
        // Already running: nothing to schedule
        assert!(!m.set_intersecting(true, 5.0));

        assert!(!m.set_document_hidden(true, 10.0));
        assert_eq!(m.lifecycle(), Lifecycle::Paused);
        assert!(m.set_document_hidden(false, 20.0));
        assert_eq!(m.lifecycle(), Lifecycle::Running);

        m.set_intersecting(false, 30.0);
        assert_eq!(m.lifecycle(), Lifecycle::Paused);
        // Foregrounding while offscreen stays paused
        assert!(!m.set_document_hidden(false, 40.0));
        assert_eq!(m.lifecycle(), Lifecycle::Paused);
    }

    #[test]
    fn test_hidden_document_blocks_start() {
        let mut m = manager();
        m.set_document_hidden(true, 0.0);
        assert!(!m.set_intersecting(true, 0.0));
        assert_eq!(m.lifecycle(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_tick_timing_and_hooks() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        m.set_intersecting(true, 1000.0);

        let f1 = m.tick(1016.0, &mut hooks).unwrap();
        let f2 = m.tick(1048.0, &mut hooks).unwrap();
        assert!((f1.delta - 0.016).abs() < 1e-6);
        assert!((f2.delta - 0.032).abs() < 1e-6);
        assert!((f2.elapsed - 0.048).abs() < 1e-6);
        assert_eq!((hooks.before, hooks.after), (2, 2));
        assert_eq!(m.backend().unwrap().draws, 2);
    }

    #[test]
    fn test_pause_excludes_hidden_time() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        m.set_intersecting(true, 0.0);
        m.tick(16.0, &mut hooks);
        m.set_intersecting(false, 20.0);
        assert!(m.tick(5000.0, &mut hooks).is_none());
        m.set_intersecting(true, 10_000.0);
        let frame = m.tick(10_016.0, &mut hooks).unwrap();
        assert!((frame.delta - 0.016).abs() < 1e-6);
        assert!((frame.elapsed - 0.032).abs() < 1e-6);
    }

    #[test]
    fn test_resize_debounce_collapses_burst() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        for i in 0..10 {
            let t = i as f64 * 9.0;
            m.request_resize(t);
            // Each signal's own timer fires 100ms later
            m.flush_resize(t, metrics(800.0, 600.0), &mut hooks);
        }
        for i in 0..10 {
            m.flush_resize(i as f64 * 9.0 + 100.0, metrics(800.0, 600.0), &mut hooks);
        }
        assert_eq!(m.resize_count(), 1);
        assert_eq!(hooks.resizes.len(), 1);
        assert_eq!(m.backend().unwrap().resizes, 1);
    }

    #[test]
    fn test_resize_computes_world_extents() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        assert!(m.resize(metrics(800.0, 800.0), &mut hooks));
        let size = *m.size();
        assert_eq!(size.ratio, 1.0);
        let expected = 2.0 * (25.0f32).to_radians().tan() * 20.0;
        assert!((size.world_height - expected).abs() < 1e-4);
        assert!((size.world_width - expected).abs() < 1e-4);
        assert_eq!(size.pixel_ratio, 2.0);
        assert_eq!(size.physical(), (1600, 1600));
        assert_eq!(hooks.resizes[0], size);
    }

    #[test]
    fn test_hidpi_backing_store_fits_texture_limit() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        m.resize(metrics(1440.0, 900.0), &mut hooks);
        assert_eq!(m.size().physical(), (2880, 1800));

        let (w, h) = m.size().physical_within(2048);
        assert!(w <= 2048 && h <= 2048);
        assert_eq!((w, h), (2048, 1280));

        // Small surfaces are untouched
        assert_eq!(fit_extent(800, 600, 2048), (800, 600));
        assert_eq!(fit_extent(0, 0, 2048), (1, 1));
        assert_eq!(fit_extent(100, 5000, 2048), (40, 2048));
    }

    #[test]
    fn test_wide_resize_corrects_fov() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        m.resize(metrics(3000.0, 1000.0), &mut hooks);
        assert!(m.camera.fov < 50.0);
        m.resize(metrics(1000.0, 1000.0), &mut hooks);
        assert_eq!(m.camera.fov, 50.0);
    }

    #[test]
    fn test_pixel_ratio_clamped() {
        let mut m = SurfaceManager::new(
            SurfaceOptions {
                min_pixel_ratio: Some(1.0),
                max_pixel_ratio: Some(1.5),
                ..Default::default()
            },
            NullBackend::default(),
        );
        let mut hooks = Hooks::default();
        m.resize(metrics(100.0, 100.0), &mut hooks);
        assert_eq!(m.size().pixel_ratio, 1.5);
        m.resize(
            HostMetrics {
                device_pixel_ratio: 0.5,
                ..metrics(100.0, 100.0)
            },
            &mut hooks,
        );
        assert_eq!(m.size().pixel_ratio, 1.0);
    }

    #[test]
    fn test_fixed_size_ignores_host() {
        let mut m = SurfaceManager::new(
            SurfaceOptions {
                size: SizeMode::Fixed {
                    width: 300.0,
                    height: 150.0,
                },
                ..Default::default()
            },
            NullBackend::default(),
        );
        let mut hooks = Hooks::default();
        m.resize(metrics(1920.0, 1080.0), &mut hooks);
        assert_eq!((m.size().width, m.size().height), (300.0, 150.0));
    }

    #[test]
    fn test_zero_size_is_ignored() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        assert!(!m.resize(metrics(0.0, 600.0), &mut hooks));
        assert_eq!(m.resize_count(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent_and_terminal() {
        let mut m = manager();
        let mut hooks = Hooks::default();
        m.set_intersecting(true, 0.0);
        m.request_resize(0.0);

        assert!(m.dispose());
        assert!(!m.dispose());
        assert_eq!(m.lifecycle(), Lifecycle::Disposed);
        assert!(m.backend().is_none());

        // Late observer callbacks are no-ops
        assert!(!m.set_intersecting(true, 10.0));
        assert!(!m.set_document_hidden(false, 10.0));
        assert!(m.request_resize(20.0).is_none());
        assert!(!m.flush_resize(200.0, metrics(10.0, 10.0), &mut hooks));
        assert!(!m.resize(metrics(10.0, 10.0), &mut hooks));
        assert!(m.tick(30.0, &mut hooks).is_none());
        assert_eq!(hooks.before, 0);
    }
}
