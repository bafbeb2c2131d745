//! The ballpit: physics, instances and the surface that drives them

use std::cell::RefCell;
use std::rc::Weak;

use glam::Vec2;

use crate::config::{BallpitConfig, ConfigError, SurfaceOptions};
use crate::interaction::{InteractionTarget, PointerState, Rect};
use crate::renderer::{InstanceSet, RenderBackend, RenderError};
use crate::sim::Physics;
use crate::surface::{FrameHooks, FrameState, HostMetrics, Lifecycle, SurfaceManager, SurfaceSize};

/// Top-level mount errors
#[derive(Debug, thiserror::Error)]
pub enum BallpitError {
    #[error("Canvas not found: {0}")]
    MissingCanvas(String),
    #[error("No drawable surface: {0}")]
    MissingSurface(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Simulation plus its drawable instance batch
#[derive(Debug, Clone)]
pub struct Ballpit {
    pub physics: Physics,
    pub instances: InstanceSet,
    pub paused: bool,
    seed: u64,
    generation: u64,
}

impl Ballpit {
    pub fn new(config: BallpitConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, seed, 0))
    }

    fn build(config: BallpitConfig, seed: u64, generation: u64) -> Self {
        let instances = InstanceSet::new(&config, generation);
        let physics = Physics::new(config, seed.wrapping_add(generation));
        let mut ballpit = Self {
            physics,
            instances,
            paused: false,
            seed,
            generation,
        };
        ballpit.instances.update(&ballpit.physics);
        ballpit
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &BallpitConfig {
        &self.physics.config
    }

    /// Flip the paused flag; returns the new value
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        log::info!("Ballpit {}", if self.paused { "paused" } else { "resumed" });
        self.paused
    }

    /// Rebuild with a new body count from the live config.
    ///
    /// Extents tracked from the viewport and the pointer flags carry over.
    pub fn set_count(&mut self, count: usize) -> Result<(), ConfigError> {
        let config = BallpitConfig {
            count,
            ..self.physics.config.clone()
        };
        config.validate()?;
        let paused = self.paused;
        let center = self.physics.center;
        *self = Self::build(config, self.seed, self.generation + 1);
        self.paused = paused;
        self.physics.center = center;
        log::info!("Ballpit re-seeded with {} spheres", count);
        Ok(())
    }
}

impl FrameHooks for Ballpit {
    fn before_render(&mut self, frame: &FrameState) {
        if self.paused {
            return;
        }
        self.physics.update(frame.delta);
        self.instances.update(&self.physics);
    }

    fn after_resize(&mut self, size: &SurfaceSize) {
        self.physics.config.max_x = size.world_width / 2.0;
        self.physics.config.max_y = size.world_height / 2.0;
    }

    fn scene(&self) -> Option<&InstanceSet> {
        Some(&self.instances)
    }
}

/// A mounted ballpit: lifecycle manager plus the simulation it drives
pub struct BallpitSurface<B: RenderBackend> {
    pub manager: SurfaceManager<B>,
    pub ballpit: Ballpit,
}

impl<B: RenderBackend> BallpitSurface<B> {
    pub fn new(config: BallpitConfig, options: SurfaceOptions, backend: B) -> Result<Self, BallpitError> {
        let seed = options.seed.unwrap_or_default();
        let ballpit = Ballpit::new(config, seed)?;
        log::info!("Ballpit mounted with {} spheres", ballpit.physics.len());
        Ok(Self {
            manager: SurfaceManager::new(options, backend),
            ballpit,
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.manager.lifecycle()
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.ballpit.toggle_pause()
    }

    pub fn set_count(&mut self, count: usize) -> Result<(), BallpitError> {
        if self.manager.is_disposed() {
            return Ok(());
        }
        self.ballpit.set_count(count)?;
        Ok(())
    }

    /// Returns false if already disposed
    pub fn dispose(&mut self) -> bool {
        self.manager.dispose()
    }

    /// Steer the attractor to where the pointer ray meets the view plane
    pub fn point_at_ndc(&mut self, ndc: Vec2) {
        if self.manager.is_disposed() {
            return;
        }
        if let Some(hit) = self.manager.camera.intersect_view_plane(ndc) {
            self.ballpit.physics.set_target(hit);
        }
    }

    pub fn release_pointer(&mut self) {
        self.ballpit.physics.release_target();
    }

    pub fn set_intersecting(&mut self, intersecting: bool, now_ms: f64) -> bool {
        self.manager.set_intersecting(intersecting, now_ms)
    }

    pub fn set_document_hidden(&mut self, hidden: bool, now_ms: f64) -> bool {
        self.manager.set_document_hidden(hidden, now_ms)
    }

    pub fn tick(&mut self, now_ms: f64) -> Option<FrameState> {
        self.manager.tick(now_ms, &mut self.ballpit)
    }

    pub fn request_resize(&mut self, now_ms: f64) -> Option<f64> {
        self.manager.request_resize(now_ms)
    }

    pub fn flush_resize(&mut self, now_ms: f64, metrics: HostMetrics) -> bool {
        self.manager.flush_resize(now_ms, metrics, &mut self.ballpit)
    }

    pub fn resize(&mut self, metrics: HostMetrics) -> bool {
        self.manager.resize(metrics, &mut self.ballpit)
    }
}

/// Registry target that routes pointer input into a mounted ballpit
pub struct BallpitPointer<B: RenderBackend> {
    surface: Weak<RefCell<BallpitSurface<B>>>,
    rect: Box<dyn Fn() -> Rect>,
}

impl<B: RenderBackend> BallpitPointer<B> {
    pub fn new(surface: Weak<RefCell<BallpitSurface<B>>>, rect: impl Fn() -> Rect + 'static) -> Self {
        Self {
            surface,
            rect: Box::new(rect),
        }
    }

    fn with_surface(&self, f: impl FnOnce(&mut BallpitSurface<B>)) {
        let Some(surface) = self.surface.upgrade() else {
            return;
        };
        // Skip rather than re-enter a surface that is mid-frame
        if let Ok(mut surface) = surface.try_borrow_mut() {
            f(&mut surface);
        }
    }
}

impl<B: RenderBackend> InteractionTarget for BallpitPointer<B> {
    fn bounding_rect(&self) -> Rect {
        (self.rect)()
    }

    fn on_move(&mut self, state: &PointerState) {
        self.with_surface(|s| s.point_at_ndc(state.n_position));
    }

    fn on_leave(&mut self, _state: &PointerState) {
        self.with_surface(|s| s.release_pointer());
    }
}
