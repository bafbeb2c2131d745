//! Ballpit - an interactive instanced-sphere background
//!
//! Core modules:
//! - `sim`: Deterministic simulation (sphere physics, color gradient)
//! - `interaction`: Pointer/touch registry shared by every mounted surface
//! - `surface`: Camera, resize/visibility lifecycle and the frame loop
//! - `renderer`: Instance data, shading extension and the WebGPU backend
//! - `ballpit`: Composition of the above plus the runtime control surface
//! - `platform`: Browser glue (wasm32 only)

pub mod ballpit;
pub mod config;
pub mod interaction;
pub mod platform;
pub mod renderer;
pub mod sim;
pub mod surface;

pub use ballpit::{Ballpit, BallpitError, BallpitSurface};
pub use config::{BallpitConfig, ConfigError, MaterialParams, SizeMode, SurfaceOptions};

/// Ballpit tuning constants
pub mod consts {
    /// Fraction of the remaining distance body 0 covers toward the pointer each step
    pub const CONTROL_LERP: f32 = 0.1;
    /// Velocity correction floor for pairwise contacts
    pub const PAIR_IMPULSE_FLOOR: f32 = 1.0;
    /// Velocity correction floor for contacts against the controlled body 0
    pub const ATTRACTOR_IMPULSE_FLOOR: f32 = 2.0;

    /// Resize signals closer together than this collapse into one recompute
    pub const RESIZE_DEBOUNCE_MS: f64 = 100.0;

    /// Camera defaults
    pub const DEFAULT_FOV: f32 = 50.0;
    pub const CAMERA_NEAR: f32 = 0.1;
    pub const CAMERA_FAR: f32 = 2000.0;
    pub const CAMERA_DISTANCE: f32 = 20.0;
    /// Wider viewports narrow the fov instead of stretching the scene
    pub const CAMERA_MAX_ASPECT: f32 = 1.5;

    /// Sphere tessellation
    pub const SPHERE_WIDTH_SEGMENTS: u32 = 32;
    pub const SPHERE_HEIGHT_SEGMENTS: u32 = 16;
}
