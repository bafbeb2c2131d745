//! Rendering module
//!
//! All spheres are drawn in one instanced call. Instance data is produced on
//! the CPU (`instances`) and uploaded by a [`RenderBackend`]; the WebGPU
//! backend lives in `pipeline`.

pub mod instances;
pub mod material;
pub mod pipeline;
pub mod sphere;

pub use instances::{AmbientLight, InstanceRaw, InstanceSet, PointLight};
pub use material::{MaterialUniform, ScatterColor, ScatteringExtension, ScatteringUniform};
pub use pipeline::WgpuBackend;

use crate::surface::{Camera, SurfaceSize};

/// Rendering error types
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("Surface creation error: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("No compatible adapter: {0}")]
    Adapter(String),
    #[error("Device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Shader hook missing: {0}")]
    MissingHook(&'static str),
}

/// Draw strategy chosen once when the surface is created
pub trait RenderBackend {
    /// Surface size changed (device-independent units plus pixel ratio)
    fn resize(&mut self, size: &SurfaceSize);

    /// Draw one frame. `scene` is `None` while nothing is mounted.
    fn draw(&mut self, camera: &Camera, scene: Option<&InstanceSet>) -> Result<(), RenderError>;

    /// Free GPU resources. Called at most once.
    fn release(&mut self);
}

/// Backend that only counts what it was asked to do
#[derive(Debug, Default, Clone)]
pub struct NullBackend {
    pub draws: u64,
    pub resizes: u32,
    pub releases: u32,
    /// Instances seen in the last draw
    pub last_instances: usize,
    pub last_size: Option<SurfaceSize>,
}

impl RenderBackend for NullBackend {
    fn resize(&mut self, size: &SurfaceSize) {
        self.resizes += 1;
        self.last_size = Some(*size);
    }

    fn draw(&mut self, _camera: &Camera, scene: Option<&InstanceSet>) -> Result<(), RenderError> {
        self.draws += 1;
        self.last_instances = scene.map_or(0, |s| s.len());
        Ok(())
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}
