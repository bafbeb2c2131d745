//! Per-instance data for the sphere batch
//!
//! CPU-side mirror of the GPU instance buffer plus the light rig. The
//! backend compares versions to decide what to upload; `generation` changes
//! only when the whole set is rebuilt, which forces a buffer reallocation.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::{BallpitConfig, MaterialParams};
use crate::sim::{Color, ColorGradient, Physics};

/// One instance as laid out in the vertex buffer
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl InstanceRaw {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.model[3][0], self.model[3][1], self.model[3][2])
    }

    /// Uniform scale (x axis length)
    pub fn scale(&self) -> f32 {
        Vec3::new(self.model[0][0], self.model[0][1], self.model[0][2]).length()
    }
}

impl Default for InstanceRaw {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            color: Color::WHITE.to_rgba(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Color,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// The drawable sphere batch
#[derive(Debug, Clone)]
pub struct InstanceSet {
    instances: Vec<InstanceRaw>,
    pub light: PointLight,
    pub ambient: AmbientLight,
    pub material: MaterialParams,
    generation: u64,
    matrix_version: u64,
    color_version: u64,
}

impl InstanceSet {
    /// Build a fresh batch for `config`; `generation` identifies this build
    pub fn new(config: &BallpitConfig, generation: u64) -> Self {
        let mut set = Self {
            instances: vec![InstanceRaw::default(); config.count],
            light: PointLight {
                position: Vec3::ZERO,
                color: config.colors.first().copied().unwrap_or(Color::WHITE),
                intensity: config.light_intensity,
            },
            ambient: AmbientLight {
                color: config.ambient_color,
                intensity: config.ambient_intensity,
            },
            material: config.material,
            generation,
            matrix_version: 0,
            color_version: 0,
        };
        set.set_colors(&config.colors);
        set
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn matrix_version(&self) -> u64 {
        self.matrix_version
    }

    pub fn color_version(&self) -> u64 {
        self.color_version
    }

    /// Color body `i` with the gradient sampled at `i / count`; the point
    /// light takes body 0's color.
    pub fn set_colors(&mut self, colors: &[Color]) {
        let gradient = ColorGradient::new(colors);
        let count = self.instances.len();
        for (idx, instance) in self.instances.iter_mut().enumerate() {
            let color = gradient.sample(idx as f32 / count as f32);
            instance.color = color.to_rgba();
            if idx == 0 {
                self.light.color = color;
            }
        }
        self.color_version += 1;
    }

    /// Copy body transforms out of the physics state.
    ///
    /// Body 0 is drawn at zero scale when `follow_cursor` is off. The light
    /// tracks body 0 either way.
    pub fn update(&mut self, physics: &Physics) {
        let follow_cursor = physics.config.follow_cursor;
        let count = self.instances.len().min(physics.len());
        for idx in 0..count {
            let position = physics.positions[idx];
            let scale = if idx == 0 && !follow_cursor {
                0.0
            } else {
                physics.sizes[idx]
            };
            let model = Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(scale));
            self.instances[idx].model = model.to_cols_array_2d();
            if idx == 0 {
                self.light.position = position;
            }
        }
        self.matrix_version += 1;
    }
}
