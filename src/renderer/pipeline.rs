//! WebGPU render backend
//!
//! One pipeline, one bind group (globals, material, scattering) and one
//! instanced draw of the shared sphere mesh per frame.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::instances::{InstanceRaw, InstanceSet};
use super::material::{BASE_SHADER, MaterialUniform, ScatteringExtension};
use super::sphere::{self, Vertex};
use super::{RenderBackend, RenderError};
use crate::config::MaterialParams;
use crate::consts::{SPHERE_HEIGHT_SEGMENTS, SPHERE_WIDTH_SEGMENTS};
use crate::sim::Color;
use crate::surface::{Camera, SurfaceSize, fit_extent};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Binding slot of the scattering uniform
pub const SCATTERING_BINDING: u32 = 2;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4], // offset 0
    camera_pos: [f32; 4],     // offset 64
    light_pos: [f32; 4],      // offset 80, w = intensity
    light_color: [f32; 4],    // offset 96
    ambient: [f32; 4],        // offset 112, rgb * intensity
}

impl Globals {
    fn new(camera: &Camera, scene: Option<&InstanceSet>) -> Self {
        let (light_pos, light_color, ambient) = match scene {
            Some(set) => {
                let p = set.light.position;
                let a = set.ambient.color.to_array();
                let i = set.ambient.intensity;
                (
                    [p.x, p.y, p.z, set.light.intensity],
                    set.light.color.to_rgba(),
                    [a[0] * i, a[1] * i, a[2] * i, 1.0],
                )
            }
            None => ([0.0; 4], [0.0; 4], [0.0; 4]),
        };
        Self {
            view_proj: camera.view_projection().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            light_pos,
            light_color,
            ambient,
        }
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Instance buffer plus what was last uploaded into it
struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    generation: u64,
    matrix_version: u64,
    color_version: u64,
}

pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    globals_buffer: wgpu::Buffer,
    material_buffer: wgpu::Buffer,
    scattering_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    instances: Option<InstanceBuffer>,
    material: Option<MaterialParams>,
    released: bool,
}

impl WgpuBackend {
    pub async fn new(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        width: u32,
        height: u32,
        scattering: &ScatteringExtension,
    ) -> Result<Self, RenderError> {
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ballpit-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        let surface_caps = surface.get_capabilities(adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Adapter("surface reports no formats".into()))?;
        // Transparent background shows the page through the canvas
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
        .into_iter()
        .find(|m| surface_caps.alpha_modes.contains(m))
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (width, height) = fit_extent(width, height, device.limits().max_texture_dimension_2d);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("Surface configured: {:?} {:?}", surface_format, alpha_mode);

        let source = scattering.inject(BASE_SHADER)?;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ballpit_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals_buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material_buffer"),
            contents: bytemuck::bytes_of(&MaterialUniform::new(&MaterialParams::default(), Color::WHITE)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let scattering_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("scattering_buffer"),
            contents: bytemuck::bytes_of(&scattering.uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ballpit_bind_group_layout"),
            entries: &[uniform_entry(0), uniform_entry(1), uniform_entry(scattering.binding)],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ballpit_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: scattering.binding,
                    resource: scattering_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ballpit_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ballpit_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc(), InstanceRaw::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let mesh = sphere::sphere(SPHERE_WIDTH_SEGMENTS, SPHERE_HEIGHT_SEGMENTS);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sphere_vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sphere_indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let (depth_texture, depth_view) = depth_texture(&device, config.width, config.height);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            bind_group,
            globals_buffer,
            material_buffer,
            scattering_buffer,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            depth_texture,
            depth_view,
            instances: None,
            material: None,
            released: false,
        })
    }

    /// Push CPU-side instance data when it changed since the last upload
    fn sync_instances(&mut self, set: &InstanceSet) {
        let needs_alloc = match &self.instances {
            Some(buf) => buf.generation != set.generation() || buf.capacity < set.len(),
            None => true,
        };
        if needs_alloc {
            if let Some(old) = self.instances.take() {
                old.buffer.destroy();
            }
            let capacity = set.len().max(1);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("instance_buffer"),
                size: (capacity * std::mem::size_of::<InstanceRaw>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            log::debug!("Allocated instance buffer for {} spheres", capacity);
            self.instances = Some(InstanceBuffer {
                buffer,
                capacity,
                generation: set.generation(),
                // Force the first upload
                matrix_version: u64::MAX,
                color_version: u64::MAX,
            });
        }

        if let Some(buf) = self.instances.as_mut() {
            if buf.matrix_version != set.matrix_version() || buf.color_version != set.color_version() {
                if !set.is_empty() {
                    self.queue
                        .write_buffer(&buf.buffer, 0, bytemuck::cast_slice(set.instances()));
                }
                buf.matrix_version = set.matrix_version();
                buf.color_version = set.color_version();
            }
        }

        if self.material.as_ref() != Some(&set.material) {
            let uniform = MaterialUniform::new(&set.material, Color::WHITE);
            self.queue
                .write_buffer(&self.material_buffer, 0, bytemuck::bytes_of(&uniform));
            self.material = Some(set.material);
        }
    }

    /// Largest surface side the device accepts
    pub fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

impl RenderBackend for WgpuBackend {
    fn resize(&mut self, size: &SurfaceSize) {
        if self.released {
            return;
        }
        let (width, height) = size.physical_within(self.max_dimension());
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
        self.depth_texture.destroy();
        let (texture, view) = depth_texture(&self.device, width, height);
        self.depth_texture = texture;
        self.depth_view = view;
    }

    fn draw(&mut self, camera: &Camera, scene: Option<&InstanceSet>) -> Result<(), RenderError> {
        if self.released {
            return Ok(());
        }
        if let Some(set) = scene {
            self.sync_instances(set);
        }
        let globals = Globals::new(camera, scene);
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.reconfigure();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ballpit_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ballpit_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let count = scene.map_or(0, |s| s.len()) as u32;
            if let (Some(buf), true) = (&self.instances, count > 0) {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, &self.bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, buf.buffer.slice(..));
                render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..self.index_count, 0, 0..count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(buf) = self.instances.take() {
            buf.buffer.destroy();
        }
        self.globals_buffer.destroy();
        self.material_buffer.destroy();
        self.scattering_buffer.destroy();
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.depth_texture.destroy();
        log::info!("GPU resources released");
    }
}
