//! Material uniforms and the subsurface scattering extension
//!
//! The base shader is a plain metal/roughness/clearcoat model. The
//! scattering extension splices an extra term into its direct lighting:
//! light bleeding through the sphere toward the viewer, tinted by either the
//! instance color or the material's base color.

use bytemuck::{Pod, Zeroable};

use super::RenderError;
use crate::config::MaterialParams;
use crate::sim::Color;

/// Base shader source with extension hooks
pub const BASE_SHADER: &str = include_str!("pbr.wgsl");

/// Hook where extra declarations are inserted
pub const DECLS_HOOK: &str = "// @hook:fragment_decls";
/// Hook right after the direct light contribution
pub const DIRECT_HOOK: &str = "// @hook:direct_light";

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
}

impl MaterialUniform {
    pub fn new(params: &MaterialParams, base_color: Color) -> Self {
        Self {
            base_color: base_color.to_rgba(),
            metalness: params.metalness,
            roughness: params.roughness,
            clearcoat: params.clearcoat,
            clearcoat_roughness: params.clearcoat_roughness,
        }
    }
}

/// Scattering knobs, uploaded as their own uniform block
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ScatteringUniform {
    pub distortion: f32,
    pub ambient: f32,
    pub attenuation: f32,
    pub power: f32,
    pub scale: f32,
    pub _pad: [f32; 3],
}

impl Default for ScatteringUniform {
    fn default() -> Self {
        Self {
            distortion: 0.1,
            ambient: 0.0,
            attenuation: 0.1,
            power: 2.0,
            scale: 10.0,
            _pad: [0.0; 3],
        }
    }
}

/// Which color tints the scattered light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScatterColor {
    /// Per-instance color
    #[default]
    Instance,
    /// Material base color
    Diffuse,
}

impl ScatterColor {
    fn expression(&self) -> &'static str {
        match self {
            ScatterColor::Instance => "in.color",
            ScatterColor::Diffuse => "material.base_color.rgb",
        }
    }
}

/// Injects the scattering term into a shader that carries the hooks
#[derive(Debug, Clone, Default)]
pub struct ScatteringExtension {
    pub uniform: ScatteringUniform,
    pub color: ScatterColor,
    /// Bind group slot of the scattering uniform
    pub binding: u32,
}

const SCATTERING_DECLS: &str = r#"
struct Scattering {
    distortion: f32,
    ambient: f32,
    attenuation: f32,
    power: f32,
    scale: f32,
};

@group(0) @binding({binding}) var<uniform> scattering: Scattering;

fn re_direct_scattering(
    direct_light: IncidentLight,
    geometry: Geometry,
    tint: vec3<f32>,
    reflected: ptr<function, ReflectedLight>,
) {
    let scattering_half = normalize(direct_light.direction + geometry.normal * scattering.distortion);
    let scattering_dot = pow(saturate(dot(geometry.view_dir, -scattering_half)), scattering.power) * scattering.scale;
    let scattering_illu = (scattering_dot + scattering.ambient) * tint;
    (*reflected).direct_diffuse += scattering_illu * scattering.attenuation * direct_light.color;
}
"#;

impl ScatteringExtension {
    pub fn new(binding: u32) -> Self {
        Self {
            binding,
            ..Default::default()
        }
    }

    /// Splice the extension into `base`. Both hooks must be present.
    pub fn inject(&self, base: &str) -> Result<String, RenderError> {
        for hook in [DECLS_HOOK, DIRECT_HOOK] {
            if !base.contains(hook) {
                return Err(RenderError::MissingHook(hook));
            }
        }
        let decls = SCATTERING_DECLS.replace("{binding}", &self.binding.to_string());
        let call = format!(
            "re_direct_scattering(direct_light, geometry, {}, &reflected);",
            self.color.expression()
        );
        Ok(base
            .replacen(DECLS_HOOK, &decls, 1)
            .replacen(DIRECT_HOOK, &call, 1))
    }
}
