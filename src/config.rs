//! Ballpit configuration
//!
//! Mirrors the host-facing option bag. Every field is optional on the wire
//! (`camelCase` JSON) and falls back to the documented default.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::Color;

/// Configuration errors, reported once at construction
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("count must be at least 1")]
    EmptyCount,
    #[error("friction must be in (0, 1], got {0}")]
    Friction(f32),
    #[error("wallBounce must be in [0, 1], got {0}")]
    WallBounce(f32),
    #[error("{name} must be a finite value >= 0, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("minSize ({min}) must not exceed maxSize ({max})")]
    SizeRange { min: f32, max: f32 },
    #[error("at least one color is required")]
    NoColors,
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Physically-based material knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialParams {
    pub metalness: f32,
    pub roughness: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            metalness: 0.5,
            roughness: 0.5,
            clearcoat: 1.0,
            clearcoat_roughness: 0.15,
        }
    }
}

/// Simulation and appearance settings for one ballpit
///
/// The physics engine reads this live: resize rewrites `max_x`/`max_y` and
/// pointer hover toggles `control_sphere0` between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BallpitConfig {
    pub count: usize,
    pub colors: Vec<Color>,
    pub ambient_color: Color,
    pub ambient_intensity: f32,
    pub light_intensity: f32,
    #[serde(alias = "materialParams")]
    pub material: MaterialParams,
    pub min_size: f32,
    pub max_size: f32,
    pub size0: f32,
    pub gravity: f32,
    /// Velocity multiplier applied every step
    pub friction: f32,
    /// Restitution on wall contact
    pub wall_bounce: f32,
    pub max_velocity: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub max_z: f32,
    /// Body 0 follows the pointer target instead of free dynamics
    pub control_sphere0: bool,
    /// Purely visual: when false body 0 is drawn at zero scale
    pub follow_cursor: bool,
}

impl Default for BallpitConfig {
    fn default() -> Self {
        Self {
            count: 200,
            colors: vec![Color::BLACK],
            ambient_color: Color::WHITE,
            ambient_intensity: 1.0,
            light_intensity: 200.0,
            material: MaterialParams::default(),
            min_size: 0.5,
            max_size: 1.0,
            size0: 1.0,
            gravity: 0.5,
            friction: 0.9975,
            wall_bounce: 0.95,
            max_velocity: 0.15,
            max_x: 5.0,
            max_y: 5.0,
            max_z: 2.0,
            control_sphere0: false,
            follow_cursor: true,
        }
    }
}

impl BallpitConfig {
    /// Parse a JSON option bag and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Pink preset used behind the proposal scene
    pub fn valentine() -> Self {
        Self {
            count: 100,
            gravity: 0.7,
            friction: 0.995,
            wall_bounce: 0.9,
            follow_cursor: true,
            colors: [0xffccd5, 0xfb7185, 0xe11d48, 0xfff0f3]
                .into_iter()
                .map(Color::from_hex)
                .collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::EmptyCount);
        }
        if self.colors.is_empty() {
            return Err(ConfigError::NoColors);
        }
        if !(self.friction > 0.0 && self.friction <= 1.0) {
            return Err(ConfigError::Friction(self.friction));
        }
        if !(0.0..=1.0).contains(&self.wall_bounce) {
            return Err(ConfigError::WallBounce(self.wall_bounce));
        }
        for (name, value) in [
            ("minSize", self.min_size),
            ("maxSize", self.max_size),
            ("size0", self.size0),
            ("maxVelocity", self.max_velocity),
            ("maxX", self.max_x),
            ("maxY", self.max_y),
            ("maxZ", self.max_z),
            ("lightIntensity", self.light_intensity),
            ("ambientIntensity", self.ambient_intensity),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { name, value });
            }
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::Negative {
                name: "gravity",
                value: self.gravity,
            });
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::SizeRange {
                min: self.min_size,
                max: self.max_size,
            });
        }
        Ok(())
    }
}

/// How the drawable surface is sized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SizeMode {
    /// Fill the parent container
    #[default]
    Parent,
    /// Fill the browser window
    Window,
    /// Fixed size in device-independent units
    Fixed { width: f32, height: f32 },
}

/// Camera and surface tuning for the lifecycle manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurfaceOptions {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Camera distance from the origin along +Z
    pub camera_distance: f32,
    pub min_aspect: Option<f32>,
    pub max_aspect: Option<f32>,
    pub min_pixel_ratio: Option<f32>,
    pub max_pixel_ratio: Option<f32>,
    pub size: SizeMode,
    /// RNG seed for initial placement; `None` lets the platform pick one
    pub seed: Option<u64>,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            fov: DEFAULT_FOV,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            camera_distance: CAMERA_DISTANCE,
            min_aspect: None,
            max_aspect: Some(CAMERA_MAX_ASPECT),
            min_pixel_ratio: None,
            max_pixel_ratio: None,
            size: SizeMode::Parent,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BallpitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.count, 200);
        assert_eq!(config.max_z, 2.0);
        assert!(!config.control_sphere0);
        assert!(config.follow_cursor);
        assert!(BallpitConfig::valentine().validate().is_ok());
    }

    #[test]
    fn test_from_json_merges_defaults() {
        let config = BallpitConfig::from_json(
            r##"{"count": 100, "gravity": 0.7, "colors": ["#ffccd5", "#fb7185"], "controlSphere0": true}"##,
        )
        .unwrap();
        assert_eq!(config.count, 100);
        assert_eq!(config.gravity, 0.7);
        assert_eq!(config.colors.len(), 2);
        assert!(config.control_sphere0);
        assert_eq!(config.friction, 0.9975);
        assert_eq!(config.material, MaterialParams::default());
    }

    #[test]
    fn test_camel_case_field_names() {
        let value = serde_json::to_value(BallpitConfig::default()).unwrap();
        assert_eq!(value["controlSphere0"], serde_json::Value::Bool(false));
        assert!(value.get("followCursor").is_some());
        assert!(value.get("control_sphere0").is_none());
    }

    #[test]
    fn test_material_params_alias() {
        let config =
            BallpitConfig::from_json(r#"{"materialParams": {"roughness": 0.25}}"#).unwrap();
        assert_eq!(config.material.roughness, 0.25);
        assert_eq!(config.material.metalness, 0.5);
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let bad = |f: fn(&mut BallpitConfig)| {
            let mut c = BallpitConfig::default();
            f(&mut c);
            c.validate()
        };
        assert!(matches!(bad(|c| c.count = 0), Err(ConfigError::EmptyCount)));
        assert!(matches!(bad(|c| c.friction = 0.0), Err(ConfigError::Friction(_))));
        assert!(matches!(bad(|c| c.friction = 1.2), Err(ConfigError::Friction(_))));
        assert!(matches!(bad(|c| c.wall_bounce = -0.1), Err(ConfigError::WallBounce(_))));
        assert!(matches!(bad(|c| c.max_x = -1.0), Err(ConfigError::Negative { .. })));
        assert!(matches!(bad(|c| c.colors.clear()), Err(ConfigError::NoColors)));
        assert!(matches!(
            bad(|c| {
                c.min_size = 2.0;
                c.max_size = 1.0;
            }),
            Err(ConfigError::SizeRange { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            BallpitConfig::from_json("{count: }"),
            Err(ConfigError::Json(_))
        ));
        assert!(BallpitConfig::from_json(r##"{"colors": ["#nope00"]}"##).is_err());
    }

    #[test]
    fn test_surface_options_from_json() {
        let options: SurfaceOptions =
            serde_json::from_str(r#"{"size": {"fixed": {"width": 640, "height": 480}}, "seed": 7}"#)
                .unwrap();
        assert_eq!(
            options.size,
            SizeMode::Fixed {
                width: 640.0,
                height: 480.0
            }
        );
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.max_aspect, Some(CAMERA_MAX_ASPECT));
    }
}
