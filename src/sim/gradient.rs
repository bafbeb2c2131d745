//! Linear color gradient used to tint the instances
//!
//! Colors are stored in linear RGB so interpolation matches what the
//! shader sees after the sRGB output conversion.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Linear RGB color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColorRepr", into = "ColorRepr")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// From a 24-bit sRGB integer such as `0xfb7185`
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
        Self::new(channel(16), channel(8), channel(0))
    }

    /// Parse `#rrggbb`, `rrggbb` or the short `#rgb` form
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let digits = s.trim().trim_start_matches('#');
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return Err(ConfigError::InvalidColor(s.to_string())),
        };
        u32::from_str_radix(&expanded, 16)
            .map(Self::from_hex)
            .map_err(|_| ConfigError::InvalidColor(s.to_string()))
    }

    /// Back to a 24-bit sRGB integer (rounded)
    pub fn to_hex(&self) -> u32 {
        let channel = |v: f32| (linear_to_srgb(v).clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn lerp(&self, other: &Color, t: f32) -> Color {
        Color::new(
            self.r + t * (other.r - self.r),
            self.g + t * (other.g - self.g),
            self.b + t * (other.b - self.b),
        )
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_rgba(&self) -> [f32; 4] {
        [self.r, self.g, self.b, 1.0]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Host-facing color: either a hex string or a packed integer
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Hex(u32),
    Css(String),
}

impl TryFrom<ColorRepr> for Color {
    type Error = ConfigError;

    fn try_from(repr: ColorRepr) -> Result<Self, Self::Error> {
        match repr {
            ColorRepr::Hex(hex) if hex <= 0xff_ffff => Ok(Color::from_hex(hex)),
            ColorRepr::Hex(hex) => Err(ConfigError::InvalidColor(format!("{hex:#x}"))),
            ColorRepr::Css(s) => Color::parse(&s),
        }
    }
}

impl From<Color> for ColorRepr {
    fn from(color: Color) -> Self {
        ColorRepr::Css(format!("#{:06x}", color.to_hex()))
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        c * 0.0773993808
    } else {
        (c * 0.9478672986 + 0.0521327014).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c < 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(0.41666) - 0.055
    }
}

/// Ordered list of colors sampled by ratio
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradient {
    colors: Vec<Color>,
}

impl ColorGradient {
    /// An empty list degrades to a single white stop.
    pub fn new(colors: &[Color]) -> Self {
        let colors = if colors.is_empty() {
            vec![Color::WHITE]
        } else {
            colors.to_vec()
        };
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Sample at `ratio`, clamped to [0, 1]
    pub fn sample(&self, ratio: f32) -> Color {
        let last = self.colors.len() - 1;
        let scaled = ratio.clamp(0.0, 1.0) * last as f32;
        let idx = scaled.floor() as usize;
        if idx >= last {
            return self.colors[last];
        }
        let alpha = scaled - idx as f32;
        self.colors[idx].lerp(&self.colors[idx + 1], alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Color, b: Color) -> bool {
        (a.r - b.r).abs() < 1e-5 && (a.g - b.g).abs() < 1e-5 && (a.b - b.b).abs() < 1e-5
    }

    #[test]
    fn test_parse_hex_forms() {
        let long = Color::parse("#ff0000").unwrap();
        let short = Color::parse("#f00").unwrap();
        assert!(approx(long, short));
        assert!((long.r - 1.0).abs() < 1e-5);
        assert_eq!(long.g, 0.0);
        assert!(Color::parse("#12").is_err());
        assert!(Color::parse("#zzzzzz").is_err());
    }

    #[test]
    fn test_hex_round_trip_is_stable() {
        for hex in [0xffccd5, 0xfb7185, 0xe11d48, 0xfff0f3, 0x000000, 0xffffff] {
            assert_eq!(Color::from_hex(hex).to_hex(), hex);
        }
    }

    #[test]
    fn test_sample_endpoints_and_midpoint() {
        let g = ColorGradient::new(&[Color::BLACK, Color::WHITE]);
        assert!(approx(g.sample(0.0), Color::BLACK));
        assert!(approx(g.sample(1.0), Color::WHITE));
        assert!(approx(g.sample(0.5), Color::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn test_sample_clamps_ratio() {
        let red = Color::new(1.0, 0.0, 0.0);
        let blue = Color::new(0.0, 0.0, 1.0);
        let g = ColorGradient::new(&[red, blue]);
        assert!(approx(g.sample(-3.0), red));
        assert!(approx(g.sample(7.5), blue));
    }

    #[test]
    fn test_sample_picks_segment() {
        let a = Color::new(0.0, 0.0, 0.0);
        let b = Color::new(1.0, 0.0, 0.0);
        let c = Color::new(1.0, 1.0, 0.0);
        let g = ColorGradient::new(&[a, b, c]);
        // 0.75 lands halfway through the second segment
        assert!(approx(g.sample(0.75), Color::new(1.0, 0.5, 0.0)));
    }

    #[test]
    fn test_single_color_is_constant() {
        let pink = Color::from_hex(0xfb7185);
        let g = ColorGradient::new(&[pink]);
        assert!(approx(g.sample(0.0), pink));
        assert!(approx(g.sample(0.6), pink));
        assert!(approx(g.sample(1.0), pink));
    }

    #[test]
    fn test_empty_degrades_to_white() {
        let g = ColorGradient::new(&[]);
        assert_eq!(g.len(), 1);
        assert!(approx(g.sample(0.3), Color::WHITE));
    }

    #[test]
    fn test_deserialize_string_and_integer() {
        let colors: Vec<Color> = serde_json::from_str(r##"["#ffffff", 16777215, "000"]"##).unwrap();
        assert!(approx(colors[0], Color::WHITE));
        assert!(approx(colors[1], Color::WHITE));
        assert!(approx(colors[2], Color::BLACK));
        assert!(serde_json::from_str::<Color>(r#""not a color""#).is_err());
    }
}
