//! Perspective camera
//!
//! Sits on +Z looking at the origin. Viewports wider than `max_aspect` (or
//! narrower than `min_aspect`) get a corrected fov so the apparent vertical
//! extent is preserved instead of stretching.

use glam::{Mat4, Vec2, Vec3};

use crate::config::SurfaceOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    /// Effective vertical fov in degrees
    pub fov: f32,
    /// Configured fov before aspect correction
    pub base_fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub min_aspect: Option<f32>,
    pub max_aspect: Option<f32>,
}

impl Camera {
    pub fn new(options: &SurfaceOptions) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, options.camera_distance),
            target: Vec3::ZERO,
            fov: options.fov,
            base_fov: options.fov,
            aspect: 1.0,
            near: options.near,
            far: options.far,
            min_aspect: options.min_aspect,
            max_aspect: options.max_aspect,
        }
    }

    /// Apply a new aspect ratio and re-derive the fov
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.fov = match (self.min_aspect, self.max_aspect) {
            (Some(min), _) if aspect < min => self.corrected_fov(min),
            (_, Some(max)) if aspect > max => self.corrected_fov(max),
            _ => self.base_fov,
        };
    }

    fn corrected_fov(&self, limit: f32) -> f32 {
        let t = (self.base_fov.to_radians() / 2.0).tan() / (self.aspect / limit);
        2.0 * t.atan().to_degrees()
    }

    /// Visible world width/height on the plane through the origin
    pub fn world_size(&self) -> Vec2 {
        let height = 2.0 * (self.fov.to_radians() / 2.0).tan() * self.position.length();
        Vec2::new(height * self.aspect, height)
    }

    /// Unit view direction
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Ray from the camera through a point in normalized device coordinates
    pub fn ray(&self, ndc: Vec2) -> (Vec3, Vec3) {
        let inverse = self.view_projection().inverse();
        let through = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 0.5));
        (self.position, (through - self.position).normalize_or_zero())
    }

    /// Project pointer NDC onto the plane through the origin facing the camera
    pub fn intersect_view_plane(&self, ndc: Vec2) -> Option<Vec3> {
        let normal = self.direction();
        let (origin, dir) = self.ray(ndc);
        let denominator = normal.dot(dir);
        if denominator.abs() < f32::EPSILON {
            return (origin.dot(normal).abs() < f32::EPSILON).then_some(origin);
        }
        let t = -origin.dot(normal) / denominator;
        (t >= 0.0).then(|| origin + dir * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(&SurfaceOptions::default())
    }

    #[test]
    fn test_fov_kept_inside_band() {
        let mut cam = camera();
        cam.set_aspect(1.2);
        assert_eq!(cam.fov, 50.0);
    }

    #[test]
    fn test_wide_aspect_preserves_vertical_extent_of_limit() {
        let mut cam = camera();
        cam.set_aspect(1.5);
        let at_limit = cam.world_size();
        cam.set_aspect(3.0);
        assert!(cam.fov < 50.0);
        // Width matches what the limit aspect showed
        assert!((cam.world_size().x - at_limit.x).abs() < 1e-3);
    }

    #[test]
    fn test_min_aspect_widens_fov() {
        let mut cam = Camera::new(&SurfaceOptions {
            min_aspect: Some(0.8),
            ..Default::default()
        });
        cam.set_aspect(0.4);
        assert!(cam.fov > 50.0);
    }

    #[test]
    fn test_world_size() {
        let mut cam = camera();
        cam.set_aspect(1.0);
        let size = cam.world_size();
        let expected = 2.0 * (25.0f32).to_radians().tan() * 20.0;
        assert!((size.y - expected).abs() < 1e-4);
        assert!((size.x - expected).abs() < 1e-4);
    }

    #[test]
    fn test_center_ray_hits_origin() {
        let mut cam = camera();
        cam.set_aspect(1.0);
        let hit = cam.intersect_view_plane(Vec2::ZERO).unwrap();
        assert!(hit.length() < 1e-3);
    }

    #[test]
    fn test_corner_ray_hits_world_edge() {
        let mut cam = camera();
        cam.set_aspect(1.25);
        let half = cam.world_size() / 2.0;
        let hit = cam.intersect_view_plane(Vec2::new(1.0, -1.0)).unwrap();
        assert!((hit.x - half.x).abs() < 1e-2);
        assert!((hit.y + half.y).abs() < 1e-2);
        assert!(hit.z.abs() < 1e-3);
    }
}
