//! Sphere physics for the ballpit
//!
//! One integration + collision step per call. Body 0 is special: while
//! `control_sphere0` is set it chases `center` (the pointer target) instead
//! of falling, and it pushes other bodies without being pushed back.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::config::BallpitConfig;
use crate::consts::*;

/// Per-body state kept in parallel arrays indexed by body
#[derive(Debug, Clone)]
pub struct Physics {
    /// Live configuration; mutated by resize and pointer hover between steps
    pub config: BallpitConfig,
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub sizes: Vec<f32>,
    /// Attractor target for body 0
    pub center: Vec3,
}

impl Physics {
    /// Create bodies with seeded random placement and radii.
    ///
    /// Body 0 starts at the attractor center with radius `size0`; every other
    /// body is spread uniformly across the box.
    pub fn new(config: BallpitConfig, seed: u64) -> Self {
        let count = config.count;
        let mut physics = Self {
            config,
            positions: vec![Vec3::ZERO; count],
            velocities: vec![Vec3::ZERO; count],
            sizes: vec![1.0; count],
            center: Vec3::ZERO,
        };
        let mut rng = Pcg32::seed_from_u64(seed);
        physics.init_positions(&mut rng);
        physics.set_sizes(&mut rng);
        physics
    }

    fn init_positions(&mut self, rng: &mut Pcg32) {
        let BallpitConfig {
            max_x, max_y, max_z, ..
        } = self.config;
        if let Some(first) = self.positions.first_mut() {
            *first = self.center;
        }
        for pos in self.positions.iter_mut().skip(1) {
            *pos = Vec3::new(
                spread(rng, max_x),
                spread(rng, max_y),
                spread(rng, max_z),
            );
        }
    }

    fn set_sizes(&mut self, rng: &mut Pcg32) {
        let (min, max) = (self.config.min_size, self.config.max_size);
        if let Some(first) = self.sizes.first_mut() {
            *first = self.config.size0;
        }
        for size in self.sizes.iter_mut().skip(1) {
            *size = if max > min {
                rng.random_range(min..max)
            } else {
                min
            };
        }
    }

    /// Number of simulated bodies
    pub fn len(&self) -> usize {
        self.config
            .count
            .min(self.positions.len())
            .min(self.velocities.len())
            .min(self.sizes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point body 0 at a world-space target and hand it to the pointer
    pub fn set_target(&mut self, target: Vec3) {
        self.center = target;
        self.config.control_sphere0 = true;
    }

    /// Return body 0 to free dynamics
    pub fn release_target(&mut self) {
        self.config.control_sphere0 = false;
    }

    /// Advance every body by one step.
    ///
    /// `delta` only scales gravity; velocities are applied per step, not per second.
    pub fn update(&mut self, delta: f32) {
        let count = self.len();
        if count == 0 {
            return;
        }
        let config = &self.config;
        let controlled = config.control_sphere0;

        let mut body0 = self.positions[0];
        let start = if controlled {
            body0 = body0.lerp(self.center, CONTROL_LERP);
            self.positions[0] = body0;
            self.velocities[0] = Vec3::ZERO;
            1
        } else {
            0
        };

        for idx in start..count {
            let mut vel = self.velocities[idx];
            vel.y -= delta * config.gravity * self.sizes[idx];
            vel *= config.friction;
            vel = vel.clamp_length_max(config.max_velocity);
            self.positions[idx] += vel;
            self.velocities[idx] = vel;
        }

        for idx in start..count {
            let mut pos = self.positions[idx];
            let mut vel = self.velocities[idx];
            let radius = self.sizes[idx];

            for jdx in idx + 1..count {
                let other_pos = self.positions[jdx];
                let other_vel = self.velocities[jdx];
                let axis = other_pos - pos;
                let dist = axis.length();
                let sum_radius = radius + self.sizes[jdx];
                if dist < sum_radius {
                    let overlap = sum_radius - dist;
                    let push = axis.normalize_or_zero() * (0.5 * overlap);
                    let correction = push * vel.length().max(PAIR_IMPULSE_FLOOR);
                    let other_correction = push * other_vel.length().max(PAIR_IMPULSE_FLOOR);
                    pos -= push;
                    vel -= correction;
                    self.positions[jdx] = other_pos + push;
                    self.velocities[jdx] = other_vel + other_correction;
                }
            }

            if controlled {
                let axis = body0 - pos;
                let dist = axis.length();
                let sum_radius = radius + self.sizes[0];
                if dist < sum_radius {
                    let push = axis.normalize_or_zero() * (sum_radius - dist);
                    let correction = push * vel.length().max(ATTRACTOR_IMPULSE_FLOOR);
                    pos -= push;
                    vel -= correction;
                }
            }

            contain(config, radius, &mut pos, &mut vel);
            self.positions[idx] = pos;
            self.velocities[idx] = vel;
        }
    }
}

/// Clamp one body into the box and reflect the clamped velocity components.
///
/// Under gravity only the floor is enforced on Y. Z tests against
/// `max(max_z, max_size)` but clamps to `max_z - radius`.
fn contain(config: &BallpitConfig, radius: f32, pos: &mut Vec3, vel: &mut Vec3) {
    if pos.x.abs() + radius > config.max_x {
        pos.x = sign(pos.x) * (config.max_x - radius);
        vel.x = -vel.x * config.wall_bounce;
    }

    if config.gravity == 0.0 {
        if pos.y.abs() + radius > config.max_y {
            pos.y = sign(pos.y) * (config.max_y - radius);
            vel.y = -vel.y * config.wall_bounce;
        }
    } else if pos.y - radius < -config.max_y {
        pos.y = -config.max_y + radius;
        vel.y = -vel.y * config.wall_bounce;
    }

    let max_boundary = config.max_z.max(config.max_size);
    if pos.z.abs() + radius > max_boundary {
        pos.z = sign(pos.z) * (config.max_z - radius);
        vel.z = -vel.z * config.wall_bounce;
    }
}

/// Sign with zero mapping to zero (unlike `f32::signum`)
#[inline]
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Uniform sample in [-extent, extent]
#[inline]
fn spread(rng: &mut Pcg32, extent: f32) -> f32 {
    if extent > 0.0 {
        rng.random_range(-extent..=extent)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-4;

    fn config(count: usize) -> BallpitConfig {
        BallpitConfig {
            count,
            ..Default::default()
        }
    }

    fn assert_contained(physics: &Physics) {
        let c = &physics.config;
        let z_bound = c.max_z.max(c.max_size);
        for (i, pos) in physics.positions.iter().enumerate() {
            if i == 0 && c.control_sphere0 {
                continue;
            }
            assert!(pos.x.abs() <= c.max_x + EPS, "body {i} x = {}", pos.x);
            assert!(pos.z.abs() <= z_bound + EPS, "body {i} z = {}", pos.z);
            assert!(pos.y >= -c.max_y - EPS, "body {i} y = {}", pos.y);
            if c.gravity == 0.0 {
                assert!(pos.y <= c.max_y + EPS, "body {i} y = {}", pos.y);
            }
        }
    }

    #[test]
    fn test_initial_layout() {
        let physics = Physics::new(config(50), 42);
        assert_eq!(physics.len(), 50);
        assert_eq!(physics.positions[0], Vec3::ZERO);
        assert_eq!(physics.sizes[0], 1.0);
        for i in 1..50 {
            let p = physics.positions[i];
            assert!(p.x.abs() <= 5.0 && p.y.abs() <= 5.0 && p.z.abs() <= 2.0);
            assert!((0.5..=1.0).contains(&physics.sizes[i]));
        }
        assert!(physics.velocities.iter().all(|v| *v == Vec3::ZERO));
    }

    #[test]
    fn test_overlap_separates_along_axis() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                ..config(2)
            },
            1,
        );
        physics.positions[0] = Vec3::ZERO;
        physics.positions[1] = Vec3::new(1.2, 0.0, 0.0);
        physics.sizes[0] = 1.0;
        physics.sizes[1] = 1.0;
        let before = physics.positions[1].distance(physics.positions[0]);
        let overlap = 2.0 - before;

        physics.update(1.0 / 60.0);

        let axis = physics.positions[1] - physics.positions[0];
        assert!(axis.length() - before >= overlap - EPS);
        assert!(axis.y.abs() < EPS && axis.z.abs() < EPS);
        assert!(axis.x > 0.0);
        // Each body moved half the overlap
        assert!((physics.positions[0].x + 0.5 * overlap).abs() < EPS);
        assert!((physics.positions[1].x - 1.2 - 0.5 * overlap).abs() < EPS);
        // Velocities point apart
        assert!(physics.velocities[0].x < 0.0);
        assert!(physics.velocities[1].x > 0.0);
    }

    #[test]
    fn test_pair_correction_scales_by_own_speed() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                friction: 1.0,
                max_velocity: 10.0,
                max_x: 50.0,
                max_y: 50.0,
                max_z: 50.0,
                ..config(2)
            },
            1,
        );
        physics.sizes = vec![1.0, 1.0];
        // Body 0 arrives at the origin moving at speed 5; body 1 rests beside it
        physics.positions = vec![Vec3::new(0.0, 5.0, 0.0), Vec3::new(1.5, 0.0, 0.0)];
        physics.velocities = vec![Vec3::new(0.0, -5.0, 0.0), Vec3::ZERO];

        physics.update(0.016);

        // push = 0.25 along +x; the fast body takes 5x, the resting one the floor of 1
        assert!((physics.velocities[0] - Vec3::new(-1.25, -5.0, 0.0)).length() < EPS);
        assert!((physics.velocities[1] - Vec3::new(0.25, 0.0, 0.0)).length() < EPS);
        assert!((physics.positions[0] - Vec3::new(-0.25, 0.0, 0.0)).length() < EPS);
        assert!((physics.positions[1] - Vec3::new(1.75, 0.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_determinism() {
        let deltas = [0.016, 0.017, 0.015, 0.033, 0.001, 0.1];
        let run = || {
            let mut physics = Physics::new(config(40), 99999);
            for (i, delta) in deltas.iter().cycle().take(120).enumerate() {
                if i == 30 {
                    physics.set_target(Vec3::new(2.0, 1.0, 0.0));
                }
                if i == 90 {
                    physics.release_target();
                }
                physics.update(*delta);
            }
            physics
        };
        let a = run();
        let b = run();
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.velocities, b.velocities);
        assert_eq!(a.sizes, b.sizes);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = Physics::new(config(10), 1);
        let b = Physics::new(config(10), 2);
        assert_ne!(a.positions, b.positions);
    }

    #[test]
    fn test_control_sphere_lerps_toward_far_target() {
        let mut physics = Physics::new(config(30), 7);
        let target = Vec3::new(100.0, -80.0, 0.0);
        physics.set_target(target);

        physics.update(0.016);
        assert!((physics.positions[0] - target * 0.1).length() < EPS);
        assert_eq!(physics.velocities[0], Vec3::ZERO);

        let mut expected = target * 0.1;
        for _ in 0..20 {
            physics.update(0.016);
            expected = expected.lerp(target, 0.1);
            assert!((physics.positions[0] - expected).length() < 1e-3);
            assert_contained(&physics);
        }
    }

    #[test]
    fn test_controlled_body_pushes_without_being_pushed() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                ..config(2)
            },
            3,
        );
        physics.positions[0] = Vec3::ZERO;
        physics.positions[1] = Vec3::new(1.0, 0.0, 0.0);
        physics.set_target(Vec3::ZERO);

        physics.update(0.016);

        assert_eq!(physics.positions[0], Vec3::ZERO);
        let sum = physics.sizes[0] + physics.sizes[1];
        assert!(physics.positions[1].length() >= sum - EPS);
        assert!(physics.velocities[1].x > 0.0);
    }

    #[test]
    fn test_gravity_only_enforces_floor() {
        let mut physics = Physics::new(config(2), 5);
        physics.positions[0] = Vec3::new(-3.0, 20.0, 0.0);
        physics.positions[1] = Vec3::new(3.0, -20.0, 0.0);

        physics.update(0.016);

        // Above the box is allowed under gravity
        assert!(physics.positions[0].y > 5.0);
        // Below the floor is clamped to rest on it
        assert!((physics.positions[1].y - (-5.0 + physics.sizes[1])).abs() < EPS);
    }

    #[test]
    fn test_zero_gravity_clamps_both_y_bounds() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                ..config(1)
            },
            5,
        );
        physics.positions[0] = Vec3::new(0.0, 20.0, 0.0);
        physics.velocities[0] = Vec3::new(0.0, 0.1, 0.0);

        physics.update(0.016);

        assert!((physics.positions[0].y - (5.0 - physics.sizes[0])).abs() < EPS);
        assert!(physics.velocities[0].y < 0.0);
    }

    #[test]
    fn test_wall_bounce_reflects_velocity() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                friction: 1.0,
                ..config(1)
            },
            5,
        );
        physics.positions[0] = Vec3::new(3.95, 0.0, 0.0);
        physics.velocities[0] = Vec3::new(0.1, 0.0, 0.0);

        physics.update(0.016);

        assert!((physics.positions[0].x - 4.0).abs() < EPS);
        assert!((physics.velocities[0].x + 0.1 * 0.95).abs() < EPS);
    }

    #[test]
    fn test_z_bound_uses_max_size() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                max_z: 0.5,
                max_size: 2.0,
                min_size: 0.2,
                ..config(1)
            },
            5,
        );
        physics.sizes[0] = 0.2;
        // |z| + r = 1.7 is past max_z but inside max(max_z, max_size)
        physics.positions[0] = Vec3::new(0.0, 0.0, 1.5);
        physics.update(0.016);
        assert_eq!(physics.positions[0].z, 1.5);

        // Past the wider bound the clamp target is still max_z - radius
        physics.positions[0] = Vec3::new(0.0, 0.0, 3.0);
        physics.update(0.016);
        assert!((physics.positions[0].z - 0.3).abs() < EPS);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let mut physics = Physics::new(
            BallpitConfig {
                gravity: 0.0,
                friction: 1.0,
                ..config(1)
            },
            5,
        );
        physics.velocities[0] = Vec3::new(3.0, 4.0, 0.0);
        physics.update(0.016);
        assert!((physics.velocities[0].length() - 0.15).abs() < EPS);
    }

    #[test]
    fn test_zero_bodies_is_noop() {
        let mut physics = Physics::new(config(0), 1);
        assert!(physics.is_empty());
        physics.set_target(Vec3::ONE);
        physics.update(0.016);
        assert!(physics.positions.is_empty());
    }

    #[test]
    fn test_live_config_changes_apply_next_step() {
        let mut physics = Physics::new(config(20), 11);
        physics.config.max_x = 1.5;
        physics.update(0.016);
        for (pos, r) in physics.positions.iter().zip(&physics.sizes) {
            assert!(pos.x.abs() <= (1.5 - r).abs() + EPS);
        }
    }

    proptest! {
        #[test]
        fn prop_bodies_stay_in_box(
            seed in any::<u64>(),
            count in 1usize..40,
            gravity in prop_oneof![Just(0.0f32), 0.1f32..2.0],
            steps in 1usize..60,
            delta in 0.001f32..0.1,
        ) {
            let mut physics = Physics::new(
                BallpitConfig { count, gravity, ..Default::default() },
                seed,
            );
            for _ in 0..steps {
                physics.update(delta);
                assert_contained(&physics);
            }
        }

        #[test]
        fn prop_pair_overlap_is_resolved(
            a in (-3.0f32..3.0, -3.0f32..3.0, -1.0f32..1.0),
            dir in (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0),
            t in 0.01f32..0.99,
            ra in 0.5f32..1.0,
            rb in 0.5f32..1.0,
        ) {
            let dir = Vec3::new(dir.0, dir.1, dir.2);
            prop_assume!(dir.length() > 1e-2);
            let a = Vec3::new(a.0, a.1, a.2);
            let b = a + dir.normalize() * (ra + rb) * t;

            // Walls far away so containment cannot push the pair back together
            let mut physics = Physics::new(
                BallpitConfig {
                    gravity: 0.0,
                    max_x: 50.0,
                    max_y: 50.0,
                    max_z: 50.0,
                    ..config(2)
                },
                0,
            );
            physics.positions = vec![a, b];
            physics.sizes = vec![ra, rb];
            physics.update(0.016);

            let dist = physics.positions[0].distance(physics.positions[1]);
            prop_assert!(dist >= ra + rb - 1e-3, "dist {} < {}", dist, ra + rb);
        }
    }
}
