//! Deterministic simulation module
//!
//! This module must be pure and deterministic:
//! - One step per call, no substepping
//! - Seeded RNG only
//! - Stable iteration order (by body index)
//! - No rendering or platform dependencies

pub mod gradient;
pub mod physics;

pub use gradient::{Color, ColorGradient};
pub use physics::Physics;
