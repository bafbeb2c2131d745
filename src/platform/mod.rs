//! Platform integration
//!
//! The simulation and lifecycle code is platform-free; this module wires it
//! to a browser page (canvas, observers, input listeners, frame loop).

#[cfg(target_arch = "wasm32")]
pub mod web;
