//! Ballpit entry point
//!
//! On the web this mounts the pink preset on `#canvas`. Natively it runs the
//! simulation headless and logs where the spheres settled.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    use ballpit::platform::web;
    use ballpit::{BallpitConfig, SurfaceOptions};

    web::init_logging();
    log::info!("Ballpit starting...");

    match web::mount_by_id("canvas", BallpitConfig::valentine(), SurfaceOptions::default()).await {
        // Lives for the page
        Ok(handle) => std::mem::forget(handle),
        Err(e) => log::error!("Failed to mount ballpit: {}", e),
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(e) = headless::run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use ballpit::renderer::NullBackend;
    use ballpit::surface::HostMetrics;
    use ballpit::{BallpitConfig, BallpitError, BallpitSurface, SurfaceOptions};

    const FRAMES: u32 = 600;
    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn load_config() -> Result<BallpitConfig, BallpitError> {
        match std::env::args().nth(1) {
            Some(path) => {
                log::info!("Loading config from {}", path);
                let json = std::fs::read_to_string(&path)?;
                Ok(BallpitConfig::from_json(&json)?)
            }
            None => Ok(BallpitConfig::valentine()),
        }
    }

    pub fn run() -> Result<(), BallpitError> {
        let config = load_config()?;
        let options = SurfaceOptions {
            seed: Some(42),
            ..Default::default()
        };
        let mut surface = BallpitSurface::new(config, options, NullBackend::default())?;
        surface.resize(HostMetrics {
            width: 1280.0,
            height: 720.0,
            device_pixel_ratio: 1.0,
        });
        surface.set_intersecting(true, 0.0);

        for frame in 1..=FRAMES {
            surface.tick(frame as f64 * FRAME_MS);
        }

        let physics = &surface.ballpit.physics;
        let lowest = physics
            .positions
            .iter()
            .zip(&physics.sizes)
            .map(|(p, r)| p.y - r)
            .fold(f32::INFINITY, f32::min);
        let mean_speed = physics.velocities.iter().map(|v| v.length()).sum::<f32>()
            / physics.len().max(1) as f32;
        log::info!(
            "{} spheres after {} frames: box {:.2} x {:.2}, lowest edge {:.3}, mean speed {:.4}",
            physics.len(),
            FRAMES,
            physics.config.max_x * 2.0,
            physics.config.max_y * 2.0,
            lowest,
            mean_speed
        );

        surface.dispose();
        Ok(())
    }
}
