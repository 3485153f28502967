//! Ballpit - headless runner
//!
//! Runs the physics thread and consumes frames at the display rate, logging
//! what a renderer would draw. An optional first argument names a JSON
//! settings file.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ballpit::{PhysicsLoop, Pipeline, Result, Settings, Simulation};
use env_logger::Env;

/// How long the demo runs
const DEMO_SECONDS: u64 = 10;
/// Display frames the consumer waits before giving up on one
const FRAME_TIMEOUT_PERIODS: u32 = 4;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Ballpit starting...");

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut settings = match std::env::args().nth(1) {
        Some(path) => Settings::load_or_default(path),
        None => Settings::default(),
    };
    settings.clamp_to_launcher_limits();

    let sim = Simulation::from_settings(&settings)?;
    if let Some(seed) = sim.placement().seed {
        log::info!("Placement seed: {seed}");
    }

    let pipeline = Arc::new(Pipeline::new());
    let mut physics = PhysicsLoop::spawn(sim, Arc::clone(&pipeline))?;

    let frame_period = Duration::from_secs_f32(1.0 / settings.display_rate);
    let timeout = frame_period * FRAME_TIMEOUT_PERIODS;
    let deadline = Instant::now() + Duration::from_secs(DEMO_SECONDS);
    let mut frames = 0u64;
    let mut last_report = Instant::now();

    while Instant::now() < deadline {
        let frame_start = Instant::now();

        match pipeline.begin_display(timeout) {
            Some(frame) => {
                // What a renderer would upload as its instance buffer
                let bytes: &[u8] = bytemuck::cast_slice(&frame.bodies);
                frames += 1;

                if last_report.elapsed() >= Duration::from_secs(1) {
                    log::info!(
                        "Frame {}: tick {}, t={:.2}s, {} bodies ({} bytes), {} contacts",
                        frames,
                        frame.tick,
                        frame.sim_time,
                        frame.bodies.len(),
                        bytes.len(),
                        frame.metrics.contacts
                    );
                    last_report = Instant::now();
                }
            }
            None if pipeline.is_shutdown() => break,
            None => log::warn!("No frame within {:?}", timeout),
        }

        let spent = frame_start.elapsed();
        if spent < frame_period {
            std::thread::sleep(frame_period - spent);
        }
    }

    let metrics = physics.metrics();
    let sim = physics.stop()?;

    log::info!(
        "Ran {} ticks ({:.1}s simulated), displayed {} frames, kinetic energy {:.1}",
        sim.tick_count(),
        sim.time(),
        frames,
        sim.kinetic_energy()
    );
    log::info!("Run metrics:\n{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
