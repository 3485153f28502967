//! Fixed-rate physics producer
//!
//! `PhysicsLoop` moves a `Simulation` onto a dedicated thread and ticks it at
//! `1 / dt` Hz with a fixed-step accumulator, publishing a frame after every
//! wake-up that advanced the world. The thread checks its shutdown flag
//! before every tick, so `stop` returns within one tick period and never
//! leaves a tick half applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::consts::{MAX_FRAME_DT, MAX_SUBSTEPS};
use crate::error::{Result, SimError};
use crate::metrics::{RunMetrics, TickMetrics};
use crate::pipeline::{Pipeline, PublishOutcome};
use crate::sim::{SimConstants, Simulation};

/// Interval between producer statistics lines
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// State shared between the handle and the physics thread
struct LoopControl {
    running: AtomicBool,
    paused: AtomicBool,
    /// Constants to apply at the next tick boundary
    pending: Mutex<Option<SimConstants>>,
    metrics: Mutex<RunMetrics>,
    max_radius: f32,
}

/// Handle to a running physics thread
pub struct PhysicsLoop {
    control: Arc<LoopControl>,
    pipeline: Arc<Pipeline>,
    handle: Option<JoinHandle<Simulation>>,
}

impl PhysicsLoop {
    /// Start ticking `sim` on a new thread, publishing into `pipeline`
    pub fn spawn(sim: Simulation, pipeline: Arc<Pipeline>) -> Result<Self> {
        let control = Arc::new(LoopControl {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            pending: Mutex::new(None),
            metrics: Mutex::new(RunMetrics::default()),
            max_radius: sim.max_radius(),
        });

        let handle = thread::Builder::new()
            .name("physics".into())
            .spawn({
                let control = Arc::clone(&control);
                let pipeline = Arc::clone(&pipeline);
                move || run(sim, &control, &pipeline)
            })
            .map_err(SimError::ThreadSpawn)?;

        log::info!("Physics thread started");
        Ok(Self {
            control,
            pipeline,
            handle: Some(handle),
        })
    }

    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::Release);
        log::info!("Physics paused");
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::Release);
        log::info!("Physics resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Queue new constants for the next tick boundary.
    ///
    /// Validated here so the caller sees configuration errors immediately.
    pub fn set_constants(&self, constants: SimConstants) -> Result<()> {
        if self.handle.is_none() {
            return Err(SimError::AlreadyStopped);
        }
        constants.validate_for_radius(self.control.max_radius)?;
        *self.control.pending.lock() = Some(constants);
        Ok(())
    }

    /// Copy of the counters so far
    pub fn metrics(&self) -> RunMetrics {
        self.control.metrics.lock().clone()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Stop the thread and take the simulation back.
    ///
    /// Shuts the pipeline down so a waiting consumer wakes up. A panic on the
    /// physics thread is propagated to the caller.
    pub fn stop(&mut self) -> Result<Simulation> {
        let handle = self.handle.take().ok_or(SimError::AlreadyStopped)?;
        self.control.running.store(false, Ordering::Release);
        self.pipeline.shutdown();

        match handle.join() {
            Ok(sim) => Ok(sim),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for PhysicsLoop {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.control.running.store(false, Ordering::Release);
        self.pipeline.shutdown();
        if handle.join().is_err() {
            log::error!("Physics thread panicked");
        }
    }
}

/// Physics thread body; returns the simulation when told to stop
fn run(mut sim: Simulation, control: &LoopControl, pipeline: &Pipeline) -> Simulation {
    let mut last_time = Instant::now();
    let mut accumulator = 0.0f32;
    let mut stats_since = Instant::now();
    let mut stats_ticks = 0u64;

    while control.running.load(Ordering::Acquire) {
        apply_pending(&mut sim, control);

        let dt = sim.constants().dt;
        let period = Duration::from_secs_f32(dt);
        let now = Instant::now();
        let frame_dt = now.duration_since(last_time).as_secs_f32().min(MAX_FRAME_DT);
        last_time = now;

        if control.paused.load(Ordering::Acquire) {
            accumulator = 0.0;
            thread::sleep(period);
            continue;
        }

        accumulator += frame_dt;

        let mut ticks = 0;
        let mut last = TickMetrics::default();
        while accumulator >= dt && ticks < MAX_SUBSTEPS {
            if !control.running.load(Ordering::Acquire) {
                break;
            }
            last = sim.tick(dt);
            accumulator -= dt;
            ticks += 1;

            if control.metrics.lock().record_tick(&last, period) {
                log::warn!(
                    "Tick {} took {:?} (budget {:?})",
                    sim.tick_count(),
                    last.elapsed,
                    period
                );
            }
        }

        // Spiral-of-death guard: drop the backlog the catch-up limit left
        if ticks == MAX_SUBSTEPS && accumulator >= dt {
            let dropped = (accumulator / dt) as u64;
            accumulator -= dropped as f32 * dt;
            control.metrics.lock().dropped_ticks += dropped;
            log::debug!("Dropped {dropped} backlogged ticks");
        }

        if ticks > 0 {
            let outcome = pipeline.publish(|frame| {
                frame.tick = sim.tick_count();
                frame.sim_time = sim.time();
                frame.metrics = last;
                sim.snapshot_into(&mut frame.bodies);
            });
            control.metrics.lock().record_publish(outcome);
            if outcome == PublishOutcome::Shutdown {
                log::debug!("Pipeline shut down; physics thread exiting");
                break;
            }
        }

        stats_ticks += ticks as u64;
        if stats_since.elapsed() >= STATS_INTERVAL {
            log::debug!(
                "Physics: {} ticks/s, {} bodies, last tick {:?}, {} contacts",
                stats_ticks,
                sim.len(),
                last.elapsed,
                last.contacts
            );
            stats_ticks = 0;
            stats_since = Instant::now();
        }

        let spent = now.elapsed();
        if spent < period {
            thread::sleep(period - spent);
        }
    }

    apply_pending(&mut sim, control);
    log::info!("Physics thread stopped after {} ticks", sim.tick_count());
    sim
}

fn apply_pending(sim: &mut Simulation, control: &LoopControl) {
    let pending = control.pending.lock().take();
    if let Some(constants) = pending {
        match sim.set_constants(constants) {
            Ok(()) => log::info!("Applied new constants at tick {}", sim.tick_count()),
            Err(err) => log::warn!("Rejected constants: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn spawn_small() -> (PhysicsLoop, Arc<Pipeline>) {
        let sim = Simulation::initialize(20, 800.0, 600.0, Some(17)).unwrap();
        let pipeline = Arc::new(Pipeline::new());
        let physics = PhysicsLoop::spawn(sim, Arc::clone(&pipeline)).unwrap();
        (physics, pipeline)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_loop_publishes_frames_and_stops() {
        let (mut physics, pipeline) = spawn_small();

        let frame = pipeline.begin_display(Duration::from_secs(5)).unwrap();
        assert!(frame.tick > 0);
        assert!(!frame.bodies.is_empty());
        assert!(frame.sim_time > 0.0);
        drop(frame);

        let metrics_before_stop = physics.metrics();
        assert!(metrics_before_stop.frames_published >= 1);

        let sim = physics.stop().unwrap();
        assert!(!physics.is_running());
        assert!(pipeline.is_shutdown());
        assert_eq!(physics.metrics().ticks, sim.tick_count());
        assert!(pipeline.begin_display(Duration::ZERO).is_none());
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut physics, _pipeline) = spawn_small();
        assert!(wait_for(|| physics.metrics().ticks > 0));

        physics.pause();
        assert!(physics.is_paused());
        thread::sleep(Duration::from_millis(50));
        let paused_at = physics.metrics().ticks;
        thread::sleep(Duration::from_millis(100));
        assert_eq!(physics.metrics().ticks, paused_at);

        physics.resume();
        assert!(wait_for(|| physics.metrics().ticks > paused_at));
        physics.stop().unwrap();
    }

    #[test]
    fn test_constants_applied_at_tick_boundary() {
        let (mut physics, _pipeline) = spawn_small();

        let bad = SimConstants::new(9.81, 2.0, SIM_DT).with_arena(800.0, 600.0);
        assert!(matches!(
            physics.set_constants(bad),
            Err(SimError::InvalidRestitution(_))
        ));
        let huge = SimConstants::default().with_arena(1e7, 1e7);
        assert!(matches!(
            physics.set_constants(huge),
            Err(SimError::GridTooLarge { .. })
        ));

        let calm = SimConstants::new(0.0, 0.5, SIM_DT).with_arena(800.0, 600.0);
        physics.set_constants(calm).unwrap();
        let start = physics.metrics().ticks;
        assert!(wait_for(|| physics.metrics().ticks > start + 2));

        let sim = physics.stop().unwrap();
        assert_eq!(sim.constants().gravity, 0.0);
        assert_eq!(sim.constants().restitution, 0.5);
    }

    #[test]
    fn test_stop_twice_is_an_error() {
        let (mut physics, _pipeline) = spawn_small();
        physics.stop().unwrap();
        assert!(matches!(physics.stop(), Err(SimError::AlreadyStopped)));
        assert!(matches!(
            physics.set_constants(SimConstants::default()),
            Err(SimError::AlreadyStopped)
        ));
    }

    #[test]
    fn test_drop_stops_thread() {
        let (physics, pipeline) = spawn_small();
        drop(physics);
        assert!(pipeline.is_shutdown());
    }
}
