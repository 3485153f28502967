//! Ballpit - parallel bouncing-ball physics core
//!
//! Core modules:
//! - `sim`: Bodies, broad phase grid, narrow phase resolver and the tick loop
//! - `pipeline`: Double-buffered hand-off between physics and a renderer
//! - `scheduler`: Fixed-rate physics producer thread
//! - `settings`: Data-driven run configuration (JSON)
//! - `snapshot`: Render-ready body records

pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod settings;
pub mod sim;
pub mod snapshot;

pub use error::{Result, SimError};
pub use glam::Vec2;
pub use metrics::{RunMetrics, TickMetrics};
pub use pipeline::{DisplayFrame, Frame, FrameState, Pipeline, PublishOutcome};
pub use scheduler::PhysicsLoop;
pub use settings::Settings;
pub use sim::{Body, BodyId, PlacementReport, ResolveMode, SimConstants, Simulation};
pub use snapshot::BodyInstance;

/// Simulation configuration constants
pub mod consts {
    /// Physics rate (Hz)
    pub const PHYSICS_RATE: f32 = 240.0;
    /// Fixed simulation timestep
    pub const SIM_DT: f32 = 1.0 / PHYSICS_RATE;
    /// Display rate the consumer aims for (Hz)
    pub const DISPLAY_RATE: f32 = 60.0;
    /// Maximum catch-up ticks per producer wake-up to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Longest wall-clock gap fed into the accumulator (seconds)
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Gravity (pixels/s², +y is down)
    pub const GRAVITY: f32 = 9.81;
    /// Default coefficient of restitution
    pub const RESTITUTION: f32 = 0.8;

    /// Arena defaults
    pub const DEFAULT_WIDTH: f32 = 1400.0;
    pub const DEFAULT_HEIGHT: f32 = 900.0;

    /// Ball defaults
    pub const MIN_BODY_COUNT: usize = 3;
    pub const MAX_BODY_COUNT: usize = 200;
    pub const DEFAULT_BODY_COUNT: usize = 50;
    pub const MIN_RADIUS: f32 = 15.0;
    pub const MAX_RADIUS: f32 = 25.0;
    pub const VELOCITY_RANGE: f32 = 100.0;

    /// Hard ceiling on bodies the core accepts
    pub const MAX_BODIES: usize = 100_000;
    /// Hard ceiling on broad phase cells; larger arenas need larger bodies
    pub const MAX_GRID_CELLS: usize = 1 << 22;
    /// Mass per unit area (mass = DENSITY * π r²)
    pub const DENSITY: f32 = 0.01;

    /// Spawned bodies keep at least this multiple of their combined radii apart
    pub const MIN_DISTANCE_FACTOR: f32 = 1.1;
    /// Placement attempts per body before it is skipped
    pub const MAX_PLACEMENT_ATTEMPTS: u32 = 100;

    /// Penetration depth tolerated without positional correction
    pub const POSITION_SLOP: f32 = 0.01;
    /// Fraction of penetration removed per resolution
    pub const CORRECTION_PERCENT: f32 = 0.8;
}
