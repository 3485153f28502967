//! Error taxonomy for the physics core
//!
//! Only configuration and I/O problems surface as errors. Numeric trouble
//! inside a tick is handled locally and reported through `TickMetrics`.

use thiserror::Error;

/// Errors returned by construction, configuration and thread control
#[derive(Debug, Error)]
pub enum SimError {
    #[error("body count {count} is outside 1..={max}")]
    InvalidBodyCount { count: usize, max: usize },

    #[error("arena dimensions must be positive and finite (got {width} x {height})")]
    InvalidArena { width: f32, height: f32 },

    #[error("restitution {0} must be within [0, 1]")]
    InvalidRestitution(f32),

    #[error("gravity {0} must be finite")]
    InvalidGravity(f32),

    #[error("time step {0} must be positive and finite")]
    InvalidTimeStep(f32),

    #[error("substep count must be at least 1")]
    InvalidSubsteps,

    #[error("rate {0} Hz must be positive and finite")]
    InvalidRate(f32),

    #[error("linear damping {0} must be non-negative and finite")]
    InvalidDamping(f32),

    #[error("initial speed {0} must be non-negative and finite")]
    InvalidSpeed(f32),

    #[error("radius range [{min}, {max}] is invalid")]
    InvalidRadius { min: f32, max: f32 },

    #[error("body {index} has invalid radius {radius}")]
    InvalidBodyRadius { index: usize, radius: f32 },

    #[error("arena {width} x {height} cannot hold a body of radius {radius}")]
    ArenaTooSmall { width: f32, height: f32, radius: f32 },

    #[error("arena {width} x {height} needs more than {max_cells} grid cells of size {cell_size}")]
    GridTooLarge {
        width: f32,
        height: f32,
        cell_size: f32,
        max_cells: usize,
    },

    #[error("failed to spawn physics thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("physics thread already stopped")]
    AlreadyStopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
