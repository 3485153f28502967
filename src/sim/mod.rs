//! Physics core
//!
//! Body state only changes inside `Simulation::tick`:
//! - Bodies live in an arena indexed by `BodyId`
//! - The grid stores ids, never references to bodies
//! - Pair resolution locks two bodies at a time, lower id first

pub mod body;
pub mod collision;
pub mod grid;
pub mod spawn;
pub mod state;
mod tick;

pub use body::{Body, BodyId, mass_from_radius};
pub use collision::{
    CollisionResult, PairOutcome, circle_collision, confine_to_arena, reflect_velocity, resolve,
};
pub use grid::SpatialGrid;
pub use spawn::{PlacementReport, place_bodies};
pub use state::{ResolveMode, SimConstants, Simulation};
