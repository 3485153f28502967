//! Initial body placement
//!
//! Rejection sampling: each body draws up to `max_placement_attempts` random
//! positions and keeps the first one that clears every placed body by
//! `MIN_DISTANCE_FACTOR` times their combined radii. A body that never finds
//! room is skipped and counted, never retried forever.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::body::{Body, BodyId};
use super::grid::SpatialGrid;
use crate::consts::MIN_DISTANCE_FACTOR;
use crate::settings::Settings;
use crate::snapshot::colors::PALETTE;

/// Outcome of initial placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementReport {
    pub requested: usize,
    pub placed: usize,
    /// Bodies dropped after exhausting their attempts
    pub skipped: usize,
    /// Seed the placement RNG ran with
    pub seed: Option<u64>,
}

/// Place `settings.body_count` non-overlapping bodies.
///
/// Settings are expected to be validated. Ids are contiguous from 0 in
/// placement order; skipped bodies do not consume an id.
pub fn place_bodies(settings: &Settings) -> (Vec<Body>, PlacementReport) {
    let seed = settings.seed.unwrap_or_else(rand::random);
    let mut rng = Pcg32::seed_from_u64(seed);
    log::debug!("Placement seed {seed}");

    let arena = Vec2::new(settings.arena_width, settings.arena_height);
    let (min_radius, max_radius) = (settings.min_radius, settings.max_radius);
    let speed = settings.max_initial_speed;
    let attempts = settings.max_placement_attempts.max(1);

    // Cells wide enough that any rejecting neighbour is in the 3x3 block
    let mut grid = SpatialGrid::new(arena.x, arena.y, 2.0 * max_radius * MIN_DISTANCE_FACTOR);
    let mut bodies: Vec<Body> = Vec::with_capacity(settings.body_count);
    let mut skipped = 0;

    'bodies: for _ in 0..settings.body_count {
        let radius = rng.random_range(min_radius..=max_radius);

        for _ in 0..attempts {
            let pos = Vec2::new(
                rng.random_range(radius..=arena.x - radius),
                rng.random_range(radius..=arena.y - radius),
            );

            let clear = grid.near(pos).all(|other| {
                let other = &bodies[other as usize];
                other.pos.distance(pos) >= MIN_DISTANCE_FACTOR * (radius + other.radius())
            });
            if !clear {
                continue;
            }

            let id = bodies.len() as BodyId;
            let vel = Vec2::new(
                rng.random_range(-speed..=speed),
                rng.random_range(-speed..=speed),
            );
            let color = PALETTE[rng.random_range(0..PALETTE.len())];

            grid.insert(id, pos);
            bodies.push(Body::new(id, pos, vel, radius, color));
            continue 'bodies;
        }

        skipped += 1;
    }

    if skipped > 0 {
        log::warn!(
            "{} of {} bodies not placed after {} attempts each",
            skipped,
            settings.body_count,
            attempts
        );
    }

    let report = PlacementReport {
        requested: settings.body_count,
        placed: bodies.len(),
        skipped,
        seed: Some(seed),
    };
    (bodies, report)
}
