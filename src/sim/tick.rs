//! Fixed timestep simulation tick
//!
//! Each substep runs its phases strictly in order, each one finishing for
//! every body before the next begins:
//! 1. Integrate and confine every body (data parallel, no locks)
//! 2. Rebuild the broad phase grid
//! 3. Resolve candidate pairs, each unordered pair once, locking by id
//! 4. Confine again and repair bodies left with non-finite state
//!
//! Every sanitize pass also records each finite body as its checkpoint, the
//! state a later non-finite body is rolled back to.

use std::iter::Sum;
use std::ops::Add;
use std::time::Instant;

use glam::Vec2;
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;

use super::body::{Body, BodyId};
use super::collision::{PairOutcome, confine_to_arena, resolve};
use super::state::{ResolveMode, SimConstants, Simulation};
use crate::metrics::TickMetrics;

/// Bodies repaired by one sanitize pass
#[derive(Debug, Clone, Copy, Default)]
struct Repair {
    restored: u32,
    reset: u32,
}

impl Add for Repair {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            restored: self.restored + other.restored,
            reset: self.reset + other.reset,
        }
    }
}

impl Sum for Repair {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Simulation {
    /// Advance by the configured `dt`
    pub fn step(&mut self) -> TickMetrics {
        self.tick(self.constants.dt)
    }

    /// Advance by `dt` seconds, split into `constants.substeps` equal steps.
    ///
    /// Never fails. A non-finite or non-positive `dt` is logged and ignored.
    pub fn tick(&mut self, dt: f32) -> TickMetrics {
        let mut metrics = TickMetrics::default();
        if !(dt.is_finite() && dt > 0.0) {
            log::warn!("Ignoring tick with invalid dt {dt}");
            return metrics;
        }

        let start = Instant::now();
        let substeps = self.constants.substeps.max(1);
        let h = dt / substeps as f32;
        for _ in 0..substeps {
            self.substep(h, &mut metrics);
        }

        metrics.substeps = substeps;
        metrics.elapsed = start.elapsed();
        self.time += dt as f64;
        self.ticks += 1;

        log::trace!(
            "Tick {}: {} pairs, {} contacts, {} wall hits in {:?}",
            self.ticks,
            metrics.candidate_pairs,
            metrics.contacts,
            metrics.wall_hits,
            metrics.elapsed
        );
        metrics
    }

    fn substep(&mut self, dt: f32, metrics: &mut TickMetrics) {
        let SimConstants {
            gravity,
            restitution,
            arena,
            linear_damping,
            collisions_enabled,
            ..
        } = self.constants;

        metrics.wall_hits += self.map_bodies(|body, _| {
            body.integrate(gravity, linear_damping, dt);
            confine_to_arena(body, arena, restitution) as u64
        });
        self.sanitize(metrics);

        if !collisions_enabled {
            return;
        }

        self.rebuild_grid();
        metrics.accumulate(&self.resolve_pairs());

        metrics.wall_hits += self.map_bodies(|body, _| confine_to_arena(body, arena, restitution) as u64);
        self.sanitize(metrics);
    }

    /// Run `f` over every body and its checkpoint, summing the results
    fn map_bodies<R, F>(&mut self, f: F) -> R
    where
        R: Send + Sum<R>,
        F: Fn(&mut Body, &mut (Vec2, Vec2)) -> R + Send + Sync,
    {
        match self.mode {
            ResolveMode::Parallel => self
                .bodies
                .par_iter_mut()
                .zip(self.checkpoints.par_iter_mut())
                .map(|(body, checkpoint)| f(body.get_mut(), checkpoint))
                .sum(),
            ResolveMode::Sequential => self
                .bodies
                .iter_mut()
                .zip(self.checkpoints.iter_mut())
                .map(|(body, checkpoint)| f(body.get_mut(), checkpoint))
                .sum(),
        }
    }

    fn sanitize(&mut self, metrics: &mut TickMetrics) {
        let arena = self.constants.arena;
        let repair: Repair = self.map_bodies(|body, checkpoint| repair_body(body, checkpoint, arena));
        metrics.bodies_restored += repair.restored;
        metrics.bodies_reset += repair.reset;
    }

    fn rebuild_grid(&mut self) {
        self.grid.clear();
        for (id, body) in self.bodies.iter_mut().enumerate() {
            self.grid.insert(id as BodyId, body.get_mut().pos);
        }
    }

    fn resolve_pairs(&self) -> TickMetrics {
        let count = self.bodies.len() as BodyId;
        match self.mode {
            ResolveMode::Parallel => (0..count)
                .into_par_iter()
                .map(|id| self.resolve_body(id))
                .reduce(TickMetrics::default, TickMetrics::merged),
            ResolveMode::Sequential => (0..count)
                .map(|id| self.resolve_body(id))
                .fold(TickMetrics::default(), TickMetrics::merged),
        }
    }

    /// Resolve `id` against each higher-id neighbour
    fn resolve_body(&self, id: BodyId) -> TickMetrics {
        let restitution = self.constants.restitution;
        let mut metrics = TickMetrics::default();

        for other in self.grid.neighbors(id).filter(|&other| other > id) {
            metrics.candidate_pairs += 1;

            let (mut a, mut b) = self.lock_pair(id, other);
            match resolve(&mut a, &mut b, restitution) {
                PairOutcome::Miss => {}
                PairOutcome::Separating => metrics.contacts += 1,
                PairOutcome::Resolved => {
                    metrics.contacts += 1;
                    metrics.impulses += 1;
                }
                PairOutcome::Skipped => metrics.skipped_pairs += 1,
            }
        }

        metrics
    }

    /// Lock two bodies, lower id first
    fn lock_pair(&self, lo: BodyId, hi: BodyId) -> (MutexGuard<'_, Body>, MutexGuard<'_, Body>) {
        assert!(lo < hi, "body lock order violated: {lo} before {hi}");
        let first = lock_body(&self.bodies, lo);
        let second = lock_body(&self.bodies, hi);
        (first, second)
    }
}

#[inline]
fn lock_body(bodies: &[Mutex<Body>], id: BodyId) -> MutexGuard<'_, Body> {
    bodies[id as usize].lock()
}

/// Record a finite body as its new checkpoint, or put a non-finite one back
/// to the checkpoint (the arena centre if the checkpoint is unusable)
fn repair_body(body: &mut Body, checkpoint: &mut (Vec2, Vec2), arena: Vec2) -> Repair {
    if body.is_finite() {
        *checkpoint = (body.pos, body.vel);
        return Repair::default();
    }

    let (pos, vel) = *checkpoint;
    let r = body.radius();
    let usable = pos.is_finite()
        && vel.is_finite()
        && pos.x >= r
        && pos.x <= arena.x - r
        && pos.y >= r
        && pos.y <= arena.y - r;

    if usable {
        log::warn!("Body {} went non-finite; restored last valid state", body.id);
        body.pos = pos;
        body.vel = vel;
        Repair {
            restored: 1,
            reset: 0,
        }
    } else {
        log::warn!("Body {} went non-finite; reset to arena centre", body.id);
        body.pos = arena * 0.5;
        body.vel = Vec2::ZERO;
        *checkpoint = (body.pos, body.vel);
        Repair {
            restored: 0,
            reset: 1,
        }
    }
}
