//! Collision detection and response
//!
//! Narrow phase for circle pairs and for the four arena walls. Pair response
//! is an impulse along the contact normal followed by a positional correction
//! that pushes the bodies apart, split by inverse mass.

use glam::Vec2;

use super::body::Body;
use crate::consts::{CORRECTION_PERCENT, POSITION_SLOP};

/// Result of a collision check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Unit contact normal, pointing from the first body toward the second
    pub normal: Vec2,
    /// Penetration depth (for position correction)
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// What `resolve` did with a candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Not overlapping
    Miss,
    /// Overlapping but already moving apart; positions corrected only
    Separating,
    /// Approaching; impulse applied and positions corrected
    Resolved,
    /// One of the bodies holds non-finite state
    Skipped,
}

/// Check overlap between two circles
///
/// Coincident centres get a nominal +x normal so the pair still separates.
pub fn circle_collision(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> CollisionResult {
    let delta = pos_b - pos_a;
    let reach = radius_a + radius_b;
    let dist_sq = delta.length_squared();

    if dist_sq >= reach * reach {
        return CollisionResult::miss();
    }

    let dist = dist_sq.sqrt();
    if dist <= f32::EPSILON {
        return CollisionResult {
            hit: true,
            normal: Vec2::X,
            penetration: reach,
        };
    }

    CollisionResult {
        hit: true,
        normal: delta / dist,
        penetration: reach - dist,
    }
}

/// Resolve a broad-phase candidate pair in place
pub fn resolve(a: &mut Body, b: &mut Body, restitution: f32) -> PairOutcome {
    if !a.is_finite() || !b.is_finite() {
        return PairOutcome::Skipped;
    }

    let contact = circle_collision(a.pos, a.radius(), b.pos, b.radius());
    if !contact.hit {
        return PairOutcome::Miss;
    }

    let inv_a = a.inv_mass();
    let inv_b = b.inv_mass();
    let inv_sum = inv_a + inv_b;
    if inv_sum <= f32::EPSILON {
        return PairOutcome::Skipped;
    }

    let normal = contact.normal;
    let approach_speed = (b.vel - a.vel).dot(normal);

    let outcome = if approach_speed < 0.0 {
        let j = -(1.0 + restitution) * approach_speed / inv_sum;
        let impulse = normal * j;
        a.vel -= impulse * inv_a;
        b.vel += impulse * inv_b;
        PairOutcome::Resolved
    } else {
        PairOutcome::Separating
    };

    let depth = (contact.penetration - POSITION_SLOP).max(0.0);
    if depth > 0.0 {
        let correction = normal * (depth / inv_sum * CORRECTION_PERCENT);
        a.pos -= correction * inv_a;
        b.pos += correction * inv_b;
    }

    outcome
}

/// Reflect velocity off a surface with energy loss
///
/// Only the component moving into the surface is reflected and scaled:
/// v' = v - (1 + e)(v·n)n when v·n < 0. With e = 1 this is the mirror
/// reflection v - 2(v·n)n.
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2, restitution: f32) -> Vec2 {
    let into = velocity.dot(normal);
    if into >= 0.0 {
        return velocity;
    }
    velocity - (1.0 + restitution) * into * normal
}

/// Clamp a body into `[r, w - r] × [r, h - r]`, reflecting off any wall hit.
///
/// Returns true if a wall was touched.
pub fn confine_to_arena(body: &mut Body, arena: Vec2, restitution: f32) -> bool {
    let r = body.radius();
    let mut hit = false;

    if body.pos.x - r < 0.0 {
        body.pos.x = r;
        body.vel = reflect_velocity(body.vel, Vec2::X, restitution);
        hit = true;
    } else if body.pos.x + r > arena.x {
        body.pos.x = arena.x - r;
        body.vel = reflect_velocity(body.vel, Vec2::NEG_X, restitution);
        hit = true;
    }

    if body.pos.y - r < 0.0 {
        body.pos.y = r;
        body.vel = reflect_velocity(body.vel, Vec2::Y, restitution);
        hit = true;
    } else if body.pos.y + r > arena.y {
        body.pos.y = arena.y - r;
        body.vel = reflect_velocity(body.vel, Vec2::NEG_Y, restitution);
        hit = true;
    }

    hit
}
