//! Body state for the simulation
//!
//! Bodies live in an arena owned by `Simulation`. Everything else refers to
//! them by `BodyId`, which doubles as the index into that arena.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::DENSITY;

/// Stable body handle; equals the body's index and sets lock order
pub type BodyId = u32;

/// Mass of a disc of the given radius
#[inline]
pub fn mass_from_radius(radius: f32) -> f32 {
    DENSITY * std::f32::consts::PI * radius * radius
}

/// A circular rigid body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: BodyId,
    pub pos: Vec2,
    pub vel: Vec2,
    radius: f32,
    mass: f32,
    /// RGBA, passed through to the renderer untouched
    pub color: u32,
}

impl Body {
    /// Create a body; mass is derived from the radius.
    ///
    /// Callers validate the radius first (see `Body::is_valid_radius`).
    pub fn new(id: BodyId, pos: Vec2, vel: Vec2, radius: f32, color: u32) -> Self {
        debug_assert!(Self::is_valid_radius(radius), "invalid radius {radius}");
        Self {
            id,
            pos,
            vel,
            radius,
            mass: mass_from_radius(radius),
            color,
        }
    }

    pub fn is_valid_radius(radius: f32) -> bool {
        radius.is_finite() && radius > 0.0
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        1.0 / self.mass
    }

    #[inline]
    pub fn momentum(&self) -> Vec2 {
        self.vel * self.mass
    }

    #[inline]
    pub fn kinetic_energy(&self) -> f32 {
        0.5 * self.mass * self.vel.length_squared()
    }

    /// Position and velocity are both finite
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite()
    }

    /// Semi-implicit Euler step: gravity into velocity, velocity into position
    pub fn integrate(&mut self, gravity: f32, damping: f32, dt: f32) {
        self.vel.y += gravity * dt;
        if damping > 0.0 {
            self.vel *= (1.0 - damping * dt).max(0.0);
        }
        self.pos += self.vel * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_scales_with_area() {
        let small = Body::new(0, Vec2::ZERO, Vec2::ZERO, 10.0, 0);
        let large = Body::new(1, Vec2::ZERO, Vec2::ZERO, 20.0, 0);
        assert!((large.mass() / small.mass() - 4.0).abs() < 1e-4);
        assert!(small.mass() > 0.0);
    }

    #[test]
    fn test_integrate_applies_gravity_first() {
        let mut body = Body::new(0, Vec2::new(10.0, 10.0), Vec2::new(2.0, 0.0), 5.0, 0);
        body.integrate(10.0, 0.0, 0.5);
        assert_eq!(body.vel, Vec2::new(2.0, 5.0));
        assert_eq!(body.pos, Vec2::new(11.0, 12.5));
    }

    #[test]
    fn test_damping_never_reverses_velocity() {
        let mut body = Body::new(0, Vec2::ZERO, Vec2::new(100.0, 0.0), 5.0, 0);
        body.integrate(0.0, 1000.0, 0.1);
        assert_eq!(body.vel, Vec2::ZERO);
    }

    #[test]
    fn test_is_finite() {
        let mut body = Body::new(0, Vec2::ZERO, Vec2::ZERO, 5.0, 0);
        assert!(body.is_finite());
        body.vel.x = f32::NAN;
        assert!(!body.is_finite());
        assert!(!Body::is_valid_radius(0.0));
        assert!(!Body::is_valid_radius(f32::INFINITY));
    }
}
