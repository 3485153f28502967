//! Run configuration
//!
//! Persisted as JSON. Missing fields fall back to their defaults, so a
//! settings file only needs the values it overrides.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Result, SimError};
use crate::sim::SimConstants;

/// Simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Bodies ===
    pub body_count: usize,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Initial velocity components are drawn from ±this
    pub max_initial_speed: f32,
    /// Placement RNG seed; random when absent
    pub seed: Option<u64>,
    pub max_placement_attempts: u32,

    // === Arena ===
    pub arena_width: f32,
    pub arena_height: f32,

    // === Physics ===
    pub gravity: f32,
    pub restitution: f32,
    /// Velocity damping per second (0 = none)
    pub linear_damping: f32,
    pub physics_rate: f32,
    pub substeps: u32,
    pub collisions: bool,
    /// Resolve collisions on the rayon pool
    pub parallel: bool,

    // === Display ===
    pub display_rate: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            body_count: DEFAULT_BODY_COUNT,
            min_radius: MIN_RADIUS,
            max_radius: MAX_RADIUS,
            max_initial_speed: VELOCITY_RANGE,
            seed: None,
            max_placement_attempts: MAX_PLACEMENT_ATTEMPTS,

            arena_width: DEFAULT_WIDTH,
            arena_height: DEFAULT_HEIGHT,

            gravity: GRAVITY,
            restitution: RESTITUTION,
            linear_damping: 0.0,
            physics_rate: PHYSICS_RATE,
            substeps: 1,
            collisions: true,
            parallel: true,

            display_rate: DISPLAY_RATE,
        }
    }
}

impl Settings {
    /// Check every value, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.body_count == 0 || self.body_count > MAX_BODIES {
            return Err(SimError::InvalidBodyCount {
                count: self.body_count,
                max: MAX_BODIES,
            });
        }
        if !(self.min_radius.is_finite()
            && self.max_radius.is_finite()
            && self.min_radius > 0.0
            && self.max_radius >= self.min_radius)
        {
            return Err(SimError::InvalidRadius {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        if !(self.max_initial_speed.is_finite() && self.max_initial_speed >= 0.0) {
            return Err(SimError::InvalidSpeed(self.max_initial_speed));
        }
        if !(self.physics_rate.is_finite() && self.physics_rate > 0.0) {
            return Err(SimError::InvalidRate(self.physics_rate));
        }
        if !(self.display_rate.is_finite() && self.display_rate > 0.0) {
            return Err(SimError::InvalidRate(self.display_rate));
        }

        self.constants().validate_for_radius(self.max_radius)
    }

    /// Physics constants described by these settings
    pub fn constants(&self) -> SimConstants {
        SimConstants {
            gravity: self.gravity,
            restitution: self.restitution,
            dt: 1.0 / self.physics_rate,
            substeps: self.substeps,
            arena: Vec2::new(self.arena_width, self.arena_height),
            linear_damping: self.linear_damping,
            collisions_enabled: self.collisions,
        }
    }

    /// Clamp to the ranges the launcher accepts (3-200 balls, 800x600 minimum)
    pub fn clamp_to_launcher_limits(&mut self) {
        self.body_count = self.body_count.clamp(MIN_BODY_COUNT, MAX_BODY_COUNT);
        self.arena_width = self.arena_width.max(800.0);
        self.arena_height = self.arena_height.max(600.0);
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!(
                    "Using default settings ({}: {})",
                    path.as_ref().display(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}
