//! Simulation state and core types
//!
//! `Simulation` owns the body arena, the broad phase grid and the active
//! constants. Each body sits behind its own `Mutex` so the narrow phase can
//! run on the rayon pool; everything else is plain owned data mutated only
//! through `&mut self`.

use glam::Vec2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::body::{Body, BodyId};
use super::grid::SpatialGrid;
use super::spawn::{PlacementReport, place_bodies};
use crate::consts::*;
use crate::error::{Result, SimError};
use crate::settings::Settings;
use crate::snapshot::BodyInstance;

/// How the per-body phases and the narrow phase are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveMode {
    /// Rayon pool, per-body locks taken in id order
    #[default]
    Parallel,
    /// Single thread, ascending id order
    Sequential,
}

/// Physics constants, read at the start of every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimConstants {
    /// Downward acceleration (+y is down)
    pub gravity: f32,
    pub restitution: f32,
    /// Default step used by `Simulation::step`
    pub dt: f32,
    /// Equal substeps each tick is split into
    pub substeps: u32,
    /// Arena size; the arena spans `[0, arena.x] × [0, arena.y]`
    pub arena: Vec2,
    pub linear_damping: f32,
    pub collisions_enabled: bool,
}

impl Default for SimConstants {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            restitution: RESTITUTION,
            dt: SIM_DT,
            substeps: 1,
            arena: Vec2::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            linear_damping: 0.0,
            collisions_enabled: true,
        }
    }
}

impl SimConstants {
    pub fn new(gravity: f32, restitution: f32, dt: f32) -> Self {
        Self {
            gravity,
            restitution,
            dt,
            ..Default::default()
        }
    }

    pub fn with_arena(mut self, width: f32, height: f32) -> Self {
        self.arena = Vec2::new(width, height);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let Vec2 { x: width, y: height } = self.arena;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(SimError::InvalidArena { width, height });
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(SimError::InvalidRestitution(self.restitution));
        }
        if !self.gravity.is_finite() {
            return Err(SimError::InvalidGravity(self.gravity));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidTimeStep(self.dt));
        }
        if self.substeps == 0 {
            return Err(SimError::InvalidSubsteps);
        }
        if !(self.linear_damping.is_finite() && self.linear_damping >= 0.0) {
            return Err(SimError::InvalidDamping(self.linear_damping));
        }
        Ok(())
    }

    /// `validate`, plus the arena must fit a body of `radius` and its grid
    /// must stay within `MAX_GRID_CELLS`
    pub fn validate_for_radius(&self, radius: f32) -> Result<()> {
        self.validate()?;
        if 2.0 * radius > self.arena.x || 2.0 * radius > self.arena.y {
            return Err(SimError::ArenaTooSmall {
                width: self.arena.x,
                height: self.arena.y,
                radius,
            });
        }
        let cell_size = cell_size_for(radius);
        if SpatialGrid::cell_count(self.arena.x, self.arena.y, cell_size).is_none() {
            return Err(SimError::GridTooLarge {
                width: self.arena.x,
                height: self.arena.y,
                cell_size,
                max_cells: MAX_GRID_CELLS,
            });
        }
        Ok(())
    }
}

/// Grid cell edge for a given largest radius
#[inline]
fn cell_size_for(max_radius: f32) -> f32 {
    2.0 * max_radius
}

/// The physics world
#[derive(Debug)]
pub struct Simulation {
    pub(super) bodies: Vec<Mutex<Body>>,
    pub(super) grid: SpatialGrid,
    pub(super) constants: SimConstants,
    pub(super) mode: ResolveMode,
    /// Last finite (position, velocity) of each body
    pub(super) checkpoints: Vec<(Vec2, Vec2)>,
    pub(super) time: f64,
    pub(super) ticks: u64,
    max_radius: f32,
    placement: PlacementReport,
}

impl Simulation {
    /// Place `num_bodies` bodies in a `width × height` arena with default
    /// physics constants.
    pub fn initialize(num_bodies: usize, width: f32, height: f32, seed: Option<u64>) -> Result<Self> {
        let settings = Settings {
            body_count: num_bodies,
            arena_width: width,
            arena_height: height,
            seed,
            ..Default::default()
        };
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let (bodies, placement) = place_bodies(settings);
        let mode = if settings.parallel {
            ResolveMode::Parallel
        } else {
            ResolveMode::Sequential
        };
        Ok(Self::build(
            settings.constants(),
            bodies,
            settings.max_radius,
            mode,
            placement,
        ))
    }

    /// Build from explicit bodies. Ids are reassigned to match their index.
    pub fn with_bodies(constants: SimConstants, mut bodies: Vec<Body>) -> Result<Self> {
        if bodies.is_empty() || bodies.len() > MAX_BODIES {
            return Err(SimError::InvalidBodyCount {
                count: bodies.len(),
                max: MAX_BODIES,
            });
        }

        let mut max_radius = 0.0f32;
        for (index, body) in bodies.iter_mut().enumerate() {
            let radius = body.radius();
            if !Body::is_valid_radius(radius) {
                return Err(SimError::InvalidBodyRadius { index, radius });
            }
            max_radius = max_radius.max(radius);
            body.id = index as BodyId;
        }
        constants.validate_for_radius(max_radius)?;

        let placement = PlacementReport {
            requested: bodies.len(),
            placed: bodies.len(),
            skipped: 0,
            seed: None,
        };
        Ok(Self::build(
            constants,
            bodies,
            max_radius,
            ResolveMode::default(),
            placement,
        ))
    }

    fn build(
        constants: SimConstants,
        bodies: Vec<Body>,
        max_radius: f32,
        mode: ResolveMode,
        placement: PlacementReport,
    ) -> Self {
        let grid = SpatialGrid::new(constants.arena.x, constants.arena.y, cell_size_for(max_radius));
        let checkpoints = bodies.iter().map(|b| (b.pos, b.vel)).collect();

        log::info!(
            "Simulation initialized: {}/{} bodies, arena {}x{}, {}x{} grid cells of {:.1}, {:?} resolve",
            placement.placed,
            placement.requested,
            constants.arena.x,
            constants.arena.y,
            grid.cols(),
            grid.rows(),
            grid.cell_size(),
            mode
        );

        Self {
            bodies: bodies.into_iter().map(Mutex::new).collect(),
            grid,
            constants,
            mode,
            checkpoints,
            time: 0.0,
            ticks: 0,
            max_radius,
            placement,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn constants(&self) -> &SimConstants {
        &self.constants
    }

    /// Replace the physics constants. Takes effect on the next tick.
    ///
    /// An arena change rebuilds the grid; bodies outside the new bounds are
    /// pulled back in by the next tick's confinement.
    pub fn set_constants(&mut self, constants: SimConstants) -> Result<()> {
        constants.validate_for_radius(self.max_radius)?;

        if constants.arena != self.constants.arena {
            self.grid = SpatialGrid::new(
                constants.arena.x,
                constants.arena.y,
                cell_size_for(self.max_radius),
            );
            log::info!("Arena resized to {}x{}", constants.arena.x, constants.arena.y);
        }
        self.constants = constants;
        Ok(())
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    pub fn set_resolve_mode(&mut self, mode: ResolveMode) {
        self.mode = mode;
    }

    /// How many requested bodies were actually placed
    pub fn placement(&self) -> &PlacementReport {
        &self.placement
    }

    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Broad phase as of the last collision pass
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Simulated seconds elapsed
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn body(&self, id: BodyId) -> Option<Body> {
        self.bodies.get(id as usize).map(|body| body.lock().clone())
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id as usize).map(Mutex::get_mut)
    }

    pub fn bodies(&self) -> Vec<Body> {
        self.bodies.iter().map(|body| body.lock().clone()).collect()
    }

    /// Render records for every body, in id order
    pub fn snapshot(&self) -> Vec<BodyInstance> {
        let mut out = Vec::with_capacity(self.bodies.len());
        self.snapshot_into(&mut out);
        out
    }

    /// `snapshot` into a reused buffer
    pub fn snapshot_into(&self, out: &mut Vec<BodyInstance>) {
        out.clear();
        out.extend(self.bodies.iter().map(|body| BodyInstance::from(&*body.lock())));
    }

    pub fn total_momentum(&self) -> Vec2 {
        self.bodies.iter().map(|body| body.lock().momentum()).sum()
    }

    pub fn kinetic_energy(&self) -> f32 {
        self.bodies.iter().map(|body| body.lock().kinetic_energy()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_constants() -> SimConstants {
        SimConstants::new(0.0, 1.0, SIM_DT).with_arena(800.0, 600.0)
    }

    #[test]
    fn test_initialize_places_bodies_in_bounds() {
        let sim = Simulation::initialize(40, 800.0, 600.0, Some(11)).unwrap();
        let report = sim.placement();
        assert_eq!(report.requested, 40);
        assert_eq!(report.placed + report.skipped, 40);
        assert_eq!(sim.len(), report.placed);
        assert_eq!(report.seed, Some(11));

        for (index, body) in sim.bodies().iter().enumerate() {
            assert_eq!(body.id as usize, index);
            let r = body.radius();
            assert!(body.pos.x >= r && body.pos.x <= 800.0 - r);
            assert!(body.pos.y >= r && body.pos.y <= 600.0 - r);
        }
    }

    #[test]
    fn test_initialize_rejects_bad_configuration() {
        assert!(matches!(
            Simulation::initialize(0, 800.0, 600.0, None),
            Err(SimError::InvalidBodyCount { .. })
        ));
        assert!(matches!(
            Simulation::initialize(10, -800.0, 600.0, None),
            Err(SimError::InvalidArena { .. })
        ));
        assert!(matches!(
            Simulation::initialize(10, 800.0, f32::NAN, None),
            Err(SimError::InvalidArena { .. })
        ));
    }

    #[test]
    fn test_constants_validation() {
        assert!(SimConstants::default().validate().is_ok());
        assert!(matches!(
            SimConstants::new(9.81, -0.1, SIM_DT).validate(),
            Err(SimError::InvalidRestitution(_))
        ));
        assert!(matches!(
            SimConstants::new(f32::INFINITY, 0.5, SIM_DT).validate(),
            Err(SimError::InvalidGravity(_))
        ));
        assert!(matches!(
            SimConstants::new(9.81, 0.5, 0.0).validate(),
            Err(SimError::InvalidTimeStep(_))
        ));

        let no_substeps = SimConstants {
            substeps: 0,
            ..Default::default()
        };
        assert!(matches!(no_substeps.validate(), Err(SimError::InvalidSubsteps)));

        let tiny = SimConstants::default().with_arena(30.0, 600.0);
        assert!(matches!(
            tiny.validate_for_radius(20.0),
            Err(SimError::ArenaTooSmall { .. })
        ));
    }

    #[test]
    fn test_with_bodies_reassigns_ids() {
        let bodies = vec![
            Body::new(42, Vec2::new(100.0, 100.0), Vec2::ZERO, 10.0, 0),
            Body::new(7, Vec2::new(200.0, 100.0), Vec2::ZERO, 20.0, 0),
        ];
        let sim = Simulation::with_bodies(pair_constants(), bodies).unwrap();
        assert_eq!(sim.body(0).unwrap().radius(), 10.0);
        assert_eq!(sim.body(1).unwrap().id, 1);
        assert_eq!(sim.max_radius(), 20.0);
        assert_eq!(sim.grid().cell_size(), 40.0);
        assert!(sim.body(2).is_none());

        assert!(Simulation::with_bodies(pair_constants(), Vec::new()).is_err());
    }

    #[test]
    fn test_with_bodies_names_bad_radius() {
        let good = Body::new(0, Vec2::new(100.0, 100.0), Vec2::ZERO, 10.0, 0);
        let mut value = serde_json::to_value(&good).unwrap();
        value["radius"] = serde_json::json!(-1.0);
        let bad: Body = serde_json::from_value(value).unwrap();

        let result = Simulation::with_bodies(pair_constants(), vec![good, bad]);
        assert!(matches!(
            result,
            Err(SimError::InvalidBodyRadius { index: 1, radius }) if radius == -1.0
        ));
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let huge = SimConstants::new(0.0, 1.0, SIM_DT).with_arena(100_000.0, 100_000.0);
        assert!(matches!(
            huge.validate_for_radius(0.5),
            Err(SimError::GridTooLarge { .. })
        ));

        let bodies = vec![Body::new(0, Vec2::new(50.0, 50.0), Vec2::ZERO, 0.5, 0)];
        assert!(matches!(
            Simulation::with_bodies(huge, bodies),
            Err(SimError::GridTooLarge { .. })
        ));

        // Enlarging the arena later goes through the same check
        let mut sim = Simulation::initialize(10, 800.0, 600.0, Some(3)).unwrap();
        let enlarged = SimConstants::default().with_arena(1e7, 1e7);
        assert!(matches!(
            sim.set_constants(enlarged),
            Err(SimError::GridTooLarge { .. })
        ));
        assert_eq!(sim.constants().arena, Vec2::new(800.0, 600.0));
    }

    #[test]
    fn test_set_constants() {
        let mut sim = Simulation::initialize(10, 800.0, 600.0, Some(3)).unwrap();

        let bad = SimConstants::new(9.81, 1.5, SIM_DT).with_arena(800.0, 600.0);
        assert!(sim.set_constants(bad).is_err());
        assert_eq!(sim.constants().restitution, RESTITUTION);

        let resized = SimConstants::new(0.0, 0.5, SIM_DT).with_arena(1600.0, 600.0);
        sim.set_constants(resized).unwrap();
        assert_eq!(sim.constants().gravity, 0.0);
        assert_eq!(sim.grid().cols(), (1600.0 / (2.0 * MAX_RADIUS)).ceil() as u32);
    }

    #[test]
    fn test_snapshot_matches_bodies() {
        let sim = Simulation::initialize(12, 800.0, 600.0, Some(5)).unwrap();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.len(), sim.len());
        for (instance, body) in snapshot.iter().zip(sim.bodies()) {
            assert_eq!(instance.pos(), body.pos);
            assert_eq!(instance.radius, body.radius());
            assert_eq!(instance.color, body.color);
        }

        let mut reused = vec![BodyInstance::new(0.0, 0.0, 1.0, 0); 100];
        sim.snapshot_into(&mut reused);
        assert_eq!(reused, snapshot);
    }

    #[test]
    fn test_momentum_and_energy() {
        let bodies = vec![
            Body::new(0, Vec2::new(100.0, 100.0), Vec2::new(10.0, 0.0), 10.0, 0),
            Body::new(1, Vec2::new(300.0, 100.0), Vec2::new(-10.0, 0.0), 10.0, 0),
        ];
        let sim = Simulation::with_bodies(pair_constants(), bodies).unwrap();
        assert!(sim.total_momentum().length() < 1e-6);

        let mass = crate::sim::mass_from_radius(10.0);
        assert!((sim.kinetic_energy() - 100.0 * mass).abs() < 1e-3);
    }
}
