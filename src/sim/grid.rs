//! Uniform-cell broad phase
//!
//! The arena is split into `cols × rows` square cells. Each cell holds the ids
//! of the bodies whose (clamped) centre falls inside it. With a cell size of at
//! least twice the largest radius, every overlapping pair sits in the same or
//! an adjacent cell, so a 3×3 block search never misses a contact.

use glam::Vec2;

use super::body::BodyId;
use crate::consts::MAX_GRID_CELLS;

const NO_CELL: u32 = u32::MAX;

/// Broad phase index over body ids
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cols: u32,
    rows: u32,
    /// Row-major cells
    cells: Vec<Vec<BodyId>>,
    /// Cell each body was inserted into (indexed by id)
    body_cells: Vec<u32>,
    len: usize,
}

impl SpatialGrid {
    /// Build an empty grid covering `width × height`.
    ///
    /// Panics if the dimensions or cell size are not positive; callers
    /// validate configuration before building a grid.
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "grid cell size must be positive, got {cell_size}"
        );
        assert!(
            width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0,
            "grid dimensions must be positive, got {width} x {height}"
        );

        let Some((cols, rows, cells)) = Self::layout(width, height, cell_size) else {
            panic!(
                "grid of {width} x {height} with cell size {cell_size} exceeds {MAX_GRID_CELLS} cells"
            );
        };

        Self {
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cells],
            body_cells: Vec::new(),
            len: 0,
        }
    }

    /// Cells needed to cover `width × height`, or `None` past `MAX_GRID_CELLS`
    pub fn cell_count(width: f32, height: f32, cell_size: f32) -> Option<usize> {
        Self::layout(width, height, cell_size).map(|(_, _, cells)| cells)
    }

    fn layout(width: f32, height: f32, cell_size: f32) -> Option<(u32, u32, usize)> {
        let span = |len: f32| {
            let n = (f64::from(len) / f64::from(cell_size)).ceil().max(1.0);
            (n <= f64::from(u32::MAX)).then_some(n as u32)
        };
        let (cols, rows) = (span(width)?, span(height)?);
        let cells = (cols as usize).checked_mul(rows as usize)?;
        (cells <= MAX_GRID_CELLS).then_some((cols, rows, cells))
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of inserted bodies
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cell coordinates for a world position, clamped to the grid.
    ///
    /// Non-finite coordinates land in cell 0 (the float-to-int cast saturates).
    pub fn cell_coords(&self, pos: Vec2) -> (u32, u32) {
        let cx = (pos.x / self.cell_size)
            .floor()
            .clamp(0.0, (self.cols - 1) as f32) as u32;
        let cy = (pos.y / self.cell_size)
            .floor()
            .clamp(0.0, (self.rows - 1) as f32) as u32;
        (cx, cy)
    }

    #[inline]
    fn cell_index(&self, pos: Vec2) -> u32 {
        let (cx, cy) = self.cell_coords(pos);
        cy * self.cols + cx
    }

    /// Remove every body. No-op on an empty grid.
    pub fn clear(&mut self) {
        if self.len == 0 {
            return;
        }
        for cell in &mut self.cells {
            cell.clear();
        }
        self.body_cells.fill(NO_CELL);
        self.len = 0;
    }

    /// Insert a body at its current position. O(1) amortized.
    pub fn insert(&mut self, id: BodyId, pos: Vec2) {
        let cell = self.cell_index(pos);
        let slot = id as usize;
        if slot >= self.body_cells.len() {
            self.body_cells.resize(slot + 1, NO_CELL);
        }
        debug_assert_eq!(self.body_cells[slot], NO_CELL, "body {id} inserted twice");

        self.cells[cell as usize].push(id);
        self.body_cells[slot] = cell;
        self.len += 1;
    }

    /// Cell a body was inserted into, if any
    pub fn cell_of(&self, id: BodyId) -> Option<(u32, u32)> {
        match self.body_cells.get(id as usize) {
            Some(&cell) if cell != NO_CELL => Some((cell % self.cols, cell / self.cols)),
            _ => None,
        }
    }

    /// Ids stored in one cell
    pub fn cell_bodies(&self, cx: u32, cy: u32) -> &[BodyId] {
        if cx >= self.cols || cy >= self.rows {
            return &[];
        }
        &self.cells[(cy * self.cols + cx) as usize]
    }

    /// Row-major indices of the 3×3 block around a cell, trimmed at the edges
    fn block(&self, cx: u32, cy: u32) -> impl Iterator<Item = usize> + use<> {
        let cols = self.cols;
        let x0 = cx.saturating_sub(1);
        let x1 = (cx + 1).min(self.cols - 1);
        let y0 = cy.saturating_sub(1);
        let y1 = (cy + 1).min(self.rows - 1);
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (y * cols + x) as usize))
    }

    /// Candidates in the 3×3 block around the body's cell, excluding itself.
    ///
    /// A superset of the bodies overlapping it. Empty if the body was never
    /// inserted.
    pub fn neighbors(&self, id: BodyId) -> impl Iterator<Item = BodyId> + '_ {
        self.cell_of(id)
            .into_iter()
            .flat_map(move |(cx, cy)| self.block(cx, cy))
            .flat_map(move |cell| self.cells[cell].iter().copied())
            .filter(move |&other| other != id)
    }

    /// Collected form of [`SpatialGrid::neighbors`]
    pub fn query_neighbors(&self, id: BodyId) -> Vec<BodyId> {
        self.neighbors(id).collect()
    }

    /// Ids in the 3×3 block around an arbitrary position
    pub fn near(&self, pos: Vec2) -> impl Iterator<Item = BodyId> + '_ {
        let (cx, cy) = self.cell_coords(pos);
        self.block(cx, cy)
            .flat_map(move |cell| self.cells[cell].iter().copied())
    }
}
