//! # Spatial Grid
//!
//! Uniform grid over the `(x, y)` plane for one map and one entity kind.
//!
//! ## Layout
//!
//! ```text
//!   cell (-1, 1) │ cell (0, 1) │ cell (1, 1)
//!   ─────────────┼─────────────┼────────────
//!   cell (-1, 0) │ cell (0, 0) │ cell (1, 0)      cell = floor(pos / cell_size)
//!   ─────────────┼─────────────┼────────────
//!   cell (-1,-1) │ cell (0,-1) │ cell (1,-1)
//! ```
//!
//! A radius query visits exactly the cells overlapping the square
//! `[center - r, center + r]`, so a radius up to one cell side touches at
//! most 9 cells. The exact distance test afterwards decides membership;
//! cell boundaries never cause false negatives.
//!
//! Cells keep their storage across [`SpatialGrid::clear`], so a grid that is
//! rebuilt every cycle stops allocating once the world's shape settles.

use std::collections::HashMap;
use std::ops::ControlFlow;

use farsight_shared::{DistanceMetric, Position};

use crate::error::{CacheError, CacheResult};
use crate::snapshot::{EntityId, EntitySnapshot};

/// Integer coordinates of one grid cell.
pub type CellCoord = (i32, i32);

/// Quantizes one axis to a cell index.
///
/// Out-of-range and non-finite inputs saturate (`NaN` maps to cell 0), so
/// a garbage position never panics; it simply never matches a query.
#[inline]
#[must_use]
pub fn quantize(cell_size: f32, value: f32) -> i32 {
    (value / cell_size).floor() as i32
}

/// How many results a radius query may return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultLimit {
    /// Every match.
    #[default]
    Unlimited,
    /// The first `n` matches in scan order; scanning stops once satisfied.
    First(usize),
    /// The `n` closest matches, sorted by distance then id.
    Nearest(usize),
}

/// Parameters of a radius query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadiusQuery {
    /// Query center.
    pub center: Position,
    /// Inclusive radius. Non-positive (or `NaN`) means exact position only.
    pub radius: f32,
}

impl RadiusQuery {
    /// Creates a query.
    #[must_use]
    pub const fn new(center: Position, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Radius clamped to `[0, inf]`.
    #[inline]
    #[must_use]
    pub fn effective_radius(&self) -> f32 {
        if self.radius > 0.0 {
            self.radius
        } else {
            0.0
        }
    }
}

/// Snapshots of one kind on one map, bucketed by cell.
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    /// Side length of a cell.
    cell_size: f32,
    /// Occupied (or recently occupied) cells, in insertion order.
    cells: HashMap<CellCoord, Vec<EntitySnapshot>>,
    /// id -> (cell, slot within cell).
    index: HashMap<EntityId, (CellCoord, usize)>,
}

impl SpatialGrid {
    /// Creates an empty grid.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not a positive finite number.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "Cell size must be positive and finite"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Side length of a cell.
    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of snapshots held.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the grid holds nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `id` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Cell a position falls into.
    #[inline]
    #[must_use]
    pub fn cell_of(&self, position: Position) -> CellCoord {
        (quantize(self.cell_size, position.x), quantize(self.cell_size, position.y))
    }

    /// Number of cells currently holding storage.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Empties the grid for the next build.
    ///
    /// Cells that held data keep their allocation; cells that were already
    /// empty are released so a shrinking world doesn't pin memory forever.
    pub fn clear(&mut self) {
        self.cells.retain(|_, cell| {
            let keep = !cell.is_empty();
            cell.clear();
            keep
        });
        self.index.clear();
    }

    /// Appends a snapshot to its cell.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DuplicateInsert`] if the id is already present.
    pub fn insert(&mut self, snapshot: EntitySnapshot) -> CacheResult<()> {
        if self.index.contains_key(&snapshot.id) {
            return Err(CacheError::DuplicateInsert {
                map: snapshot.map,
                id: snapshot.id,
            });
        }
        let coord = self.cell_of(snapshot.position);
        let cell = self.cells.entry(coord).or_default();
        self.index.insert(snapshot.id, (coord, cell.len()));
        cell.push(snapshot);
        Ok(())
    }

    /// Identity lookup through the side index.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        let &(coord, slot) = self.index.get(&id)?;
        self.cells.get(&coord)?.get(slot)
    }

    /// Iterates every snapshot (unordered across cells).
    pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.cells.values().flatten()
    }

    /// Visits every snapshot within the query radius, with its squared distance.
    ///
    /// Cells are walked row by row, so the visit order is deterministic for a
    /// given grid content. The visitor may stop the scan with `Break`.
    pub fn for_each_within<F>(&self, query: &RadiusQuery, metric: DistanceMetric, mut visit: F) -> ControlFlow<()>
    where
        F: FnMut(&EntitySnapshot, f32) -> ControlFlow<()>,
    {
        if self.is_empty() {
            return ControlFlow::Continue(());
        }

        let radius = query.effective_radius();
        let radius_sq = radius * radius;
        let center = query.center;

        let mut check = |cell: &[EntitySnapshot]| -> ControlFlow<()> {
            for snapshot in cell {
                let dist_sq = metric.distance_squared(center, snapshot.position);
                if dist_sq <= radius_sq {
                    visit(snapshot, dist_sq)?;
                }
            }
            ControlFlow::Continue(())
        };

        // Rounding slack so an entity sitting exactly on the bounding square
        // is never pushed into an unvisited neighbour cell.
        let slack = (center.x.abs().max(center.y.abs()) + radius) * 4.0 * f32::EPSILON;
        let reach = radius + slack;
        let (min_x, max_x) = (
            quantize(self.cell_size, center.x - reach),
            quantize(self.cell_size, center.x + reach),
        );
        let (min_y, max_y) = (
            quantize(self.cell_size, center.y - reach),
            quantize(self.cell_size, center.y + reach),
        );

        let span_x = u64::from(max_x.abs_diff(min_x)) + 1;
        let span_y = u64::from(max_y.abs_diff(min_y)) + 1;
        let range_cells = span_x.saturating_mul(span_y);

        if range_cells > self.cells.len() as u64 {
            // Huge radius: walking the occupied cells is cheaper than the range.
            let mut coords: Vec<&CellCoord> = self
                .cells
                .iter()
                .filter(|(coord, cell)| {
                    let (x, y) = **coord;
                    !cell.is_empty() && (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y)
                })
                .map(|(coord, _)| coord)
                .collect();
            coords.sort_unstable_by_key(|&&(x, y)| (y, x));
            for coord in coords {
                if let Some(cell) = self.cells.get(coord) {
                    check(cell)?;
                }
            }
        } else {
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    if let Some(cell) = self.cells.get(&(x, y)) {
                        check(cell)?;
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MapId;

    fn actor(id: u64, x: f32, y: f32) -> EntitySnapshot {
        EntitySnapshot::actor(EntityId(id), MapId(1), Position::new(x, y, 0.0))
    }

    fn ids_within(grid: &SpatialGrid, center: Position, radius: f32) -> Vec<u64> {
        let mut ids = Vec::new();
        let _ = grid.for_each_within(&RadiusQuery::new(center, radius), DistanceMetric::Spatial, |s, _| {
            ids.push(s.id.0);
            ControlFlow::Continue(())
        });
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(10.0, 0.0), 0);
        assert_eq!(quantize(10.0, 9.99), 0);
        assert_eq!(quantize(10.0, 10.0), 1);
        assert_eq!(quantize(10.0, -0.01), -1);
        assert_eq!(quantize(10.0, f32::NAN), 0);
        assert_eq!(quantize(10.0, f32::INFINITY), i32::MAX);
    }

    #[test]
    fn test_insert_and_get() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(actor(1, 5.0, 5.0)).unwrap();
        grid.insert(actor(2, 15.0, 5.0)).unwrap();
        grid.insert(actor(3, 16.0, 5.0)).unwrap();

        assert_eq!(grid.len(), 3);
        assert_eq!(grid.get(EntityId(3)).map(|s| s.position.x), Some(16.0));
        assert!(grid.get(EntityId(4)).is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(actor(1, 0.0, 0.0)).unwrap();

        let err = grid.insert(actor(1, 50.0, 50.0)).unwrap_err();
        assert_eq!(err, CacheError::DuplicateInsert { map: MapId(1), id: EntityId(1) });
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_cell_edges_are_inclusive() {
        let mut grid = SpatialGrid::new(10.0);
        // Exactly on the radius, exactly on cell boundaries.
        grid.insert(actor(1, 10.0, 0.0)).unwrap();
        grid.insert(actor(2, -10.0, 0.0)).unwrap();
        grid.insert(actor(3, 0.0, 10.0)).unwrap();
        grid.insert(actor(4, 0.0, -10.0)).unwrap();
        grid.insert(actor(5, 10.01, 0.0)).unwrap();

        assert_eq!(ids_within(&grid, Position::ORIGIN, 10.0), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_radius_matches_exact_position_only() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(actor(1, 3.0, 3.0)).unwrap();
        grid.insert(actor(2, 3.0, 3.0)).unwrap();
        grid.insert(actor(3, 3.0, 3.5)).unwrap();

        assert_eq!(ids_within(&grid, Position::new(3.0, 3.0, 0.0), 0.0), vec![1, 2]);
        assert_eq!(ids_within(&grid, Position::new(3.0, 3.0, 0.0), -5.0), vec![1, 2]);
        assert_eq!(ids_within(&grid, Position::new(3.0, 3.0, 0.0), f32::NAN), vec![1, 2]);
    }

    #[test]
    fn test_huge_radius_walks_occupied_cells() {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(actor(1, -1_000_000.0, 0.0)).unwrap();
        grid.insert(actor(2, 1_000_000.0, 1_000_000.0)).unwrap();

        assert_eq!(ids_within(&grid, Position::ORIGIN, f32::INFINITY), vec![1, 2]);
        assert_eq!(ids_within(&grid, Position::ORIGIN, 1_000_001.0), vec![1]);
    }

    #[test]
    fn test_break_stops_scan() {
        let mut grid = SpatialGrid::new(10.0);
        for i in 0..20 {
            grid.insert(actor(i, i as f32, 0.0)).unwrap();
        }
        let mut seen = 0;
        let flow = grid.for_each_within(&RadiusQuery::new(Position::ORIGIN, 100.0), DistanceMetric::Spatial, |_, _| {
            seen += 1;
            if seen == 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_clear_keeps_occupied_cells() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(actor(1, 0.0, 0.0)).unwrap();
        grid.insert(actor(2, 100.0, 0.0)).unwrap();
        assert_eq!(grid.cell_count(), 2);

        grid.clear();
        assert!(grid.is_empty());
        assert_eq!(grid.cell_count(), 2);

        grid.insert(actor(1, 0.0, 0.0)).unwrap();
        grid.clear();
        // The cell at x=100 sat empty for a whole build and is released.
        assert_eq!(grid.cell_count(), 1);
    }
}
