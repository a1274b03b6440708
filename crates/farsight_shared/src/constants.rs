//! # Cache Tuning Constants
//!
//! Defaults used when the configuration file leaves a value unset.

// =============================================================================
// REFRESH CADENCE
// =============================================================================

/// Default interval between snapshot rebuilds, in milliseconds.
///
/// This is also the staleness bound seen by readers.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 100;

// =============================================================================
// SPATIAL PARTITIONING
// =============================================================================

/// Default side length of one grid cell, in world units.
///
/// Sized so a query with a radius up to one cell side touches at most 9 cells.
pub const DEFAULT_CELL_SIZE: f32 = 64.0;

/// Default radius used by nearest-entity lookups that don't pass one.
pub const DEFAULT_SEARCH_RADIUS: f32 = 100.0;
