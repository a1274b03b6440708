//! # FARSIGHT Shared
//!
//! Common types used by the snapshot cache and the hosts that feed it.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the simulation it observes.
//! Positions here are plain values, copied out of the world and never
//! pointing back into it.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{DEFAULT_CELL_SIZE, DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_SEARCH_RADIUS};
pub use math::{DistanceMetric, Position, Vec3};
