//! # Cache Error Types
//!
//! Everything that can go wrong on the write side of the cache.
//! Readers never see these: queries are total and return empty results instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::snapshot::{EntityId, EntityKind, MapId};

/// Errors raised by an authoritative store while it is being enumerated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store has no loaded instance of this map.
    #[error("map {0} is not loaded")]
    MapUnavailable(MapId),

    /// Enumeration was interrupted by the store.
    #[error("enumeration failed: {0}")]
    Enumeration(String),
}

/// Errors that can occur while building or publishing a generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A build is already running; only one may be in flight.
    #[error("a snapshot build is already in progress")]
    BuildInProgress,

    /// Enumerating the authoritative store failed mid-build.
    #[error("population of map {map} ({kind:?}) failed: {source}")]
    PopulationFailure {
        /// Map being enumerated.
        map: MapId,
        /// Kind being enumerated.
        kind: EntityKind,
        /// Underlying store error.
        source: StoreError,
    },

    /// Two snapshots with the same id were inserted into one build.
    #[error("duplicate entity {id} inserted on map {map}")]
    DuplicateInsert {
        /// Map of the second insert.
        map: MapId,
        /// The repeated id.
        id: EntityId,
    },

    /// A converted snapshot landed outside the map/kind being enumerated.
    #[error("entity {id} converted to {found_kind:?} on map {found_map}, expected {kind:?} on map {map}")]
    MisplacedSnapshot {
        /// The offending entity.
        id: EntityId,
        /// Map being enumerated.
        map: MapId,
        /// Kind being enumerated.
        kind: EntityKind,
        /// Map the snapshot claims.
        found_map: MapId,
        /// Kind the snapshot claims.
        found_kind: EntityKind,
    },
}

impl CacheError {
    /// True for every error that aborts a build without publishing.
    ///
    /// Duplicate and misplaced inserts are conversion bugs but are handled
    /// exactly like store failures: the cycle is dropped and retried.
    #[must_use]
    pub const fn is_population_failure(&self) -> bool {
        matches!(
            self,
            Self::PopulationFailure { .. } | Self::DuplicateInsert { .. } | Self::MisplacedSnapshot { .. }
        )
    }
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
