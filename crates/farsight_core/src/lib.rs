//! # FARSIGHT Core
//!
//! Concurrent spatial snapshot cache for bot worker tasks:
//! - Any number of readers, none of which ever waits on a lock
//! - One scheduler rebuilding the whole world copy every refresh interval
//! - Every query answered from one consistent generation, at most one
//!   interval stale
//!
//! ## Architecture Rules
//!
//! 1. **Workers never touch the authoritative store** - they only see snapshots
//! 2. **Push, never pull** - queries never trigger a refresh
//! 3. **Publish is one atomic store** - no query can mix two generations
//!
//! ## Example
//!
//! ```rust,ignore
//! use farsight_core::{CacheConfig, DoubleBufferedSnapshots, QueryService, UpdateScheduler};
//!
//! let config = CacheConfig::load("farsight.toml")?;
//! let buffers = DoubleBufferedSnapshots::from_config(&config)?;
//! let scheduler = UpdateScheduler::new(Arc::clone(&buffers), world, config.clone());
//! let queries = QueryService::new(buffers, &config);
//!
//! // Host loop, every 100 ms
//! scheduler.tick(Instant::now());
//!
//! // Any worker, any time
//! let target = queries.find_nearest(map, bot.position, KindSet::ALL, |s| s.alive);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod generation;
pub mod grid;
pub mod query;
pub mod refresh;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use config::{CacheConfig, MapOverride};
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use generation::{BufferState, GenerationBuffer, GenerationId, MapLayer};
pub use grid::{RadiusQuery, ResultLimit, SpatialGrid};
pub use query::QueryService;
pub use refresh::{RefreshLoop, RefreshStats};
pub use scheduler::{SchedulerState, SchedulerStats, TickOutcome, UpdateScheduler};
pub use snapshot::{EntityId, EntityKind, EntitySnapshot, FactionTag, KindSet, MapId, SnapshotDetail, SpellId};
pub use store::{AuthoritativeStore, EntityVisitor, MemoryStore};
pub use sync::{DoubleBufferedSnapshots, ReadHandle, StagingHandle};

pub use farsight_shared::{DistanceMetric, Position};
