//! # Double-Buffered Generations
//!
//! Lock-free-read handoff between the single scheduler and many readers.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!                    │     DoubleBufferedSnapshots      │
//!                    │                                  │
//!                    │  ┌──────────┐    ┌──────────┐    │
//!                    │  │ Slot 0   │    │ Slot 1   │    │
//!                    │  │ (guard)  │    │ (guard)  │    │
//!                    │  └────┬─────┘    └────┬─────┘    │
//!                    │       │               │          │
//!                    │  ┌────┴───────────────┴─────┐    │
//!                    │  │ Atomic active index (0/1)│    │
//!                    │  └──────────────────────────┘    │
//!                    └──────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!      ┌───────────────┐               ┌────────────────┐
//!      │ StagingHandle │               │   ReadHandle   │
//!      │  (scheduler)  │               │ (worker tasks) │
//!      └───────────────┘               └────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `StagingHandle`: exclusive access to the non-active slot, one at a time
//!   (single-flight flag).
//! - `ReadHandle`: shared access to the active slot, any number.
//! - `publish`: one atomic store of the active index.
//!
//! ## Reclamation
//!
//! Readers never wait. They load the active index and *try* to pin that slot.
//! The only way the pin can fail is that the scheduler has since published
//! the other slot and started rewriting this one, so the reader reloads the
//! index and pins the fresh generation instead. The scheduler, on the other
//! hand, waits for any straggler still reading the slot it is about to reuse.
//! A slot is therefore never rewritten under a reader, whatever the timing.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use farsight_shared::DistanceMetric;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult, ConfigError};
use crate::generation::{BufferState, GenerationBuffer, GenerationId};

/// Active index before anything has been published.
const NO_ACTIVE: usize = usize::MAX;

/// Two generation buffers plus the atomic index naming the readable one.
///
/// Both buffers are allocated once and reused round-robin forever; only
/// their contents are refreshed.
///
/// ## Usage
///
/// ```rust,ignore
/// let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
///
/// // Scheduler, once per interval
/// let mut staging = buffers.begin_build()?;
/// staging.insert(snapshot)?;
/// staging.publish(Instant::now());
///
/// // Any worker, any time
/// if let Some(read) = buffers.read_handle() {
///     let hit = read.query_by_id(map, id).copied();
/// }
/// ```
#[derive(Debug)]
pub struct DoubleBufferedSnapshots {
    /// The two generation buffers.
    slots: [RwLock<GenerationBuffer>; 2],

    /// Index of the active (readable) slot, or `NO_ACTIVE`.
    /// The staging slot is always `active ^ 1`.
    active_index: AtomicUsize,

    /// Whether a staging handle is currently held.
    build_in_progress: AtomicBool,

    /// Last published generation id (0 before the first publish).
    generation: AtomicU64,

    cell_size: f32,
    metric: DistanceMetric,
}

impl DoubleBufferedSnapshots {
    /// Creates both buffers up front.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not a positive finite number.
    #[must_use]
    pub fn new(cell_size: f32, metric: DistanceMetric) -> Arc<Self> {
        Arc::new(Self {
            slots: [
                RwLock::new(GenerationBuffer::new(cell_size, metric)),
                RwLock::new(GenerationBuffer::new(cell_size, metric)),
            ],
            active_index: AtomicUsize::new(NO_ACTIVE),
            build_in_progress: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cell_size,
            metric,
        })
    }

    /// Creates both buffers from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the configuration is out of range.
    pub fn from_config(config: &CacheConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.cell_size, config.metric))
    }

    /// Grid cell edge length used by both buffers.
    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Distance metric used by both buffers.
    #[inline]
    #[must_use]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Last published generation, `None` before the first publish.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Option<GenerationId> {
        match self.generation.load(Ordering::Acquire) {
            0 => None,
            n => Some(GenerationId(n)),
        }
    }

    /// Whether anything has ever been published.
    #[inline]
    #[must_use]
    pub fn has_published(&self) -> bool {
        self.active_index.load(Ordering::Acquire) != NO_ACTIVE
    }

    /// Whether a staging handle is currently held.
    #[inline]
    #[must_use]
    pub fn is_build_in_progress(&self) -> bool {
        self.build_in_progress.load(Ordering::Acquire)
    }

    /// Claims the staging slot for a new build.
    ///
    /// The slot is reset before it is handed out. If a reader is still
    /// finishing a query on it (from before the last publish), this waits for
    /// that reader; readers themselves never wait.
    ///
    /// # Errors
    ///
    /// [`CacheError::BuildInProgress`] if another staging handle is alive.
    pub fn begin_build(&self) -> CacheResult<StagingHandle<'_>> {
        if self.build_in_progress.swap(true, Ordering::AcqRel) {
            return Err(CacheError::BuildInProgress);
        }
        let flag = BuildFlag(&self.build_in_progress);

        let active = self.active_index.load(Ordering::Acquire);
        let index = if active == NO_ACTIVE { 0 } else { active ^ 1 };

        let mut guard = self.slots[index].write();
        guard.reset();

        Ok(StagingHandle {
            owner: self,
            index,
            guard,
            _flag: flag,
        })
    }

    /// Pins the active generation for reading.
    ///
    /// Returns `None` before the first publish. Never blocks.
    #[must_use]
    pub fn read_handle(&self) -> Option<ReadHandle<'_>> {
        loop {
            let index = self.active_index.load(Ordering::Acquire);
            if index == NO_ACTIVE {
                return None;
            }
            if let Some(guard) = self.slots[index].try_read() {
                // A slot abandoned by a failed build is never shown, even to a
                // reader holding a very old index.
                if guard.state() == BufferState::Published {
                    return Some(ReadHandle { index, guard });
                }
            }
            // The scheduler has taken this slot back since we loaded the index,
            // which means the other slot was just published.
            std::hint::spin_loop();
        }
    }
}

/// Clears the single-flight flag when the staging handle goes away,
/// whether it was published, abandoned or unwound.
#[derive(Debug)]
struct BuildFlag<'a>(&'a AtomicBool);

impl Drop for BuildFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Exclusive write access to the staging buffer.
///
/// Only one exists at a time. Dropping it without calling
/// [`publish`](Self::publish) leaves the previous generation active.
#[derive(Debug)]
pub struct StagingHandle<'a> {
    owner: &'a DoubleBufferedSnapshots,
    index: usize,
    guard: RwLockWriteGuard<'a, GenerationBuffer>,
    _flag: BuildFlag<'a>,
}

impl StagingHandle<'_> {
    /// Returns the slot this handle writes to (for debugging).
    #[inline]
    #[must_use]
    pub fn buffer_index(&self) -> usize {
        self.index
    }

    /// Makes the staging buffer the active generation.
    ///
    /// This is the only write readers can observe: a single atomic store of
    /// the active index, after the buffer has been sealed and unlocked.
    pub fn publish(self, built_at: Instant) -> GenerationId {
        let Self { owner, index, mut guard, _flag } = self;

        let generation = GenerationId(owner.generation.load(Ordering::Acquire)).next();
        guard.seal(generation, built_at);
        drop(guard);

        owner.active_index.store(index, Ordering::Release);
        owner.generation.store(generation.0, Ordering::Release);
        generation
    }

    /// Throws away whatever was written. The active generation is untouched.
    pub fn abandon(mut self) {
        self.guard.reset();
    }
}

impl Deref for StagingHandle<'_> {
    type Target = GenerationBuffer;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for StagingHandle<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Shared read access to one published generation.
///
/// Keep it for the duration of one query (or a short burst of queries);
/// the scheduler cannot reuse this slot until it is dropped.
#[derive(Debug)]
pub struct ReadHandle<'a> {
    index: usize,
    guard: RwLockReadGuard<'a, GenerationBuffer>,
}

impl ReadHandle<'_> {
    /// Returns the slot this handle reads from (for debugging).
    #[inline]
    #[must_use]
    pub fn buffer_index(&self) -> usize {
        self.index
    }
}

impl Deref for ReadHandle<'_> {
    type Target = GenerationBuffer;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}
