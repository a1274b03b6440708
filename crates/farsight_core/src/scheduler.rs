//! # Update Scheduler
//!
//! The one and only writer. Once per refresh interval the host calls
//! [`UpdateScheduler::tick`], which enumerates the authoritative store,
//! rebuilds the staging generation and publishes it.
//!
//! ## State Machine
//!
//! ```text
//!            tick()                 all maps done
//!   Idle ───────────► Building ───────────────────► Publishing ──► Idle
//!                        │
//!                        │ store error / duplicate id
//!                        └──────────────────────────────────────────► Idle
//! ```
//!
//! A tick that arrives while another is still in flight is dropped
//! (`Overrun`), never queued: under load the cache gets staler, not slower.
//!
//! Queries never trigger a refresh. That push-only rule is what keeps
//! worker tasks off the store's lock entirely.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::generation::GenerationId;
use crate::store::AuthoritativeStore;
use crate::sync::{DoubleBufferedSnapshots, StagingHandle};

/// Where the scheduler is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle = 0,
    /// Enumerating the store into the staging buffer.
    Building = 1,
    /// Swapping the active buffer.
    Publishing = 2,
}

impl SchedulerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Building,
            2 => Self::Publishing,
            _ => Self::Idle,
        }
    }
}

/// Result of one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new generation is live.
    Published {
        /// Its id.
        generation: GenerationId,
        /// Snapshots it holds.
        entities: usize,
    },
    /// A previous build was still running; this tick did nothing.
    Overrun,
    /// The build failed; the previous generation stays active.
    Failed(CacheError),
}

impl TickOutcome {
    /// True if a generation was published.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Generations published.
    pub builds_published: u64,
    /// Builds abandoned on error.
    pub builds_failed: u64,
    /// Ticks dropped because a build was still running.
    pub ticks_skipped: u64,
    /// Duration of the most recent build (published or failed).
    pub last_build_micros: u64,
    /// Longest build seen.
    pub max_build_micros: u64,
    /// Snapshots in the last published generation.
    pub last_entity_count: usize,
}

/// Single writer driving the refresh cadence.
///
/// Shares the [`DoubleBufferedSnapshots`] with any number of
/// [`QueryService`](crate::QueryService)s.
#[derive(Debug)]
pub struct UpdateScheduler<S: AuthoritativeStore> {
    buffers: Arc<DoubleBufferedSnapshots>,
    store: Arc<S>,
    config: CacheConfig,
    state: AtomicU8,
    stats: Mutex<SchedulerStats>,
}

impl<S: AuthoritativeStore> UpdateScheduler<S> {
    /// Creates a scheduler. The configuration is read once, here.
    ///
    /// `buffers` must have been built from the same configuration, for
    /// instance with [`DoubleBufferedSnapshots::from_config`].
    #[must_use]
    pub fn new(buffers: Arc<DoubleBufferedSnapshots>, store: Arc<S>, config: CacheConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "Invalid cache configuration");
        debug_assert!(
            buffers.cell_size().to_bits() == config.cell_size.to_bits() && buffers.metric() == config.metric,
            "Buffers were built from a different configuration"
        );
        Self {
            buffers,
            store,
            config,
            state: AtomicU8::new(SchedulerState::Idle as u8),
            stats: Mutex::new(SchedulerStats::default()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        *self.stats.lock()
    }

    /// The buffers this scheduler publishes into.
    #[must_use]
    pub fn buffers(&self) -> &Arc<DoubleBufferedSnapshots> {
        &self.buffers
    }

    /// Configured interval between ticks.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval()
    }

    /// Runs one refresh cycle.
    ///
    /// `now` is the host's timestamp for this tick and becomes the
    /// generation's `built_at`.
    pub fn tick(&self, now: Instant) -> TickOutcome {
        // Claimed before `begin_build`, which may wait for a straggling reader.
        if self
            .state
            .compare_exchange(
                SchedulerState::Idle as u8,
                SchedulerState::Building as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return self.skip(&CacheError::BuildInProgress);
        }

        let started = Instant::now();
        let mut staging = match self.buffers.begin_build() {
            Ok(staging) => staging,
            Err(err) => {
                self.set_state(SchedulerState::Idle);
                return self.skip(&err);
            }
        };

        match self.populate(&mut staging) {
            Ok(entities) => {
                self.set_state(SchedulerState::Publishing);
                let generation = staging.publish(now);
                self.set_state(SchedulerState::Idle);

                let micros = duration_micros(started.elapsed());
                {
                    let mut stats = self.stats.lock();
                    stats.builds_published += 1;
                    stats.last_build_micros = micros;
                    stats.max_build_micros = stats.max_build_micros.max(micros);
                    stats.last_entity_count = entities;
                }
                tracing::debug!("Published snapshot {} ({} entities, {} us)", generation, entities, micros);
                TickOutcome::Published { generation, entities }
            }
            Err(err) => {
                staging.abandon();
                self.set_state(SchedulerState::Idle);

                let micros = duration_micros(started.elapsed());
                {
                    let mut stats = self.stats.lock();
                    stats.builds_failed += 1;
                    stats.last_build_micros = micros;
                    stats.max_build_micros = stats.max_build_micros.max(micros);
                }
                tracing::warn!("Snapshot build abandoned, keeping {:?}: {}", self.buffers.generation(), err);
                TickOutcome::Failed(err)
            }
        }
    }

    /// Enumerates every enabled map and kind into `staging`.
    fn populate(&self, staging: &mut StagingHandle<'_>) -> CacheResult<usize> {
        let mut inserted = 0;

        for map in self.store.map_ids() {
            for kind in self.config.kinds_for(map).iter() {
                let mut failure: Option<CacheError> = None;

                self.store
                    .enumerate_entities(map, kind, &mut |entity| {
                        let Some(snapshot) = S::to_snapshot(entity) else {
                            return ControlFlow::Continue(());
                        };
                        if snapshot.map != map || snapshot.kind() != kind {
                            failure = Some(CacheError::MisplacedSnapshot {
                                id: snapshot.id,
                                map,
                                kind,
                                found_map: snapshot.map,
                                found_kind: snapshot.kind(),
                            });
                            return ControlFlow::Break(());
                        }
                        match staging.insert(snapshot) {
                            Ok(()) => {
                                inserted += 1;
                                ControlFlow::Continue(())
                            }
                            Err(err) => {
                                failure = Some(err);
                                ControlFlow::Break(())
                            }
                        }
                    })
                    .map_err(|source| CacheError::PopulationFailure { map, kind, source })?;

                if let Some(err) = failure {
                    return Err(err);
                }
            }
            tracing::trace!("Snapshotted map {}", map);
        }

        Ok(inserted)
    }

    fn skip(&self, err: &CacheError) -> TickOutcome {
        self.stats.lock().ticks_skipped += 1;
        tracing::warn!("Snapshot tick skipped, previous build still running: {}", err);
        TickOutcome::Overrun
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{EntityId, EntityKind, EntitySnapshot, MapId};
    use crate::store::MemoryStore;
    use farsight_shared::{DistanceMetric, Position};
    use std::thread;

    fn setup() -> (Arc<MemoryStore>, UpdateScheduler<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let scheduler = UpdateScheduler::new(buffers, Arc::clone(&store), CacheConfig::default());
        (store, scheduler)
    }

    #[test]
    fn test_tick_publishes() {
        let (store, scheduler) = setup();
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));
        store.upsert(EntitySnapshot::trigger(EntityId(2), MapId(2), Position::ORIGIN, 3.0));

        let outcome = scheduler.tick(Instant::now());
        assert_eq!(outcome, TickOutcome::Published { generation: GenerationId(1), entities: 2 });
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let stats = scheduler.stats();
        assert_eq!(stats.builds_published, 1);
        assert_eq!(stats.last_entity_count, 2);
    }

    #[test]
    fn test_tick_during_build_is_overrun() {
        let (store, scheduler) = setup();
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));
        assert!(scheduler.tick(Instant::now()).is_published());

        let held = scheduler.buffers().begin_build().unwrap();
        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Overrun);
        assert_eq!(scheduler.buffers().generation(), Some(GenerationId(1)));
        assert_eq!(scheduler.stats().ticks_skipped, 1);
        drop(held);

        assert_eq!(
            scheduler.tick(Instant::now()),
            TickOutcome::Published { generation: GenerationId(2), entities: 1 }
        );
    }

    #[test]
    fn test_disabled_kinds_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));
        store.upsert(EntitySnapshot::trigger(EntityId(2), MapId(1), Position::ORIGIN, 3.0));

        let config = CacheConfig {
            enabled_kinds: vec![EntityKind::Trigger],
            ..CacheConfig::default()
        };
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let scheduler = UpdateScheduler::new(Arc::clone(&buffers), store, config);

        assert_eq!(
            scheduler.tick(Instant::now()),
            TickOutcome::Published { generation: GenerationId(1), entities: 1 }
        );
        let read = buffers.read_handle().unwrap();
        assert!(read.query_by_id(MapId(1), EntityId(1)).is_none());
        assert!(read.query_by_id(MapId(1), EntityId(2)).is_some());
    }

    #[test]
    fn test_building_while_waiting_for_straggler() {
        let (store, scheduler) = setup();
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));
        assert!(scheduler.tick(Instant::now()).is_published());

        let straggler = scheduler.buffers().read_handle().unwrap();
        assert!(scheduler.tick(Instant::now()).is_published());

        thread::scope(|s| {
            // Needs the slot the straggler still holds.
            let builder = s.spawn(|| scheduler.tick(Instant::now()));
            while scheduler.state() != SchedulerState::Building {
                thread::yield_now();
            }

            assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Overrun);
            assert_eq!(straggler.generation(), GenerationId(1));
            drop(straggler);

            assert_eq!(
                builder.join().unwrap(),
                TickOutcome::Published { generation: GenerationId(3), entities: 1 }
            );
        });

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.stats().ticks_skipped, 1);
    }

    #[test]
    fn test_overrun_when_buffers_claimed_elsewhere_leaves_idle() {
        let (_store, scheduler) = setup();
        let held = scheduler.buffers().begin_build().unwrap();

        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Overrun);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        drop(held);
        assert!(scheduler.tick(Instant::now()).is_published());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Buffers were built from a different configuration")]
    fn test_mismatched_buffers_rejected() {
        let buffers = DoubleBufferedSnapshots::new(32.0, DistanceMetric::Spatial);
        let _ = UpdateScheduler::new(buffers, Arc::new(MemoryStore::new()), CacheConfig::default());
    }
}
