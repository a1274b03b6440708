//! # Synchronization Primitives for the Snapshot Cache
//!
//! ARCHITECT'S ORDER: Readers never wait. One writer. No torn reads.
//!
//! ## The Problem
//!
//! ```text
//! Scheduler:      REBUILD the world copy every 100 ms
//! Worker tasks:   QUERY the world copy at any time, thousands per second
//!
//! Reading live entities:   RACE CONDITION -> CRASH
//! One big lock:            LOCK CONTENTION -> STALLED BOTS
//! ```
//!
//! ## The Solution: Double Buffering
//!
//! ```text
//! Cycle N:
//!   Scheduler fills Buffer A
//!   Workers read Buffer B (last cycle's world)
//!
//! Cycle N+1:
//!   PUBLISH (one atomic store)
//!   Scheduler fills Buffer B
//!   Workers read Buffer A
//! ```

mod double_buffer;

pub use double_buffer::{DoubleBufferedSnapshots, ReadHandle, StagingHandle};
