//! # FARSIGHT
//!
//! Host integration for the snapshot cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                            HOST PROCESS                            │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  ┌──────────────┐  step()   ┌──────────────┐                       │
//! │  │  Host loop   │──────────>│   SimWorld   │  (coarse lock)        │
//! │  │              │           │ Authoritative│                       │
//! │  │ RefreshLoop  │  tick()   │    Store     │                       │
//! │  │      └──────────────────>│              │<── enumerate ──┐      │
//! │  └──────────────┘           └──────────────┘                │      │
//! │                                                    ┌────────┴────┐ │
//! │                                                    │  Scheduler  │ │
//! │                                                    └────────┬────┘ │
//! │                                                      publish│      │
//! │  ┌──────────────┐   find_*()   ┌────────────────────────────┴───┐  │
//! │  │ Worker tasks │─────────────>│ QueryService / double buffer   │  │
//! │  │  (BotBrain)  │              └────────────────────────────────┘  │
//! │  └──────────────┘                                                  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `world`: simulated authoritative store
//! - `bot`: worker-side decisions made purely from snapshots

pub mod bot;
pub mod world;

// Re-export the cache
pub use farsight_core as core;

pub use bot::{BotAction, BotBrain, Decision};
pub use world::{LiveEntity, SimWorld, StepReport, WorldConfig};
