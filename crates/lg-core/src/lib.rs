//! `lg-core`: foundational types for the `rust_lg` load-generation engine.
//!
//! This crate is a dependency of every other `lg-*` crate.  It has no `lg-*`
//! dependencies and only a handful of external ones (`rand`, `thiserror`,
//! `serde`, `serde_json`).
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`ids`]         | `UserId`, `OrderingId`, `OpIndex`, `BehaviorId`       |
//! | [`time`]        | `Cadence`, next-start arithmetic, cycle-time sampling |
//! | [`rng`]         | `BehaviorRng` (per-behavior, deterministic)           |
//! | [`config`]      | `DriverConfig` (JSON-loadable run configuration)      |
//! | [`error`]       | `LgError`, `LgResult`                                 |

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::DriverConfig;
pub use error::{LgError, LgResult};
pub use ids::{BehaviorId, OpIndex, OrderingId, UserId};
pub use rng::BehaviorRng;
pub use time::{Cadence, cycle_time_from_mean};
