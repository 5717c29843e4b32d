//! Operation cadence model.
//!
//! # Cycle time vs. think time
//!
//! A behavior draws a *cycle time* for every operation it schedules.  How that
//! value turns into a start instant depends on the [`Cadence`]:
//!
//! ```text
//! ThinkTime:  next_start = now + cycle
//! CycleTime:  next_start = max(previous_start + cycle, now)
//! ```
//!
//! Cycle-time mode keeps a steady arrival rate under load: a slow response
//! eats into the following gap instead of pushing every later operation back.
//!
//! The arithmetic here is generic over the instant type so the driver can use
//! `tokio::time::Instant` (pausable in tests) while this crate stays runtime
//! agnostic.

use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BehaviorRng;

// ── Cadence ───────────────────────────────────────────────────────────────────

/// How the gap between consecutive operations is measured.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Gap measured start-to-start; late operations are clamped to `now`.
    #[default]
    CycleTime,
    /// Gap measured from the completion of the previous operation.
    ThinkTime,
}

impl Cadence {
    /// Build from the `use_think_time` configuration flag.
    #[inline]
    pub fn from_think_time(use_think_time: bool) -> Self {
        if use_think_time { Cadence::ThinkTime } else { Cadence::CycleTime }
    }

    /// Compute the start instant of the next operation.
    ///
    /// `previous_start` is the scheduled start of the operation that just
    /// completed, or `None` for the first operation of a behavior (which
    /// always starts at `now`).
    pub fn next_start<I>(self, previous_start: Option<I>, now: I, cycle: Duration) -> I
    where
        I: Copy + Ord + Add<Duration, Output = I>,
    {
        match (self, previous_start) {
            (_, None) => now,
            (Cadence::ThinkTime, Some(_)) => now + cycle,
            (Cadence::CycleTime, Some(prev)) => (prev + cycle).max(now),
        }
    }
}

// ── Cycle-time sampling ───────────────────────────────────────────────────────

/// Draw a cycle time for an operation whose configured mean is `mean_secs`.
///
/// The variate is negative-exponential (Poisson arrivals), rounded up to the
/// next whole millisecond.
pub fn cycle_time_from_mean(rng: &mut BehaviorRng, mean_secs: f64) -> Duration {
    let millis = rng.neg_exp(mean_secs * 1_000.0).ceil();
    if millis.is_finite() && millis > 0.0 {
        Duration::from_millis(millis as u64)
    } else {
        Duration::ZERO
    }
}
