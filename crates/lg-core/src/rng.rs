//! Deterministic per-behavior RNG.
//!
//! # Determinism strategy
//!
//! Each behavior gets its own independent `SmallRng` seeded by:
//!
//!   seed = run_seed XOR (behavior_id * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive behavior IDs uniformly across the seed space.
//! Behaviors never share RNG state, so draws never contend on a lock and a
//! run with the same seed and the same id allocation order replays the same
//! transition choices.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::BehaviorId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

// ── BehaviorRng ───────────────────────────────────────────────────────────────

/// Per-behavior deterministic RNG.
///
/// Owned by the behavior (or operation) that draws from it; the type is
/// deliberately not `Clone` so two owners can never replay the same stream.
#[derive(Debug)]
pub struct BehaviorRng(SmallRng);

impl BehaviorRng {
    /// Seed deterministically from the run seed and a behavior ID.
    pub fn new(run_seed: u64, behavior: BehaviorId) -> Self {
        Self::with_salt(run_seed, behavior, 0)
    }

    /// Like [`new`][Self::new] but mixes in `salt` so several streams can be
    /// derived for one behavior (one per operation slot, for example).
    pub fn with_salt(run_seed: u64, behavior: BehaviorId, salt: u64) -> Self {
        let seed = run_seed
            ^ behavior.0.wrapping_mul(MIXING_CONSTANT)
            ^ salt.wrapping_mul(MIXING_CONSTANT).rotate_left(32);
        BehaviorRng(SmallRng::seed_from_u64(seed))
    }

    /// Uniform draw in `[0, 1)`.
    #[inline]
    pub fn unit(&mut self) -> f64 {
        self.0.r#gen::<f64>()
    }

    /// Sample a negative-exponential variate with the given mean.
    ///
    /// Uses `1 - u` so the logarithm argument lies in `(0, 1]` and the result
    /// is always finite.  A non-positive mean yields `0.0`.
    #[inline]
    pub fn neg_exp(&mut self, mean: f64) -> f64 {
        if mean <= 0.0 || !mean.is_finite() {
            return 0.0;
        }
        -mean * (1.0 - self.unit()).ln()
    }

    /// A uniformly chosen element of `slice`, or `None` if it is empty.
    #[inline]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.0)
    }
}
