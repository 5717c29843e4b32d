//! The `StatsWriter` trait implemented by all backend writers.

use crate::{OperationStats, StatsResult};

/// Trait implemented by the CSV and SQLite writers.
pub trait StatsWriter: Send {
    fn write(&mut self, row: &OperationStats) -> StatsResult<()>;

    /// Flush and close all underlying handles.
    ///
    /// Idempotent: safe to call more than once.
    fn finish(&mut self) -> StatsResult<()>;
}
