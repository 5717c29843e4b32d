//! The per-operation statistics record.

use std::time::Duration;

use lg_core::{BehaviorId, OpIndex, UserId};

/// One finished (completed or failed) operation.
///
/// Offsets are measured from the start of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStats {
    pub target:        String,
    pub user:          UserId,
    pub behavior:      BehaviorId,
    pub op_index:      OpIndex,
    pub op_name:       String,
    pub failed:        bool,
    pub failure:       Option<String>,
    pub start_offset:  Duration,
    pub end_offset:    Duration,
    pub cycle_time:    Duration,
    /// Steps that issued network calls, embedded fetches excluded.
    pub total_steps:   u32,
    /// Configured limit for this operation; `None` when it has none or does
    /// not count response time.
    pub response_time_limit: Option<Duration>,
}

impl OperationStats {
    pub fn response_time(&self) -> Duration {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// `false` only when a limit is configured and was exceeded.
    pub fn within_limit(&self) -> bool {
        self.response_time_limit.is_none_or(|limit| self.response_time() <= limit)
    }
}
