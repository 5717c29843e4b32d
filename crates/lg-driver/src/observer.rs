//! Driver observer trait for progress reporting and test instrumentation.

use std::time::Duration;

use lg_core::{BehaviorId, OpIndex, UserId};

/// Callbacks invoked by the driver at lifecycle points.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.  Hooks are called from worker tasks,
/// sometimes while the user's critical section is held, so they must be
/// quick and must not call back into the driver.
///
/// # Example: reset counter
///
/// ```rust,ignore
/// struct Resets(AtomicUsize);
///
/// impl DriverObserver for Resets {
///     fn on_reset_complete(&self, _user: UserId) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait DriverObserver: Send + Sync {
    /// A user became active and started its root behavior.
    fn on_user_started(&self, _user: UserId, _root: BehaviorId) {}

    /// An operation was scheduled to start after `delay`.
    fn on_operation_scheduled(
        &self,
        _user:     UserId,
        _behavior: BehaviorId,
        _op:       OpIndex,
        _delay:    Duration,
    ) {}

    /// An operation finished, successfully or not.  Not called for stopped
    /// or aborted operations.
    fn on_operation_finished(
        &self,
        _user:     UserId,
        _behavior: BehaviorId,
        _op:       OpIndex,
        _failed:   bool,
    ) {}

    /// A behavior (root or child) became fully stopped and was discarded.
    fn on_behavior_stopped(&self, _user: UserId, _behavior: BehaviorId) {}

    /// A user began resetting.
    fn on_reset_started(&self, _user: UserId) {}

    /// A user finished resetting; its replacement is already running.
    fn on_reset_complete(&self, _user: UserId) {}
}

/// A [`DriverObserver`] that does nothing.
pub struct NoopObserver;

impl DriverObserver for NoopObserver {}
