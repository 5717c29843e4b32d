//! The `Driver`: an in-process workload owning a population of users.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lg_core::{DriverConfig, OrderingId, UserId};
use tracing::info;

use crate::context::DriverContext;
use crate::user::User;
use crate::{DriverError, DriverResult};

/// Poll interval of [`Driver::wait_idle`].
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Owns the user population and the permitted active-user count.
///
/// Users are numbered in the order they are added; a user's ordering id is
/// its user id, so raising the active count activates users from the front.
///
/// Create via [`DriverBuilder`][crate::DriverBuilder].
pub struct Driver {
    ctx:     Arc<DriverContext>,
    started: AtomicBool,
}

impl Driver {
    pub(crate) fn from_context(ctx: Arc<DriverContext>) -> Self {
        Self { ctx, started: AtomicBool::new(false) }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.ctx.config
    }

    // ── Population ────────────────────────────────────────────────────────

    /// Add `count` users running the spec named `spec`.
    ///
    /// Users added after [`start`][Self::start] subscribe immediately.
    pub fn add_users(&self, spec: &str, count: u32) -> DriverResult<Vec<UserId>> {
        let spec = self.ctx.registry.require(spec)?;
        let first = u32::try_from(self.ctx.user_count()).map_err(|_| DriverError::PopulationFull)?;
        let started = self.started.load(Ordering::Acquire);

        let mut ids = Vec::with_capacity(count as usize);
        for n in first..first.checked_add(count).ok_or(DriverError::PopulationFull)? {
            let user = User::new(Arc::clone(&self.ctx), UserId(n), OrderingId(n), Arc::clone(&spec));
            self.ctx.register(Arc::clone(&user));
            if started {
                user.start(self.ctx.active_users());
            }
            ids.push(UserId(n));
        }
        info!(spec = spec.name(), count, total = self.ctx.user_count(), "users added");
        Ok(ids)
    }

    /// The current user registered under `id`.
    pub fn user(&self, id: UserId) -> Option<Arc<User>> {
        self.ctx.user(id)
    }

    /// Snapshot of the current population, in id order.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.ctx.users()
    }

    pub fn user_count(&self) -> usize {
        self.ctx.user_count()
    }

    // ── Load profile ──────────────────────────────────────────────────────

    /// Subscribe every user and activate the first `active_users`.
    pub fn start(&self, active_users: u32) {
        self.ctx.set_active_users(active_users);
        self.started.store(true, Ordering::Release);
        info!(active_users, users = self.ctx.user_count(), "driver started");
        for user in self.ctx.users() {
            user.start(active_users);
        }
    }

    /// Change the permitted active-user count.
    ///
    /// Users are notified from a snapshot of the population, never while the
    /// population lock is held.  With the `parallel` feature the
    /// notifications fan out over Rayon's thread pool.
    pub fn set_active_users(&self, active_users: u32) {
        self.ctx.set_active_users(active_users);
        let users = self.ctx.users();
        info!(active_users, "load profile changed");

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            users.par_iter().for_each(|u| u.load_profile_changed(active_users));
        }
        #[cfg(not(feature = "parallel"))]
        for user in &users {
            user.load_profile_changed(active_users);
        }
    }

    pub fn active_users(&self) -> u32 {
        self.ctx.active_users()
    }

    /// The load profile is over: every user stops and no replacement starts.
    pub fn complete(&self) {
        self.ctx.mark_complete();
        info!("load profiles complete");
        for user in self.ctx.users() {
            user.load_profiles_complete();
        }
    }

    /// Forced shutdown of every user.  Pending delays wake immediately.
    pub fn stop_all(&self) {
        self.ctx.mark_complete();
        for user in self.ctx.users() {
            user.stop();
        }
        self.ctx.run.cancel();
        info!("driver stopped");
    }

    // ── Progress ──────────────────────────────────────────────────────────

    /// Number of user resets that have completed.
    pub fn resets_completed(&self) -> u64 {
        self.ctx.resets_completed()
    }

    /// Live behaviors across the current population.
    pub fn live_behaviors(&self) -> usize {
        self.ctx.users().iter().map(|u| u.behavior_count()).sum()
    }

    /// Wait until no current user has a live behavior, or `timeout` passes.
    /// Returns `true` if the population went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.live_behaviors() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.ctx.run.cancel();
        self.ctx.clear_population();
    }
}
