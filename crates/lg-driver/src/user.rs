//! `User`: activation, reset and replacement of one virtual user.
//!
//! # Lifecycle
//!
//! ```text
//! start(active) ─▶ subscribed ─▶ active (root behavior running)
//!                      ▲               │ deactivated, failure, abort,
//!                      │               │ reset-state op
//!                      │               ▼
//!                 replacement ◀── resetting ── root fully stopped ──▶ retired
//!                 (same ids)        (timer forces completion)
//! ```
//!
//! A user never comes back from a reset.  The replacement is created and
//! started as soon as the reset begins; the old user only finishes tearing
//! down its behavior tree.
//!
//! # Critical section
//!
//! Every change to the behavior tree happens inside [`User::with_state`],
//! which holds the user's lock.  Effects that must not run under the lock
//! (creating the replacement, which touches the population) are queued as
//! [`Deferred`] items and run after it is released.

use std::sync::{Arc, Weak};

use lg_core::{BehaviorId, OpIndex, OrderingId, UserId};
use lg_data::DataScopes;
use lg_spec::BehaviorSpec;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::behavior::BehaviorNode;
use crate::cache::PageCache;
use crate::context::DriverContext;

// ── State ─────────────────────────────────────────────────────────────────────

pub(crate) enum Deferred {
    SpawnReplacement,
}

#[derive(Default)]
pub(crate) struct UserState {
    pub active:      bool,
    pub resetting:   bool,
    pub subscribed:  bool,
    pub root:        Option<BehaviorId>,
    /// Every live behavior of this user, root and children.
    pub behaviors:   FxHashMap<BehaviorId, BehaviorNode>,
    pub reset_timer: Option<AbortHandle>,
    pub deferred:    Vec<Deferred>,
}

// ── User ──────────────────────────────────────────────────────────────────────

/// One virtual user.
///
/// Created by the [`Driver`][crate::Driver]; a reset retires the instance and
/// registers a replacement under the same [`UserId`].
pub struct User {
    pub(crate) id:       UserId,
    pub(crate) ordering: OrderingId,
    pub(crate) spec:     Arc<BehaviorSpec>,
    pub(crate) me:       Weak<User>,
    pub(crate) ctx:      Arc<DriverContext>,
    pub(crate) data:     DataScopes,
    pub(crate) cache:    Arc<dyn PageCache>,
    state:               Mutex<UserState>,
}

impl User {
    pub(crate) fn new(
        ctx:      Arc<DriverContext>,
        id:       UserId,
        ordering: OrderingId,
        spec:     Arc<BehaviorSpec>,
    ) -> Arc<Self> {
        let cache = (ctx.page_cache)(ctx.config.page_cache_capacity);
        Arc::new_cyclic(|me| Self {
            id,
            ordering,
            spec,
            me: me.clone(),
            ctx,
            data: DataScopes::new(),
            cache,
            state: Mutex::new(UserState::default()),
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn ordering_id(&self) -> OrderingId {
        self.ordering
    }

    pub fn spec(&self) -> &BehaviorSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_resetting(&self) -> bool {
        self.state.lock().resetting
    }

    /// `true` while the user reacts to load-profile changes.
    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscribed
    }

    pub fn root_behavior(&self) -> Option<BehaviorId> {
        self.state.lock().root
    }

    /// Live behaviors, the root included.
    pub fn behavior_count(&self) -> usize {
        self.state.lock().behaviors.len()
    }

    /// Children of `behavior` that have not yet fully stopped, oldest first.
    pub fn children(&self, behavior: BehaviorId) -> Option<Vec<BehaviorId>> {
        self.state.lock().behaviors.get(&behavior).map(|n| n.children.clone())
    }

    /// The user's data channels.  Useful for seeding user-scoped values.
    pub fn data(&self) -> &DataScopes {
        &self.data
    }

    pub(crate) fn context(&self) -> &DriverContext {
        &self.ctx
    }

    pub(crate) fn page_cache(&self) -> &dyn PageCache {
        self.cache.as_ref()
    }

    // ── Load profile ──────────────────────────────────────────────────────

    /// Subscribe to load-profile changes and become active if `active_users`
    /// covers this user's ordering position.
    pub fn start(&self, active_users: u32) {
        self.with_state(|user, st| {
            st.subscribed = true;
            user.apply_activity(st, active_users);
        });
    }

    /// React to a new permitted active-user count.
    pub fn load_profile_changed(&self, active_users: u32) {
        self.with_state(|user, st| {
            if st.resetting || !st.subscribed {
                debug!(user = %user.id, active_users, "load change ignored");
                return;
            }
            user.apply_activity(st, active_users);
        });
    }

    /// The run is over: stop the behavior tree and stop listening.
    pub fn load_profiles_complete(&self) {
        self.with_state(|user, st| user.shut_down(st, "load profiles complete"));
    }

    /// Forced shutdown.  Same as [`load_profiles_complete`][Self::load_profiles_complete].
    pub fn stop(&self) {
        self.with_state(|user, st| user.shut_down(st, "stopped"));
    }

    fn apply_activity(&self, st: &mut UserState, active_users: u32) {
        let should_run = self.ordering.is_within(active_users);
        if should_run && !st.active {
            if let Err(e) = self.start_root(st) {
                error!(user = %self.id, spec = self.spec.name(), error = %e, "could not start user");
            }
        } else if !should_run && st.active {
            st.active = false;
            self.start_reset(st, "deactivated");
        }
    }

    fn start_root(&self, st: &mut UserState) -> crate::DriverResult<()> {
        if let Some(root) = st.root {
            warn!(user = %self.id, %root, "previous behavior still stopping");
            return Ok(());
        }
        let node = self.build_behavior(Arc::clone(&self.spec), None, &self.ctx.run, None)?;
        let root = node.id;
        st.behaviors.insert(root, node);
        st.root = Some(root);
        st.active = true;
        info!(user = %self.id, %root, spec = self.spec.name(), "user active");
        self.ctx.observer.on_user_started(self.id, root);
        self.start_next(st, root);
        Ok(())
    }

    fn shut_down(&self, st: &mut UserState, reason: &str) {
        st.subscribed = false;
        st.active = false;
        if let Some(root) = st.root {
            info!(user = %self.id, reason, "stopping user");
            self.stop_behavior(st, root);
        }
    }

    // ── Reset ─────────────────────────────────────────────────────────────

    /// Begin a reset.  Ignored while one is already in progress.
    pub(crate) fn start_reset(&self, st: &mut UserState, reason: &str) {
        if st.resetting {
            debug!(user = %self.id, reason, "reset already in progress");
            return;
        }
        st.resetting = true;
        st.subscribed = false;
        info!(user = %self.id, reason, "user reset started");
        self.ctx.observer.on_reset_started(self.id);
        st.deferred.push(Deferred::SpawnReplacement);

        let Some(root) = st.root else {
            self.complete_reset(st);
            return;
        };

        // Armed before stopping: the tree may finish stopping right here.
        if let Some(me) = self.me.upgrade() {
            let timeout = self.ctx.config.reset_timeout();
            let timer = self.ctx.handle.spawn(async move {
                tokio::time::sleep(timeout).await;
                me.force_reset_complete();
            });
            st.reset_timer = Some(timer.abort_handle());
        }
        self.stop_behavior(st, root);
    }

    /// Called when the root behavior is fully stopped (or the reset timer
    /// fired).
    pub(crate) fn complete_reset(&self, st: &mut UserState) {
        if let Some(timer) = st.reset_timer.take() {
            timer.abort();
        }
        st.root = None;
        st.behaviors.clear();
        self.data.clear_all();
        self.cache.clear();

        if !st.resetting {
            debug!(user = %self.id, "behavior tree stopped");
            return;
        }
        st.resetting = false;
        self.ctx.reset_completed();
        info!(user = %self.id, "user reset complete");
        self.ctx.observer.on_reset_complete(self.id);
    }

    fn force_reset_complete(&self) {
        self.with_state(|user, st| {
            if st.resetting {
                warn!(user = %user.id, behaviors = st.behaviors.len(), "reset timed out, forcing completion");
                user.complete_reset(st);
            }
        });
    }

    fn spawn_replacement(&self) {
        let ctx = &self.ctx;
        if ctx.run.is_cancelled() {
            debug!(user = %self.id, "run stopped, no replacement");
            return;
        }
        let replacement = User::new(Arc::clone(ctx), self.id, self.ordering, Arc::clone(&self.spec));
        ctx.register(Arc::clone(&replacement));
        if ctx.is_complete() {
            return;
        }
        debug!(user = %self.id, "replacement user started");
        replacement.start(ctx.active_users());
    }

    // ── Entry points for operations ───────────────────────────────────────

    pub(crate) fn operation_complete(&self, behavior: BehaviorId, op: OpIndex) {
        self.with_state(|user, st| user.on_operation_complete(st, behavior, op));
    }

    pub(crate) fn op_stopped(&self, behavior: BehaviorId) {
        self.with_state(|user, st| user.ack_op_stopped(st, behavior));
    }

    /// Reset the user, then acknowledge that `behavior`'s operation stopped.
    pub(crate) fn reset_and_ack(&self, behavior: BehaviorId, reason: &str) {
        self.with_state(|user, st| {
            user.start_reset(st, reason);
            user.ack_op_stopped(st, behavior);
        });
    }

    // ── Critical section ──────────────────────────────────────────────────

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&Self, &mut UserState) -> R) -> R {
        let (out, deferred) = {
            let mut st = self.state.lock();
            let out = f(self, &mut st);
            (out, std::mem::take(&mut st.deferred))
        };
        for effect in deferred {
            match effect {
                Deferred::SpawnReplacement => self.spawn_replacement(),
            }
        }
        out
    }
}
