//! Run-wide state shared by every user of a driver.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use lg_core::{BehaviorId, Cadence, DriverConfig, UserId};
use lg_spec::SpecRegistry;
use lg_stats::StatsCollector;
use lg_transport::Transport;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::PageCacheFactory;
use crate::observer::DriverObserver;
use crate::operation::OperationFactory;
use crate::user::User;

pub(crate) struct DriverContext {
    pub config:     DriverConfig,
    pub cadence:    Cadence,
    pub registry:   Arc<SpecRegistry>,
    pub factory:    Arc<dyn OperationFactory>,
    pub transport:  Arc<dyn Transport>,
    pub stats:      Arc<dyn StatsCollector>,
    pub observer:   Arc<dyn DriverObserver>,
    pub page_cache: PageCacheFactory,
    pub handle:     Handle,
    /// Parent of every root behavior's stop token.
    pub run:        CancellationToken,
    pub run_start:  Instant,

    next_behavior:    AtomicU64,
    active_users:     AtomicU32,
    complete:         AtomicBool,
    resets_completed: AtomicU64,
    population:       Mutex<BTreeMap<UserId, Arc<User>>>,
}

/// Everything [`DriverContext::new`] needs.
pub(crate) struct ContextParts {
    pub config:     DriverConfig,
    pub registry:   Arc<SpecRegistry>,
    pub factory:    Arc<dyn OperationFactory>,
    pub transport:  Arc<dyn Transport>,
    pub stats:      Arc<dyn StatsCollector>,
    pub observer:   Arc<dyn DriverObserver>,
    pub page_cache: PageCacheFactory,
    pub handle:     Handle,
}

impl DriverContext {
    pub fn new(parts: ContextParts) -> Self {
        Self {
            cadence:          parts.config.cadence(),
            config:           parts.config,
            registry:         parts.registry,
            factory:          parts.factory,
            transport:        parts.transport,
            stats:            parts.stats,
            observer:         parts.observer,
            page_cache:       parts.page_cache,
            handle:           parts.handle,
            run:              CancellationToken::new(),
            run_start:        Instant::now(),
            next_behavior:    AtomicU64::new(0),
            active_users:     AtomicU32::new(0),
            complete:         AtomicBool::new(false),
            resets_completed: AtomicU64::new(0),
            population:       Mutex::new(BTreeMap::new()),
        }
    }

    pub fn next_behavior_id(&self) -> BehaviorId {
        BehaviorId(self.next_behavior.fetch_add(1, Ordering::Relaxed))
    }

    /// Time since the run started, for statistics offsets.
    pub fn offset(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.run_start)
    }

    // ── Load profile ──────────────────────────────────────────────────────

    pub fn active_users(&self) -> u32 {
        self.active_users.load(Ordering::Acquire)
    }

    pub fn set_active_users(&self, n: u32) {
        self.active_users.store(n, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn reset_completed(&self) {
        self.resets_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resets_completed(&self) -> u64 {
        self.resets_completed.load(Ordering::Relaxed)
    }

    // ── Population ────────────────────────────────────────────────────────

    /// Insert `user`, replacing any user with the same id.
    pub fn register(&self, user: Arc<User>) {
        self.population.lock().insert(user.id(), user);
    }

    pub fn user(&self, id: UserId) -> Option<Arc<User>> {
        self.population.lock().get(&id).cloned()
    }

    /// Snapshot of the population, in id order.  Callers notify users from
    /// the snapshot so the population lock is never held across a user's
    /// critical section.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.population.lock().values().cloned().collect()
    }

    /// Drop every registered user.  Breaks the user → context reference
    /// cycle when the driver goes away.
    pub fn clear_population(&self) {
        self.population.lock().clear();
    }

    pub fn user_count(&self) -> usize {
        self.population.lock().len()
    }
}
