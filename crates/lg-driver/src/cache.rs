//! Per-user cache of already-fetched embedded resources.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Remembers which embedded resource URLs a user has fetched.
///
/// Shared by all operations of one user; cleared when the user resets.
pub trait PageCache: Send + Sync {
    fn contains(&self, uri: &str) -> bool;

    /// Record `uri`.  Returns `true` if it was not cached before.
    fn add(&self, uri: &str) -> bool;

    fn clear(&self);
}

/// Builds one cache per user.  Receives the configured capacity.
pub type PageCacheFactory = Arc<dyn Fn(usize) -> Arc<dyn PageCache> + Send + Sync>;

/// The default factory: a [`BoundedPageCache`] per user.
pub fn bounded_factory() -> PageCacheFactory {
    Arc::new(|capacity| Arc::new(BoundedPageCache::new(capacity)) as Arc<dyn PageCache>)
}

// ── BoundedPageCache ──────────────────────────────────────────────────────────

/// A set of URLs with first-in, first-out eviction once `capacity` is reached.
///
/// A capacity of zero caches nothing, so every embedded resource is fetched
/// every time.
pub struct BoundedPageCache {
    capacity: usize,
    inner:    Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    set:   FxHashSet<String>,
    order: VecDeque<String>,
}

impl BoundedPageCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(Inner::default()) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for BoundedPageCache {
    fn contains(&self, uri: &str) -> bool {
        self.inner.lock().set.contains(uri)
    }

    fn add(&self, uri: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        let mut inner = self.inner.lock();
        if inner.set.contains(uri) {
            return false;
        }
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.set.remove(&oldest);
                }
                None => break,
            }
        }
        inner.set.insert(uri.to_owned());
        inner.order.push_back(uri.to_owned());
        true
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.set.clear();
        inner.order.clear();
    }
}
