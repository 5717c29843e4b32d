//! Generic, composable data channels.
//!
//! Three container shapes cover every data dependency between operations:
//!
//! | Channel          | Shape                 | Typical use                      |
//! |------------------|-----------------------|----------------------------------|
//! | [`Slot<T>`]      | single value          | login token, current item        |
//! | [`Sequence<T>`]  | ordered, append/pop   | item ids found on a page         |
//! | [`KeyedMap<K,V>`]| key → value           | auction id → item id             |
//!
//! Every channel is a cheap handle (`Arc` inside); cloning it shares the
//! underlying storage.  Access is guarded by a `parking_lot::Mutex` local to
//! the channel, never by the per-user lock.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

// ── Channel trait ─────────────────────────────────────────────────────────────

/// Discriminant recorded in descriptors and error messages.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChannelKind {
    Slot,
    Sequence,
    Map,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelKind::Slot     => "slot",
            ChannelKind::Sequence => "sequence",
            ChannelKind::Map      => "map",
        };
        f.write_str(s)
    }
}

/// Implemented by the three channel shapes in this module.
///
/// The trait is sealed: the store relies on every channel being a shared
/// handle whose `clone` aliases the same storage.
pub trait Channel: Clone + Send + Sync + 'static + sealed::Sealed {
    const KIND: ChannelKind;

    /// A new, empty channel.
    fn empty() -> Self;

    /// Drop every value held by the channel.
    fn clear(&self);
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

// ── Slot ──────────────────────────────────────────────────────────────────────

/// A single-value channel.
pub struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&*self.0.lock()).finish()
    }
}

impl<T: Clone + Send + 'static> Slot<T> {
    pub fn new() -> Self {
        Slot(Arc::new(Mutex::new(None)))
    }

    /// Copy of the current value, if any.
    pub fn get(&self) -> Option<T> {
        self.0.lock().clone()
    }

    /// Replace the current value, returning the previous one.
    pub fn set(&self, value: T) -> Option<T> {
        self.0.lock().replace(value)
    }

    /// Remove and return the current value.
    pub fn take(&self) -> Option<T> {
        self.0.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    /// Run `f` against the value in place, under the channel lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// `true` if both handles alias the same storage.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone + Send + 'static> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> sealed::Sealed for Slot<T> {}

impl<T: Clone + Send + 'static> Channel for Slot<T> {
    const KIND: ChannelKind = ChannelKind::Slot;

    fn empty() -> Self {
        Self::new()
    }

    fn clear(&self) {
        Slot::clear(self);
    }
}

// ── Sequence ──────────────────────────────────────────────────────────────────

/// An ordered channel: producers append at the back, consumers pop from the
/// front or read a snapshot.  Covers list, queue, and (with
/// [`push_unique`][Self::push_unique]) set usage.
pub struct Sequence<T>(Arc<Mutex<VecDeque<T>>>);

impl<T> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Sequence(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&*self.0.lock()).finish()
    }
}

impl<T: Clone + Send + 'static> Sequence<T> {
    pub fn new() -> Self {
        Sequence(Arc::new(Mutex::new(VecDeque::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().push_back(value);
    }

    pub fn extend<I: IntoIterator<Item = T>>(&self, values: I) {
        self.0.lock().extend(values);
    }

    pub fn pop_front(&self) -> Option<T> {
        self.0.lock().pop_front()
    }

    /// Copy of every element, front to back.
    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().iter().cloned().collect()
    }

    /// Copy of the element at `index`, if present.
    pub fn get(&self, index: usize) -> Option<T> {
        self.0.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Remove the first element matching `pred`.
    pub fn remove_first(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let mut guard = self.0.lock();
        let pos = guard.iter().position(pred)?;
        guard.remove(pos)
    }
}

impl<T: Clone + PartialEq + Send + 'static> Sequence<T> {
    /// Append `value` unless an equal element is already present.
    /// Returns `true` if the value was added.
    pub fn push_unique(&self, value: T) -> bool {
        let mut guard = self.0.lock();
        if guard.contains(&value) {
            return false;
        }
        guard.push_back(value);
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.lock().contains(value)
    }
}

impl<T: Clone + Send + 'static> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> sealed::Sealed for Sequence<T> {}

impl<T: Clone + Send + 'static> Channel for Sequence<T> {
    const KIND: ChannelKind = ChannelKind::Sequence;

    fn empty() -> Self {
        Self::new()
    }

    fn clear(&self) {
        Sequence::clear(self);
    }
}

// ── KeyedMap ──────────────────────────────────────────────────────────────────

/// A key → value channel.  Inserting an existing key replaces its value.
pub struct KeyedMap<K, V>(Arc<Mutex<HashMap<K, V>>>);

impl<K, V> Clone for KeyedMap<K, V> {
    fn clone(&self) -> Self {
        KeyedMap(Arc::clone(&self.0))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for KeyedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyedMap").field(&*self.0.lock()).finish()
    }
}

impl<K, V> KeyedMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        KeyedMap(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Insert or replace; returns the previous value for `key`.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.0.lock().insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.0.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.0.lock().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.lock().contains_key(key)
    }

    /// Copy of every key, in arbitrary order.
    pub fn keys(&self) -> Vec<K> {
        self.0.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl<K, V> Default for KeyedMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> sealed::Sealed for KeyedMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
}

impl<K, V> Channel for KeyedMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    const KIND: ChannelKind = ChannelKind::Map;

    fn empty() -> Self {
        Self::new()
    }

    fn clear(&self) {
        KeyedMap::clear(self);
    }
}
