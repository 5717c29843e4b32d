//! Type-erased, scoped channel storage.
//!
//! # Design
//!
//! Each channel is stored as a `Box<dyn ErasedChannel>` in a map keyed by the
//! channel name.  One [`ChannelMap`] exists per scope: one for the user, and
//! one per behavior id.  Wiring clones channel handles out of the maps into a
//! [`Bindings`] value owned by the operation, so the hot path (reading and
//! writing channel values) never touches the scope maps again.

use std::any::{Any, TypeId};
use std::fmt;

use lg_core::BehaviorId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::capability::Capabilities;
use crate::channel::{Channel, ChannelKind};
use crate::key::{ChannelDescriptor, ChannelKey, ChannelScope};
use crate::{DataError, DataResult};

// ── Trait object ──────────────────────────────────────────────────────────────

/// Type-erased interface over the three channel shapes.
///
/// Implemented for every [`Channel`] by a blanket impl; `Channel` is sealed,
/// so no other implementations exist.
pub trait ErasedChannel: Send + Sync + 'static {
    fn kind(&self) -> ChannelKind;

    /// Drop every value held by the channel.
    fn clear_values(&self);

    /// A new handle aliasing the same storage.
    fn clone_handle(&self) -> Box<dyn ErasedChannel>;

    #[doc(hidden)]
    fn channel_type(&self) -> TypeId;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

impl<C: Channel> ErasedChannel for C {
    fn kind(&self) -> ChannelKind {
        C::KIND
    }

    fn clear_values(&self) {
        Channel::clear(self);
    }

    fn clone_handle(&self) -> Box<dyn ErasedChannel> {
        Box::new(self.clone())
    }

    fn channel_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── ChannelMap ────────────────────────────────────────────────────────────────

/// All channels of one scope, keyed by channel name.
#[derive(Default)]
pub struct ChannelMap {
    map: FxHashMap<&'static str, Box<dyn ErasedChannel>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the channel described by `desc`, if this scope holds it.
    ///
    /// Errors if a channel of the same name but a different type exists.
    pub fn get(&self, desc: &ChannelDescriptor) -> DataResult<Option<Box<dyn ErasedChannel>>> {
        match self.map.get(desc.name) {
            None => Ok(None),
            Some(existing) => {
                check_type(desc, existing.as_ref())?;
                Ok(Some(existing.clone_handle()))
            }
        }
    }

    /// Handle to the channel described by `desc`, creating it when missing.
    pub fn get_or_create(&mut self, desc: &ChannelDescriptor) -> DataResult<Box<dyn ErasedChannel>> {
        if let Some(existing) = self.map.get(desc.name) {
            check_type(desc, existing.as_ref())?;
            return Ok(existing.clone_handle());
        }
        let created = desc.instantiate();
        let handle = created.clone_handle();
        self.map.insert(desc.name, created);
        Ok(handle)
    }

    /// Typed lookup without creating.
    pub fn typed<C: Channel>(&self, key: &ChannelKey<C>) -> Option<C> {
        self.map
            .get(key.name())
            .and_then(|c| c.as_any().downcast_ref::<C>())
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of channels in this scope.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Empty every channel in place; handles held elsewhere see the change.
    pub fn clear_values(&self) {
        for channel in self.map.values() {
            channel.clear_values();
        }
    }
}

fn check_type(desc: &ChannelDescriptor, existing: &dyn ErasedChannel) -> DataResult<()> {
    if existing.channel_type() == desc.type_id {
        Ok(())
    } else {
        Err(DataError::TypeMismatch { name: desc.name, existing: existing.kind() })
    }
}

// ── DataScopes ────────────────────────────────────────────────────────────────

/// Every data channel belonging to one user.
///
/// # Thread safety
///
/// The user scope and the behavior-scope table each sit behind their own
/// `parking_lot::Mutex`.  Locks are held only while handles are cloned out,
/// never across channel reads or writes.
#[derive(Default)]
pub struct DataScopes {
    user:      Mutex<ChannelMap>,
    behaviors: Mutex<FxHashMap<BehaviorId, ChannelMap>>,
}

impl DataScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve only the user-scoped channels of `caps`.
    ///
    /// Used when an operation is constructed, before any behavior-scoped
    /// routing is known.
    pub fn wire_user(&self, caps: &Capabilities) -> DataResult<Bindings> {
        let mut bindings = Bindings::empty();
        let mut user = self.user.lock();
        for desc in caps.contains_iter().filter(|d| d.scope == ChannelScope::User) {
            bindings.contains.insert(desc.name, user.get_or_create(desc)?);
        }
        for desc in caps.needs_iter().filter(|d| d.scope == ChannelScope::User) {
            bindings.needs.insert(desc.name, user.get_or_create(desc)?);
        }
        Ok(bindings)
    }

    /// Resolve every channel of `caps`.
    ///
    /// Contained behavior-scoped channels are bound in `id_for_contains`,
    /// created there if needed.  Needed ones are looked up in `id_for_needs`,
    /// then `id_for_contains`.  The two sets are bound separately: an
    /// operation that both needs and contains a channel reads the source
    /// scope's copy and writes the sink's.
    pub fn wire(
        &self,
        caps:            &Capabilities,
        id_for_needs:    BehaviorId,
        id_for_contains: BehaviorId,
    ) -> DataResult<Bindings> {
        let mut bindings = self.wire_user(caps)?;
        let mut scopes = self.behaviors.lock();

        for desc in caps.contains_iter().filter(|d| d.scope == ChannelScope::Behavior) {
            let scope = scopes.entry(id_for_contains).or_default();
            bindings.contains.insert(desc.name, scope.get_or_create(desc)?);
        }

        for desc in caps.needs_iter().filter(|d| d.scope == ChannelScope::Behavior) {
            let found = match scopes.get(&id_for_needs) {
                Some(scope) => scope.get(desc)?,
                None => None,
            };
            let found = match found {
                Some(handle) => Some(handle),
                None => match scopes.get(&id_for_contains) {
                    Some(scope) => scope.get(desc)?,
                    None => None,
                },
            };
            match found {
                Some(handle) => {
                    bindings.needs.insert(desc.name, handle);
                }
                None => {
                    return Err(DataError::Unresolved {
                        name:     desc.name,
                        needs:    id_for_needs,
                        contains: id_for_contains,
                    });
                }
            }
        }

        Ok(bindings)
    }

    /// Create every channel `caps` contains, without resolving its needs.
    ///
    /// Behavior-scoped channels land in `scope`.  Declaring all of a
    /// behavior's operations before wiring any of them lets an operation need
    /// a channel that a later operation of the same behavior contains.
    pub fn declare(&self, caps: &Capabilities, scope: BehaviorId) -> DataResult<()> {
        let mut user = self.user.lock();
        let mut scopes = self.behaviors.lock();
        for desc in caps.contains_iter() {
            match desc.scope {
                ChannelScope::User => {
                    user.get_or_create(desc)?;
                }
                ChannelScope::Behavior => {
                    scopes.entry(scope).or_default().get_or_create(desc)?;
                }
            }
        }
        Ok(())
    }

    /// Typed handle to a user-scoped channel, creating it when missing.
    pub fn user_channel<C: Channel>(&self, key: &ChannelKey<C>) -> DataResult<C> {
        let handle = self.user.lock().get_or_create(&key.descriptor())?;
        downcast(key.name(), handle.as_ref())
    }

    /// Typed handle to a behavior-scoped channel, if that scope holds it.
    pub fn behavior_channel<C: Channel>(&self, scope: BehaviorId, key: &ChannelKey<C>) -> Option<C> {
        self.behaviors.lock().get(&scope).and_then(|m| m.typed(key))
    }

    /// Seed a behavior-scoped channel before any operation contains it.
    pub fn provide<C: Channel>(&self, scope: BehaviorId, key: &ChannelKey<C>) -> DataResult<C> {
        let mut scopes = self.behaviors.lock();
        let handle = scopes.entry(scope).or_default().get_or_create(&key.descriptor())?;
        downcast(key.name(), handle.as_ref())
    }

    /// Drop every channel scoped to `behavior`.
    pub fn clear_scope(&self, behavior: BehaviorId) {
        if let Some(map) = self.behaviors.lock().remove(&behavior) {
            debug!(%behavior, channels = map.len(), "cleared behavior data scope");
        }
    }

    /// Drop every behavior scope and empty the user-scoped channels.
    pub fn clear_all(&self) {
        self.behaviors.lock().clear();
        self.user.lock().clear_values();
    }

    /// Number of live behavior scopes.
    pub fn scope_count(&self) -> usize {
        self.behaviors.lock().len()
    }

    pub fn has_scope(&self, behavior: BehaviorId) -> bool {
        self.behaviors.lock().contains_key(&behavior)
    }
}

fn downcast<C: Channel>(name: &'static str, handle: &dyn ErasedChannel) -> DataResult<C> {
    handle
        .as_any()
        .downcast_ref::<C>()
        .cloned()
        .ok_or(DataError::TypeMismatch { name, existing: handle.kind() })
}

// ── Bindings ──────────────────────────────────────────────────────────────────

type HandleMap = FxHashMap<&'static str, Box<dyn ErasedChannel>>;

/// The live channel handles resolved for one operation (or chooser).
///
/// Needed and contained channels are held apart.  [`get`][Self::get] reads,
/// [`output`][Self::output] writes; they differ only when the operation's
/// output is routed to another behavior.
#[derive(Default)]
pub struct Bindings {
    needs:    HandleMap,
    contains: HandleMap,
}

impl Bindings {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Handle to read `key` through: the needed channel, else the contained
    /// one.
    ///
    /// Errors with [`DataError::Unbound`] if the key was not declared in the
    /// capabilities these bindings were wired from.
    pub fn get<C: Channel>(&self, key: &ChannelKey<C>) -> DataResult<C> {
        let handle = self
            .needs
            .get(key.name())
            .or_else(|| self.contains.get(key.name()))
            .ok_or(DataError::Unbound(key.name()))?;
        downcast(key.name(), handle.as_ref())
    }

    /// Handle to write `key` through.  Only contained channels qualify.
    pub fn output<C: Channel>(&self, key: &ChannelKey<C>) -> DataResult<C> {
        let handle = self.contains.get(key.name()).ok_or(DataError::Unbound(key.name()))?;
        downcast(key.name(), handle.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.needs.contains_key(name) || self.contains.contains_key(name)
    }

    /// Number of bound handles, reads and writes counted separately.
    pub fn len(&self) -> usize {
        self.needs.len() + self.contains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty() && self.contains.is_empty()
    }
}

fn clone_handles(map: &HandleMap) -> HandleMap {
    map.iter().map(|(name, handle)| (*name, handle.clone_handle())).collect()
}

impl Clone for Bindings {
    fn clone(&self) -> Self {
        Self { needs: clone_handles(&self.needs), contains: clone_handles(&self.contains) }
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut needs: Vec<_> = self.needs.keys().collect();
        let mut contains: Vec<_> = self.contains.keys().collect();
        needs.sort_unstable();
        contains.sort_unstable();
        f.debug_struct("Bindings").field("needs", &needs).field("contains", &contains).finish()
    }
}
