//! Typed channel keys and their erased descriptors.
//!
//! A key is declared once, usually as a `const`, next to the operations that
//! share it:
//!
//! ```rust
//! use lg_data::{ChannelKey, Sequence, Slot};
//!
//! pub const AUTH_TOKEN: ChannelKey<Slot<String>> = ChannelKey::user("auth_token");
//! pub const ITEM_IDS:   ChannelKey<Sequence<u64>> = ChannelKey::behavior("item_ids");
//! ```
//!
//! The key carries the channel type statically, so lookups through
//! [`Bindings::get`][crate::Bindings::get] are checked at compile time.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use crate::channel::{Channel, ChannelKind};
use crate::store::ErasedChannel;

/// Which scope a channel lives in.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ChannelScope {
    /// One instance per user, shared by all of the user's behaviors.
    User,
    /// One instance per behavior id.
    Behavior,
}

// ── ChannelKey ────────────────────────────────────────────────────────────────

/// A named, typed handle to a data channel.
pub struct ChannelKey<C> {
    name:    &'static str,
    scope:   ChannelScope,
    _marker: PhantomData<fn() -> C>,
}

impl<C> Clone for ChannelKey<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ChannelKey<C> {}

impl<C> fmt::Debug for ChannelKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelKey")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

impl<C> ChannelKey<C> {
    /// A key for a channel shared by every behavior of a user.
    pub const fn user(name: &'static str) -> Self {
        Self { name, scope: ChannelScope::User, _marker: PhantomData }
    }

    /// A key for a channel scoped to one behavior.
    pub const fn behavior(name: &'static str) -> Self {
        Self { name, scope: ChannelScope::Behavior, _marker: PhantomData }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn scope(&self) -> ChannelScope {
        self.scope
    }
}

impl<C: Channel> ChannelKey<C> {
    /// Erase the channel type into a descriptor the store can act on.
    pub fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name:      self.name,
            scope:     self.scope,
            kind:      C::KIND,
            type_id:   TypeId::of::<C>(),
            make:      make_erased::<C>,
        }
    }
}

fn make_erased<C: Channel>() -> Box<dyn ErasedChannel> {
    Box::new(C::empty())
}

// ── ChannelDescriptor ─────────────────────────────────────────────────────────

/// The type-erased form of a [`ChannelKey`], stored in [`Capabilities`][crate::Capabilities].
#[derive(Copy, Clone)]
pub struct ChannelDescriptor {
    pub name:  &'static str,
    pub scope: ChannelScope,
    pub kind:  ChannelKind,
    pub(crate) type_id: TypeId,
    pub(crate) make:    fn() -> Box<dyn ErasedChannel>,
}

impl ChannelDescriptor {
    /// Build an empty channel of the described type.
    pub(crate) fn instantiate(&self) -> Box<dyn ErasedChannel> {
        (self.make)()
    }
}

impl fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for ChannelDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.scope == other.scope && self.type_id == other.type_id
    }
}

impl Eq for ChannelDescriptor {}
