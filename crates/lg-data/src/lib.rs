//! `lg-data`: the data-dependency plumbing between operations.
//!
//! Operations never talk to each other directly.  An operation *contains* a
//! channel when it produces a value other operations read, and *needs* a
//! channel when it consumes one.  Each operation declares both sets up front
//! in a static [`Capabilities`] descriptor; [`DataScopes::wire`] resolves the
//! declarations into live channel handles ([`Bindings`]) for one behavior
//! scope at a time.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`channel`]     | `Slot<T>`, `Sequence<T>`, `KeyedMap<K, V>`, `Channel` trait |
//! | [`key`]         | `ChannelKey<C>`, `ChannelScope`, `ChannelDescriptor`       |
//! | [`capability`]  | `Capabilities` (needs / contains descriptor sets)          |
//! | [`store`]       | `ChannelMap`, `DataScopes`, `Bindings`                     |
//! | [`extract`]     | substring and JSON-path extraction helpers                 |
//! | [`listener`]    | `ResponseListener` trait and the stock listeners           |
//! | [`error`]       | `DataError`, `DataResult<T>`                               |
//!
//! # Scoping
//!
//! ```text
//! ChannelScope::User      one channel per user, shared by every behavior
//! ChannelScope::Behavior  one channel per behavior id
//!
//! wire(caps, id_for_needs, id_for_contains):
//!   contains → channel in scope id_for_contains (created when missing)
//!   needs    → channel in scope id_for_needs, else id_for_contains, else error
//!
//! Bindings::get     reads  (needed handle, else contained)
//! Bindings::output  writes (contained handle only)
//! ```
//!
//! Routing a parent's output into a freshly spawned child is just a matter of
//! passing the child's id as `id_for_contains`.

pub mod capability;
pub mod channel;
pub mod error;
pub mod extract;
pub mod key;
pub mod listener;
pub mod store;


pub use capability::Capabilities;
pub use channel::{Channel, ChannelKind, KeyedMap, Sequence, Slot};
pub use error::{DataError, DataResult};
pub use key::{ChannelDescriptor, ChannelKey, ChannelScope};
pub use listener::{
    HeaderListener, JsonFieldListener, JsonMapListener, KeyValueListener, RawBodyListener,
    ResponseListener, SubstringListener, SubstringSlotListener,
};
pub use store::{Bindings, ChannelMap, DataScopes};
