//! Static needs/contains declarations.

use crate::channel::Channel;
use crate::key::{ChannelDescriptor, ChannelKey, ChannelScope};

/// The set of channels an operation (or transition chooser) reads and writes.
///
/// Built once, typically in the operation's constructor:
///
/// ```rust
/// use lg_data::{Capabilities, ChannelKey, Sequence, Slot};
///
/// const TOKEN: ChannelKey<Slot<String>> = ChannelKey::user("token");
/// const ITEMS: ChannelKey<Sequence<u64>> = ChannelKey::behavior("items");
///
/// let caps = Capabilities::none().needs(TOKEN).contains(ITEMS);
/// assert_eq!(caps.needs_iter().count(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    needs:    Vec<ChannelDescriptor>,
    contains: Vec<ChannelDescriptor>,
}

impl Capabilities {
    /// No channels at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Declare that the holder reads `key`.
    pub fn needs<C: Channel>(mut self, key: ChannelKey<C>) -> Self {
        push_unique(&mut self.needs, key.descriptor());
        self
    }

    /// Declare that the holder writes `key`.
    pub fn contains<C: Channel>(mut self, key: ChannelKey<C>) -> Self {
        push_unique(&mut self.contains, key.descriptor());
        self
    }

    pub fn needs_iter(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.needs.iter()
    }

    pub fn contains_iter(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.contains.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty() && self.contains.is_empty()
    }

    /// `true` if any declared channel is behavior scoped.
    pub fn has_behavior_scope(&self) -> bool {
        self.needs
            .iter()
            .chain(self.contains.iter())
            .any(|d| d.scope == ChannelScope::Behavior)
    }
}

fn push_unique(list: &mut Vec<ChannelDescriptor>, desc: ChannelDescriptor) {
    if !list.contains(&desc) {
        list.push(desc);
    }
}
