//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  The inner integer is `pub`; prefer
//! the `.index()` helper when using an ID to index a `Vec`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            /// Returns the `INVALID` sentinel so uninitialized IDs are visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// Identity of a virtual user.  Survives reset: a replacement user keeps
    /// the id of the user it replaces.
    pub struct UserId(u32);
}

typed_id! {
    /// Position of a user in the activation order.  A user is active while
    /// its ordering id is below the permitted active-user count.
    pub struct OrderingId(u32);
}

typed_id! {
    /// Index of an operation within a `BehaviorSpec`.
    pub struct OpIndex(u16);
}

typed_id! {
    /// Identity of one behavior instance (root or sub-behavior).
    ///
    /// Never reused within a run; also used as the scope key for data
    /// channels.
    pub struct BehaviorId(u64);
}

impl OrderingId {
    /// `true` if a user at this position should run when `active_users`
    /// users are permitted.
    #[inline]
    pub fn is_within(self, active_users: u32) -> bool {
        self.0 < active_users
    }
}
