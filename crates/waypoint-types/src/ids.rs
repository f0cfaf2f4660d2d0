//! Type-safe identifier wrappers around `i64`.
//!
//! Users arrive from the external identity subsystem with integer ids, and
//! every catalog and progress row uses a `BIGSERIAL` key, so all identifiers
//! are 64-bit integers. Each entity still gets its own newtype to prevent
//! accidental mixing of a user id with an experience id at compile time.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `i64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw database key.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Return the inner `i64` value.
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a user, owned by the external identity subsystem.
    UserId
}

define_id! {
    /// Identifier of an experience in the content catalog.
    ExperienceId
}

define_id! {
    /// Identifier of one ordered component of an experience.
    ComponentId
}

define_id! {
    /// Identifier of a per-user progress row.
    ProgressId
}

define_id! {
    /// Identifier of an inventory item, owned by the inventory subsystem.
    ItemId
}

define_id! {
    /// Identifier of an achievement, owned by the achievement subsystem.
    AchievementId
}
