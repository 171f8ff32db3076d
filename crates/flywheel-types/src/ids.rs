//! Type-safe identifier wrappers.
//!
//! Run-scoped records (simulations, events, reviews) are keyed by [`Uuid`].
//! Domain entities chosen by operators (products, agents) are keyed by
//! stable strings such as SKUs so that configuration files and command
//! schedules stay readable.
//!
//! Nothing in the live simulation path calls [`Uuid::now_v7`]: event and
//! review IDs are derived by the [`EventFactory`] so that two runs with the
//! same configuration produce identical journals.
//!
//! [`EventFactory`]: crate::event::EventFactory

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around a `String` key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a key from any string-like value.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the key is empty (never valid in a command).
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_id! {
    /// Unique identifier for one simulation run (journal partition key).
    SimulationId
}

define_id! {
    /// Unique identifier for an event in the journal.
    EventId
}

define_id! {
    /// Unique identifier for a customer review.
    ReviewId
}

define_key! {
    /// Identifier of a product (SKU) tracked by the world store.
    ProductId
}

define_key! {
    /// Identifier of an acting party (pricing bot, marketplace, operator).
    AgentId
}

impl SimulationId {
    /// Derive a stable run identifier from the world name and seed.
    ///
    /// Uses UUID v5 so the same name and seed always map to the same run.
    pub fn derive(name: &str, seed: u64) -> Self {
        let key = format!("flywheel:{name}:{seed}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
    }
}
