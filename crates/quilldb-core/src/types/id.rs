//! Unique identifiers for engine objects.
//!
//! Logical ids (`DatabaseId`, `CollectionId`, `ViewId`, `IndexId`) name an
//! object in the catalog. The [`ObjectId`] is a separate process-wide handle
//! that scopes an object's key range in the store; it is decoupled from the
//! logical id so that key scoping survives renames.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            /// Create from a raw u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw u64 value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self::new(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type! {
    /// Unique identifier for a database.
    DatabaseId
}

id_type! {
    /// Logical (renamable) identifier for a collection.
    CollectionId
}

id_type! {
    /// Logical identifier for an index.
    IndexId
}

id_type! {
    /// Logical identifier for a view.
    ViewId
}

id_type! {
    /// Process-wide unique handle scoping a collection's or index's key range.
    ///
    /// Assigned exactly once for the lifetime of the keyspace and never
    /// reused, even across restarts.
    ObjectId
}

/// Monotonic source of fresh identifiers.
///
/// All logical ids and object ids are drawn from a single generator, which is
/// reseeded at startup from the highest id observed while scanning the
/// keyspace. Values are never handed out twice.
#[derive(Debug)]
pub struct TickGenerator {
    next: AtomicU64,
}

impl TickGenerator {
    /// Create a generator whose first tick is `seed + 1`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { next: AtomicU64::new(seed) }
    }

    /// Return a fresh, never-before-returned value.
    pub fn next_tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise the generator floor to at least `id`.
    ///
    /// Called for every id seen during the startup scan so that ids assigned
    /// after a restart never collide with ids already in the keyspace.
    pub fn observe(&self, id: u64) {
        self.next.fetch_max(id, Ordering::SeqCst);
    }

    /// The highest value handed out or observed so far.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for TickGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}
