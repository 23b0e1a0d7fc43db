//! Object registry: object id to owner mapping.
//!
//! Read-side consumers (replication appliers, index repair) hold storage
//! keys and need to attribute an object id to its logical owner without
//! touching the persisted catalog. The registry is advisory: a miss means
//! the object was dropped or never existed, which callers treat as "skip".

use std::collections::HashMap;
use std::sync::RwLock;

use quilldb_core::{CollectionId, DatabaseId, ObjectId};

/// In-memory map from storage object ids to their logical owners.
///
/// The lock is only ever held for the map operation itself, never across
/// storage I/O.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    map: RwLock<HashMap<ObjectId, (DatabaseId, CollectionId)>>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the owner of `object_id`. Idempotent: re-registering the same
    /// mapping is a no-op, and an existing mapping is overwritten (object
    /// ids are never reused, so a conflicting owner cannot occur in
    /// practice).
    pub fn register(&self, object_id: ObjectId, db: DatabaseId, coll: CollectionId) {
        let mut map = self.map.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.insert(object_id, (db, coll));
    }

    /// Look up the owner of `object_id`. `None` means dropped or unknown.
    #[must_use]
    pub fn lookup(&self, object_id: ObjectId) -> Option<(DatabaseId, CollectionId)> {
        let map = self.map.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.get(&object_id).copied()
    }

    /// Remove the mapping for a dropped object.
    pub fn unregister(&self, object_id: ObjectId) {
        let mut map = self.map.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.remove(&object_id);
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        let map = self.map.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
