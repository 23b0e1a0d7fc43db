//! Catalog records persisted as lifecycle markers.
//!
//! Each logical object is described by a small serde record that the engine
//! writes as a durable marker *before* any bulk data for the object exists.
//! A marker with `deleted = true` is a soft-delete tombstone: the object is
//! already invisible to every consumer, and the remaining cleanup steps may
//! run (and be retried) at any later point.

use serde::{Deserialize, Serialize};

use super::id::{CollectionId, DatabaseId, IndexId, ObjectId, ViewId};
use super::name::ObjectName;

/// Marker record for a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Globally unique, never-reused id.
    pub id: DatabaseId,
    /// The database name.
    pub name: ObjectName,
    /// Soft-delete flag; set durably before any physical removal.
    pub deleted: bool,
}

impl DatabaseInfo {
    /// Create a marker for a live database.
    #[must_use]
    pub fn new(id: DatabaseId, name: ObjectName) -> Self {
        Self { id, name, deleted: false }
    }
}

/// Marker record for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Logical (renamable) id.
    pub id: CollectionId,
    /// Owning database.
    pub database_id: DatabaseId,
    /// Key-range scope for this collection's documents. Distinct from `id`
    /// so that the scope survives renames.
    pub object_id: ObjectId,
    /// The collection name.
    pub name: ObjectName,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Indexes defined on this collection.
    pub indexes: Vec<IndexDescriptor>,
}

impl CollectionInfo {
    /// Create a marker for a live collection with no indexes.
    #[must_use]
    pub fn new(
        id: CollectionId,
        database_id: DatabaseId,
        object_id: ObjectId,
        name: ObjectName,
    ) -> Self {
        Self { id, database_id, object_id, name, deleted: false, indexes: Vec::new() }
    }

    /// Find an index descriptor by its logical id.
    #[must_use]
    pub fn index(&self, id: IndexId) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|ix| ix.id == id)
    }
}

/// Kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// The built-in primary index over document keys.
    Primary,
    /// Hash index for equality lookups.
    Hash,
    /// Skiplist index for ordered range lookups.
    Skiplist,
    /// General persistent index.
    Persistent,
}

/// Descriptor for one index defined on a collection.
///
/// The descriptor travels inside the owning collection's marker; the index's
/// entries occupy their own key range scoped by `object_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Logical id of the index.
    pub id: IndexId,
    /// Key-range scope for this index's entries.
    pub object_id: ObjectId,
    /// Index kind.
    pub kind: IndexKind,
    /// Indexed field paths.
    pub fields: Vec<String>,
}

impl IndexDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(id: IndexId, object_id: ObjectId, kind: IndexKind, fields: Vec<String>) -> Self {
        Self { id, object_id, kind, fields }
    }
}

/// Marker record for a view.
///
/// Views parallel collections in lifecycle but own no document storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewInfo {
    /// Logical id.
    pub id: ViewId,
    /// Owning database.
    pub database_id: DatabaseId,
    /// The view name.
    pub name: ObjectName,
    /// View implementation kind, opaque to the engine.
    pub kind: String,
    /// Implementation-defined properties, stored as-is.
    pub properties: serde_json::Value,
    /// Soft-delete flag.
    pub deleted: bool,
}

impl ViewInfo {
    /// Create a marker for a live view.
    #[must_use]
    pub fn new(
        id: ViewId,
        database_id: DatabaseId,
        name: ObjectName,
        kind: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        Self { id, database_id, name, kind: kind.into(), properties, deleted: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_index_lookup() {
        let mut coll = CollectionInfo::new(
            CollectionId::new(7),
            DatabaseId::new(1),
            ObjectId::new(100),
            ObjectName::new("orders").unwrap(),
        );
        coll.indexes.push(IndexDescriptor::new(
            IndexId::new(8),
            ObjectId::new(101),
            IndexKind::Hash,
            vec!["customer".into()],
        ));

        assert!(coll.index(IndexId::new(8)).is_some());
        assert!(coll.index(IndexId::new(9)).is_none());
    }

    #[test]
    fn markers_start_live() {
        let db = DatabaseInfo::new(DatabaseId::new(1), ObjectName::new("d1").unwrap());
        assert!(!db.deleted);

        let view = ViewInfo::new(
            ViewId::new(2),
            DatabaseId::new(1),
            ObjectName::new("v1").unwrap(),
            "search",
            serde_json::json!({ "links": {} }),
        );
        assert!(!view.deleted);
    }
}
