//! Half-open prefix bounds for range scans.

use std::ops::Bound;

use crate::types::{DatabaseId, ObjectId};

use super::{KeyError, KeyTag};

/// A half-open byte range `[low, high)` containing exactly the keys that
/// belong to one scope.
///
/// The upper bound is derived by incrementing the final scope component, so
/// iteration bounded by a `KeyBounds` never reads past another object's
/// data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBounds {
    low: Vec<u8>,
    high: Vec<u8>,
}

impl KeyBounds {
    /// All keys carrying `tag`.
    #[must_use]
    pub fn tag_bounds(tag: KeyTag) -> Self {
        // Tag bytes are small constants; tag + 1 cannot wrap.
        Self { low: vec![tag.as_u8()], high: vec![tag.as_u8() + 1] }
    }

    fn scoped(tag: KeyTag, scope: u64) -> Result<Self, KeyError> {
        let next = scope.checked_add(1).ok_or(KeyError::ScopeOverflow)?;
        let mut low = Vec::with_capacity(9);
        low.push(tag.as_u8());
        low.extend_from_slice(&scope.to_be_bytes());
        let mut high = Vec::with_capacity(9);
        high.push(tag.as_u8());
        high.extend_from_slice(&next.to_be_bytes());
        Ok(Self { low, high })
    }

    /// All database marker records.
    #[must_use]
    pub fn databases() -> Self {
        Self::tag_bounds(KeyTag::Database)
    }

    /// All collection marker records, across every database.
    #[must_use]
    pub fn all_collections() -> Self {
        Self::tag_bounds(KeyTag::Collection)
    }

    /// All view marker records, across every database.
    #[must_use]
    pub fn all_views() -> Self {
        Self::tag_bounds(KeyTag::View)
    }

    /// All durable counter checkpoint records.
    #[must_use]
    pub fn counters() -> Self {
        Self::tag_bounds(KeyTag::CounterValue)
    }

    /// Collection markers owned by one database.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::ScopeOverflow`] if the database id is maximal.
    pub fn collections(db: DatabaseId) -> Result<Self, KeyError> {
        Self::scoped(KeyTag::Collection, db.as_u64())
    }

    /// View markers owned by one database.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::ScopeOverflow`] if the database id is maximal.
    pub fn views(db: DatabaseId) -> Result<Self, KeyError> {
        Self::scoped(KeyTag::View, db.as_u64())
    }

    /// Document entries scoped by one collection's object id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::ScopeOverflow`] if the object id is maximal.
    pub fn documents(object_id: ObjectId) -> Result<Self, KeyError> {
        Self::scoped(KeyTag::Document, object_id.as_u64())
    }

    /// Index entries scoped by one index's object id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::ScopeOverflow`] if the object id is maximal.
    pub fn index_entries(object_id: ObjectId) -> Result<Self, KeyError> {
        Self::scoped(KeyTag::Index, object_id.as_u64())
    }

    /// Inclusive lower bound.
    #[must_use]
    pub fn low(&self) -> &[u8] {
        &self.low
    }

    /// Exclusive upper bound.
    #[must_use]
    pub fn high(&self) -> &[u8] {
        &self.high
    }

    /// The range as `(Bound::Included(low), Bound::Excluded(high))`.
    #[must_use]
    pub fn as_range(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (Bound::Included(self.low.as_slice()), Bound::Excluded(self.high.as_slice()))
    }

    /// Whether `key` falls inside this bound.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.low.as_slice() && key < self.high.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{collection_key, document_key};
    use crate::types::CollectionId;

    #[test]
    fn document_bounds_contain_only_their_scope() {
        let bounds = KeyBounds::documents(ObjectId::new(100)).unwrap();

        assert!(bounds.contains(&document_key(ObjectId::new(100), b"")));
        assert!(bounds.contains(&document_key(ObjectId::new(100), b"k1")));
        assert!(bounds.contains(&document_key(ObjectId::new(100), &[0xFF; 32])));

        assert!(!bounds.contains(&document_key(ObjectId::new(99), &[0xFF; 32])));
        assert!(!bounds.contains(&document_key(ObjectId::new(101), b"")));
    }

    #[test]
    fn adjacent_scopes_do_not_overlap() {
        let a = KeyBounds::documents(ObjectId::new(7)).unwrap();
        let b = KeyBounds::documents(ObjectId::new(8)).unwrap();
        assert_eq!(a.high(), b.low());
    }

    #[test]
    fn collection_bounds_scoped_by_database() {
        let bounds = KeyBounds::collections(crate::types::DatabaseId::new(2)).unwrap();
        let inside = collection_key(crate::types::DatabaseId::new(2), CollectionId::new(u64::MAX));
        let outside = collection_key(crate::types::DatabaseId::new(3), CollectionId::new(0));
        assert!(bounds.contains(&inside));
        assert!(!bounds.contains(&outside));
    }

    #[test]
    fn maximal_scope_overflows() {
        assert_eq!(KeyBounds::documents(ObjectId::new(u64::MAX)), Err(KeyError::ScopeOverflow));
    }

    #[test]
    fn tag_bounds_cover_scoped_bounds() {
        let all = KeyBounds::all_collections();
        let one = KeyBounds::collections(crate::types::DatabaseId::new(5)).unwrap();
        assert!(all.contains(one.low()));
        assert!(all.low() <= one.low() && one.high() <= all.high());
    }
}
