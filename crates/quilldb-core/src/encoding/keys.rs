//! Key construction and decoding.
//!
//! # Key layouts
//!
//! ```text
//! Database marker:        [0x01][database_id: 8]
//! Collection marker:      [0x02][database_id: 8][collection_id: 8]
//! Index entry:            [0x03][object_id: 8][entry suffix...]
//! Document:               [0x04][object_id: 8][user key...]
//! View marker:            [0x05][database_id: 8][view_id: 8]
//! Replication config:     [0x06][database_id: 8]
//! Counter checkpoint:     [0x07][object_id: 8]
//! Engine tick:            [0x08]
//! ```
//!
//! Tag values are stable on-disk identifiers and must not be renumbered
//! without a migration path.

use crate::types::{CollectionId, DatabaseId, ObjectId, ViewId};

use super::KeyError;

/// One-byte key type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyTag {
    /// Database marker record.
    Database = 1,
    /// Collection marker record.
    Collection = 2,
    /// Secondary index entry.
    Index = 3,
    /// Document record.
    Document = 4,
    /// View marker record.
    View = 5,
    /// Replication applier configuration.
    ReplicationConfig = 6,
    /// Durable counter checkpoint.
    CounterValue = 7,
    /// Singleton engine-state records (the persisted tick high-water mark).
    EngineState = 8,
}

impl KeyTag {
    /// The raw tag byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

fn scoped_key(tag: KeyTag, scope: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(tag.as_u8());
    key.extend_from_slice(&scope.to_be_bytes());
    key
}

/// Encode a database marker key.
#[inline]
#[must_use]
pub fn database_key(db: DatabaseId) -> Vec<u8> {
    scoped_key(KeyTag::Database, db.as_u64())
}

/// Encode a collection marker key.
#[must_use]
pub fn collection_key(db: DatabaseId, coll: CollectionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(KeyTag::Collection.as_u8());
    key.extend_from_slice(&db.as_u64().to_be_bytes());
    key.extend_from_slice(&coll.as_u64().to_be_bytes());
    key
}

/// Encode a view marker key.
#[must_use]
pub fn view_key(db: DatabaseId, view: ViewId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(KeyTag::View.as_u8());
    key.extend_from_slice(&db.as_u64().to_be_bytes());
    key.extend_from_slice(&view.as_u64().to_be_bytes());
    key
}

/// Encode the replication applier configuration key for a database.
#[inline]
#[must_use]
pub fn replication_config_key(db: DatabaseId) -> Vec<u8> {
    scoped_key(KeyTag::ReplicationConfig, db.as_u64())
}

/// Encode a document key scoped by the owning collection's object id.
#[must_use]
pub fn document_key(object_id: ObjectId, user_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + user_key.len());
    key.push(KeyTag::Document.as_u8());
    key.extend_from_slice(&object_id.as_u64().to_be_bytes());
    key.extend_from_slice(user_key);
    key
}

/// Encode an index entry key scoped by the index's object id.
#[must_use]
pub fn index_entry_key(object_id: ObjectId, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + suffix.len());
    key.push(KeyTag::Index.as_u8());
    key.extend_from_slice(&object_id.as_u64().to_be_bytes());
    key.extend_from_slice(suffix);
    key
}

/// Encode a durable counter checkpoint key.
#[inline]
#[must_use]
pub fn counter_key(object_id: ObjectId) -> Vec<u8> {
    scoped_key(KeyTag::CounterValue, object_id.as_u64())
}

/// Encode the singleton key holding the persisted tick high-water mark.
#[inline]
#[must_use]
pub fn engine_tick_key() -> Vec<u8> {
    vec![KeyTag::EngineState.as_u8()]
}

fn decode_scoped(key: &[u8], tag: KeyTag) -> Result<u64, KeyError> {
    if key.len() != 9 {
        return Err(KeyError::MalformedKey("expected 9-byte scoped key"));
    }
    if key[0] != tag.as_u8() {
        return Err(KeyError::MalformedKey("unexpected type tag"));
    }
    let bytes: [u8; 8] =
        key[1..9].try_into().map_err(|_| KeyError::MalformedKey("truncated scope id"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Decode a database marker key.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] for truncated or mistyped input.
pub fn decode_database_key(key: &[u8]) -> Result<DatabaseId, KeyError> {
    decode_scoped(key, KeyTag::Database).map(DatabaseId::new)
}

/// Decode a collection marker key into its owning database and collection id.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] for truncated or mistyped input.
pub fn decode_collection_key(key: &[u8]) -> Result<(DatabaseId, CollectionId), KeyError> {
    if key.len() != 17 {
        return Err(KeyError::MalformedKey("expected 17-byte collection key"));
    }
    if key[0] != KeyTag::Collection.as_u8() {
        return Err(KeyError::MalformedKey("unexpected type tag"));
    }
    let db: [u8; 8] =
        key[1..9].try_into().map_err(|_| KeyError::MalformedKey("truncated database id"))?;
    let coll: [u8; 8] =
        key[9..17].try_into().map_err(|_| KeyError::MalformedKey("truncated collection id"))?;
    Ok((DatabaseId::new(u64::from_be_bytes(db)), CollectionId::new(u64::from_be_bytes(coll))))
}

/// Decode a view marker key into its owning database and view id.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] for truncated or mistyped input.
pub fn decode_view_key(key: &[u8]) -> Result<(DatabaseId, ViewId), KeyError> {
    if key.len() != 17 {
        return Err(KeyError::MalformedKey("expected 17-byte view key"));
    }
    if key[0] != KeyTag::View.as_u8() {
        return Err(KeyError::MalformedKey("unexpected type tag"));
    }
    let db: [u8; 8] =
        key[1..9].try_into().map_err(|_| KeyError::MalformedKey("truncated database id"))?;
    let view: [u8; 8] =
        key[9..17].try_into().map_err(|_| KeyError::MalformedKey("truncated view id"))?;
    Ok((DatabaseId::new(u64::from_be_bytes(db)), ViewId::new(u64::from_be_bytes(view))))
}

/// Decode a document key into its object scope and user key.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] for truncated or mistyped input.
pub fn decode_document_key(key: &[u8]) -> Result<(ObjectId, &[u8]), KeyError> {
    if key.len() < 9 {
        return Err(KeyError::MalformedKey("document key shorter than its scope"));
    }
    if key[0] != KeyTag::Document.as_u8() {
        return Err(KeyError::MalformedKey("unexpected type tag"));
    }
    let oid: [u8; 8] =
        key[1..9].try_into().map_err(|_| KeyError::MalformedKey("truncated object id"))?;
    Ok((ObjectId::new(u64::from_be_bytes(oid)), &key[9..]))
}

/// Decode a counter checkpoint key.
///
/// # Errors
///
/// Returns [`KeyError::MalformedKey`] for truncated or mistyped input.
pub fn decode_counter_key(key: &[u8]) -> Result<ObjectId, KeyError> {
    decode_scoped(key, KeyTag::CounterValue).map(ObjectId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_key_roundtrip() {
        for id in [0u64, 1, 42, u64::MAX] {
            let db = DatabaseId::new(id);
            assert_eq!(decode_database_key(&database_key(db)), Ok(db));
        }
    }

    #[test]
    fn collection_key_roundtrip() {
        let db = DatabaseId::new(3);
        let coll = CollectionId::new(9000);
        assert_eq!(decode_collection_key(&collection_key(db, coll)), Ok((db, coll)));
    }

    #[test]
    fn view_key_roundtrip() {
        let db = DatabaseId::new(1);
        let view = ViewId::new(77);
        assert_eq!(decode_view_key(&view_key(db, view)), Ok((db, view)));
    }

    #[test]
    fn document_key_roundtrip() {
        let oid = ObjectId::new(100);
        let key = document_key(oid, b"k1");
        let (decoded, user) = decode_document_key(&key).unwrap();
        assert_eq!(decoded, oid);
        assert_eq!(user, b"k1");
    }

    #[test]
    fn document_keys_are_ordered_by_scope_then_key() {
        let a = document_key(ObjectId::new(1), b"zzz");
        let b = document_key(ObjectId::new(2), b"aaa");
        assert!(a < b);

        let c = document_key(ObjectId::new(2), b"bbb");
        assert!(b < c);
    }

    #[test]
    fn counter_key_roundtrip() {
        let oid = ObjectId::new(500);
        assert_eq!(decode_counter_key(&counter_key(oid)), Ok(oid));
    }

    #[test]
    fn decode_rejects_wrong_tag() {
        let key = database_key(DatabaseId::new(1));
        assert!(matches!(decode_counter_key(&key), Err(KeyError::MalformedKey(_))));
        assert!(matches!(decode_document_key(&key), Err(KeyError::MalformedKey(_))));
    }

    #[test]
    fn decode_rejects_truncation() {
        assert!(matches!(decode_database_key(&[]), Err(KeyError::MalformedKey(_))));
        assert!(matches!(
            decode_database_key(&[KeyTag::Database.as_u8(), 0, 0]),
            Err(KeyError::MalformedKey(_))
        ));
        assert!(matches!(
            decode_collection_key(&collection_key(DatabaseId::new(1), CollectionId::new(2))[..10]),
            Err(KeyError::MalformedKey(_))
        ));
        assert!(matches!(
            decode_document_key(&[KeyTag::Document.as_u8(), 1, 2, 3]),
            Err(KeyError::MalformedKey(_))
        ));
    }

    #[test]
    fn tags_partition_the_keyspace() {
        let keys = [
            database_key(DatabaseId::new(1)),
            collection_key(DatabaseId::new(1), CollectionId::new(1)),
            index_entry_key(ObjectId::new(1), b"x"),
            document_key(ObjectId::new(1), b"x"),
            view_key(DatabaseId::new(1), ViewId::new(1)),
            replication_config_key(DatabaseId::new(1)),
            counter_key(ObjectId::new(1)),
            engine_tick_key(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a[0], b[0]);
                }
            }
        }
    }
}
