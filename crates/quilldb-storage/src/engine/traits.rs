//! Core storage engine traits.
//!
//! Backends expose a single ordered byte keyspace. Keys arriving here are
//! already fully scoped by the key codec, so there is no table or namespace
//! parameter: one physical keyspace, total byte order.

use std::ops::Bound;
use std::sync::Arc;

use super::StorageError;

/// A key-value pair returned by cursor operations.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Result type for cursor operations that return a key-value pair.
pub type CursorResult = Result<Option<KeyValue>, StorageError>;

/// A storage engine that provides transactional key-value operations.
///
/// The engine relies on two backend guarantees and does not reimplement
/// them: read transactions see a consistent snapshot, and a committed write
/// transaction applies all of its operations atomically.
pub trait StorageEngine: Send + Sync {
    /// The transaction type for this engine.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Begin a read-only transaction over a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the transaction cannot be
    /// started.
    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Begin a read-write transaction.
    ///
    /// Depending on the backend, write transactions may be serialized.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the transaction cannot be
    /// started.
    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Request compaction of the keyspace.
    ///
    /// Best-effort: the drop protocol calls this after releasing a key
    /// range, and ignores failures. The default implementation does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the backend attempted and
    /// failed to compact.
    fn compact(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A transaction over the keyspace.
///
/// Write transactions must be explicitly committed; dropping without a
/// commit rolls back all staged changes.
pub trait Transaction {
    /// The cursor type for iteration.
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    /// Get a value by key.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a key-value pair, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read transaction.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.
    ///
    /// Returns `Ok(true)` if the key existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read transaction.
    fn delete(&mut self, key: &[u8]) -> Result<bool, StorageError>;

    /// Create a cursor over a key range.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the range cannot be opened.
    fn range(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
    ) -> Result<Self::Cursor<'_>, StorageError>;

    /// Commit the transaction, making all changes durable atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the commit fails; no staged
    /// change is applied in that case.
    fn commit(self) -> Result<(), StorageError>;

    /// Roll back the transaction, discarding all staged changes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the rollback fails.
    fn rollback(self) -> Result<(), StorageError>;

    /// Check if this is a read-only transaction.
    fn is_read_only(&self) -> bool;
}

/// A cursor for ordered forward iteration over key-value pairs.
///
/// ```ignore
/// let mut cursor = tx.range(bounds.as_range().0, bounds.as_range().1)?;
/// while let Some((key, value)) = cursor.next()? {
///     // process entry
/// }
/// ```
pub trait Cursor {
    /// Seek to the first key greater than or equal to `key` within the
    /// cursor's range.
    fn seek(&mut self, key: &[u8]) -> CursorResult;

    /// Seek to the first key-value pair in the range.
    fn seek_first(&mut self) -> CursorResult;

    /// Move to the next key-value pair.
    ///
    /// A freshly created cursor starts before the first entry, so the first
    /// call returns the first pair in the range.
    fn next(&mut self) -> CursorResult;
}

/// Shared-ownership engines: `Arc<E>` is an engine whenever `E` is.
impl<E: StorageEngine> StorageEngine for Arc<E> {
    type Transaction<'a>
        = E::Transaction<'a>
    where
        Self: 'a;

    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_read()
    }

    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_write()
    }

    fn compact(&self) -> Result<(), StorageError> {
        (**self).compact()
    }
}
