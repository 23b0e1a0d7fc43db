//! Redb transaction and cursor implementation.
//!
//! The cursor streams entries in batches instead of materializing a whole
//! range up front, so a prefix scan over a large collection holds at most
//! one batch in memory.

use std::ops::Bound;

use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::engine::{Cursor, CursorResult, KeyValue, StorageError, Transaction};

use super::DATA_TABLE;

/// Default number of entries fetched per cursor batch.
const DEFAULT_BATCH_SIZE: usize = 1000;

/// A transaction for the Redb storage engine.
///
/// Wraps both read-only and read-write Redb transactions behind the
/// [`Transaction`] trait.
#[allow(clippy::large_enum_variant)]
pub enum RedbTransaction {
    /// A read-only transaction over a consistent snapshot.
    Read(ReadTransaction),
    /// A read-write transaction.
    Write(WriteTransaction),
}

impl RedbTransaction {
    /// Create a new read-only transaction.
    pub const fn new_read(tx: ReadTransaction) -> Self {
        Self::Read(tx)
    }

    /// Create a new read-write transaction.
    pub const fn new_write(tx: WriteTransaction) -> Self {
        Self::Write(tx)
    }

    /// Fetch up to `limit` entries from `[start, end)` in key order.
    fn fetch_batch(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<KeyValue>, StorageError> {
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(table) => scan_table(&table, start, end, limit),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
            Self::Write(tx) => match tx.open_table(DATA_TABLE) {
                Ok(table) => scan_table(&table, start, end, limit),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
        }
    }
}

fn scan_table<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    start: Bound<&[u8]>,
    end: Bound<&[u8]>,
    limit: usize,
) -> Result<Vec<KeyValue>, StorageError> {
    let range =
        table.range::<&[u8]>((start, end)).map_err(|e| StorageError::Internal(e.to_string()))?;

    let mut entries = Vec::with_capacity(limit.min(1024));
    for result in range {
        if entries.len() >= limit {
            break;
        }
        let (k, v) = result.map_err(|e| StorageError::Internal(e.to_string()))?;
        entries.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(entries)
}

fn get_from<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StorageError> {
    match table.get(key) {
        Ok(Some(value)) => Ok(Some(value.value().to_vec())),
        Ok(None) => Ok(None),
        Err(e) => Err(StorageError::Internal(e.to_string())),
    }
}

impl Transaction for RedbTransaction {
    type Cursor<'a>
        = RedbCursor<'a>
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(table) => get_from(&table, key),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
            Self::Write(tx) => match tx.open_table(DATA_TABLE) {
                Ok(table) => get_from(&table, key),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let mut table =
                    tx.open_table(DATA_TABLE).map_err(|e| StorageError::Internal(e.to_string()))?;
                table.insert(key, value).map_err(|e| StorageError::Internal(e.to_string()))?;
                Ok(())
            }
        }
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool, StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => match tx.open_table(DATA_TABLE) {
                Ok(mut table) => match table.remove(key) {
                    Ok(Some(_)) => Ok(true),
                    Ok(None) => Ok(false),
                    Err(e) => Err(StorageError::Internal(e.to_string())),
                },
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(false),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
        }
    }

    fn range(
        &self,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
    ) -> Result<Self::Cursor<'_>, StorageError> {
        Ok(RedbCursor::new(self, bound_to_owned(start), bound_to_owned(end), DEFAULT_BATCH_SIZE))
    }

    fn commit(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.commit().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn rollback(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => {
                drop(tx.abort());
                Ok(())
            }
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

fn bound_to_owned(bound: Bound<&[u8]>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(b) => Bound::Included(b.to_vec()),
        Bound::Excluded(b) => Bound::Excluded(b.to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn as_bound_ref(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

enum CursorState {
    /// No batch loaded yet.
    Unprimed,
    /// Streaming through batches; the last fetch returned a full batch, so
    /// more entries may follow.
    Streaming,
    /// The range is exhausted.
    Exhausted,
}

/// A memory-efficient forward cursor over a Redb key range.
///
/// At most `batch_size` entries are held in memory at a time; the next batch
/// is fetched on demand as iteration advances past the current one.
pub struct RedbCursor<'a> {
    tx: &'a RedbTransaction,
    start: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    batch: Vec<KeyValue>,
    next_index: usize,
    state: CursorState,
    batch_size: usize,
}

impl<'a> RedbCursor<'a> {
    fn new(
        tx: &'a RedbTransaction,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        batch_size: usize,
    ) -> Self {
        Self {
            tx,
            start,
            end,
            batch: Vec::new(),
            next_index: 0,
            state: CursorState::Unprimed,
            batch_size,
        }
    }

    fn load_from(&mut self, start: Bound<&[u8]>) -> Result<(), StorageError> {
        self.batch = self.tx.fetch_batch(start, as_bound_ref(&self.end), self.batch_size)?;
        self.next_index = 0;
        self.state = if self.batch.len() >= self.batch_size {
            CursorState::Streaming
        } else if self.batch.is_empty() {
            CursorState::Exhausted
        } else {
            // Partial batch: these are the final entries of the range.
            CursorState::Streaming
        };
        Ok(())
    }

    fn advance(&mut self) -> CursorResult {
        if self.next_index < self.batch.len() {
            let entry = self.batch[self.next_index].clone();
            self.next_index += 1;
            return Ok(Some(entry));
        }

        // Current batch consumed. A short batch means the range is done.
        if self.batch.len() < self.batch_size {
            self.state = CursorState::Exhausted;
            return Ok(None);
        }

        let after = match self.batch.last() {
            Some((key, _)) => key.clone(),
            None => {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
        };
        self.load_from(Bound::Excluded(after.as_slice()))?;
        self.advance()
    }
}

impl Cursor for RedbCursor<'_> {
    fn seek(&mut self, key: &[u8]) -> CursorResult {
        // Never seek before the cursor's own lower bound.
        let effective = match &self.start {
            Bound::Included(s) if s.as_slice() > key => Bound::Included(s.clone()),
            Bound::Excluded(s) if s.as_slice() >= key => Bound::Excluded(s.clone()),
            _ => Bound::Included(key.to_vec()),
        };
        self.load_from(as_bound_ref(&effective))?;
        self.advance()
    }

    fn seek_first(&mut self) -> CursorResult {
        let start = match &self.start {
            Bound::Included(s) => Bound::Included(s.clone()),
            Bound::Excluded(s) => Bound::Excluded(s.clone()),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.load_from(as_bound_ref(&start))?;
        self.advance()
    }

    fn next(&mut self) -> CursorResult {
        match self.state {
            CursorState::Unprimed => self.seek_first(),
            CursorState::Streaming => self.advance(),
            CursorState::Exhausted => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RedbEngine;
    use crate::engine::StorageEngine;

    fn populated_engine() -> RedbEngine {
        let engine = RedbEngine::in_memory().unwrap();
        let mut tx = engine.begin_write().unwrap();
        for i in 0u8..10 {
            tx.put(&[1, i], &[i]).unwrap();
        }
        tx.put(&[2, 0], b"other-scope").unwrap();
        tx.commit().unwrap();
        engine
    }

    #[test]
    fn range_respects_bounds() {
        let engine = populated_engine();
        let tx = engine.begin_read().unwrap();

        let mut cursor =
            tx.range(Bound::Included(&[1][..]), Bound::Excluded(&[2][..])).unwrap();

        let mut seen = Vec::new();
        while let Some((key, _)) = cursor.next().unwrap() {
            seen.push(key);
        }
        assert_eq!(seen.len(), 10);
        assert!(seen.iter().all(|k| k[0] == 1));
    }

    #[test]
    fn seek_positions_at_first_ge_key() {
        let engine = populated_engine();
        let tx = engine.begin_read().unwrap();

        let mut cursor = tx.range(Bound::Unbounded, Bound::Unbounded).unwrap();
        let (key, value) = cursor.seek(&[1, 5]).unwrap().unwrap();
        assert_eq!(key, vec![1, 5]);
        assert_eq!(value, vec![5]);

        let (key, _) = cursor.next().unwrap().unwrap();
        assert_eq!(key, vec![1, 6]);
    }

    #[test]
    fn small_batches_stream_the_full_range() {
        let engine = populated_engine();
        let tx = engine.begin_read().unwrap();

        // Force multiple batch fetches.
        let mut cursor = RedbCursor::new(
            &tx,
            Bound::Included(vec![1]),
            Bound::Excluded(vec![2]),
            3,
        );

        let mut count = 0;
        while cursor.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 10);
        // Exhausted cursors stay exhausted.
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn empty_range_yields_nothing() {
        let engine = populated_engine();
        let tx = engine.begin_read().unwrap();

        let mut cursor =
            tx.range(Bound::Included(&[9][..]), Bound::Excluded(&[10][..])).unwrap();
        assert!(cursor.next().unwrap().is_none());
    }
}
