//! The logical transaction adapter.
//!
//! The storage backend offers one atomic write batch per transaction. A
//! logical engine transaction can outgrow what a single batch should hold,
//! so the adapter stages operations and, when a size threshold is crossed,
//! durably commits the staged prefix as an intermediate batch while the
//! logical transaction continues. Callers see one begin/commit pair either
//! way.
//!
//! After an intermediate commit has happened, abort can no longer undo the
//! already-committed prefix. Large maintenance-style transactions accept
//! that tradeoff in exchange for bounded batch sizes.

use std::collections::HashMap;

use quilldb_core::encoding::{decode_document_value, document_key, encode_document_value};
use quilldb_core::{CollectionInfo, ObjectId};
use quilldb_storage::{StorageEngine, Transaction};

use crate::engine::EngineInner;
use crate::error::{EngineError, EngineResult};

enum StagedOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A logical read-write transaction.
///
/// Created by [`Engine::begin`](crate::Engine::begin). Dropping the
/// adapter without committing discards all staged (not yet intermediately
/// committed) operations.
pub struct EngineTransaction<'e, E: StorageEngine> {
    inner: &'e EngineInner<E>,
    staged: Vec<StagedOp>,
    staged_bytes: usize,
    /// Read-your-own-writes overlay for every key touched by this logical
    /// transaction, staged or already flushed.
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
    /// Count deltas accumulated since the last flush.
    deltas: HashMap<ObjectId, i64>,
    intermediate_commits: usize,
    completed: bool,
}

impl<'e, E: StorageEngine> EngineTransaction<'e, E> {
    pub(crate) fn new(inner: &'e EngineInner<E>) -> Self {
        Self {
            inner,
            staged: Vec::new(),
            staged_bytes: 0,
            overlay: HashMap::new(),
            deltas: HashMap::new(),
            intermediate_commits: 0,
            completed: false,
        }
    }

    /// Insert or replace a document. Returns the assigned revision.
    pub fn insert(
        &mut self,
        collection: &CollectionInfo,
        user_key: &[u8],
        payload: &[u8],
    ) -> EngineResult<u64> {
        self.check_active()?;

        let key = document_key(collection.object_id, user_key);
        let existed = self.key_present(&key)?;
        let revision = self.inner.ticks.next_tick();
        let value = encode_document_value(revision, payload);

        self.stage(StagedOp::Put { key: key.clone(), value: value.clone() });
        self.overlay.insert(key, Some(value));
        if !existed {
            *self.deltas.entry(collection.object_id).or_insert(0) += 1;
        }

        self.spill_if_needed()?;
        Ok(revision)
    }

    /// Remove a document. Returns whether it existed.
    pub fn remove(
        &mut self,
        collection: &CollectionInfo,
        user_key: &[u8],
    ) -> EngineResult<bool> {
        self.check_active()?;

        let key = document_key(collection.object_id, user_key);
        let existed = self.key_present(&key)?;
        if !existed {
            return Ok(false);
        }

        self.stage(StagedOp::Delete { key: key.clone() });
        self.overlay.insert(key, None);
        *self.deltas.entry(collection.object_id).or_insert(0) -= 1;

        self.spill_if_needed()?;
        Ok(true)
    }

    /// Read a document, seeing this transaction's own uncommitted writes.
    /// Returns the revision and payload.
    pub fn get(
        &self,
        collection: &CollectionInfo,
        user_key: &[u8],
    ) -> EngineResult<Option<(u64, Vec<u8>)>> {
        let key = document_key(collection.object_id, user_key);
        let value = match self.overlay.get(&key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => {
                let tx = self.inner.store.begin_read()?;
                tx.get(&key)?
            }
        };

        match value {
            Some(bytes) => {
                let (revision, payload) = decode_document_value(&bytes)?;
                Ok(Some((revision, payload.to_vec())))
            }
            None => Ok(None),
        }
    }

    /// Stage a raw key-value write, bypassing document encoding and
    /// counters. For internal index and replication plumbing.
    pub fn stage_put(&mut self, key: Vec<u8>, value: Vec<u8>) -> EngineResult<()> {
        self.check_active()?;
        self.overlay.insert(key.clone(), Some(value.clone()));
        self.stage(StagedOp::Put { key, value });
        self.spill_if_needed()
    }

    /// Stage a raw key deletion, bypassing counters.
    pub fn stage_delete(&mut self, key: Vec<u8>) -> EngineResult<()> {
        self.check_active()?;
        self.overlay.insert(key.clone(), None);
        self.stage(StagedOp::Delete { key });
        self.spill_if_needed()
    }

    /// Commit everything staged since the last flush. After this the
    /// logical transaction is complete.
    pub fn commit(mut self) -> EngineResult<()> {
        self.check_active()?;
        self.flush()?;
        self.completed = true;
        Ok(())
    }

    /// Abort the transaction, discarding staged operations.
    ///
    /// Operations already flushed by an intermediate commit stay committed;
    /// only the unflushed tail is discarded.
    pub fn abort(mut self) {
        self.staged.clear();
        self.deltas.clear();
        self.completed = true;
    }

    /// How many intermediate commits this transaction has performed.
    #[must_use]
    pub const fn intermediate_commits(&self) -> usize {
        self.intermediate_commits
    }

    fn check_active(&self) -> EngineResult<()> {
        if self.completed {
            return Err(EngineError::TransactionCompleted);
        }
        Ok(())
    }

    fn stage(&mut self, op: StagedOp) {
        self.staged_bytes += match &op {
            StagedOp::Put { key, value } => key.len() + value.len(),
            StagedOp::Delete { key } => key.len(),
        };
        self.staged.push(op);
    }

    fn key_present(&self, key: &[u8]) -> EngineResult<bool> {
        match self.overlay.get(key) {
            Some(entry) => Ok(entry.is_some()),
            None => {
                let tx = self.inner.store.begin_read()?;
                Ok(tx.get(key)?.is_some())
            }
        }
    }

    fn spill_if_needed(&mut self) -> EngineResult<()> {
        if self.staged_bytes >= self.inner.config.max_transaction_bytes
            || self.staged.len() >= self.inner.config.max_transaction_ops
        {
            self.flush()?;
            self.intermediate_commits += 1;
        }
        Ok(())
    }

    /// Durably commit the staged operations and journal their count
    /// deltas. Any failure kills the logical transaction.
    fn flush(&mut self) -> EngineResult<()> {
        if self.staged.is_empty() && self.deltas.is_empty() {
            return Ok(());
        }

        if !self.staged.is_empty() {
            let result = (|| {
                let mut tx = self.inner.store.begin_write()?;
                for op in &self.staged {
                    match op {
                        StagedOp::Put { key, value } => tx.put(key, value)?,
                        StagedOp::Delete { key } => {
                            tx.delete(key)?;
                        }
                    }
                }
                tx.commit()
            })();
            if let Err(e) = result {
                self.completed = true;
                return Err(EngineError::CommitFailed(e));
            }
        }

        // Counter deltas are journaled only after the storage commit is
        // durable, so the journal never counts documents that were not
        // written.
        let deltas: Vec<(ObjectId, i64)> =
            self.deltas.drain().filter(|&(_, d)| d != 0).collect();
        self.inner.counters.apply_committed(&deltas)?;

        self.staged.clear();
        self.staged_bytes = 0;
        Ok(())
    }
}
