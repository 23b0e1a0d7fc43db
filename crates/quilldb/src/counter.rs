//! Document counters with journaled durability.
//!
//! Exact per-collection document counts are kept in memory and adjusted as
//! transactions commit. Durability comes from two places: periodic
//! checkpoint records written under `counter_key(obj)` in the main store,
//! and the append-only journal holding every adjustment since the last
//! checkpoint. Recovery is checkpoint plus replay, so a crash never loses
//! more than the adjustments of transactions whose journal frames had not
//! reached disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quilldb_core::encoding::{counter_key, decode_counter_key, KeyBounds};
use quilldb_core::ObjectId;
use quilldb_storage::journal::{
    JournalConfig, JournalOp, JournalRecovery, JournalWriter, Lsn,
};
use quilldb_storage::{Cursor, StorageEngine, Transaction};

use crate::error::{EngineError, EngineResult};

/// Durable per-collection counter record, persisted under `counter_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CounterCheckpoint {
    /// Document count at checkpoint time.
    count: u64,
    /// Revision tick of the last counted change.
    revision: u64,
    /// LSN of the last journal entry reflected in `count`.
    lsn: Lsn,
}

/// In-memory counter state for one collection object.
#[derive(Debug, Clone, Copy)]
struct CounterState {
    count: u64,
    revision: u64,
    lsn: Lsn,
    dirty: bool,
}

/// Manages exact document counts for all collection objects.
///
/// Lock order is journal before states; neither lock is held across writes
/// to the main store.
pub struct CounterManager {
    journal: Mutex<JournalWriter>,
    states: Mutex<HashMap<ObjectId, CounterState>>,
    revision: AtomicU64,
    /// Serializes whole checkpoint passes. The snapshot's journal offset is
    /// only meaningful if no other truncation runs between snapshot and
    /// truncate; foreground appends only ever take the journal lock.
    checkpointing: Mutex<()>,
}

impl CounterManager {
    /// Open the journal at `path` and rebuild counter state from the
    /// durable checkpoints in `store` plus journal replay.
    ///
    /// Replay applies, per object, only entries with an LSN past that
    /// object's checkpoint; a `Remove` discards the counter regardless of
    /// earlier adjustments. In strict mode a corrupt journal frame is
    /// fatal; otherwise replay stops at the first bad frame.
    pub fn recover<E: StorageEngine>(
        store: &E,
        path: &Path,
        journal_config: JournalConfig,
        strict: bool,
    ) -> EngineResult<Self> {
        let mut states: HashMap<ObjectId, CounterState> = HashMap::new();
        let mut max_revision = 0;

        // Durable checkpoints first.
        let tx = store.begin_read()?;
        let bounds = KeyBounds::counters();
        let mut cursor = tx.range(bounds.as_range().0, bounds.as_range().1)?;
        while let Some((key, value)) = cursor.next()? {
            let object_id = decode_counter_key(&key)?;
            let (ckpt, _): (CounterCheckpoint, _) =
                bincode::serde::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| EngineError::Serialization(e.to_string()))?;
            max_revision = max_revision.max(ckpt.revision);
            states.insert(
                object_id,
                CounterState {
                    count: ckpt.count,
                    revision: ckpt.revision,
                    lsn: ckpt.lsn,
                    dirty: false,
                },
            );
        }
        drop(cursor);
        drop(tx);

        // Then the journal suffix.
        let mut replayed = 0usize;
        if path.exists() {
            let entries = JournalRecovery::open(path)?.read_all(strict)?;
            for entry in entries {
                match entry.op {
                    JournalOp::Adjust { object_id, delta } => {
                        let state = states.entry(object_id).or_insert(CounterState {
                            count: 0,
                            revision: 0,
                            lsn: 0,
                            dirty: false,
                        });
                        if entry.lsn > state.lsn {
                            state.count = apply_delta(state.count, delta);
                            state.lsn = entry.lsn;
                            state.dirty = true;
                            replayed += 1;
                        }
                    }
                    JournalOp::Remove { object_id } => {
                        states.remove(&object_id);
                        replayed += 1;
                    }
                    JournalOp::Checkpoint { .. } => {}
                }
            }
        }

        let journal = JournalWriter::open(path, journal_config)?;
        info!(
            counters = states.len(),
            replayed_ops = replayed,
            journal_lsn = journal.current_lsn(),
            "counter recovery complete"
        );

        Ok(Self {
            journal: Mutex::new(journal),
            states: Mutex::new(states),
            revision: AtomicU64::new(max_revision),
            checkpointing: Mutex::new(()),
        })
    }

    /// Journal a committed transaction's count deltas, then apply them in
    /// memory. Called after the storage commit succeeded; a crash between
    /// the commit and this append loses at most that one transaction's
    /// counts, never documents.
    pub fn apply_committed(&self, deltas: &[(ObjectId, i64)]) -> EngineResult<()> {
        if deltas.is_empty() {
            return Ok(());
        }

        let ops: Vec<JournalOp> =
            deltas.iter().map(|&(object_id, delta)| JournalOp::adjust(object_id, delta)).collect();

        let mut journal = self.journal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let last_lsn = journal.append(&ops)?;
        let first_lsn = last_lsn - (ops.len() as u64 - 1);

        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (i, &(object_id, delta)) in deltas.iter().enumerate() {
            let lsn = first_lsn + i as u64;
            let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
            let state = states.entry(object_id).or_insert(CounterState {
                count: 0,
                revision: 0,
                lsn: 0,
                dirty: false,
            });
            state.count = apply_delta(state.count, delta);
            state.revision = revision;
            state.lsn = lsn;
            state.dirty = true;
        }
        Ok(())
    }

    /// Apply a single adjustment in memory. Used by replay paths that have
    /// already journaled the operation.
    pub fn adjust(&self, object_id: ObjectId, delta: i64, lsn: Lsn) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = states.entry(object_id).or_insert(CounterState {
            count: 0,
            revision: 0,
            lsn: 0,
            dirty: false,
        });
        state.count = apply_delta(state.count, delta);
        state.revision = revision;
        state.lsn = lsn;
        state.dirty = true;
    }

    /// Permanently forget the counter for a dropped collection object.
    ///
    /// The removal is journaled so that replay after a crash does not
    /// resurrect the counter from an older checkpoint. The durable
    /// checkpoint record itself is deleted by the drop's storage
    /// transaction.
    pub fn remove(&self, object_id: ObjectId) -> EngineResult<()> {
        let mut journal = self.journal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        journal.append(&[JournalOp::remove(object_id)])?;
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states.remove(&object_id);
        Ok(())
    }

    /// Persist dirty counters as checkpoint records, then truncate the
    /// journal through the flushed LSN.
    ///
    /// Neither manager lock is held while the store transaction runs.
    /// Adjustments that land between the snapshot and the truncation get
    /// LSNs past the flushed point and survive in the journal. Dirty flags
    /// clear and the journal truncates only after the store commit is
    /// durable; a failed commit leaves every state dirty for the next
    /// attempt and the journal intact for replay.
    pub fn checkpoint_all<E: StorageEngine>(&self, store: &E) -> EngineResult<()> {
        let _pass =
            self.checkpointing.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let (snapshot, flushed_lsn, retain_from) = {
            let journal = self.journal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

            // Quiescent: nothing dirty and the journal holds at most the
            // previous checkpoint's own marker.
            let flushed = journal.current_lsn();
            if flushed <= journal.checkpoint_lsn() + 1 && states.values().all(|s| !s.dirty) {
                return Ok(());
            }

            let snapshot: Vec<(ObjectId, CounterCheckpoint)> = states
                .iter()
                .filter(|(_, s)| s.dirty)
                .map(|(&object_id, s)| {
                    (
                        object_id,
                        CounterCheckpoint { count: s.count, revision: s.revision, lsn: s.lsn },
                    )
                })
                .collect();
            (snapshot, flushed, journal.position())
        };

        if !snapshot.is_empty() {
            let mut tx = store.begin_write()?;
            for (object_id, ckpt) in &snapshot {
                let value = bincode::serde::encode_to_vec(ckpt, bincode::config::standard())
                    .map_err(|e| EngineError::Serialization(e.to_string()))?;
                tx.put(&counter_key(*object_id), &value)?;
            }
            tx.commit()?;
        }

        let mut journal = self.journal.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (object_id, ckpt) in &snapshot {
            if let Some(state) = states.get_mut(object_id) {
                // A state re-dirtied past the snapshot stays dirty; its
                // newer adjustments sit beyond the flushed LSN anyway.
                if state.lsn == ckpt.lsn {
                    state.dirty = false;
                }
            }
        }
        drop(states);

        journal.checkpoint(flushed_lsn, retain_from)?;
        debug!(flushed = snapshot.len(), lsn = flushed_lsn, "counter checkpoint written");
        Ok(())
    }

    /// Current document count for `object_id`. Unknown objects count zero.
    #[must_use]
    pub fn count(&self, object_id: ObjectId) -> u64 {
        let states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states.get(&object_id).map_or(0, |s| s.count)
    }

    /// Global revision tick of the most recent counted change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

/// Counts never go negative; a replayed over-decrement clamps at zero.
fn apply_delta(count: u64, delta: i64) -> u64 {
    if delta >= 0 {
        count.saturating_add(delta as u64)
    } else {
        count.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use quilldb_storage::backends::{RedbEngine, RedbTransaction};
    use quilldb_storage::StorageError;
    use tempfile::tempdir;

    fn manager(store: &RedbEngine, path: &Path) -> CounterManager {
        CounterManager::recover(store, path, JournalConfig::default(), true).unwrap()
    }

    /// Store wrapper whose write transactions can be made to fail on demand.
    struct FlakyStore {
        inner: RedbEngine,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self { inner: RedbEngine::in_memory().unwrap(), fail_writes: AtomicBool::new(false) }
        }

        fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl StorageEngine for FlakyStore {
        type Transaction<'a> = RedbTransaction;

        fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
            self.inner.begin_read()
        }

        fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Transaction("injected write failure".into()));
            }
            self.inner.begin_write()
        }
    }

    #[test]
    fn adjustments_accumulate() {
        let dir = tempdir().unwrap();
        let store = RedbEngine::in_memory().unwrap();
        let counters = manager(&store, &dir.path().join("c.journal"));

        let oid = ObjectId::new(7);
        counters.apply_committed(&[(oid, 3)]).unwrap();
        counters.apply_committed(&[(oid, -1), (oid, 2)]).unwrap();

        assert_eq!(counters.count(oid), 4);
        assert!(counters.revision() >= 3);
    }

    #[test]
    fn recovery_replays_journal_past_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.journal");
        let store = RedbEngine::in_memory().unwrap();

        let oid = ObjectId::new(7);
        {
            let counters = manager(&store, &path);
            counters.apply_committed(&[(oid, 2)]).unwrap();
            counters.checkpoint_all(&store).unwrap();
            // Past the checkpoint, only in the journal.
            counters.apply_committed(&[(oid, 3)]).unwrap();
        }

        let recovered = manager(&store, &path);
        assert_eq!(recovered.count(oid), 5);
    }

    #[test]
    fn remove_wins_over_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.journal");
        let store = RedbEngine::in_memory().unwrap();

        let oid = ObjectId::new(9);
        {
            let counters = manager(&store, &path);
            counters.apply_committed(&[(oid, 5)]).unwrap();
            counters.checkpoint_all(&store).unwrap();
            counters.remove(oid).unwrap();
        }

        // The checkpoint record still exists in the store (the engine
        // deletes it during the drop), but the journaled Remove discards it.
        let recovered = manager(&store, &path);
        assert_eq!(recovered.count(oid), 0);
    }

    #[test]
    fn failed_checkpoint_keeps_adjustments_recoverable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.journal");
        let store = FlakyStore::new();

        let oid = ObjectId::new(11);
        {
            let counters =
                CounterManager::recover(&store, &path, JournalConfig::default(), true).unwrap();
            counters.apply_committed(&[(oid, 1)]).unwrap();
            counters.apply_committed(&[(oid, 1)]).unwrap();
            counters.apply_committed(&[(oid, 1)]).unwrap();

            store.set_fail_writes(true);
            assert!(counters.checkpoint_all(&store).is_err());
            store.set_fail_writes(false);

            // The retry must still see the states dirty and the journal
            // untruncated, and persist what the failed attempt did not.
            counters.checkpoint_all(&store).unwrap();
        }

        let recovered =
            CounterManager::recover(&store, &path, JournalConfig::default(), true).unwrap();
        assert_eq!(recovered.count(oid), 3);
    }

    #[test]
    fn checkpoint_without_traffic_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = RedbEngine::in_memory().unwrap();
        let counters = manager(&store, &dir.path().join("c.journal"));

        counters.checkpoint_all(&store).unwrap();
        counters.checkpoint_all(&store).unwrap();
    }
}
