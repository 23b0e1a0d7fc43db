//! Counter journal for QuillDB
//!
//! Document counts and count revisions live outside the transactional
//! keyspace, so they need their own durability log. Every committed write
//! transaction appends its per-collection count deltas here; on restart the
//! engine replays the journal to rebuild exact counts without scanning
//! document ranges.
//!
//! # Log format
//!
//! The file starts with an 8-byte magic and a 4-byte version, followed by
//! framed entries:
//!
//! ```text
//! [length: u32 LE][bincode-encoded JournalEntry][crc32: u32 LE]
//! ```
//!
//! The CRC covers the encoded entry only. A torn final frame is expected
//! after a crash and is not treated as corruption; the writer resumes
//! appending at the last intact frame.
//!
//! # Checkpoints
//!
//! A checkpoint entry records that all adjustments up to its `flushed_lsn`
//! have been materialized into the main storage. Checkpointing copies the
//! byte suffix holding entries past the flushed LSN into a fresh file, so
//! both the journal and the cost of truncating it stay proportional to the
//! write traffic since the last flush.

mod entry;
mod error;
mod recovery;
mod writer;

pub use entry::{JournalEntry, JournalOp};
pub use error::{JournalError, JournalResult};
pub use recovery::{JournalEntryIterator, JournalRecovery};
pub use writer::{JournalConfig, JournalWriter, SyncMode};

/// Log sequence number. Assigned by the writer, strictly increasing within
/// a journal file's lifetime.
pub type Lsn = u64;

#[cfg(test)]
mod tests {
    use super::*;
    use quilldb_core::ObjectId;
    use tempfile::tempdir;

    #[test]
    fn append_then_recover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counters.journal");

        {
            let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
            journal.append(&[JournalOp::adjust(ObjectId::new(7), 3)]).unwrap();
            journal.append(&[JournalOp::adjust(ObjectId::new(7), -1)]).unwrap();
            journal.append(&[JournalOp::remove(ObjectId::new(9))]).unwrap();
            journal.sync().unwrap();
        }

        let recovery = JournalRecovery::open(&path).unwrap();
        let entries: Vec<_> = recovery.iter().map(Result::unwrap).collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].lsn, 1);
        assert_eq!(entries[0].op, JournalOp::adjust(ObjectId::new(7), 3));
        assert_eq!(entries[2].op, JournalOp::remove(ObjectId::new(9)));
    }

    #[test]
    fn checkpoint_truncates_flushed_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counters.journal");

        let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
        for i in 1..=4 {
            journal.append(&[JournalOp::adjust(ObjectId::new(i), 1)]).unwrap();
        }
        let retain_from = journal.position();
        for i in 5..=6 {
            journal.append(&[JournalOp::adjust(ObjectId::new(i), 1)]).unwrap();
        }
        journal.checkpoint(4, retain_from).unwrap();

        let recovery = JournalRecovery::open(&path).unwrap();
        let entries: Vec<_> = recovery.iter().map(Result::unwrap).collect();

        // Entries 5 and 6 survive, plus the checkpoint marker itself.
        assert_eq!(entries[0].lsn, 5);
        assert_eq!(entries[1].lsn, 6);
        assert!(matches!(entries[2].op, JournalOp::Checkpoint { flushed_lsn: 4 }));
    }

    #[test]
    fn lsns_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counters.journal");

        {
            let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
            journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
            journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
            journal.sync().unwrap();
        }

        let mut journal = JournalWriter::open(&path, JournalConfig::default()).unwrap();
        assert_eq!(journal.current_lsn(), 2);
        let lsn = journal.append(&[JournalOp::adjust(ObjectId::new(1), 1)]).unwrap();
        assert_eq!(lsn, 3);
    }
}
