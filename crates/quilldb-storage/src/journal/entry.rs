//! Journal entry types and constructors

use quilldb_core::ObjectId;
use serde::{Deserialize, Serialize};

use super::Lsn;

/// A single logged counter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Apply a signed delta to the document count of one collection object.
    Adjust {
        /// Storage-level object id of the collection.
        object_id: ObjectId,
        /// Net change in document count (inserts minus removes).
        delta: i64,
    },
    /// Forget the counter for a dropped collection object.
    Remove {
        /// Storage-level object id of the collection.
        object_id: ObjectId,
    },
    /// All adjustments with LSN <= `flushed_lsn` are materialized in the
    /// main storage and may be discarded.
    Checkpoint {
        /// Highest LSN covered by the flush.
        flushed_lsn: Lsn,
    },
}

impl JournalOp {
    /// Create an adjustment for `object_id`.
    #[must_use]
    pub const fn adjust(object_id: ObjectId, delta: i64) -> Self {
        Self::Adjust { object_id, delta }
    }

    /// Create a removal for `object_id`.
    #[must_use]
    pub const fn remove(object_id: ObjectId) -> Self {
        Self::Remove { object_id }
    }

    /// Returns true for checkpoint markers.
    #[must_use]
    pub const fn is_checkpoint(&self) -> bool {
        matches!(self, Self::Checkpoint { .. })
    }
}

/// One framed record in the journal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequence number assigned by the writer at append time.
    pub lsn: Lsn,
    /// The logged operation.
    pub op: JournalOp,
}

impl JournalEntry {
    /// The flushed LSN if this entry is a checkpoint marker.
    #[must_use]
    pub const fn checkpoint_lsn(&self) -> Option<Lsn> {
        match self.op {
            JournalOp::Checkpoint { flushed_lsn } => Some(flushed_lsn),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_lsn_accessor() {
        let entry = JournalEntry { lsn: 10, op: JournalOp::Checkpoint { flushed_lsn: 7 } };
        assert_eq!(entry.checkpoint_lsn(), Some(7));
        assert!(entry.op.is_checkpoint());

        let entry = JournalEntry { lsn: 11, op: JournalOp::adjust(ObjectId::new(1), -2) };
        assert_eq!(entry.checkpoint_lsn(), None);
    }

    #[test]
    fn serialization_roundtrip() {
        let entries = [
            JournalEntry { lsn: 1, op: JournalOp::adjust(ObjectId::new(42), 5) },
            JournalEntry { lsn: 2, op: JournalOp::remove(ObjectId::new(42)) },
            JournalEntry { lsn: 3, op: JournalOp::Checkpoint { flushed_lsn: 2 } },
        ];

        for entry in entries {
            let data =
                bincode::serde::encode_to_vec(entry, bincode::config::standard()).unwrap();
            let (decoded, _): (JournalEntry, _) =
                bincode::serde::decode_from_slice(&data, bincode::config::standard()).unwrap();
            assert_eq!(entry, decoded);
        }
    }
}
