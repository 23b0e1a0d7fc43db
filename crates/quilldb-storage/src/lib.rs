//! `QuillDB` Storage
//!
//! The transactional key-value substrate the engine builds on. Backends
//! implement a single ordered byte keyspace with snapshot-isolated reads and
//! atomic batched writes; the key codec in `quilldb-core` partitions that
//! keyspace, so no logical-table layer is needed here.
//!
//! # Modules
//!
//! - [`engine`] - the [`StorageEngine`], [`Transaction`], and [`Cursor`] traits
//! - [`backends`] - concrete backends (redb)
//! - [`journal`] - the append-only counter journal (the engine's
//!   WAL-equivalent durability log)

pub mod backends;
pub mod engine;
pub mod journal;

pub use engine::{
    Cursor, CursorResult, KeyValue, StorageEngine, StorageError, StorageResult, Transaction,
};

pub use journal::{
    JournalConfig, JournalEntry, JournalError, JournalOp, JournalRecovery, JournalResult,
    JournalWriter, Lsn, SyncMode,
};
