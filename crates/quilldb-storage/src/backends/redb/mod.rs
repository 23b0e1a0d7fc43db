//! Redb storage backend.
//!
//! Redb is a pure-Rust embedded database providing ACID transactions over a
//! B-tree. All engine data lives in a single physical table; keys are
//! already partitioned by the key codec's type tags.

mod engine;
mod transaction;

pub use engine::{RedbConfig, RedbEngine};
pub use transaction::{RedbCursor, RedbTransaction};

use redb::TableDefinition;

/// The single physical table holding the entire keyspace.
pub(crate) const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> =
    TableDefinition::new("quill_data");
