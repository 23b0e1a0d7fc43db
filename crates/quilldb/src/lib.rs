//! `QuillDB`
//!
//! A multi-model document storage engine layered over an ordered
//! transactional key-value store. The engine maps databases, collections,
//! indexes, views, and documents onto a single byte keyspace through the
//! codec in `quilldb-core`, keeps exact journaled document counters, and
//! drives object lifecycles through durable marker-first protocols that
//! recover cleanly from a crash at any step.
//!
//! # Quick start
//!
//! ```no_run
//! use quilldb::{Engine, EngineConfig};
//! use quilldb_storage::backends::RedbEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedbEngine::open("data.quill")?;
//! let engine = Engine::open(store, EngineConfig::new("counters.journal"))?;
//!
//! let db = engine.create_database("app")?;
//! let orders = engine.create_collection(db, "orders")?;
//!
//! let mut tx = engine.begin();
//! tx.insert(&orders, b"order-1", br#"{"total": 40}"#)?;
//! tx.commit()?;
//!
//! assert_eq!(engine.document_count(&orders), 1);
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod counter;
pub mod engine;
pub mod error;
pub mod registry;
pub mod transaction;

mod maintenance;

pub use config::{EngineConfig, RecoveryMode};
pub use counter::CounterManager;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use registry::ObjectRegistry;
pub use transaction::EngineTransaction;

pub use quilldb_core::{
    CollectionId, CollectionInfo, DatabaseId, DatabaseInfo, IndexDescriptor, IndexId, IndexKind,
    ObjectId, ObjectName, ViewId, ViewInfo,
};
