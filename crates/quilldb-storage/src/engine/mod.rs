//! Storage engine traits and abstractions.
//!
//! - [`StorageEngine`] - main entry point for creating transactions
//! - [`Transaction`] - atomic batched get/put/delete/range operations
//! - [`Cursor`] - ordered forward iteration over key-value pairs
//!
//! All operations return [`StorageResult<T>`], an alias for
//! `Result<T, StorageError>`.

mod error;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{Cursor, CursorResult, KeyValue, StorageEngine, Transaction};
