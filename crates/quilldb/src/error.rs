//! Engine error types.

use quilldb_core::{KeyError, NameError};
use quilldb_storage::journal::JournalError;
use quilldb_storage::StorageError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine's public operations.
///
/// Lifecycle cleanup failures after a marker commit are deliberately absent:
/// those are logged and queued for retry, never returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The durable marker write for a DDL operation failed. The object's
    /// state is unchanged.
    #[error("marker write failed: {0}")]
    MarkerWriteFailed(#[source] StorageError),

    /// A transaction commit (intermediate or final) failed. The logical
    /// transaction is dead.
    #[error("transaction commit failed: {0}")]
    CommitFailed(#[source] StorageError),

    /// An object with this name already exists in the same scope.
    #[error("an object named '{0}' already exists")]
    DuplicateName(String),

    /// The named or identified object does not exist (or is soft-deleted).
    #[error("{0} not found")]
    NotFound(String),

    /// The supplied name is not a valid object name.
    #[error(transparent)]
    InvalidName(#[from] NameError),

    /// Key codec failure.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Counter journal failure.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// A persisted record failed to encode or decode.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Startup recovery found state it cannot reconcile in strict mode.
    #[error("recovery found inconsistent state: {0}")]
    RecoveryInconsistent(String),

    /// The transaction was already committed or aborted.
    #[error("transaction already completed")]
    TransactionCompleted,
}
