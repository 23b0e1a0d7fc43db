//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use quilldb_storage::journal::SyncMode;

/// How startup recovery reacts to undecodable catalog markers and corrupt
/// journal frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Any undecodable marker or corrupt journal frame aborts engine open.
    #[default]
    Strict,
    /// Log and skip undecodable markers; stop journal replay at the first
    /// corrupt frame and keep what was recovered.
    Tolerant,
}

/// Configuration for [`Engine::open`](crate::Engine::open).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Location of the counter journal file.
    pub journal_path: PathBuf,

    /// Cadence of the background counter checkpoint.
    /// Default: 2500 milliseconds.
    pub checkpoint_interval: Duration,

    /// Staged byte size at which a logical transaction commits an
    /// intermediate batch. Default: 64 MiB.
    pub max_transaction_bytes: usize,

    /// Staged operation count at which a logical transaction commits an
    /// intermediate batch. Default: 100 000.
    pub max_transaction_ops: usize,

    /// Corruption handling during startup recovery.
    pub recovery: RecoveryMode,

    /// When journal appends are fsynced.
    pub journal_sync: SyncMode,
}

impl EngineConfig {
    /// Create a configuration with default thresholds for the given
    /// journal location.
    #[must_use]
    pub fn new(journal_path: impl Into<PathBuf>) -> Self {
        Self {
            journal_path: journal_path.into(),
            checkpoint_interval: Duration::from_millis(2500),
            max_transaction_bytes: 64 * 1024 * 1024,
            max_transaction_ops: 100_000,
            recovery: RecoveryMode::default(),
            journal_sync: SyncMode::Immediate,
        }
    }

    /// Set the counter checkpoint cadence.
    #[must_use]
    pub const fn checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the intermediate-commit byte threshold.
    #[must_use]
    pub const fn max_transaction_bytes(mut self, bytes: usize) -> Self {
        self.max_transaction_bytes = bytes;
        self
    }

    /// Set the intermediate-commit operation threshold.
    #[must_use]
    pub const fn max_transaction_ops(mut self, ops: usize) -> Self {
        self.max_transaction_ops = ops;
        self
    }

    /// Set the recovery mode.
    #[must_use]
    pub const fn recovery(mut self, mode: RecoveryMode) -> Self {
        self.recovery = mode;
        self
    }

    /// Set the journal sync mode.
    #[must_use]
    pub const fn journal_sync(mut self, mode: SyncMode) -> Self {
        self.journal_sync = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfig::new("/tmp/counters.journal")
            .checkpoint_interval(Duration::from_millis(100))
            .max_transaction_ops(10)
            .recovery(RecoveryMode::Tolerant);

        assert_eq!(config.checkpoint_interval, Duration::from_millis(100));
        assert_eq!(config.max_transaction_ops, 10);
        assert_eq!(config.recovery, RecoveryMode::Tolerant);
        assert_eq!(config.max_transaction_bytes, 64 * 1024 * 1024);
    }
}
