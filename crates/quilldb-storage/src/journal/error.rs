//! Journal error types

use std::io;

/// Result type alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur while writing or recovering the counter journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// I/O error during file operations.
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checksum mismatch, the frame's payload is corrupt.
    #[error("journal checksum mismatch at offset {offset}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Byte offset of the corrupted frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// Entry encoding failed.
    #[error("journal entry encoding failed: {0}")]
    Encode(String),

    /// Entry decoding failed.
    #[error("journal entry decoding failed: {0}")]
    Decode(String),

    /// Bad magic number, unsupported version, or a nonsensical frame length.
    #[error("invalid journal format: {0}")]
    InvalidFormat(String),

    /// The file ends mid-frame. Expected after a crash during append.
    #[error("journal truncated at offset {offset}")]
    Truncated {
        /// Byte offset of the last intact frame boundary.
        offset: u64,
    },
}

impl JournalError {
    /// Returns true if this error means the frame contents cannot be
    /// trusted, as opposed to a clean torn tail.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Decode(_) | Self::InvalidFormat(_))
    }
}
