//! Error types for the GIN index core.

use thiserror::Error;

/// Errors produced by the GIN index core.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Unreadable header, truncated stream, unknown version, or a codec failure.
    #[error("corrupted GIN index data: {0}")]
    CorruptedData(String),

    /// A violated precondition: out-of-order FST keys, an unknown segment id, or
    /// re-finalizing a store that has already been finalized or cancelled.
    #[error("GIN index logical error: {0}")]
    LogicalError(String),

    /// Underlying storage read/write failure.
    #[error("GIN index I/O error: {0}")]
    IOError(#[from] std::io::Error),
}

/// A specialized `Result` type for GIN index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
