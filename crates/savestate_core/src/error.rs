//! Error types for the savestate engine.

use savestate_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in savestate operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    ///
    /// A read that runs past the end of the file surfaces here as
    /// [`StorageError::ShortRead`].
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key or a store file was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// Operation on a store that has been closed.
    #[error("store is closed")]
    AlreadyClosed,

    /// Mutating operation on a store opened read-only.
    #[error("store is open read-only")]
    ReadOnly,

    /// An empty key was supplied to a write.
    #[error("empty keys are not permitted")]
    InvalidKey,

    /// Invalid argument provided by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// The file is not a savestate file or has an unsupported version.
    #[error("invalid savestate file: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Checksum mismatch detected on a verified read.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed from the record bytes.
        actual: u32,
    },

    /// `popitem` on an empty store.
    #[error("store is empty")]
    Empty,
}

impl StoreError {
    /// Creates a not-found error for a missing key.
    pub fn key_not_found(key: &[u8]) -> Self {
        Self::NotFound {
            message: format!("key {:?}", String::from_utf8_lossy(key)),
        }
    }

    /// Creates a not-found error for a missing store file.
    pub fn file_not_found(path: &std::path::Path) -> Self {
        Self::NotFound {
            message: format!("no such file: {}", path.display()),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
