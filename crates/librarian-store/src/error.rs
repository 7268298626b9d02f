//! Error types for the blob store.

use std::path::PathBuf;

use thiserror::Error;

use crate::blob_id::BlobId;

/// Result type alias for blob store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client-declared SHA-1 does not match the bytes received.
    #[error("Digest mismatch: declared sha1 {expected}, computed {actual}")]
    DigestMismatch {
        /// Hex SHA-1 the client declared.
        expected: String,
        /// Hex SHA-1 computed over the uploaded bytes.
        actual: String,
    },

    /// A file already exists at the path of a freshly allocated identity.
    #[error("Duplicate identity {id}: {} already exists (upload kept at {})", path.display(), temp_path.display())]
    DuplicateIdentity {
        /// The identity that collided.
        id: BlobId,
        /// The pre-existing file.
        path: PathBuf,
        /// The staged upload, preserved for diagnosis.
        temp_path: PathBuf,
    },

    /// The caller's database identity differs from this store's.
    #[error("Wrong environment: upload targets database {declared:?}, store serves {configured:?}")]
    WrongEnvironment {
        /// Database name this store is configured for.
        configured: String,
        /// Database name the caller declared.
        declared: String,
    },

    /// No tier holds the requested blob.
    #[error("Blob not found: {id}")]
    NotFound {
        /// The identity that was not found.
        id: BlobId,
    },

    /// A raw identity does not fit the 32-bit identity space.
    #[error("Identity {raw} exceeds the 32-bit identity space")]
    IdentityOutOfRange {
        /// The rejected raw value.
        raw: u64,
    },

    /// The number of bytes received differs from the declared size.
    #[error("Size mismatch: declared {expected} bytes, received {actual}")]
    SizeMismatch {
        /// Declared size in bytes.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },

    /// The staging filesystem ran out of space.
    #[error("Staging area full while writing {}", path.display())]
    StagingFull {
        /// The temp file being written.
        path: PathBuf,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid upload state: cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The current state.
        state: &'static str,
    },

    /// A caller-supplied content identity was refused by the catalogue.
    #[error("Identity {id} rejected: not reserved for this content")]
    IdentityRejected {
        /// The refused identity.
        id: BlobId,
    },

    /// Remote object-storage failure.
    #[error("Remote tier {pool}: {reason}")]
    Remote {
        /// Name of the pool that failed.
        pool: String,
        /// Description of the failure.
        reason: String,
    },

    /// Catalogue collaborator failure.
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    ///
    /// Integrity failures (digest mismatch, duplicate identity, wrong
    /// environment, full staging disk) are final; the caller has to start
    /// a new upload from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Remote { .. } | StoreError::Io(_))
    }

    pub(crate) fn from_write(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.raw_os_error() == Some(libc::ENOSPC) {
            StoreError::StagingFull {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io(err)
        }
    }
}
