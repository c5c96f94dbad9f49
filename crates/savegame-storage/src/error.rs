/// Errors from save slot storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Slot names must be non-empty file names without path separators.
    #[error("invalid slot name: {0:?}")]
    InvalidSlotName(String),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refuses writes.
    #[error("storage is read-only")]
    ReadOnly,
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
