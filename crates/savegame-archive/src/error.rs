use savegame_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unexpected end of archive at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof { offset: u64, needed: usize },

    #[error("seek to {position} is beyond archive length {len}")]
    SeekOutOfRange { position: u64, len: u64 },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: u64 },

    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { offset: u64, length: i64 },

    #[error("unknown property tag {tag} at offset {offset}")]
    UnknownPropertyTag { offset: u64, tag: u8 },

    #[error("malformed value at offset {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    #[error("invalid object path: {0}")]
    InvalidPath(#[from] TypeError),

    #[error("'{0}' is not an editable, persistable property")]
    NotPersistable(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
