use savegame_archive::ArchiveError;
use savegame_storage::StorageError;
use savegame_world::WorldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveGameError {
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("world error: {0}")]
    World(#[from] WorldError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No snapshot is stored under the slot.
    #[error("no snapshot in slot '{0}'")]
    SnapshotNotFound(String),

    #[error("snapshot does not name a map")]
    EmptyMapName,

    /// A load is already waiting for its map.
    #[error("a snapshot load is already in progress")]
    LoadInProgress,

    #[error("the world is travelling")]
    TravelInProgress,

    #[error("no snapshot load is pending")]
    NoPendingLoad,

    #[error("expected map '{expected}' but '{actual}' is loaded")]
    MapMismatch { expected: String, actual: String },

    #[error("could not resolve object '{name}'")]
    UnresolvedObject { name: String },

    #[error("invalid settings: {0}")]
    Settings(String),
}

pub type SaveGameResult<T> = Result<T, SaveGameError>;
