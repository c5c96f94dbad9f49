use savegame_types::{ClassPath, ObjectHandle};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("class not registered: {0}")]
    UnknownClass(ClassPath),

    #[error("an object named '{0}' already exists")]
    NameInUse(String),

    #[error("map not found: {0}")]
    UnknownMap(String),

    #[error("the world is already travelling")]
    TravelInProgress,

    #[error("no travel is pending")]
    NoPendingTravel,

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectHandle),
}

pub type WorldResult<T> = Result<T, WorldError>;
