//! Foundation types for SaveGame.
//!
//! This crate provides the identity and reference types shared by every other
//! SaveGame crate. None of these types own live objects; they only name them.
//!
//! # Key Types
//!
//! - [`ObjectHandle`]: Handle to a live object, issued by the host world
//! - [`ObjectPath`]: Portable, path-like reference to an object (`asset:sub.path`)
//! - [`ClassPath`]: Path of a spawnable class
//! - [`SpawnId`]: Stable identity used to re-bind persisted data to a live object
//! - [`VersionTagId`]: Stable identifier of a custom version tag

pub mod error;
pub mod handle;
pub mod identity;
pub mod path;

pub use error::TypeError;
pub use handle::ObjectHandle;
pub use identity::{SpawnId, VersionTagId};
pub use path::{ClassPath, ObjectPath, LEVEL_SUBPATH_PREFIX};
