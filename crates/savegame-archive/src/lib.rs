//! Archive format for SaveGame world snapshots.
//!
//! This crate turns live object state into bytes and back. Every layer reads
//! and writes through the same code path, selected by the archive's mode.
//!
//! # Architecture
//!
//! - [`MemoryStream`]: seekable big-endian byte buffer
//! - [`ProxyArchive`]: persists object references as paths and rewrites them
//!   through a redirect table on load
//! - [`StructuredArchive`]: records, fields, arrays and maps, in binary or as
//!   JSON text
//! - [`SaveGameArchive`]: a record whose fields are addressable by name
//!
//! # Design Rules
//!
//! - Every variable-length payload carries a length, so readers can skip
//!   what they do not understand.
//! - Counts read from a stream never size an allocation beyond the bytes
//!   left in it.
//! - The custom version table travels with the data it describes.

pub mod envelope;
pub mod error;
pub mod property;
pub mod proxy;
pub mod record;
pub mod stream;
pub mod structured;
pub mod value;
pub mod version;

pub use error::{ArchiveError, ArchiveResult};
pub use proxy::{NullResolver, ObjectResolver, ProxyArchive};
pub use record::{FieldRedirects, SaveGameArchive};
pub use stream::{MemoryStream, Placeholder, StreamMode};
pub use structured::{Archivable, ArrayScope, MapScope, Record, Slot, StructuredArchive};
pub use value::{ObjectRef, PropertyFlags, PropertyValue};
pub use version::{
    CustomVersionContainer, SaveGameVersion, VersionInfo, VersionRegistry, NO_VERSION,
    SAVEGAME_VERSION_ID,
};
