//! Snapshot slot storage for SaveGame.
//!
//! Snapshots are opaque blobs kept under named slots. All backends implement
//! the [`SaveStorage`] trait:
//!
//! - [`InMemorySaveStorage`]: `HashMap`-based store for tests and embedding
//! - [`FileSaveStorage`]: one file per slot, replaced atomically

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use file::FileSaveStorage;
pub use memory::InMemorySaveStorage;
pub use traits::{validate_slot_name, SaveStorage};
