//! Host world boundary for SaveGame.
//!
//! This crate describes what the save system needs from the host: a
//! [`World`] that owns live objects and reports their lifecycle, and
//! [`SaveGameObject`]s that expose their persistable state.
//!
//! # Modules
//!
//! - [`world`]: the [`World`] trait and its lifecycle events
//! - [`object`]: per-object persistence hooks and [`DynamicObject`]
//! - [`memory`]: [`InMemoryWorld`], a complete host for tests and tools

pub mod error;
pub mod memory;
pub mod object;
pub mod world;

pub use error::{WorldError, WorldResult};
pub use memory::{ClassRegistry, InMemoryWorld, MapDefinition, PlacedObject};
pub use object::{
    shared, DynamicObject, PersistableFields, SaveGameObject, SharedObject, SpawnIdentity,
};
pub use world::{World, WorldEvent};
