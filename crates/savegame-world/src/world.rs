use savegame_archive::ObjectResolver;
use savegame_types::{ClassPath, ObjectHandle, ObjectPath};

use crate::error::WorldResult;
use crate::object::SharedObject;

/// Lifecycle notifications from the host world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// The current map is being torn down.
    WorldCleanup,
    /// All objects placed in the new map exist.
    ActorsInitialized,
    ObjectSpawned(ObjectHandle),
    /// An object was destroyed. `path` and `was_loaded` describe it as it
    /// was just before destruction.
    ObjectDestroyed {
        handle: ObjectHandle,
        path: ObjectPath,
        was_loaded: bool,
    },
}

/// The host world.
///
/// Owns the live objects. Travel to another map completes asynchronously:
/// [`travel`](World::travel) only requests it, and the host reports the new
/// map through the event queue.
pub trait World: ObjectResolver {
    /// Name of the current map, empty if none is loaded.
    fn map_name(&self) -> String;

    /// Asset path of the current map's level, e.g. `/Game/Maps/Arena.Arena`.
    fn level_asset(&self) -> String;

    /// Every live object that should be persisted.
    fn persistent_objects(&self) -> Vec<ObjectHandle>;

    fn object(&self, handle: ObjectHandle) -> Option<SharedObject>;

    fn object_name(&self, handle: ObjectHandle) -> Option<String>;

    fn class_of(&self, handle: ObjectHandle) -> Option<ClassPath>;

    /// Returns `true` if the object was loaded with the map rather than
    /// spawned at runtime.
    fn was_loaded(&self, handle: ObjectHandle) -> bool;

    /// Find an object in the current level by name.
    fn find_in_level(&self, name: &str) -> Option<ObjectHandle>;

    /// Spawn an instance of `class` named `name`. An empty name lets the
    /// world pick one.
    fn spawn(&self, class: &ClassPath, name: &str) -> WorldResult<ObjectHandle>;

    fn destroy(&self, handle: ObjectHandle) -> WorldResult<()>;

    /// Request travel to `map`.
    fn travel(&self, map: &str) -> WorldResult<()>;

    fn is_travelling(&self) -> bool;

    /// Take the queued lifecycle events, oldest first.
    fn drain_events(&self) -> Vec<WorldEvent>;
}
