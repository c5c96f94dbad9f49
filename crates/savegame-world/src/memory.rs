use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use savegame_archive::ObjectResolver;
use savegame_types::{ClassPath, ObjectHandle, ObjectPath, SpawnId, LEVEL_SUBPATH_PREFIX};
use tracing::{debug, info};

use crate::error::{WorldError, WorldResult};
use crate::object::SharedObject;
use crate::world::{World, WorldEvent};

type Factory = Arc<dyn Fn() -> SharedObject + Send + Sync>;

/// Spawnable classes by path.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    factories: HashMap<ClassPath, Factory>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class: impl Into<ClassPath>, factory: F)
    where
        F: Fn() -> SharedObject + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    pub fn with<F>(mut self, class: impl Into<ClassPath>, factory: F) -> Self
    where
        F: Fn() -> SharedObject + Send + Sync + 'static,
    {
        self.register(class, factory);
        self
    }

    pub fn contains(&self, class: &ClassPath) -> bool {
        self.factories.contains_key(class)
    }

    pub fn create(&self, class: &ClassPath) -> Option<SharedObject> {
        self.factories.get(class).map(|factory| factory())
    }
}

/// An object a map creates when it is opened.
#[derive(Clone, Debug)]
pub struct PlacedObject {
    pub name: String,
    pub class: ClassPath,
    pub spawn_id: Option<SpawnId>,
}

impl PlacedObject {
    pub fn new(name: impl Into<String>, class: impl Into<ClassPath>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            spawn_id: None,
        }
    }

    pub fn with_spawn_id(mut self, id: SpawnId) -> Self {
        self.spawn_id = Some(id);
        self
    }
}

/// A map: the objects placed in its level, and the objects other systems
/// spawn as soon as it is ready (a player character, for example).
#[derive(Clone, Debug)]
pub struct MapDefinition {
    pub name: String,
    pub placed: Vec<PlacedObject>,
    pub pre_spawned: Vec<PlacedObject>,
}

impl MapDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placed: Vec::new(),
            pre_spawned: Vec::new(),
        }
    }

    pub fn place(mut self, object: PlacedObject) -> Self {
        self.placed.push(object);
        self
    }

    pub fn pre_spawn(mut self, object: PlacedObject) -> Self {
        self.pre_spawned.push(object);
        self
    }

    /// Level asset path, `/Game/Maps/<name>.<name>`.
    pub fn level_asset(&self) -> String {
        level_asset_for(&self.name)
    }
}

fn level_asset_for(map: &str) -> String {
    format!("/Game/Maps/{map}.{map}")
}

struct LiveObject {
    name: String,
    class: ClassPath,
    was_loaded: bool,
    object: SharedObject,
}

#[derive(Default)]
struct WorldState {
    map: Option<String>,
    objects: BTreeMap<ObjectHandle, LiveObject>,
    names: HashMap<String, ObjectHandle>,
    resident_assets: BTreeMap<ObjectPath, ObjectHandle>,
    next_handle: u64,
    pending_travel: Option<String>,
    events: Vec<WorldEvent>,
}

impl WorldState {
    fn allocate(&mut self) -> ObjectHandle {
        self.next_handle += 1;
        ObjectHandle::new(self.next_handle)
    }

    fn level_asset(&self) -> String {
        self.map.as_deref().map(level_asset_for).unwrap_or_default()
    }

    fn insert(
        &mut self,
        name: String,
        class: ClassPath,
        was_loaded: bool,
        object: SharedObject,
    ) -> ObjectHandle {
        let handle = self.allocate();
        self.names.insert(name.clone(), handle);
        self.objects.insert(
            handle,
            LiveObject {
                name,
                class,
                was_loaded,
                object,
            },
        );
        handle
    }

    fn unique_name(&self, class: &ClassPath) -> String {
        let base = class.short_name();
        (0..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// World held entirely in memory.
///
/// Maps are opened from [`MapDefinition`]s and objects are created through
/// a [`ClassRegistry`]. Travel completes when the host calls
/// [`finish_travel`](InMemoryWorld::finish_travel).
pub struct InMemoryWorld {
    classes: ClassRegistry,
    maps: HashMap<String, MapDefinition>,
    loadable_assets: BTreeSet<ObjectPath>,
    state: RwLock<WorldState>,
}

impl InMemoryWorld {
    pub fn new(classes: ClassRegistry) -> Self {
        Self {
            classes,
            maps: HashMap::new(),
            loadable_assets: BTreeSet::new(),
            state: RwLock::new(WorldState::default()),
        }
    }

    pub fn with_map(mut self, map: MapDefinition) -> Self {
        self.maps.insert(map.name.clone(), map);
        self
    }

    /// Make `path` loadable on demand.
    pub fn with_asset(mut self, path: ObjectPath) -> Self {
        self.loadable_assets.insert(path);
        self
    }

    /// Open `map` immediately.
    pub fn open_map(&self, map: &str) -> WorldResult<()> {
        self.travel(map)?;
        self.finish_travel()?;
        Ok(())
    }

    /// Complete a pending travel: tear down the current map and build the
    /// requested one. Returns the new map's name.
    pub fn finish_travel(&self) -> WorldResult<String> {
        let mut state = self.state.write().expect("lock poisoned");
        let map_name = state
            .pending_travel
            .take()
            .ok_or(WorldError::NoPendingTravel)?;
        let map = self
            .maps
            .get(&map_name)
            .ok_or_else(|| WorldError::UnknownMap(map_name.clone()))?;

        if state.map.is_some() {
            state.events.push(WorldEvent::WorldCleanup);
        }
        state.objects.clear();
        state.names.clear();
        state.map = Some(map_name.clone());

        for placed in &map.placed {
            let object = self.instantiate(placed)?;
            state.insert(placed.name.clone(), placed.class.clone(), true, object);
        }
        state.events.push(WorldEvent::ActorsInitialized);

        for placed in &map.pre_spawned {
            let object = self.instantiate(placed)?;
            let handle = state.insert(placed.name.clone(), placed.class.clone(), false, object);
            state.events.push(WorldEvent::ObjectSpawned(handle));
        }

        info!(
            map = %map_name,
            objects = state.objects.len(),
            "map opened"
        );
        Ok(map_name)
    }

    fn instantiate(&self, placed: &PlacedObject) -> WorldResult<SharedObject> {
        let object = self
            .classes
            .create(&placed.class)
            .ok_or_else(|| WorldError::UnknownClass(placed.class.clone()))?;
        if let Some(id) = placed.spawn_id {
            let mut guard = object.lock().expect("lock poisoned");
            if let Some(identity) = guard.spawn_identity_mut() {
                identity.set_spawn_id(id);
            }
        }
        Ok(object)
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    /// Find a live object by name.
    pub fn find(&self, name: &str) -> Option<ObjectHandle> {
        self.state
            .read()
            .expect("lock poisoned")
            .names
            .get(name)
            .copied()
    }

    /// Path of an object in the current level.
    pub fn object_path(&self, handle: ObjectHandle) -> Option<ObjectPath> {
        let state = self.state.read().expect("lock poisoned");
        let live = state.objects.get(&handle)?;
        Some(ObjectPath::level_object(state.level_asset(), &live.name))
    }
}

impl ObjectResolver for InMemoryWorld {
    fn path_of(&self, handle: ObjectHandle) -> Option<ObjectPath> {
        let state = self.state.read().expect("lock poisoned");
        if let Some(live) = state.objects.get(&handle) {
            return Some(ObjectPath::level_object(state.level_asset(), &live.name));
        }
        state
            .resident_assets
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(path, _)| path.clone())
    }

    fn resolve(&self, path: &ObjectPath) -> Option<ObjectHandle> {
        let state = self.state.read().expect("lock poisoned");
        if path.asset_path() == state.level_asset() {
            let name = path.sub_path().strip_prefix(LEVEL_SUBPATH_PREFIX)?;
            return state.names.get(name).copied();
        }
        state.resident_assets.get(path).copied()
    }

    fn load(&self, path: &ObjectPath) -> Option<ObjectHandle> {
        if !self.loadable_assets.contains(path) {
            return None;
        }
        let mut state = self.state.write().expect("lock poisoned");
        if let Some(handle) = state.resident_assets.get(path) {
            return Some(*handle);
        }
        let handle = state.allocate();
        state.resident_assets.insert(path.clone(), handle);
        debug!(%path, %handle, "loaded asset");
        Some(handle)
    }
}

impl World for InMemoryWorld {
    fn map_name(&self) -> String {
        self.state
            .read()
            .expect("lock poisoned")
            .map
            .clone()
            .unwrap_or_default()
    }

    fn level_asset(&self) -> String {
        self.state.read().expect("lock poisoned").level_asset()
    }

    fn persistent_objects(&self) -> Vec<ObjectHandle> {
        self.state
            .read()
            .expect("lock poisoned")
            .objects
            .keys()
            .copied()
            .collect()
    }

    fn object(&self, handle: ObjectHandle) -> Option<SharedObject> {
        let state = self.state.read().expect("lock poisoned");
        state.objects.get(&handle).map(|live| Arc::clone(&live.object))
    }

    fn object_name(&self, handle: ObjectHandle) -> Option<String> {
        let state = self.state.read().expect("lock poisoned");
        state.objects.get(&handle).map(|live| live.name.clone())
    }

    fn class_of(&self, handle: ObjectHandle) -> Option<ClassPath> {
        let state = self.state.read().expect("lock poisoned");
        state.objects.get(&handle).map(|live| live.class.clone())
    }

    fn was_loaded(&self, handle: ObjectHandle) -> bool {
        let state = self.state.read().expect("lock poisoned");
        state
            .objects
            .get(&handle)
            .map(|live| live.was_loaded)
            .unwrap_or(false)
    }

    fn find_in_level(&self, name: &str) -> Option<ObjectHandle> {
        self.find(name)
    }

    fn spawn(&self, class: &ClassPath, name: &str) -> WorldResult<ObjectHandle> {
        let object = self
            .classes
            .create(class)
            .ok_or_else(|| WorldError::UnknownClass(class.clone()))?;
        let mut state = self.state.write().expect("lock poisoned");
        let name = if name.is_empty() {
            state.unique_name(class)
        } else if state.names.contains_key(name) {
            return Err(WorldError::NameInUse(name.to_string()));
        } else {
            name.to_string()
        };
        debug!(%class, name = %name, "spawning object");
        let handle = state.insert(name, class.clone(), false, object);
        state.events.push(WorldEvent::ObjectSpawned(handle));
        Ok(handle)
    }

    fn destroy(&self, handle: ObjectHandle) -> WorldResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let live = state
            .objects
            .remove(&handle)
            .ok_or(WorldError::ObjectNotFound(handle))?;
        state.names.remove(&live.name);
        let path = ObjectPath::level_object(state.level_asset(), &live.name);
        debug!(%path, "destroyed object");
        state.events.push(WorldEvent::ObjectDestroyed {
            handle,
            path,
            was_loaded: live.was_loaded,
        });
        Ok(())
    }

    fn travel(&self, map: &str) -> WorldResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.pending_travel.is_some() {
            return Err(WorldError::TravelInProgress);
        }
        if !self.maps.contains_key(map) {
            return Err(WorldError::UnknownMap(map.to_string()));
        }
        info!(map, "travel requested");
        state.pending_travel = Some(map.to_string());
        Ok(())
    }

    fn is_travelling(&self) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .pending_travel
            .is_some()
    }

    fn drain_events(&self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.state.write().expect("lock poisoned").events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{shared, DynamicObject};

    fn classes() -> ClassRegistry {
        ClassRegistry::new()
            .with("/Script/Game.Door", || {
                shared(DynamicObject::new(&["Door", "Actor"]).with_property("bOpen", false))
            })
            .with("/Script/Game.Hero", || {
                shared(DynamicObject::new(&["Hero", "Actor"]).with_spawn_identity(SpawnId::invalid()))
            })
    }

    fn world() -> InMemoryWorld {
        let arena = MapDefinition::new("Arena")
            .place(PlacedObject::new("Door_12", "/Script/Game.Door"))
            .place(PlacedObject::new("Door_13", "/Script/Game.Door"));
        InMemoryWorld::new(classes()).with_map(arena)
    }

    #[test]
    fn open_map_places_objects() {
        let world = world();
        world.open_map("Arena").unwrap();
        assert_eq!(world.map_name(), "Arena");
        assert_eq!(world.level_asset(), "/Game/Maps/Arena.Arena");
        assert_eq!(world.object_count(), 2);

        let door = world.find_in_level("Door_12").unwrap();
        assert!(world.was_loaded(door));
        assert_eq!(
            world.path_of(door).unwrap().to_string(),
            "/Game/Maps/Arena.Arena:PersistentLevel.Door_12"
        );
        assert_eq!(world.drain_events(), vec![WorldEvent::ActorsInitialized]);
    }

    #[test]
    fn spawned_objects_are_not_loaded() {
        let world = world();
        world.open_map("Arena").unwrap();
        world.drain_events();

        let hero = world.spawn(&"/Script/Game.Hero".into(), "").unwrap();
        assert_eq!(world.object_name(hero).unwrap(), "Hero_0");
        assert!(!world.was_loaded(hero));
        assert_eq!(world.drain_events(), vec![WorldEvent::ObjectSpawned(hero)]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let world = world();
        world.open_map("Arena").unwrap();
        let err = world.spawn(&"/Script/Game.Door".into(), "Door_12").unwrap_err();
        assert_eq!(err, WorldError::NameInUse("Door_12".into()));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let world = world();
        world.open_map("Arena").unwrap();
        assert!(matches!(
            world.spawn(&"/Script/Game.Dragon".into(), "Smaug"),
            Err(WorldError::UnknownClass(_))
        ));
    }

    #[test]
    fn destroy_reports_path_and_origin() {
        let world = world();
        world.open_map("Arena").unwrap();
        world.drain_events();

        let door = world.find_in_level("Door_12").unwrap();
        world.destroy(door).unwrap();
        assert!(world.find_in_level("Door_12").is_none());
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::ObjectDestroyed {
                handle: door,
                path: ObjectPath::level_object("/Game/Maps/Arena.Arena", "Door_12"),
                was_loaded: true,
            }]
        );
        assert_eq!(world.destroy(door), Err(WorldError::ObjectNotFound(door)));
    }

    #[test]
    fn travel_is_asynchronous() {
        let world = world();
        world.open_map("Arena").unwrap();
        world.drain_events();

        world.travel("Arena").unwrap();
        assert!(world.is_travelling());
        assert_eq!(world.travel("Arena"), Err(WorldError::TravelInProgress));
        assert_eq!(world.object_count(), 2);

        world.finish_travel().unwrap();
        assert!(!world.is_travelling());
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::WorldCleanup, WorldEvent::ActorsInitialized]
        );
    }

    #[test]
    fn pre_spawned_objects_get_their_spawn_id() {
        let id = SpawnId::new();
        let map = MapDefinition::new("Town")
            .pre_spawn(PlacedObject::new("Hero_C_3", "/Script/Game.Hero").with_spawn_id(id));
        let world = InMemoryWorld::new(classes()).with_map(map);
        world.open_map("Town").unwrap();

        let hero = world.find("Hero_C_3").unwrap();
        assert!(!world.was_loaded(hero));
        let object = world.object(hero).unwrap();
        let guard = object.lock().unwrap();
        assert_eq!(guard.spawn_identity().unwrap().spawn_id(), id);
    }

    #[test]
    fn assets_load_on_demand() {
        let sword = ObjectPath::asset("/Game/Items/Sword.Sword");
        let world = world().with_asset(sword.clone());
        world.open_map("Arena").unwrap();

        assert!(world.resolve(&sword).is_none());
        let handle = world.load(&sword).unwrap();
        assert_eq!(world.resolve(&sword), Some(handle));
        assert_eq!(world.path_of(handle), Some(sword));
        assert!(world.load(&ObjectPath::asset("/Game/Missing.Missing")).is_none());
    }

    #[test]
    fn unknown_map() {
        let world = world();
        assert_eq!(
            world.travel("Nowhere"),
            Err(WorldError::UnknownMap("Nowhere".into()))
        );
    }
}
