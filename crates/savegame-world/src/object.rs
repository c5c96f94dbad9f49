use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use savegame_archive::{ArchiveResult, PropertyValue, SaveGameArchive};
use savegame_types::SpawnId;

/// Reflection surface: the flagged properties of an object.
pub trait PersistableFields {
    /// Every persistable property, lazily.
    fn persistable_fields(&self) -> Box<dyn Iterator<Item = (String, PropertyValue)> + '_>;

    /// Apply a loaded property. Returns `false` if the object has no such
    /// property or rejects the value.
    fn apply_field(&mut self, name: &str, value: PropertyValue) -> bool;

    fn field(&self, name: &str) -> Option<PropertyValue> {
        self.persistable_fields()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// An object that keeps a stable spawn id across save and load.
pub trait SpawnIdentity {
    fn spawn_id(&self) -> SpawnId;

    /// Returns `false` if the id was not accepted.
    fn set_spawn_id(&mut self, id: SpawnId) -> bool;
}

/// A live object that participates in snapshots.
pub trait SaveGameObject: PersistableFields + Send {
    /// Type names from the most derived type to the root. Used to scope
    /// field renames.
    fn type_hierarchy(&self) -> &[&'static str];

    /// Serialize custom data into the object's field-indexed record.
    /// Returns `true` if the object wrote or read anything.
    fn on_serialize(
        &mut self,
        _archive: &mut SaveGameArchive<'_>,
        _is_loading: bool,
    ) -> ArchiveResult<bool> {
        Ok(false)
    }

    fn spawn_identity(&self) -> Option<&dyn SpawnIdentity> {
        None
    }

    fn spawn_identity_mut(&mut self) -> Option<&mut dyn SpawnIdentity> {
        None
    }
}

/// A live object shared between the world and the save system.
pub type SharedObject = Arc<Mutex<dyn SaveGameObject>>;

pub fn shared<T: SaveGameObject + 'static>(object: T) -> SharedObject {
    Arc::new(Mutex::new(object))
}

/// Property-bag object.
///
/// Persists its properties through the flagged-property pass and its custom
/// data as named fields of its record.
#[derive(Clone, Debug, Default)]
pub struct DynamicObject {
    hierarchy: Vec<&'static str>,
    properties: BTreeMap<String, PropertyValue>,
    custom: BTreeMap<String, PropertyValue>,
    spawn_id: Option<SpawnId>,
}

impl DynamicObject {
    pub fn new(hierarchy: &[&'static str]) -> Self {
        Self {
            hierarchy: hierarchy.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_custom(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.custom.insert(name.to_string(), value.into());
        self
    }

    /// Give the object a spawn identity, initially `id`.
    pub fn with_spawn_identity(mut self, id: SpawnId) -> Self {
        self.spawn_id = Some(id);
        self
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(name.to_string(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn set_custom(&mut self, name: &str, value: impl Into<PropertyValue>) {
        self.custom.insert(name.to_string(), value.into());
    }

    pub fn custom(&self, name: &str) -> Option<&PropertyValue> {
        self.custom.get(name)
    }
}

impl PersistableFields for DynamicObject {
    fn persistable_fields(&self) -> Box<dyn Iterator<Item = (String, PropertyValue)> + '_> {
        Box::new(
            self.properties
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        )
    }

    fn apply_field(&mut self, name: &str, value: PropertyValue) -> bool {
        self.properties.insert(name.to_string(), value);
        true
    }
}

impl SpawnIdentity for DynamicObject {
    fn spawn_id(&self) -> SpawnId {
        self.spawn_id.unwrap_or_default()
    }

    fn set_spawn_id(&mut self, id: SpawnId) -> bool {
        if self.spawn_id.is_none() {
            return false;
        }
        self.spawn_id = Some(id);
        true
    }
}

impl SaveGameObject for DynamicObject {
    fn type_hierarchy(&self) -> &[&'static str] {
        &self.hierarchy
    }

    fn on_serialize(
        &mut self,
        archive: &mut SaveGameArchive<'_>,
        is_loading: bool,
    ) -> ArchiveResult<bool> {
        if is_loading {
            let names: Vec<String> = archive.field_names().map(str::to_string).collect();
            for name in names {
                let mut value = PropertyValue::default();
                if archive.serialize_field(&name, &mut value)? {
                    self.custom.insert(name, value);
                }
            }
        } else {
            for (name, value) in self.custom.iter_mut() {
                archive.serialize_field(name, value)?;
            }
        }
        Ok(!self.custom.is_empty())
    }

    fn spawn_identity(&self) -> Option<&dyn SpawnIdentity> {
        self.spawn_id.map(|_| self as &dyn SpawnIdentity)
    }

    fn spawn_identity_mut(&mut self) -> Option<&mut dyn SpawnIdentity> {
        if self.spawn_id.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup() {
        let object = DynamicObject::new(&["Door"]).with_property("bOpen", true);
        assert_eq!(object.field("bOpen"), Some(PropertyValue::Bool(true)));
        assert_eq!(object.field("Missing"), None);
    }

    #[test]
    fn spawn_identity_is_opt_in() {
        let plain = DynamicObject::new(&["Crate"]);
        assert!(plain.spawn_identity().is_none());

        let id = SpawnId::new();
        let mut hero = DynamicObject::new(&["Hero", "Pawn"]).with_spawn_identity(id);
        assert_eq!(hero.spawn_identity().map(|s| s.spawn_id()), Some(id));

        let other = SpawnId::new();
        assert!(hero.spawn_identity_mut().unwrap().set_spawn_id(other));
        assert_eq!(hero.spawn_identity().unwrap().spawn_id(), other);
    }

    #[test]
    fn shared_objects_lock() {
        let object = shared(DynamicObject::new(&["Door"]).with_property("Angle", 90.0));
        let guard = object.lock().unwrap();
        assert_eq!(guard.field("Angle"), Some(PropertyValue::Float(90.0)));
        assert_eq!(guard.type_hierarchy(), &["Door"]);
    }
}
