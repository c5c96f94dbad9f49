//! Offline inspection of binary snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use savegame_archive::{
    envelope, property, FieldRedirects, NullResolver, PropertyValue, SaveGameArchive,
    StructuredArchive,
};
use savegame_types::{ClassPath, SpawnId, VersionTagId};
use serde::Serialize;

use crate::entry;
use crate::error::SaveGameResult;
use crate::serializer;
use crate::tombstone;

/// One object entry as stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntrySummary {
    pub name: String,
    pub class: Option<ClassPath>,
    pub spawn_id: Option<SpawnId>,
    pub data_size: u64,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Names of the fields in the object's custom record. Their values have
    /// no self-describing type and are not decoded.
    pub custom_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionSummary {
    pub id: VersionTagId,
    pub version: i32,
}

/// Everything a snapshot records, decoded without a world. References stay
/// as paths.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub map: String,
    pub uncompressed_size: u64,
    pub versions_offset: u64,
    pub objects: Vec<EntrySummary>,
    pub destroyed: Vec<String>,
    pub versions: Vec<VersionSummary>,
}

impl SnapshotSummary {
    /// Decode a stored (compressed) snapshot.
    pub fn decode(blob: &[u8]) -> SaveGameResult<Self> {
        Self::decode_uncompressed(envelope::decompress(blob)?)
    }

    pub fn decode_uncompressed(data: Vec<u8>) -> SaveGameResult<Self> {
        let uncompressed_size = data.len() as u64;
        let mut ar = StructuredArchive::binary_reader(data, Arc::new(NullResolver));
        let mut root = ar.root();

        let header = serializer::read_header(&mut root)?;
        let versions = serializer::read_versions(&mut root, &header)?;

        let no_redirects = FieldRedirects::new();
        let mut count = 0;
        let mut objects = Vec::new();
        {
            let mut table = root.field("Objects").map(&mut count)?;
            for _ in 0..count {
                let mut name = String::new();
                let mut record = table.element(&mut name)?.record();
                let header = entry::read_header(&mut record, name)?;

                let properties = property::read_properties(record.field("Properties"))?
                    .into_iter()
                    .collect();
                let custom_fields = {
                    let data = SaveGameArchive::open(record.field("Data").record(), &[], &no_redirects)?;
                    let names: Vec<String> = data.field_names().map(str::to_string).collect();
                    data.close()?;
                    names
                };
                record.archive().seek(header.data_end())?;

                objects.push(EntrySummary {
                    name: header.name,
                    class: header.class,
                    spawn_id: header.spawn_id,
                    data_size: header.data_size,
                    properties,
                    custom_fields,
                });
            }
        }

        let destroyed = tombstone::read_tombstones(&mut root)?;

        Ok(Self {
            map: header.map,
            uncompressed_size,
            versions_offset: header.versions_offset,
            objects,
            destroyed,
            versions: versions
                .iter()
                .map(|(id, version)| VersionSummary {
                    id: *id,
                    version: *version,
                })
                .collect(),
        })
    }

    pub fn object(&self, name: &str) -> Option<&EntrySummary> {
        self.objects.iter().find(|entry| entry.name == name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use savegame_archive::{VersionRegistry, SAVEGAME_VERSION_ID};
    use savegame_types::ObjectPath;
    use savegame_world::{
        shared, ClassRegistry, DynamicObject, InMemoryWorld, MapDefinition, PlacedObject, World,
    };

    use super::*;
    use crate::serializer::{encode_snapshot, SnapshotContext};

    #[test]
    fn summary_lists_entries_tombstones_and_versions() {
        let classes = ClassRegistry::new()
            .with("/Script/Game.Door", || {
                shared(DynamicObject::new(&["Door"]).with_property("bOpen", true))
            })
            .with("/Script/Game.Chest", || {
                shared(
                    DynamicObject::new(&["Chest"])
                        .with_custom("Coins", 12)
                        .with_spawn_identity(SpawnId::new()),
                )
            });
        let map = MapDefinition::new("Arena").place(PlacedObject::new("Door_12", "/Script/Game.Door"));
        let world = Arc::new(InMemoryWorld::new(classes).with_map(map));
        world.open_map("Arena").unwrap();
        world.spawn(&"/Script/Game.Chest".into(), "Chest_1").unwrap();

        let redirects = FieldRedirects::new();
        let ctx = SnapshotContext {
            world: world.as_ref(),
            resolver: world.clone(),
            registry: Arc::new(VersionRegistry::default()),
            redirects: &redirects,
        };
        let tombstones = BTreeSet::from([ObjectPath::level_object(world.level_asset(), "Door_13")]);
        let raw = encode_snapshot(&ctx, &world.persistent_objects(), &tombstones, false).unwrap();
        let blob = envelope::compress(&raw, 6).unwrap();

        let summary = SnapshotSummary::decode(&blob).unwrap();
        assert_eq!(summary.map, "Arena");
        assert_eq!(summary.uncompressed_size, raw.len() as u64);
        assert_eq!(summary.destroyed, vec!["Door_13"]);
        assert_eq!(summary.versions.len(), 1);
        assert_eq!(summary.versions[0].id, SAVEGAME_VERSION_ID);

        let door = summary.object("Door_12").unwrap();
        assert_eq!(door.class, None);
        assert_eq!(door.properties["bOpen"], PropertyValue::Bool(true));
        assert!(door.custom_fields.is_empty());

        let chest = summary.object("Chest_1").unwrap();
        assert_eq!(chest.class, Some(ClassPath::new("/Script/Game.Chest")));
        assert!(chest.spawn_id.is_some());
        assert_eq!(chest.custom_fields, vec!["Coins"]);
        assert!(chest.data_size > 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["objects"][1]["name"], "Chest_1");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(SnapshotSummary::decode(b"not a snapshot").is_err());
    }
}
