//! Snapshot encoding and decoding.
//!
//! ```text
//! Map: string
//! VersionsOffset: u64          (binary only)
//! Objects: map of object entries
//! DestroyedObjects: array of names
//! Versions: custom version table
//! ```
//!
//! `VersionsOffset` is the absolute position of `Versions`, so a reader can
//! learn the versions before it interprets any object data.

use std::collections::BTreeSet;
use std::sync::Arc;

use savegame_archive::{
    CustomVersionContainer, FieldRedirects, NullResolver, ObjectResolver, Placeholder, Record,
    SaveGameVersion, StructuredArchive, VersionRegistry, SAVEGAME_VERSION_ID,
};
use savegame_types::{ObjectHandle, ObjectPath};
use savegame_world::World;
use tracing::{debug, info, warn};

use crate::entry::{self, LoadReport};
use crate::error::{SaveGameError, SaveGameResult};
use crate::tombstone;

/// Storage slot of the binary snapshot.
pub const SAVE_SLOT: &str = "SaveGame";

/// Storage slot of the optional text snapshot.
pub const TEXT_SAVE_SLOT: &str = "SaveGame.json";

/// What a snapshot pass needs from its surroundings.
pub struct SnapshotContext<'a> {
    pub world: &'a dyn World,
    /// The same world, as the archive's reference resolver.
    pub resolver: Arc<dyn ObjectResolver>,
    pub registry: Arc<VersionRegistry>,
    pub redirects: &'a FieldRedirects,
}

/// The fixed-position part of a binary snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub map: String,
    pub versions_offset: u64,
}

/// A decoded snapshot waiting for its map to load.
#[derive(Debug)]
pub struct PreparedLoad {
    pub header: SnapshotHeader,
    pub versions: CustomVersionContainer,
    data: Vec<u8>,
    objects_position: u64,
}

/// Encode the world into an uncompressed snapshot, binary or JSON text.
pub fn encode_snapshot(
    ctx: &SnapshotContext<'_>,
    objects: &[ObjectHandle],
    tombstones: &BTreeSet<ObjectPath>,
    text: bool,
) -> SaveGameResult<Vec<u8>> {
    let ar = if text {
        StructuredArchive::text_writer(Arc::clone(&ctx.resolver))
    } else {
        StructuredArchive::binary_writer(Arc::clone(&ctx.resolver))
    };
    let mut ar = ar.with_registry(Arc::clone(&ctx.registry));
    ar.using_custom_version(SAVEGAME_VERSION_ID, SaveGameVersion::LATEST);

    let written;
    {
        let mut root = ar.root();
        let mut map = ctx.world.map_name();
        root.field("Map").string(&mut map)?;

        let versions_offset = if text {
            None
        } else {
            Some(Placeholder::reserve(root.archive().proxy_mut().stream_mut()))
        };

        written = entry::write_objects(&mut root, ctx.world, objects, ctx.redirects)?;
        tombstone::write_tombstones(&mut root, tombstones)?;

        let stream = root.archive().proxy_mut().stream_mut();
        let offset = stream.tell();
        if let Some(slot) = versions_offset {
            slot.fill(stream, offset)?;
        }
        let mut versions = root.archive().versions().clone();
        root.field("Versions").value(&mut versions)?;
    }

    let bytes = ar.finish()?;
    debug!(objects = written, tombstones = tombstones.len(), bytes = bytes.len(), text, "encoded snapshot");
    Ok(bytes)
}

pub(crate) fn read_header(root: &mut Record<'_>) -> SaveGameResult<SnapshotHeader> {
    let mut map = String::new();
    root.field("Map").string(&mut map)?;
    let versions_offset = root.archive().proxy_mut().stream_mut().read_u64()?;
    Ok(SnapshotHeader {
        map,
        versions_offset,
    })
}

/// Read the version table at `header.versions_offset` and return to the
/// current position.
pub(crate) fn read_versions(
    root: &mut Record<'_>,
    header: &SnapshotHeader,
) -> SaveGameResult<CustomVersionContainer> {
    let resume = root.archive().tell();
    root.archive().seek(header.versions_offset)?;
    let mut versions = CustomVersionContainer::new();
    root.field("Versions").value(&mut versions)?;
    root.archive().seek(resume)?;
    Ok(versions)
}

/// Decode the header and version table of an uncompressed binary snapshot.
pub fn prepare_load(data: Vec<u8>) -> SaveGameResult<PreparedLoad> {
    let mut ar = StructuredArchive::binary_reader(data, Arc::new(NullResolver));
    let (header, versions, objects_position) = {
        let mut root = ar.root();
        let header = read_header(&mut root)?;
        let versions = read_versions(&mut root, &header)?;
        let position = root.archive().tell();
        (header, versions, position)
    };

    if versions.get(&SAVEGAME_VERSION_ID).is_none() {
        warn!("snapshot carries no format version");
    }
    Ok(PreparedLoad {
        header,
        versions,
        data: ar.finish()?,
        objects_position,
    })
}

/// Apply a prepared snapshot to the world, which must have the snapshot's
/// map loaded.
///
/// Runs the identity pass, the payload pass and tombstone replay. When
/// `strict` is set an unresolved entry aborts the load after the identity
/// pass.
pub fn apply_snapshot(
    ctx: &SnapshotContext<'_>,
    prepared: PreparedLoad,
    tracked: &BTreeSet<ObjectHandle>,
    strict: bool,
) -> SaveGameResult<(LoadReport, Vec<ObjectPath>)> {
    let mut ar = StructuredArchive::binary_reader(prepared.data, Arc::clone(&ctx.resolver))
        .with_registry(Arc::clone(&ctx.registry));
    ar.set_versions(prepared.versions);
    ar.seek(prepared.objects_position)?;

    let mut report = LoadReport {
        map: prepared.header.map,
        ..LoadReport::default()
    };

    let mut root = ar.root();
    let objects_start = root.archive().tell();
    let resolved = entry::resolve_identities(&mut root, ctx.world, tracked)?;
    if strict {
        if let Some(missing) = resolved.iter().find(|r| r.handle.is_none()) {
            return Err(SaveGameError::UnresolvedObject {
                name: missing.name.clone(),
            });
        }
    }

    root.archive().seek(objects_start)?;
    entry::apply_payloads(&mut root, ctx.world, &resolved, ctx.redirects, &mut report)?;

    let names = tombstone::read_tombstones(&mut root)?;
    let destroyed = tombstone::replay_tombstones(ctx.world, &names);
    report.destroyed = destroyed
        .iter()
        .map(|path| path.level_object_name().to_string())
        .collect();

    info!(
        map = %report.map,
        applied = report.applied.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        destroyed = report.destroyed.len(),
        "snapshot applied"
    );
    Ok((report, destroyed))
}

#[cfg(test)]
mod tests {
    use savegame_world::{
        shared, ClassRegistry, DynamicObject, InMemoryWorld, MapDefinition, PlacedObject,
    };

    use super::*;

    fn world() -> Arc<InMemoryWorld> {
        let classes = ClassRegistry::new()
            .with("/Script/Game.Door", || shared(DynamicObject::new(&["Door"])));
        let map = MapDefinition::new("Arena").place(PlacedObject::new("Door_12", "/Script/Game.Door"));
        let world = Arc::new(InMemoryWorld::new(classes).with_map(map));
        world.open_map("Arena").unwrap();
        world
    }

    fn context<'a>(world: &'a Arc<InMemoryWorld>, redirects: &'a FieldRedirects) -> SnapshotContext<'a> {
        SnapshotContext {
            world: world.as_ref(),
            resolver: world.clone(),
            registry: Arc::new(VersionRegistry::default()),
            redirects,
        }
    }

    #[test]
    fn versions_offset_points_at_version_table() {
        let world = world();
        let redirects = FieldRedirects::new();
        let ctx = context(&world, &redirects);
        let bytes =
            encode_snapshot(&ctx, &world.persistent_objects(), &BTreeSet::new(), false).unwrap();

        let prepared = prepare_load(bytes).unwrap();
        assert_eq!(prepared.header.map, "Arena");
        assert_eq!(
            prepared.versions.get(&SAVEGAME_VERSION_ID),
            Some(SaveGameVersion::LATEST)
        );
        // Map string (4 + 5) + offset slot (8)
        assert_eq!(prepared.objects_position, 17);
    }

    #[test]
    fn text_snapshot_is_json() {
        let world = world();
        let redirects = FieldRedirects::new();
        let ctx = context(&world, &redirects);
        let tombstones = BTreeSet::from([ObjectPath::level_object(world.level_asset(), "Door_13")]);
        let bytes = encode_snapshot(&ctx, &world.persistent_objects(), &tombstones, true).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["Map"], "Arena");
        assert!(json["Objects"]["Door_12"]["Data"].is_object());
        assert!(json["Objects"]["Door_12"].get("Class").is_none());
        assert_eq!(json["DestroyedObjects"], serde_json::json!(["Door_13"]));
        assert_eq!(json["Versions"].as_array().unwrap().len(), 1);
        assert!(json.get("VersionsOffset").is_none());
    }

    #[test]
    fn corrupt_object_count_fails_the_load() {
        let world = world();
        let redirects = FieldRedirects::new();
        let ctx = context(&world, &redirects);
        let mut bytes =
            encode_snapshot(&ctx, &world.persistent_objects(), &BTreeSet::new(), false).unwrap();
        // The object count follows the map name and the versions offset.
        bytes[17..21].copy_from_slice(&i32::MAX.to_be_bytes());

        let prepared = prepare_load(bytes).unwrap();
        let tracked = world.persistent_objects().into_iter().collect();
        assert!(apply_snapshot(&ctx, prepared, &tracked, false).is_err());
    }

    #[test]
    fn truncated_snapshot_fails_to_prepare() {
        let world = world();
        let redirects = FieldRedirects::new();
        let ctx = context(&world, &redirects);
        let mut bytes =
            encode_snapshot(&ctx, &world.persistent_objects(), &BTreeSet::new(), false).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(prepare_load(bytes).is_err());
    }
}
