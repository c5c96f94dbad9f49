//! Object entries.
//!
//! Every persisted object is one entry of the `Objects` map, keyed by the
//! object's name:
//!
//! ```text
//! has_class: u8, Class?: string
//! has_spawn_id: u8, SpawnID?: 16 bytes
//! DataSize: u64
//! Properties: tagged property blob
//! Data: field-indexed record written by the object's hook
//! ```
//!
//! `DataSize` covers `Properties` and `Data`, so a reader can always move to
//! the next entry without understanding the payload. Loading runs in two
//! passes over the table: [`resolve_identities`] finds or spawns every
//! object, then [`apply_payloads`] applies the data once all references can
//! resolve.

use std::collections::{BTreeSet, HashMap};
use std::sync::MutexGuard;

use savegame_archive::{
    property, ArchiveError, ArchiveResult, FieldRedirects, Placeholder, Record,
    SaveGameArchive,
};
use savegame_types::{ClassPath, ObjectHandle, ObjectPath, SpawnId};
use savegame_world::{SaveGameObject, SharedObject, World, WorldError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SaveGameResult;

/// Identity and payload location of an entry being loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub class: Option<ClassPath>,
    pub spawn_id: Option<SpawnId>,
    pub data_size: u64,
    pub data_start: u64,
}

impl EntryHeader {
    pub fn data_end(&self) -> u64 {
        self.data_start + self.data_size
    }

    fn valid_spawn_id(&self) -> Option<SpawnId> {
        self.spawn_id.filter(SpawnId::is_valid)
    }
}

/// Outcome of the identity pass for one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub name: String,
    pub handle: Option<ObjectHandle>,
}

/// What a load did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub map: String,
    /// Entries whose data was applied.
    pub applied: Vec<String>,
    /// Entries with no live object to apply to.
    pub unresolved: Vec<String>,
    /// Entries whose data failed to apply.
    pub failed: Vec<String>,
    /// Level objects destroyed by tombstone replay.
    pub destroyed: Vec<String>,
}

/// Lock an object, recovering it if a previous holder panicked.
pub(crate) fn lock_object(object: &SharedObject) -> MutexGuard<'_, dyn SaveGameObject + 'static> {
    object
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Write the `Objects` table for `handles`. Returns the number of entries.
pub fn write_objects(
    root: &mut Record<'_>,
    world: &dyn World,
    handles: &[ObjectHandle],
    redirects: &FieldRedirects,
) -> SaveGameResult<usize> {
    let live: Vec<(ObjectHandle, String, SharedObject)> = handles
        .iter()
        .filter_map(|&handle| Some((handle, world.object_name(handle)?, world.object(handle)?)))
        .collect();

    let mut count = live.len() as i32;
    let mut objects = root.field("Objects").map(&mut count)?;
    for (handle, name, object) in &live {
        let mut key = name.clone();
        let mut entry = objects.element(&mut key)?.record();
        let mut guard = lock_object(object);
        write_entry(&mut entry, world, *handle, &mut *guard, redirects)?;
        debug!(object = %name, "wrote object entry");
    }
    Ok(live.len())
}

fn write_entry(
    entry: &mut Record<'_>,
    world: &dyn World,
    handle: ObjectHandle,
    object: &mut dyn SaveGameObject,
    redirects: &FieldRedirects,
) -> ArchiveResult<()> {
    let mut class = if world.was_loaded(handle) {
        ClassPath::default()
    } else {
        world.class_of(handle).unwrap_or_default()
    };
    if let Some(slot) = entry.try_field("Class", !class.is_null())? {
        slot.value(&mut class)?;
    }

    let mut spawn_id = object
        .spawn_identity()
        .map(|identity| identity.spawn_id())
        .unwrap_or_default();
    if let Some(slot) = entry.try_field("SpawnID", spawn_id.is_valid())? {
        slot.value(&mut spawn_id)?;
    }

    let size = if entry.is_text() {
        None
    } else {
        Some(Placeholder::reserve(entry.archive().proxy_mut().stream_mut()))
    };
    let data_start = entry.archive().tell();

    serialize_body(entry, object, redirects, false)?;

    if let Some(size) = size {
        let stream = entry.archive().proxy_mut().stream_mut();
        let len = stream.tell() - data_start;
        size.fill(stream, len)?;
    }
    Ok(())
}

/// Read an entry's identity and payload length. The stream is left at the
/// start of the payload.
pub(crate) fn read_header(entry: &mut Record<'_>, name: String) -> ArchiveResult<EntryHeader> {
    let mut class = ClassPath::default();
    let has_class = match entry.try_field("Class", false)? {
        Some(slot) => {
            slot.value(&mut class)?;
            true
        }
        None => false,
    };

    let mut spawn_id = SpawnId::invalid();
    let has_spawn_id = match entry.try_field("SpawnID", false)? {
        Some(slot) => {
            slot.value(&mut spawn_id)?;
            true
        }
        None => false,
    };

    let stream = entry.archive().proxy_mut().stream_mut();
    let data_size = stream.read_u64()?;
    let data_start = stream.tell();
    if data_size > stream.remaining() {
        return Err(ArchiveError::InvalidLength {
            offset: data_start,
            length: data_size as i64,
        });
    }

    Ok(EntryHeader {
        name,
        class: has_class.then_some(class),
        spawn_id: has_spawn_id.then_some(spawn_id),
        data_size,
        data_start,
    })
}

/// Flagged properties, then the object's field-indexed record.
fn serialize_body(
    entry: &mut Record<'_>,
    object: &mut dyn SaveGameObject,
    redirects: &FieldRedirects,
    loading: bool,
) -> ArchiveResult<()> {
    if loading {
        for (name, value) in property::read_properties(entry.field("Properties"))? {
            if !object.apply_field(&name, value) {
                debug!(property = %name, "object did not accept loaded property");
            }
        }
    } else {
        property::write_properties(entry.field("Properties"), object.persistable_fields())?;
    }

    let mut data = SaveGameArchive::open(
        entry.field("Data").record(),
        object.type_hierarchy(),
        redirects,
    )?;
    object.on_serialize(&mut data, loading)?;
    data.close()
}

/// Live objects with a valid spawn id, among `tracked`.
fn spawn_id_index(
    world: &dyn World,
    tracked: &BTreeSet<ObjectHandle>,
) -> HashMap<SpawnId, ObjectHandle> {
    tracked
        .iter()
        .filter_map(|&handle| {
            let object = world.object(handle)?;
            let guard = lock_object(&object);
            let id = guard.spawn_identity()?.spawn_id();
            id.is_valid().then_some((id, handle))
        })
        .collect()
}

fn resolve_entry(
    world: &dyn World,
    header: &EntryHeader,
    by_spawn_id: &HashMap<SpawnId, ObjectHandle>,
) -> Option<ObjectHandle> {
    let Some(class) = &header.class else {
        return world.find_in_level(&header.name);
    };

    if let Some(&handle) = header
        .valid_spawn_id()
        .and_then(|id| by_spawn_id.get(&id))
    {
        debug!(object = %header.name, %handle, "bound entry to live object by spawn id");
        return Some(handle);
    }

    let spawned = match world.spawn(class, &header.name) {
        Err(WorldError::NameInUse(_)) => world.spawn(class, ""),
        other => other,
    };
    let handle = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            warn!(object = %header.name, %class, error = %e, "could not spawn object");
            return None;
        }
    };

    if let Some(id) = header.valid_spawn_id() {
        if let Some(object) = world.object(handle) {
            let mut guard = lock_object(&object);
            if let Some(identity) = guard.spawn_identity_mut() {
                identity.set_spawn_id(id);
            }
        }
    }
    debug!(object = %header.name, %class, %handle, "spawned object for entry");
    Some(handle)
}

/// First load pass: find or spawn the object of every entry and register
/// reference redirects. Payloads are skipped.
pub fn resolve_identities(
    root: &mut Record<'_>,
    world: &dyn World,
    tracked: &BTreeSet<ObjectHandle>,
) -> SaveGameResult<Vec<ResolvedEntry>> {
    let by_spawn_id = spawn_id_index(world, tracked);
    let level_asset = world.level_asset();

    let mut count = 0;
    let mut objects = root.field("Objects").map(&mut count)?;
    let remaining = objects.archive().proxy().stream().remaining();
    let mut resolved = Vec::with_capacity((count as u64).min(remaining) as usize);
    for _ in 0..count {
        let mut name = String::new();
        let mut entry = objects.element(&mut name)?.record();
        let header = read_header(&mut entry, name)?;

        let handle = resolve_entry(world, &header, &by_spawn_id);
        match handle {
            Some(handle) => {
                if header.valid_spawn_id().is_some() {
                    if let Some(live_path) = world.path_of(handle) {
                        let placeholder = ObjectPath::level_object(level_asset.as_str(), &header.name);
                        entry.archive().proxy_mut().add_redirect(placeholder, live_path);
                    }
                }
            }
            None => warn!(object = %header.name, "object entry could not be resolved"),
        }

        entry.archive().seek(header.data_end())?;
        resolved.push(ResolvedEntry {
            name: header.name,
            handle,
        });
    }
    Ok(resolved)
}

/// Second load pass: apply each resolved entry's payload.
///
/// Failing or unresolved entries are skipped by their length prefix so the
/// rest of the table still loads.
pub fn apply_payloads(
    root: &mut Record<'_>,
    world: &dyn World,
    resolved: &[ResolvedEntry],
    redirects: &FieldRedirects,
    report: &mut LoadReport,
) -> SaveGameResult<()> {
    let mut count = 0;
    let offset = root.archive().tell();
    let mut objects = root.field("Objects").map(&mut count)?;
    if count as usize != resolved.len() {
        return Err(ArchiveError::Malformed {
            offset,
            reason: format!(
                "object table has {count} entries, expected {}",
                resolved.len()
            ),
        }
        .into());
    }

    for target in resolved {
        let mut name = String::new();
        let mut entry = objects.element(&mut name)?.record();
        let header = read_header(&mut entry, name)?;

        match target.handle.and_then(|handle| world.object(handle)) {
            Some(object) => {
                let mut guard = lock_object(&object);
                match serialize_body(&mut entry, &mut *guard, redirects, true) {
                    Ok(()) => report.applied.push(header.name.clone()),
                    Err(e) => {
                        warn!(object = %header.name, error = %e, "failed to apply object data");
                        report.failed.push(header.name.clone());
                    }
                }
            }
            None => report.unresolved.push(header.name.clone()),
        }

        entry.archive().seek(header.data_end())?;
    }
    Ok(())
}
