//! Level objects destroyed during a session.
//!
//! Tombstones are stored as bare object names, without the level container
//! prefix, and replayed after a load by destroying the same objects in the
//! freshly opened level.

use std::collections::BTreeSet;

use savegame_archive::{ArchiveResult, Record};
use savegame_types::ObjectPath;
use savegame_world::World;
use tracing::{debug, warn};

pub fn write_tombstones(root: &mut Record<'_>, tombstones: &BTreeSet<ObjectPath>) -> ArchiveResult<()> {
    let mut names: Vec<String> = tombstones
        .iter()
        .map(|path| path.level_object_name().to_string())
        .collect();
    root.field("DestroyedObjects").value(&mut names)
}

pub fn read_tombstones(root: &mut Record<'_>) -> ArchiveResult<Vec<String>> {
    let mut names = Vec::new();
    root.field("DestroyedObjects").value(&mut names)?;
    Ok(names)
}

/// Destroy each named object that exists in the current level. Returns the
/// paths of the objects destroyed.
pub fn replay_tombstones(world: &dyn World, names: &[String]) -> Vec<ObjectPath> {
    let mut destroyed = Vec::with_capacity(names.len());
    for name in names {
        let Some(handle) = world.find_in_level(name) else {
            debug!(object = %name, "tombstoned object not present in level");
            continue;
        };
        let path = world
            .path_of(handle)
            .unwrap_or_else(|| ObjectPath::level_object(world.level_asset(), name));
        match world.destroy(handle) {
            Ok(()) => destroyed.push(path),
            Err(e) => warn!(object = %name, error = %e, "failed to replay tombstone"),
        }
    }
    destroyed
}
