//! Custom version tags.
//!
//! Each snapshot carries a table of `(tag id, version)` pairs. Code that
//! changes its on-disk layout registers a tag and branches on the version
//! stored in the snapshot being loaded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use savegame_types::VersionTagId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ArchiveResult;
use crate::structured::{Archivable, Slot};

/// Version reported for a tag that a snapshot does not contain.
pub const NO_VERSION: i32 = -1;

/// Tag id of the snapshot format itself.
pub const SAVEGAME_VERSION_ID: VersionTagId = VersionTagId::from_bytes([
    0x5a, 0x1e, 0x9c, 0x42, 0x7d, 0x03, 0x4b, 0x8e, 0x91, 0x6f, 0x2c, 0xd4, 0x0b, 0x73, 0xe8, 0x15,
]);

/// Versions of the snapshot format.
pub struct SaveGameVersion;

impl SaveGameVersion {
    pub const INITIAL: i32 = 0;
    pub const LATEST: i32 = Self::INITIAL;
}

/// The version table stored in a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVersionContainer {
    versions: BTreeMap<VersionTagId, i32>,
}

impl CustomVersionContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &VersionTagId) -> Option<i32> {
        self.versions.get(id).copied()
    }

    pub fn set(&mut self, id: VersionTagId, version: i32) {
        self.versions.insert(id, version);
    }

    /// Insert `id` at `version` unless present. Returns the stored version.
    pub fn register(&mut self, id: VersionTagId, version: i32) -> i32 {
        *self.versions.entry(id).or_insert(version)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VersionTagId, &i32)> {
        self.versions.iter()
    }
}

impl Archivable for CustomVersionContainer {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
        let loading = slot.is_loading();
        let mut count = self.versions.len() as i32;
        let mut array = slot.array(&mut count)?;
        if loading {
            self.versions.clear();
            for _ in 0..count {
                let mut id = VersionTagId::from_bytes([0; 16]);
                let mut version = 0;
                let mut entry = array.element().record();
                entry.field("Key").value(&mut id)?;
                entry.field("Version").i32(&mut version)?;
                self.versions.insert(id, version);
            }
        } else {
            for (id, version) in self.versions.iter_mut() {
                let mut id = *id;
                let mut entry = array.element().record();
                entry.field("Key").value(&mut id)?;
                entry.field("Version").i32(version)?;
            }
        }
        Ok(())
    }
}

/// Configuration entry for one version tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub tag: String,
    /// Explicit id. Derived from the tag name when absent.
    #[serde(default)]
    pub id: Option<VersionTagId>,
    pub latest: i32,
}

impl VersionInfo {
    pub fn new(tag: impl Into<String>, latest: i32) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            latest,
        }
    }

    pub fn with_id(mut self, id: VersionTagId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn resolved_id(&self) -> VersionTagId {
        self.id.unwrap_or_else(|| VersionTagId::derive(&self.tag))
    }
}

#[derive(Default)]
struct RegistryState {
    config: Vec<VersionInfo>,
    cache: Option<HashMap<String, (VersionTagId, i32)>>,
}

static GLOBAL: Lazy<Arc<VersionRegistry>> = Lazy::new(|| Arc::new(VersionRegistry::default()));

/// Registry of custom version tags.
///
/// Lookups go through a cache that is rebuilt lazily after the
/// configuration changes.
#[derive(Default)]
pub struct VersionRegistry {
    state: RwLock<RegistryState>,
}

impl VersionRegistry {
    pub fn new(config: Vec<VersionInfo>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                config,
                cache: None,
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Replace the configuration.
    pub fn configure(&self, config: Vec<VersionInfo>) {
        let mut state = self.state.write().expect("lock poisoned");
        state.config = config;
        state.cache = None;
    }

    /// Add one tag to the configuration.
    pub fn register(&self, info: VersionInfo) {
        let mut state = self.state.write().expect("lock poisoned");
        state.config.push(info);
        state.cache = None;
    }

    pub fn config(&self) -> Vec<VersionInfo> {
        self.state.read().expect("lock poisoned").config.clone()
    }

    pub fn version_id(&self, tag: &str) -> Option<VersionTagId> {
        self.lookup(tag).map(|(id, _)| id)
    }

    pub fn latest_version(&self, tag: &str) -> Option<i32> {
        self.lookup(tag).map(|(_, latest)| latest)
    }

    /// Id and latest version of `tag`.
    pub fn lookup(&self, tag: &str) -> Option<(VersionTagId, i32)> {
        {
            let state = self.state.read().expect("lock poisoned");
            if let Some(cache) = &state.cache {
                return cache.get(tag).copied();
            }
        }

        let mut state = self.state.write().expect("lock poisoned");
        if state.cache.is_none() {
            let cache = build_cache(&state.config);
            debug!(tags = cache.len(), "rebuilt custom version cache");
            state.cache = Some(cache);
        }
        state.cache.as_ref().and_then(|cache| cache.get(tag).copied())
    }

    /// Returns `true` if the lookup cache is populated.
    pub fn is_cached(&self) -> bool {
        self.state.read().expect("lock poisoned").cache.is_some()
    }
}

fn build_cache(config: &[VersionInfo]) -> HashMap<String, (VersionTagId, i32)> {
    let mut cache = HashMap::with_capacity(config.len());
    for info in config {
        let id = info.resolved_id();
        if let Some((existing, _)) = cache.get(&info.tag) {
            if *existing != id {
                warn!(tag = %info.tag, "duplicate custom version tag with a different id; keeping the first");
            }
            continue;
        }
        cache.insert(info.tag.clone(), (id, info.latest));
    }
    cache
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::NullResolver;
    use crate::structured::StructuredArchive;

    fn registry() -> Arc<VersionRegistry> {
        Arc::new(VersionRegistry::new(vec![
            VersionInfo::new("Inventory", 3),
            VersionInfo::new("Quests", 1).with_id(VersionTagId::derive("quests-v2")),
        ]))
    }

    #[test]
    fn lookup_resolves_configured_tags() {
        let registry = registry();
        assert_eq!(
            registry.version_id("Inventory"),
            Some(VersionTagId::derive("Inventory"))
        );
        assert_eq!(
            registry.version_id("Quests"),
            Some(VersionTagId::derive("quests-v2"))
        );
        assert_eq!(registry.latest_version("Inventory"), Some(3));
        assert_eq!(registry.lookup("Missing"), None);
    }

    #[test]
    fn configure_invalidates_cache() {
        let registry = registry();
        registry.lookup("Inventory");
        assert!(registry.is_cached());

        registry.configure(vec![VersionInfo::new("Inventory", 5)]);
        assert!(!registry.is_cached());
        assert_eq!(registry.latest_version("Inventory"), Some(5));
        assert_eq!(registry.lookup("Quests"), None);
    }

    #[test]
    fn first_duplicate_wins() {
        let registry = VersionRegistry::new(vec![
            VersionInfo::new("Inventory", 1),
            VersionInfo::new("Inventory", 9),
        ]);
        assert_eq!(registry.latest_version("Inventory"), Some(1));
    }

    #[test]
    fn saving_records_latest_version() {
        let mut ar =
            StructuredArchive::binary_writer(Arc::new(NullResolver)).with_registry(registry());
        assert_eq!(ar.custom_version("Inventory"), 3);
        assert_eq!(
            ar.versions().get(&VersionTagId::derive("Inventory")),
            Some(3)
        );
        assert_eq!(ar.custom_version("Unknown"), NO_VERSION);
        assert_eq!(ar.versions().len(), 1);
    }

    #[test]
    fn loading_reports_stored_or_absent() {
        let mut versions = CustomVersionContainer::new();
        versions.set(VersionTagId::derive("Inventory"), 2);

        let mut ar = StructuredArchive::binary_reader(Vec::new(), Arc::new(NullResolver))
            .with_registry(registry());
        ar.set_versions(versions);
        assert_eq!(ar.custom_version("Inventory"), 2);
        assert_eq!(ar.custom_version("Quests"), NO_VERSION);
    }

    #[test]
    fn table_layout() {
        let mut versions = CustomVersionContainer::new();
        versions.set(SAVEGAME_VERSION_ID, SaveGameVersion::LATEST);

        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        ar.slot().value(&mut versions.clone()).unwrap();
        let bytes = ar.finish().unwrap();
        assert_eq!(bytes.len(), 4 + 16 + 4);
        assert_eq!(&bytes[4..20], SAVEGAME_VERSION_ID.as_bytes());

        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut back = CustomVersionContainer::new();
        ar.slot().value(&mut back).unwrap();
        assert_eq!(back, versions);
    }
}
