//! The save/load state machine.
//!
//! A load is split in two around map travel: [`SaveGameSubsystem::load`]
//! reads the snapshot and asks the world to travel to its map, and
//! [`SaveGameSubsystem::on_map_loaded`] applies it once the host reports
//! that travel finished. At most one load is pending at a time.

use std::collections::BTreeSet;
use std::sync::Arc;

use savegame_archive::{envelope, FieldRedirects, VersionRegistry};
use savegame_storage::SaveStorage;
use savegame_types::{ObjectHandle, ObjectPath};
use savegame_world::{World, WorldEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::entry::LoadReport;
use crate::error::{SaveGameError, SaveGameResult};
use crate::event::{SaveGameEvent, SaveGameEventStream};
use crate::serializer::{self, PreparedLoad, SnapshotContext, SAVE_SLOT, TEXT_SAVE_SLOT};
use crate::settings::SaveGameSettings;

const EVENT_CAPACITY: usize = 64;

pub struct SaveGameSubsystem<W: World + 'static> {
    world: Arc<W>,
    storage: Arc<dyn SaveStorage>,
    settings: SaveGameSettings,
    redirects: FieldRedirects,
    registry: Arc<VersionRegistry>,
    /// Objects that participate in the next save.
    tracked: BTreeSet<ObjectHandle>,
    /// Level objects destroyed since the level was opened.
    tombstones: BTreeSet<ObjectPath>,
    pending: Option<PreparedLoad>,
    events: broadcast::Sender<SaveGameEvent>,
}

impl<W: World + 'static> SaveGameSubsystem<W> {
    /// Create a subsystem using the process-wide version registry.
    pub fn new(
        world: Arc<W>,
        storage: Arc<dyn SaveStorage>,
        settings: SaveGameSettings,
    ) -> SaveGameResult<Self> {
        Self::with_registry(world, storage, settings, VersionRegistry::global())
    }

    /// Create a subsystem with its own version registry. Versions listed in
    /// `settings` replace the registry's configuration.
    pub fn with_registry(
        world: Arc<W>,
        storage: Arc<dyn SaveStorage>,
        settings: SaveGameSettings,
        registry: Arc<VersionRegistry>,
    ) -> SaveGameResult<Self> {
        settings.validate()?;
        if !settings.versions.is_empty() {
            registry.configure(settings.versions.clone());
        }
        let redirects = settings.field_redirect_table();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut subsystem = Self {
            world,
            storage,
            settings,
            redirects,
            registry,
            tracked: BTreeSet::new(),
            tombstones: BTreeSet::new(),
            pending: None,
            events,
        };
        subsystem.pump_world_events();
        subsystem
            .tracked
            .extend(subsystem.world.persistent_objects());
        Ok(subsystem)
    }

    pub fn world(&self) -> &Arc<W> {
        &self.world
    }

    pub fn settings(&self) -> &SaveGameSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> SaveGameEventStream {
        self.events.subscribe()
    }

    pub fn tracked_objects(&self) -> &BTreeSet<ObjectHandle> {
        &self.tracked
    }

    pub fn destroyed_level_objects(&self) -> &BTreeSet<ObjectPath> {
        &self.tombstones
    }

    /// Whether a load is waiting for its map.
    pub fn is_loading_snapshot(&self) -> bool {
        self.pending.is_some()
    }

    /// Apply every lifecycle event the world has queued. Returns the number
    /// handled.
    pub fn pump_world_events(&mut self) -> usize {
        let events = self.world.drain_events();
        let count = events.len();
        for event in events {
            self.handle_world_event(event);
        }
        count
    }

    pub fn handle_world_event(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::WorldCleanup => {
                debug!(
                    tracked = self.tracked.len(),
                    tombstones = self.tombstones.len(),
                    "world cleanup, forgetting tracked objects"
                );
                self.tracked.clear();
                self.tombstones.clear();
            }
            WorldEvent::ActorsInitialized => {
                self.tracked.extend(self.world.persistent_objects());
            }
            WorldEvent::ObjectSpawned(handle) => {
                self.tracked.insert(handle);
            }
            WorldEvent::ObjectDestroyed {
                handle,
                path,
                was_loaded,
            } => {
                self.tracked.remove(&handle);
                if was_loaded {
                    debug!(%path, "level object destroyed");
                    self.tombstones.insert(path);
                }
            }
        }
    }

    fn context(&self) -> SnapshotContext<'_> {
        SnapshotContext {
            world: self.world.as_ref(),
            resolver: self.world.clone(),
            registry: Arc::clone(&self.registry),
            redirects: &self.redirects,
        }
    }

    fn publish(&self, event: SaveGameEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Snapshot the world into storage.
    pub fn save(&mut self) -> SaveGameResult<()> {
        if self.pending.is_some() {
            warn!("save rejected while a load is pending");
            return Err(SaveGameError::LoadInProgress);
        }
        self.pump_world_events();

        let objects: Vec<ObjectHandle> = self
            .tracked
            .iter()
            .copied()
            .filter(|&handle| self.world.object(handle).is_some())
            .collect();

        let ctx = self.context();
        let raw = serializer::encode_snapshot(&ctx, &objects, &self.tombstones, false)?;
        let blob = envelope::compress(&raw, self.settings.compression_level)?;
        self.storage.save(SAVE_SLOT, &blob)?;

        if self.settings.write_text_snapshot {
            let text = serializer::encode_snapshot(&ctx, &objects, &self.tombstones, true)?;
            self.storage.save(TEXT_SAVE_SLOT, &text)?;
        }

        info!(
            map = %self.world.map_name(),
            objects = objects.len(),
            tombstones = self.tombstones.len(),
            uncompressed = raw.len(),
            bytes = blob.len(),
            "snapshot saved"
        );
        self.publish(SaveGameEvent::SaveCompleted {
            objects: objects.len(),
            bytes: blob.len(),
        });
        Ok(())
    }

    /// Read the stored snapshot and start travelling to its map.
    pub fn load(&mut self) -> SaveGameResult<()> {
        if self.pending.is_some() {
            warn!("load rejected while another load is pending");
            return Err(SaveGameError::LoadInProgress);
        }

        let blob = self
            .storage
            .load(SAVE_SLOT)?
            .ok_or_else(|| SaveGameError::SnapshotNotFound(SAVE_SLOT.to_string()))?;
        let prepared = serializer::prepare_load(envelope::decompress(&blob)?)?;

        let map = prepared.header.map.clone();
        if map.is_empty() {
            return Err(SaveGameError::EmptyMapName);
        }
        if self.world.is_travelling() {
            return Err(SaveGameError::TravelInProgress);
        }

        self.world.travel(&map)?;
        info!(%map, versions = prepared.versions.len(), "loading snapshot");
        self.pending = Some(prepared);
        self.publish(SaveGameEvent::LoadStarted { map });
        Ok(())
    }

    /// Apply the pending snapshot to the newly loaded map.
    ///
    /// The pending load is consumed whether or not it succeeds, except when
    /// travel has not finished yet.
    pub fn on_map_loaded(&mut self) -> SaveGameResult<LoadReport> {
        if self.pending.is_none() {
            return Err(SaveGameError::NoPendingLoad);
        }
        if self.world.is_travelling() {
            return Err(SaveGameError::TravelInProgress);
        }
        let Some(prepared) = self.pending.take() else {
            return Err(SaveGameError::NoPendingLoad);
        };

        let map = prepared.header.map.clone();
        match self.complete_load(prepared) {
            Ok(report) => {
                self.publish(SaveGameEvent::LoadCompleted {
                    map,
                    applied: report.applied.len(),
                    unresolved: report.unresolved.len(),
                });
                Ok(report)
            }
            Err(e) => {
                error!(%map, error = %e, "snapshot load failed");
                self.publish(SaveGameEvent::LoadFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn complete_load(&mut self, prepared: PreparedLoad) -> SaveGameResult<LoadReport> {
        let actual = self.world.map_name();
        if actual != prepared.header.map {
            return Err(SaveGameError::MapMismatch {
                expected: prepared.header.map,
                actual,
            });
        }

        self.pump_world_events();
        let strict = self.settings.strict_object_resolution;
        let (report, destroyed) = {
            let ctx = self.context();
            serializer::apply_snapshot(&ctx, prepared, &self.tracked, strict)?
        };

        // Objects spawned and destroyed during the restore.
        self.pump_world_events();
        self.tombstones.extend(destroyed);
        Ok(report)
    }
}
