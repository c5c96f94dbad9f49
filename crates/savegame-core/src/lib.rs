//! World snapshot orchestration for SaveGame.
//!
//! This crate decides which objects are saved, how they are laid out, and
//! how a stored snapshot is brought back into a freshly loaded map.
//!
//! # Design Rules
//!
//! - Loading resolves every object before applying any data, so references
//!   between objects always find their target.
//! - One bad entry never desynchronizes the next.
//! - At most one load is pending at a time.
//!
//! # Modules
//!
//! - [`entry`]: per-object entries and the two-pass restore
//! - [`tombstone`]: level objects destroyed during play
//! - [`serializer`]: the snapshot layout
//! - [`subsystem`]: the save/load state machine hosts drive
//! - [`snapshot`]: offline inspection

pub mod entry;
pub mod error;
pub mod event;
pub mod serializer;
pub mod settings;
pub mod snapshot;
pub mod subsystem;
pub mod tombstone;

pub use entry::{EntryHeader, LoadReport, ResolvedEntry};
pub use error::{SaveGameError, SaveGameResult};
pub use event::{SaveGameEvent, SaveGameEventStream};
pub use serializer::{
    apply_snapshot, encode_snapshot, prepare_load, PreparedLoad, SnapshotContext, SnapshotHeader,
    SAVE_SLOT, TEXT_SAVE_SLOT,
};
pub use settings::{FieldRedirect, SaveGameSettings};
pub use snapshot::{EntrySummary, SnapshotSummary, VersionSummary};
pub use subsystem::SaveGameSubsystem;
