use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StorageResult;
use crate::traits::{validate_slot_name, SaveStorage};

/// Save slots as files in a directory.
///
/// Slot `name` is stored as `<root>/<name>.sav`. Writes go to a temporary
/// file in the same directory that is then renamed over the slot file, so a
/// crash never leaves a half-written slot behind.
pub struct FileSaveStorage {
    root: PathBuf,
}

impl FileSaveStorage {
    /// Open (or create) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of a slot.
    pub fn slot_path(&self, slot: &str) -> StorageResult<PathBuf> {
        validate_slot_name(slot)?;
        Ok(self.root.join(format!("{slot}.sav")))
    }
}

impl SaveStorage for FileSaveStorage {
    fn save(&self, slot: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.slot_path(slot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(slot, path = %path.display(), bytes = data.len(), "slot written");
        Ok(())
    }

    fn load(&self, slot: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.slot_path(slot)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, slot: &str) -> StorageResult<bool> {
        Ok(self.slot_path(slot)?.is_file())
    }

    fn delete(&self, slot: &str) -> StorageResult<bool> {
        let path = self.slot_path(slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSaveStorage::open(dir.path().join("saves")).unwrap();

        assert!(storage.load("SaveGame").unwrap().is_none());
        storage.save("SaveGame", b"snapshot").unwrap();
        assert!(dir.path().join("saves/SaveGame.sav").is_file());
        assert_eq!(storage.load("SaveGame").unwrap().unwrap(), b"snapshot");
        assert!(storage.exists("SaveGame").unwrap());
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSaveStorage::open(dir.path()).unwrap();
        storage.save("SaveGame", b"a much longer first snapshot").unwrap();
        storage.save("SaveGame", b"short").unwrap();
        assert_eq!(storage.load("SaveGame").unwrap().unwrap(), b"short");
    }

    #[test]
    fn delete_missing_slot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSaveStorage::open(dir.path()).unwrap();
        assert!(!storage.delete("SaveGame").unwrap());
        storage.save("SaveGame", b"x").unwrap();
        assert!(storage.delete("SaveGame").unwrap());
        assert!(!storage.exists("SaveGame").unwrap());
    }

    #[test]
    fn slot_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSaveStorage::open(dir.path()).unwrap();
        assert!(storage.slot_path("../../etc/passwd").is_err());
    }
}
