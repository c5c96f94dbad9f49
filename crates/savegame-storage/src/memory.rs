use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StorageResult;
use crate::traits::{validate_slot_name, SaveStorage};

/// In-memory save slots, for tests and embedding.
pub struct InMemorySaveStorage {
    slots: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySaveStorage {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Number of slots currently stored.
    pub fn len(&self) -> usize {
        self.slots.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().expect("lock poisoned").is_empty()
    }

    /// Sorted slot names.
    pub fn slot_names(&self) -> Vec<String> {
        let slots = self.slots.read().expect("lock poisoned");
        let mut names: Vec<String> = slots.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemorySaveStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveStorage for InMemorySaveStorage {
    fn save(&self, slot: &str, data: &[u8]) -> StorageResult<()> {
        validate_slot_name(slot)?;
        self.slots
            .write()
            .expect("lock poisoned")
            .insert(slot.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, slot: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_slot_name(slot)?;
        Ok(self.slots.read().expect("lock poisoned").get(slot).cloned())
    }

    fn exists(&self, slot: &str) -> StorageResult<bool> {
        validate_slot_name(slot)?;
        Ok(self.slots.read().expect("lock poisoned").contains_key(slot))
    }

    fn delete(&self, slot: &str) -> StorageResult<bool> {
        validate_slot_name(slot)?;
        Ok(self
            .slots
            .write()
            .expect("lock poisoned")
            .remove(slot)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let storage = InMemorySaveStorage::new();
        assert!(storage.load("SaveGame").unwrap().is_none());

        storage.save("SaveGame", b"one").unwrap();
        storage.save("SaveGame", b"two").unwrap();
        assert_eq!(storage.load("SaveGame").unwrap().unwrap(), b"two");
        assert!(storage.exists("SaveGame").unwrap());
        assert_eq!(storage.len(), 1);

        assert!(storage.delete("SaveGame").unwrap());
        assert!(!storage.delete("SaveGame").unwrap());
        assert!(storage.is_empty());
    }

    #[test]
    fn slot_names_sorted() {
        let storage = InMemorySaveStorage::new();
        storage.save("b", b"").unwrap();
        storage.save("a", b"").unwrap();
        assert_eq!(storage.slot_names(), vec!["a", "b"]);
    }

    #[test]
    fn rejects_bad_slot() {
        let storage = InMemorySaveStorage::new();
        assert!(storage.save("../escape", b"x").is_err());
    }
}
