use crate::error::{StorageError, StorageResult};

/// Named save slots holding opaque byte blobs.
///
/// Implementations must satisfy:
/// - `save` replaces the slot's previous contents as a whole.
/// - `load` returns `Ok(None)` for a slot that was never saved or was
///   deleted; `Err` is reserved for backend failures.
pub trait SaveStorage: Send + Sync {
    fn save(&self, slot: &str, data: &[u8]) -> StorageResult<()>;

    fn load(&self, slot: &str) -> StorageResult<Option<Vec<u8>>>;

    fn exists(&self, slot: &str) -> StorageResult<bool> {
        Ok(self.load(slot)?.is_some())
    }

    /// Delete a slot. Returns `true` if it existed.
    fn delete(&self, slot: &str) -> StorageResult<bool>;
}

/// Reject slot names that cannot be used as a plain file name.
pub fn validate_slot_name(slot: &str) -> StorageResult<()> {
    let invalid = slot.is_empty()
        || slot == "."
        || slot == ".."
        || slot.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidSlotName(slot.to_string()));
    }
    Ok(())
}
