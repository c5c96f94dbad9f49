use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a live object owned by the host world.
///
/// Handles are only meaningful inside the world that issued them. They are
/// never written to a snapshot; references are persisted as [`ObjectPath`]s
/// instead.
///
/// [`ObjectPath`]: crate::ObjectPath
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Create a handle from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.0)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        assert_eq!(ObjectHandle::new(42).raw(), 42);
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(ObjectHandle::new(1) < ObjectHandle::new(2));
    }

    #[test]
    fn display_format() {
        assert_eq!(ObjectHandle::new(7).to_string(), "#7");
    }
}
