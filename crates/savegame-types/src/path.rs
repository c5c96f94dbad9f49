use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Sub-path prefix of objects placed in a map's persistent level.
pub const LEVEL_SUBPATH_PREFIX: &str = "PersistentLevel.";

/// Portable reference to an object.
///
/// The textual form is `asset` or `asset:sub_path`, for example
/// `/Game/Maps/Arena.Arena:PersistentLevel.Door_12`. The empty path is the
/// null reference.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath {
    asset: String,
    sub_path: String,
}

impl ObjectPath {
    /// Create a path from an asset path and a sub-object path.
    pub fn new(asset: impl Into<String>, sub_path: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            sub_path: sub_path.into(),
        }
    }

    /// Path to a top-level asset (no sub-object).
    pub fn asset(asset: impl Into<String>) -> Self {
        Self::new(asset, "")
    }

    /// Path of an object named `name` placed in the persistent level of
    /// `level_asset`.
    pub fn level_object(level_asset: impl Into<String>, name: &str) -> Self {
        Self::new(level_asset, format!("{LEVEL_SUBPATH_PREFIX}{name}"))
    }

    /// The null path.
    pub fn null() -> Self {
        Self::default()
    }

    /// Returns `true` for the null path.
    pub fn is_null(&self) -> bool {
        self.asset.is_empty() && self.sub_path.is_empty()
    }

    /// The asset part (before `:`).
    pub fn asset_path(&self) -> &str {
        &self.asset
    }

    /// The sub-object part (after `:`), empty for top-level assets.
    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    /// The object's name inside its level: the sub-path with the
    /// `PersistentLevel.` container prefix removed.
    pub fn level_object_name(&self) -> &str {
        self.sub_path
            .strip_prefix(LEVEL_SUBPATH_PREFIX)
            .unwrap_or(&self.sub_path)
    }

    /// Parse the textual form. The empty string parses to the null path.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::null());
        }
        let (asset, sub_path) = match s.split_once(':') {
            Some((asset, sub)) => (asset, sub),
            None => (s, ""),
        };
        if asset.is_empty() {
            return Err(TypeError::InvalidPath {
                path: s.to_string(),
                reason: "missing asset path".into(),
            });
        }
        if sub_path.contains(':') {
            return Err(TypeError::InvalidPath {
                path: s.to_string(),
                reason: "more than one ':' separator".into(),
            });
        }
        Ok(Self::new(asset, sub_path))
    }
}

impl fmt::Debug for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPath({self})")
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub_path.is_empty() {
            write!(f, "{}", self.asset)
        } else {
            write!(f, "{}:{}", self.asset, self.sub_path)
        }
    }
}

impl FromStr for ObjectPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Path of a spawnable class, e.g. `/Script/Game.Door`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassPath(String);

impl ClassPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no class is named.
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    /// The class name without its package, e.g. `Door` for `/Script/Game.Door`.
    pub fn short_name(&self) -> &str {
        self.0.rsplit(['.', '/']).next().unwrap_or(&self.0)
    }
}

impl fmt::Debug for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassPath({})", self.0)
    }
}

impl fmt::Display for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_object() {
        let path = ObjectPath::parse("/Game/Maps/Arena.Arena:PersistentLevel.Door_12").unwrap();
        assert_eq!(path.asset_path(), "/Game/Maps/Arena.Arena");
        assert_eq!(path.sub_path(), "PersistentLevel.Door_12");
        assert_eq!(path.level_object_name(), "Door_12");
    }

    #[test]
    fn parse_asset_only() {
        let path = ObjectPath::parse("/Game/Items/Sword.Sword").unwrap();
        assert_eq!(path.sub_path(), "");
        assert_eq!(path.to_string(), "/Game/Items/Sword.Sword");
    }

    #[test]
    fn empty_string_is_null() {
        let path = ObjectPath::parse("").unwrap();
        assert!(path.is_null());
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn missing_asset_is_rejected() {
        let err = ObjectPath::parse(":PersistentLevel.Door").unwrap_err();
        assert!(matches!(err, TypeError::InvalidPath { .. }));
    }

    #[test]
    fn double_separator_is_rejected() {
        assert!(ObjectPath::parse("/Game/A.A:B:C").is_err());
    }

    #[test]
    fn level_object_builds_prefixed_sub_path() {
        let path = ObjectPath::level_object("/Game/Maps/Arena.Arena", "Hero_0");
        assert_eq!(path.to_string(), "/Game/Maps/Arena.Arena:PersistentLevel.Hero_0");
    }

    #[test]
    fn display_parse_roundtrip() {
        let path = ObjectPath::level_object("/Game/Maps/Arena.Arena", "Crate_3");
        assert_eq!(ObjectPath::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn serde_uses_textual_form() {
        let path = ObjectPath::level_object("/Game/Maps/Arena.Arena", "Crate_3");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/Game/Maps/Arena.Arena:PersistentLevel.Crate_3\"");
        let back: ObjectPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn class_short_name() {
        assert_eq!(ClassPath::new("/Script/Game.Door").short_name(), "Door");
        assert_eq!(ClassPath::new("Door").short_name(), "Door");
        assert!(ClassPath::default().is_null());
    }
}
