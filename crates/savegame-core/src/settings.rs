use std::collections::HashMap;
use std::path::Path;

use savegame_archive::envelope::DEFAULT_COMPRESSION_LEVEL;
use savegame_archive::{FieldRedirects, VersionInfo};
use serde::{Deserialize, Serialize};

use crate::error::{SaveGameError, SaveGameResult};

/// Rename of a persisted field for a type and its subtypes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRedirect {
    pub type_name: String,
    pub old_name: String,
    pub new_name: String,
}

/// Save system settings, usually read from TOML:
///
/// ```toml
/// write_text_snapshot = true
/// compression_level = 9
///
/// [[versions]]
/// tag = "Inventory"
/// latest = 2
///
/// [[field_redirects]]
/// type_name = "Door"
/// old_name = "Hp"
/// new_name = "Health"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveGameSettings {
    /// Also write an uncompressed JSON snapshot next to the binary one.
    pub write_text_snapshot: bool,
    /// zlib level, 0 to 9.
    pub compression_level: u32,
    /// Fail a load when an object entry cannot be resolved instead of
    /// skipping it.
    pub strict_object_resolution: bool,
    pub versions: Vec<VersionInfo>,
    pub field_redirects: Vec<FieldRedirect>,
}

impl Default for SaveGameSettings {
    fn default() -> Self {
        Self {
            write_text_snapshot: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            strict_object_resolution: false,
            versions: Vec::new(),
            field_redirects: Vec::new(),
        }
    }
}

impl SaveGameSettings {
    /// Parse and validate TOML settings.
    pub fn from_toml_str(s: &str) -> SaveGameResult<Self> {
        let settings: Self =
            toml::from_str(s).map_err(|e| SaveGameError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> SaveGameResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SaveGameError::Settings(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SaveGameResult<()> {
        if self.compression_level > 9 {
            return Err(SaveGameError::Settings(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }

        let mut ids = HashMap::new();
        for info in &self.versions {
            if info.tag.is_empty() {
                return Err(SaveGameError::Settings("version tag must not be empty".into()));
            }
            let id = info.resolved_id();
            if let Some(previous) = ids.insert(info.tag.as_str(), id) {
                if previous != id {
                    return Err(SaveGameError::Settings(format!(
                        "version tag '{}' is configured with two different ids",
                        info.tag
                    )));
                }
            }
        }

        for redirect in &self.field_redirects {
            if redirect.type_name.is_empty()
                || redirect.old_name.is_empty()
                || redirect.new_name.is_empty()
            {
                return Err(SaveGameError::Settings(
                    "field redirects need a type name, an old name and a new name".into(),
                ));
            }
            if redirect.old_name == redirect.new_name {
                return Err(SaveGameError::Settings(format!(
                    "field redirect for '{}.{}' does not rename anything",
                    redirect.type_name, redirect.old_name
                )));
            }
        }
        Ok(())
    }

    /// The rename table built from `field_redirects`.
    pub fn field_redirect_table(&self) -> FieldRedirects {
        let mut table = FieldRedirects::new();
        for r in &self.field_redirects {
            table.add(&r.type_name, &r.old_name, &r.new_name);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use savegame_types::VersionTagId;

    use super::*;

    #[test]
    fn default_settings() {
        let s = SaveGameSettings::default();
        assert!(!s.write_text_snapshot);
        assert_eq!(s.compression_level, 6);
        assert!(!s.strict_object_resolution);
        assert!(s.versions.is_empty());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn parse_full_settings() {
        let s = SaveGameSettings::from_toml_str(
            r#"
            write_text_snapshot = true
            compression_level = 9

            [[versions]]
            tag = "Inventory"
            latest = 2

            [[versions]]
            tag = "Quests"
            id = "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b"
            latest = 1

            [[field_redirects]]
            type_name = "Door"
            old_name = "Hp"
            new_name = "Health"
            "#,
        )
        .unwrap();

        assert!(s.write_text_snapshot);
        assert_eq!(s.compression_level, 9);
        assert_eq!(s.versions.len(), 2);
        assert_eq!(s.versions[0].resolved_id(), VersionTagId::derive("Inventory"));
        assert_eq!(
            s.versions[1].id,
            Some(VersionTagId::parse("6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b").unwrap())
        );
        assert_eq!(
            s.field_redirect_table().redirect(&["Door"], "Hp"),
            Some("Health")
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        assert_eq!(
            SaveGameSettings::from_toml_str("").unwrap(),
            SaveGameSettings::default()
        );
    }

    #[test]
    fn rejects_bad_compression_level() {
        let err = SaveGameSettings::from_toml_str("compression_level = 12").unwrap_err();
        assert!(matches!(err, SaveGameError::Settings(_)));
    }

    #[test]
    fn rejects_conflicting_version_ids() {
        let err = SaveGameSettings::from_toml_str(
            r#"
            [[versions]]
            tag = "Inventory"
            latest = 1

            [[versions]]
            tag = "Inventory"
            id = "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b"
            latest = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SaveGameError::Settings(_)));
    }

    #[test]
    fn rejects_identity_rename() {
        let mut s = SaveGameSettings::default();
        s.field_redirects.push(FieldRedirect {
            type_name: "Door".into(),
            old_name: "Hp".into(),
            new_name: "Hp".into(),
        });
        assert!(s.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("savegame.toml");
        std::fs::write(&path, "strict_object_resolution = true\n").unwrap();
        assert!(SaveGameSettings::load(&path).unwrap().strict_object_resolution);
        assert!(SaveGameSettings::load(&dir.path().join("missing.toml")).is_err());
    }
}
