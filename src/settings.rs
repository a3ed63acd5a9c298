use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{RegistryError, Result};
use crate::registry::RegistryRecord;

/// Persisted application settings (`settings.toml`).
///
/// Only the subscribed registries live here, one `[[registry]]` table each.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct Settings {
    #[serde(default, rename = "registry")]
    pub registries: Vec<RegistryRecord>,
}

impl Settings {
    /// Loads settings from `path`. A missing file yields empty settings.
    ///
    /// # Errors
    /// Returns [`RegistryError::Settings`] if the file can't be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let settings_error = |reason: String| RegistryError::Settings {
            path: path.to_path_buf(),
            reason,
        };
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| settings_error(e.to_string()))?;
        toml::from_str(&content).map_err(|e| settings_error(e.to_string()))
    }

    /// Saves the settings to `path` in pretty TOML format, creating parent directories.
    ///
    /// # Errors
    /// Returns [`RegistryError::Settings`] if serialization or writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let settings_error = |reason: String| RegistryError::Settings {
            path: path.to_path_buf(),
            reason,
        };
        let content = toml::to_string_pretty(self).map_err(|e| settings_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| settings_error(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| settings_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(name: &str) -> RegistryRecord {
        RegistryRecord {
            name: name.to_string(),
            url: format!("https://example.com/{name}.git"),
            git_ref: None,
            subpath: Some("aws".to_string()),
            filename: "granted.yml".to_string(),
            priority: 3,
            prefix_all_profiles: false,
            prefix_duplicate_profiles: true,
            required_keys: Default::default(),
            values: BTreeMap::from([("Org".to_string(), "acme".to_string())]),
        }
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.toml")).unwrap();
        assert!(settings.registries.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            registries: vec![record("core"), record("team")],
        };
        settings.save(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[[registry]]"));
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_minimal_record_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[[registry]]\nname = \"core\"\nurl = \"https://x/core.git\"\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        let record = &settings.registries[0];
        assert_eq!(record.filename, "granted.yml");
        assert_eq!(record.priority, 0);
        assert!(!record.prefix_all_profiles);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "registry = 12 [").unwrap();
        assert!(matches!(Settings::load(&path), Err(RegistryError::Settings { .. })));
    }
}
