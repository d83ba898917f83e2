//! Read / replace / save access to the persisted settings.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader;
use crate::types::Settings;
use crate::validate;

/// The settings object consumed by the catalog and the installer.
///
/// A store is either backed by a file (`open`, `open_default`) or purely
/// in memory (`in_memory`), in which case [`save`](Self::save) is a no-op.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    settings: Settings,
}

impl SettingsStore {
    /// Open the store backed by `path`, loading it if it exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file exists but is invalid.
    pub fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let settings = loader::load(&path)?;
        Ok(Self {
            path: Some(path),
            settings,
        })
    }

    /// Open the store at the default location (see
    /// [`loader::default_settings_path`]).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the location cannot be resolved or the
    /// file is invalid.
    pub fn open_default() -> ConfigResult<Self> {
        Self::open(loader::default_settings_path()?)
    }

    /// A store that lives only in memory.
    #[must_use]
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings,
        }
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current settings.
    #[must_use]
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Replace all settings after validating them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] and leaves the store
    /// unchanged if `settings` is invalid.
    pub fn set(&mut self, settings: Settings) -> ConfigResult<()> {
        validate::validate(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Current namespace bindings.
    #[must_use]
    pub fn search_paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.settings.search_paths
    }

    /// Replace the whole namespace binding map.
    pub fn set_search_paths(&mut self, search_paths: BTreeMap<String, PathBuf>) {
        self.settings.search_paths = search_paths;
    }

    /// Persist the settings to the backing file.
    ///
    /// The file is written to a sibling temporary file first and then
    /// renamed over the target.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if serialization or any filesystem step
    /// fails.
    pub fn save(&self) -> ConfigResult<()> {
        let Some(path) = &self.path else {
            debug!("in-memory settings store, nothing to save");
            return Ok(());
        };

        let content = toml::to_string_pretty(&self.settings)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let write_err = |source: std::io::Error| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!(path = %path.display(), "saved settings");
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_save_is_noop() {
        let mut store = SettingsStore::default();
        store.set_search_paths(BTreeMap::from([("a".to_owned(), PathBuf::from("/a"))]));
        store.save().unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.search_paths().len(), 1);
    }

    #[test]
    fn save_then_reopen_round_trips_bindings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("settings.toml");

        let mut store = SettingsStore::open(&path).unwrap();
        let mut paths = store.search_paths().clone();
        paths.insert("vision".to_owned(), PathBuf::from("/srv/vision"));
        store.set_search_paths(paths);
        store.save().unwrap();

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.search_paths().get("vision"),
            Some(&PathBuf::from("/srv/vision"))
        );
    }

    #[test]
    fn repeated_saves_replace_the_file_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.toml");

        let mut store = SettingsStore::open(&path).unwrap();
        store.save().unwrap();
        let mut paths = store.search_paths().clone();
        paths.insert("audio".to_owned(), PathBuf::from("/srv/audio"));
        store.set_search_paths(paths);
        store.save().unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("settings.toml")]);
        let reopened = SettingsStore::open(&path).unwrap();
        assert!(reopened.search_paths().contains_key("audio"));
    }

    #[test]
    fn set_rejects_invalid_settings() {
        let mut store = SettingsStore::default();
        let bad = Settings {
            unit_extension: String::new(),
            ..Settings::default()
        };
        assert!(store.set(bad).is_err());
        assert_eq!(store.get().unit_extension, "toml");
    }
}
