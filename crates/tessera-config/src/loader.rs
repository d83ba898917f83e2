//! Settings file discovery and loading.
//!
//! 1. Parse the embedded `defaults.toml` → base table
//! 2. Overlay the top-level keys of the settings file, if it exists
//! 3. Deserialize the merged table → [`Settings`]
//! 4. Validate

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Settings;
use crate::validate;

/// Embedded default settings.
pub(crate) const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Environment variable overriding the settings directory.
pub const HOME_ENV_VAR: &str = "TESSERA_HOME";

/// File name of the settings file inside the settings directory.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Upper bound on the settings file size, to avoid reading garbage.
const MAX_SETTINGS_FILE_SIZE: u64 = 1024 * 1024;

/// Resolve the default settings file path.
///
/// `$TESSERA_HOME/settings.toml` when the variable is set and non-empty,
/// `~/.tessera/settings.toml` otherwise.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if neither location can be resolved.
pub fn default_settings_path() -> ConfigResult<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home).join(SETTINGS_FILE_NAME));
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".tessera").join(SETTINGS_FILE_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Load settings from `path`, falling back to the defaults for missing
/// keys, or entirely when the file does not exist.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file exists but cannot be read or
/// parsed, or if the merged settings fail validation.
pub fn load(path: &Path) -> ConfigResult<Settings> {
    let mut merged: toml::Table =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    if let Some(overlay) = try_load_file(path)? {
        debug!(path = %path.display(), "loaded settings file");
        for (key, value) in overlay {
            merged.insert(key, value);
        }
    }

    let settings: Settings =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                source: e,
            })?;

    validate::validate(&settings)?;
    Ok(settings)
}

/// Read and parse a settings file, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Table>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_SETTINGS_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "settings file is {} bytes, exceeding the {MAX_SETTINGS_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let table: toml::Table = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(table))
}
