//! Settings struct definition.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Registry settings.
///
/// Every field has a default, so a settings file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Namespace name → namespace root directory.
    pub search_paths: BTreeMap<String, PathBuf>,
    /// Minimum time between two catalog refresh scans, in milliseconds.
    pub update_interval_ms: u64,
    /// Similarity score (0..=1) above which a failed import suggests
    /// installing a declared requirement.
    pub install_tip_threshold: f64,
    /// Name of the metadata file at the root of each namespace.
    pub namespace_config_filename: String,
    /// Extension (without the dot) of source unit files.
    pub unit_extension: String,
    /// Install declared requirements after fetching a namespace.
    pub auto_install_requirements: bool,
    /// Installer tool used for requirements given as plain strings.
    pub default_installer: String,
}

impl Settings {
    /// The refresh throttle as a [`Duration`].
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_paths: BTreeMap::new(),
            update_interval_ms: 1000,
            install_tip_threshold: 0.75,
            namespace_config_filename: "namespace.yml".to_owned(),
            unit_extension: "toml".to_owned(),
            auto_install_requirements: false,
            default_installer: "pip".to_owned(),
        }
    }
}
