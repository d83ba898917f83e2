#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Persisted settings for the Tessera component registry.
//!
//! The registry consumes settings as a small key-value object: the
//! namespace bindings (`search_paths`) plus a handful of tunables. The
//! catalog reads the bindings on every refresh; the installer replaces the
//! whole mapping and saves it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tessera_config::SettingsStore;
//!
//! let mut store = SettingsStore::open_default().unwrap();
//! let mut paths = store.search_paths().clone();
//! paths.insert("vision".into(), "/srv/vision".into());
//! store.set_search_paths(paths);
//! store.save().unwrap();
//! ```
//!
//! # Locations
//!
//! The settings file lives at `$TESSERA_HOME/settings.toml`, falling back
//! to `~/.tessera/settings.toml`. Keys missing from the file take the values
//! of the embedded `defaults.toml`.

/// Configuration error types.
pub mod error;
/// Settings file discovery and loading.
pub mod loader;
/// Read / replace / save access to the persisted settings.
pub mod store;
/// Settings struct definition.
pub mod types;
/// Settings validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use store::SettingsStore;
pub use types::Settings;
