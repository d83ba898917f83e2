//! The catalog: namespaces, loaded units and the flat entry map.
//!
//! Every lookup first refreshes the catalog. Refreshing is throttled by
//! `update_interval_ms`; within the interval lookups are served from the
//! current maps without touching the filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tessera_config::SettingsStore;
use tracing::{debug, info};

use crate::entry::{Entry, EntryId};
use crate::error::{LookupError, RegistryResult, Warning};
use crate::library::Library;
use crate::loader::{self, LoadContext, UnitId, Units};
use crate::namespace::{Namespace, NamespaceMeta, NamespaceTable};
use crate::query::Query;

/// Where the catalog stands in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Never refreshed, or the throttle interval has elapsed.
    Stale,
    /// A scan is in progress.
    Refreshing,
    /// Scanned within the throttle interval.
    Fresh,
}

/// Registry of every entry found across all namespaces.
#[derive(Debug)]
pub struct Catalog {
    store: SettingsStore,
    library: Library,
    current_dir: Option<PathBuf>,
    namespaces: NamespaceTable,
    units: Units,
    entries: BTreeMap<EntryId, Entry>,
    state: RefreshState,
    last_refresh: Option<Instant>,
    warnings: Vec<Warning>,
}

impl Catalog {
    /// A catalog over `store` resolving units against `library`, with the
    /// process working directory as the `main` namespace.
    #[must_use]
    pub fn new(store: SettingsStore, library: Library) -> Self {
        Self::builder(library).settings(store).build()
    }

    /// A catalog over the settings file at its default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded.
    pub fn open_default(library: Library) -> RegistryResult<Self> {
        Ok(Self::new(SettingsStore::open_default()?, library))
    }

    /// Start configuring a catalog.
    #[must_use]
    pub fn builder(library: Library) -> CatalogBuilder {
        CatalogBuilder {
            library,
            store: SettingsStore::default(),
            current_dir: std::env::current_dir().ok(),
        }
    }

    /// Current refresh state.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        match (self.state, self.last_refresh) {
            (RefreshState::Fresh, Some(at)) => {
                let interval = self.store.get().update_interval();
                if interval.is_zero() || at.elapsed() > interval {
                    RefreshState::Stale
                } else {
                    RefreshState::Fresh
                }
            },
            (RefreshState::Refreshing, _) => RefreshState::Refreshing,
            _ => RefreshState::Stale,
        }
    }

    /// Rescan if the throttle interval has elapsed. Returns whether a scan
    /// ran.
    pub fn refresh(&mut self) -> bool {
        if self.state() == RefreshState::Fresh {
            return false;
        }
        self.force_refresh();
        true
    }

    /// Rescan regardless of the throttle.
    ///
    /// Re-derives the namespace table from the settings, then loads every
    /// namespace's module path. Units whose file disappeared, or whose
    /// directory is no longer bound under the same name, are retired.
    pub fn force_refresh(&mut self) {
        self.state = RefreshState::Refreshing;
        let settings = self.store.get();
        let mut warnings = Vec::new();

        self.namespaces = NamespaceTable::derive(
            &settings.search_paths,
            self.current_dir.as_deref(),
            &settings.namespace_config_filename,
            &mut warnings,
        );

        let mut ctx = LoadContext {
            library: &self.library,
            unit_extension: &settings.unit_extension,
            metadata_filename: &settings.namespace_config_filename,
            install_tip_threshold: settings.install_tip_threshold,
            default_installer: &settings.default_installer,
            warnings: &mut warnings,
        };
        let mut present = BTreeSet::new();
        for namespace in self.namespaces.iter() {
            let files = loader::load_directory(
                &namespace.module_path,
                namespace,
                &mut self.units,
                &mut self.entries,
                &mut ctx,
            );
            present.extend(
                files
                    .iter()
                    .map(|file| UnitId::for_file(&namespace.name, file)),
            );
        }
        self.units.retire_absent(&present, &mut self.entries);

        for warning in &warnings {
            warning.log();
        }
        self.warnings.extend(warnings);
        self.last_refresh = Some(Instant::now());
        self.state = RefreshState::Fresh;
        info!(
            namespaces = self.namespaces.len(),
            units = self.units.len(),
            entries = self.entries.len(),
            "refreshed catalog"
        );
    }

    /// Look up an entry by short name.
    ///
    /// Several matches yield the first in id order plus a
    /// [`Warning::Ambiguity`].
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if no entry has that name.
    pub fn get(&mut self, short_name: &str) -> RegistryResult<Entry> {
        self.refresh();
        let matches: Vec<EntryId> = self
            .entries
            .keys()
            .filter(|id| id.name() == short_name)
            .cloned()
            .collect();
        Ok(self.pick(short_name, &matches)?)
    }

    /// Look up an entry by query key: `$<id>`, `r/<regex>` or a glob.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if nothing matches, or
    /// [`LookupError::InvalidPattern`] if the key does not compile.
    pub fn query(&mut self, key: &str) -> RegistryResult<Entry> {
        let query = Query::parse(key)?;
        self.refresh();
        let matches: Vec<EntryId> = self
            .entries
            .keys()
            .filter(|id| query.matches(id))
            .cloned()
            .collect();
        Ok(self.pick(key, &matches)?)
    }

    fn pick(&mut self, key: &str, matches: &[EntryId]) -> Result<Entry, LookupError> {
        let Some(first) = matches.first() else {
            return Err(LookupError::NotFound {
                query: key.to_owned(),
            });
        };
        if matches.len() > 1 {
            let rendered = matches
                .iter()
                .filter_map(|id| self.entries.get(id).map(|e| format!("{id} {}", e.signature())))
                .collect();
            let warning = Warning::Ambiguity {
                query: key.to_owned(),
                chosen: first.clone(),
                matches: rendered,
            };
            warning.log();
            self.warnings.push(warning);
        }
        self.entries
            .get(first)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                query: key.to_owned(),
            })
    }

    /// Refresh, then iterate every registered entry in id order.
    pub fn iter(&mut self) -> impl Iterator<Item = (&EntryId, &Entry)> {
        self.refresh();
        self.entries.iter()
    }

    /// Refresh, then count the registered entries.
    pub fn len(&mut self) -> usize {
        self.refresh();
        self.entries.len()
    }

    /// Refresh, then check whether no entry is registered.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Refresh, then list every id.
    pub fn ids(&mut self) -> Vec<EntryId> {
        self.refresh();
        self.entries.keys().cloned().collect()
    }

    /// Refresh, then list every short name, for completion.
    pub fn names(&mut self) -> Vec<String> {
        self.refresh();
        self.entries.keys().map(|id| id.name().to_owned()).collect()
    }

    /// Refresh, then open a view on one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownNamespace`] if no such namespace
    /// exists.
    pub fn namespace(&mut self, name: &str) -> RegistryResult<NamespaceView<'_>> {
        self.refresh();
        let namespace = self
            .namespaces
            .get(name)
            .ok_or_else(|| LookupError::UnknownNamespace {
                namespace: name.to_owned(),
            })?;
        Ok(NamespaceView {
            namespace,
            entries: &self.entries,
        })
    }

    /// Refresh, then return the namespace table.
    pub fn namespaces(&mut self) -> &NamespaceTable {
        self.refresh();
        &self.namespaces
    }

    /// Loaded source units, as of the last refresh.
    #[must_use]
    pub fn units(&self) -> &Units {
        &self.units
    }

    /// The host library.
    #[must_use]
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// The settings store.
    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        &self.store
    }

    /// Mutable access to the settings store. The next lookup rescans.
    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        self.state = RefreshState::Stale;
        &mut self.store
    }

    /// Take every warning recorded since the last call.
    pub fn drain_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entries.len() {
            0 => f.write_str("No entry found."),
            1 => f.write_str("Found 1 entry."),
            n => write!(f, "{n} entries are available."),
        }
    }
}

/// Configures a [`Catalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    library: Library,
    store: SettingsStore,
    current_dir: Option<PathBuf>,
}

impl CatalogBuilder {
    /// Use `store` for settings. Defaults to an in-memory store.
    #[must_use]
    pub fn settings(mut self, store: SettingsStore) -> Self {
        self.store = store;
        self
    }

    /// Bind the `main` namespace to `dir` instead of the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Do not add a `main` namespace.
    #[must_use]
    pub fn without_current_dir(mut self) -> Self {
        self.current_dir = None;
        self
    }

    /// Finish. Nothing is scanned until the first lookup.
    #[must_use]
    pub fn build(self) -> Catalog {
        debug!(current_dir = ?self.current_dir, "created catalog");
        Catalog {
            store: self.store,
            library: self.library,
            current_dir: self.current_dir,
            namespaces: NamespaceTable::default(),
            units: Units::default(),
            entries: BTreeMap::new(),
            state: RefreshState::Stale,
            last_refresh: None,
            warnings: Vec::new(),
        }
    }
}

/// Read-only view on one namespace and its entries.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceView<'a> {
    namespace: &'a Namespace,
    entries: &'a BTreeMap<EntryId, Entry>,
}

impl<'a> NamespaceView<'a> {
    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.namespace.name
    }

    /// Directory scanned for units.
    #[must_use]
    pub fn module_path(&self) -> &'a Path {
        &self.namespace.module_path
    }

    /// Parsed metadata file.
    #[must_use]
    pub fn metadata(&self) -> &'a NamespaceMeta {
        &self.namespace.meta
    }

    /// A clone of the entry `short_name` of this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if the namespace has no such entry.
    pub fn get(&self, short_name: &str) -> Result<Entry, LookupError> {
        let id = EntryId::new(self.namespace.name.clone(), short_name);
        self.entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                query: id.to_string(),
            })
    }

    /// Entries of this namespace in id order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a EntryId, &'a Entry)> + use<'a> {
        let name = self.namespace.name.as_str();
        self.entries
            .range(EntryId::new(name, "")..)
            .take_while(move |(id, _)| id.namespace() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_catalog_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::builder(Library::new())
            .current_dir(tmp.path())
            .build();
        assert_eq!(catalog.state(), RefreshState::Stale);
        assert!(catalog.is_empty());
        assert_eq!(catalog.to_string(), "No entry found.");
        assert!(matches!(
            catalog.get("anything"),
            Err(crate::RegistryError::Lookup(LookupError::NotFound { .. }))
        ));
        assert!(catalog.namespace("main").is_ok());
        assert!(catalog.namespace("nope").is_err());
    }
}
