//! Scratch directories laid out as namespaces.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tessera_config::{Settings, SettingsStore};
use tessera_registry::{Catalog, Library};

/// A temporary directory holding namespace roots and an empty working
/// directory for the `main` namespace.
///
/// Unit files get strictly increasing modification times, so every
/// [`write_unit`](Self::write_unit) is seen as a change regardless of the
/// filesystem's timestamp resolution.
#[derive(Debug)]
pub struct TestWorkspace {
    dir: TempDir,
    bindings: BTreeMap<String, PathBuf>,
    clock: SystemTime,
}

impl TestWorkspace {
    /// Create an empty workspace.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("cwd")).expect("create cwd");
        Self {
            dir,
            bindings: BTreeMap::new(),
            clock: SystemTime::UNIX_EPOCH
                .checked_add(Duration::from_secs(1_700_000_000))
                .unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory bound to the `main` namespace by [`catalog`](Self::catalog).
    #[must_use]
    pub fn cwd(&self) -> PathBuf {
        self.dir.path().join("cwd")
    }

    /// Root of namespace `name`, created and bound on first use.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn namespace(&mut self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).expect("create namespace dir");
        self.bindings.insert(name.to_owned(), path.clone());
        path
    }

    /// Write `<namespace>/<stem>.toml` with a modification time later than
    /// any previous write.
    ///
    /// # Panics
    ///
    /// Panics on any filesystem error.
    pub fn write_unit(&mut self, namespace: &str, stem: &str, source: &str) -> PathBuf {
        let path = self.namespace(namespace).join(format!("{stem}.toml"));
        std::fs::write(&path, source).expect("write unit");
        self.touch(&path);
        path
    }

    /// Write an arbitrary file into a namespace root.
    ///
    /// # Panics
    ///
    /// Panics on any filesystem error.
    pub fn write_file(&mut self, namespace: &str, name: &str, content: &str) -> PathBuf {
        let path = self.namespace(namespace).join(name);
        std::fs::write(&path, content).expect("write file");
        path
    }

    /// Advance the modification time of `path`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be opened or its time set.
    pub fn touch(&mut self, path: &Path) {
        self.clock = self
            .clock
            .checked_add(Duration::from_secs(1))
            .unwrap_or(self.clock);
        set_mtime(path, self.clock);
    }

    /// Namespace bindings created so far.
    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, PathBuf> {
        &self.bindings
    }

    /// In-memory settings binding every namespace created so far, with
    /// refresh throttling disabled.
    #[must_use]
    pub fn settings(&self) -> SettingsStore {
        SettingsStore::in_memory(Settings {
            search_paths: self.bindings.clone(),
            update_interval_ms: 0,
            ..Settings::default()
        })
    }

    /// A catalog over [`settings`](Self::settings) with `main` bound to
    /// [`cwd`](Self::cwd).
    #[must_use]
    pub fn catalog(&self, library: Library) -> Catalog {
        Catalog::builder(library)
            .settings(self.settings())
            .current_dir(self.cwd())
            .build()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Set the modification time of `path`.
///
/// # Panics
///
/// Panics if the file cannot be opened or its time set.
pub fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(time))
        .expect("set mtime");
}
