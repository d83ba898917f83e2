//! Source unit loading with mtime-based hot reload.
//!
//! A unit is reloaded only when its file is newer than the revision last
//! seen. A reload replaces the unit's entries only if the new revision
//! evaluates cleanly; a failing revision leaves the previous entries in
//! place and is reported once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::entry::{Entry, EntryId};
use crate::error::{ImportFailure, Warning};
use crate::library::Library;
use crate::namespace::{Namespace, Requirement};
use crate::unit::{UnitError, UnitScope};

/// Identity of a source unit: namespace plus file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId {
    namespace: String,
    stem: String,
}

impl UnitId {
    /// Build an id.
    pub fn new(namespace: impl Into<String>, stem: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            stem: stem.into(),
        }
    }

    /// The id of the unit at `path` loaded under `namespace`.
    #[must_use]
    pub fn for_file(namespace: &str, path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(namespace, stem)
    }

    /// Namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// File stem component.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.stem)
    }
}

/// The last successfully loaded revision of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Unit id.
    pub id: UnitId,
    /// File the unit was loaded from.
    pub path: PathBuf,
    /// Modification time of that revision.
    pub modified: SystemTime,
    /// Ids of the entries it produced.
    pub entries: Vec<EntryId>,
}

/// Known units plus the revisions that failed to load.
#[derive(Debug, Clone, Default)]
pub struct Units {
    loaded: BTreeMap<UnitId, SourceUnit>,
    failed: BTreeMap<UnitId, SystemTime>,
}

impl Units {
    /// Loaded units in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.loaded.values()
    }

    /// Look up a loaded unit.
    #[must_use]
    pub fn get(&self, id: &UnitId) -> Option<&SourceUnit> {
        self.loaded.get(id)
    }

    /// Number of loaded units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    /// Whether no unit is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// The unit that produced `id`.
    #[must_use]
    pub fn owner_of(&self, id: &EntryId) -> Option<&UnitId> {
        self.loaded
            .values()
            .find(|u| u.entries.contains(id))
            .map(|u| &u.id)
    }

    /// Forget every unit whose id is not in `present`, removing its
    /// entries. Returns the retired ids.
    ///
    /// A unit drops out when its file disappears or when its directory is
    /// no longer bound under the same namespace name.
    pub fn retire_absent(
        &mut self,
        present: &BTreeSet<UnitId>,
        entries: &mut BTreeMap<EntryId, Entry>,
    ) -> Vec<UnitId> {
        let gone: Vec<UnitId> = self
            .loaded
            .keys()
            .filter(|id| !present.contains(*id))
            .cloned()
            .collect();
        for id in &gone {
            if let Some(unit) = self.loaded.remove(id) {
                for entry_id in &unit.entries {
                    entries.remove(entry_id);
                }
                info!(unit = %id, path = %unit.path.display(), "retired unit");
            }
        }
        self.failed.retain(|id, _| present.contains(id));
        gone
    }
}

/// Everything a load needs besides the unit and the tables it updates.
#[derive(Debug)]
pub struct LoadContext<'a> {
    /// Host callables units resolve against.
    pub library: &'a Library,
    /// File extension of source units, without the dot.
    pub unit_extension: &'a str,
    /// Namespace metadata file name, never treated as a unit.
    pub metadata_filename: &'a str,
    /// Similarity above which an install tip is offered.
    pub install_tip_threshold: f64,
    /// Installer tool for requirements that do not name one.
    pub default_installer: &'a str,
    /// Sink for non-fatal conditions.
    pub warnings: &'a mut Vec<Warning>,
}

/// Result of [`load_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was not newer than the last seen revision.
    Unchanged,
    /// The file was (re)loaded and produced this many entries.
    Loaded(usize),
    /// The file failed to load; an import failure was reported.
    Failed,
}

/// Load one source unit into `entries`.
///
/// Failures never propagate: they are pushed to `ctx.warnings` as
/// [`Warning::ImportFailure`] and the unit's previous entries stay.
pub fn load_file(
    path: &Path,
    namespace: &Namespace,
    units: &mut Units,
    entries: &mut BTreeMap<EntryId, Entry>,
    ctx: &mut LoadContext<'_>,
) -> LoadOutcome {
    let id = UnitId::for_file(&namespace.name, path);

    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(e) => {
            let failure = import_failure(&id, path, namespace, &UnitError::Io(e), ctx);
            ctx.warnings.push(Warning::ImportFailure(failure));
            return LoadOutcome::Failed;
        },
    };
    if units.loaded.get(&id).is_some_and(|u| u.modified >= modified)
        || units.failed.get(&id).is_some_and(|t| *t >= modified)
    {
        return LoadOutcome::Unchanged;
    }

    let evaluated = std::fs::read_to_string(path)
        .map_err(UnitError::from)
        .and_then(|source| UnitScope::evaluate(&source, ctx.library, namespace.meta.shared()));
    let scope = match evaluated {
        Ok(scope) => scope,
        Err(e) => {
            units.failed.insert(id.clone(), modified);
            let failure = import_failure(&id, path, namespace, &e, ctx);
            ctx.warnings.push(Warning::ImportFailure(failure));
            return LoadOutcome::Failed;
        },
    };
    units.failed.remove(&id);

    if let Some(previous) = units.loaded.get(&id) {
        for old in &previous.entries {
            entries.remove(old);
        }
    }

    let mut produced = Vec::new();
    for (name, mut entry) in scope.into_public() {
        let entry_id = EntryId::new(namespace.name.clone(), name);
        if entries.contains_key(&entry_id) {
            ctx.warnings.push(Warning::DuplicateRegistration {
                owner: units.owner_of(&entry_id).cloned(),
                id: entry_id,
                unit: id.clone(),
            });
            continue;
        }
        entry.set_id(entry_id.clone());
        entries.insert(entry_id.clone(), entry);
        produced.push(entry_id);
    }

    debug!(unit = %id, entries = produced.len(), "loaded unit");
    let count = produced.len();
    units.loaded.insert(
        id.clone(),
        SourceUnit {
            id,
            path: path.to_path_buf(),
            modified,
            entries: produced,
        },
    );
    LoadOutcome::Loaded(count)
}

/// Load every unit file directly under `dir`, in file name order.
///
/// Returns the paths of the unit files found, loaded or not.
pub fn load_directory(
    dir: &Path,
    namespace: &Namespace,
    units: &mut Units,
    entries: &mut BTreeMap<EntryId, Entry>,
    ctx: &mut LoadContext<'_>,
) -> Vec<PathBuf> {
    let files = match unit_files(dir, ctx.unit_extension, ctx.metadata_filename) {
        Ok(files) => files,
        Err(e) => {
            warn!(namespace = %namespace.name, path = %dir.display(), error = %e, "failed to scan namespace");
            return Vec::new();
        },
    };
    for file in &files {
        load_file(file, namespace, units, entries, ctx);
    }
    files
}

fn unit_files(dir: &Path, extension: &str, metadata_filename: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        let matches_ext = path.extension().is_some_and(|e| e == extension);
        let is_meta = path.file_name().is_some_and(|n| n == metadata_filename);
        if matches_ext && !is_meta && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn import_failure(
    id: &UnitId,
    path: &Path,
    namespace: &Namespace,
    error: &UnitError,
    ctx: &LoadContext<'_>,
) -> ImportFailure {
    let missing = error.unresolved_name().map(str::to_owned);
    let tip = missing.as_deref().and_then(|name| {
        install_tip(
            name,
            &namespace.meta.requirements,
            ctx.install_tip_threshold,
            ctx.default_installer,
        )
    });
    ImportFailure {
        unit: id.clone(),
        path: path.to_path_buf(),
        reason: error.to_string(),
        missing,
        tip,
    }
}

/// Suggest installing the declared requirement most similar to `missing`
/// if its similarity exceeds `threshold`.
#[must_use]
pub fn install_tip(
    missing: &str,
    requirements: &[Requirement],
    threshold: f64,
    default_installer: &str,
) -> Option<String> {
    let (score, best) = requirements
        .iter()
        .map(|r| (strsim::sorensen_dice(missing, r.target()), r))
        .max_by(|a, b| a.0.total_cmp(&b.0))?;
    (score > threshold).then(|| {
        format!(
            "Try `{} install {}` to install the missing dependency.",
            best.tool(default_installer),
            best.target()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_names_closest_requirement_and_tool() {
        let reqs = vec![
            Requirement::Plain("numpy".into()),
            Requirement::Tool {
                url: "torchvision".into(),
                tool: "conda".into(),
            },
        ];
        assert_eq!(
            install_tip("torchvision", &reqs, 0.75, "pip").as_deref(),
            Some("Try `conda install torchvision` to install the missing dependency.")
        );
        assert_eq!(
            install_tip("numpy", &reqs, 0.75, "pip").as_deref(),
            Some("Try `pip install numpy` to install the missing dependency.")
        );
        assert_eq!(install_tip("pandas", &reqs, 0.75, "pip"), None);
        assert_eq!(install_tip("numpy", &[], 0.75, "pip"), None);
    }

    #[test]
    fn unit_files_skip_metadata_and_other_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.toml", "a.toml", "namespace.toml", "notes.md"] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }
        std::fs::create_dir(tmp.path().join("dir.toml")).unwrap();

        let files = unit_files(tmp.path(), "toml", "namespace.toml").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);
    }

    #[test]
    fn unit_ids_render_dotted() {
        assert_eq!(UnitId::new("vision", "models").to_string(), "vision.models");
    }
}
