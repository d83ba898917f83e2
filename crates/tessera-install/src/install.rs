//! Binding namespaces into the settings store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tessera_config::SettingsStore;
use tessera_registry::{NamespaceMeta, Requirement, is_valid_namespace, normalize_namespace};
use tracing::{debug, info};

use crate::error::{DependencyError, InstallError, InstallResult, InstallWarning};
use crate::fetch::{self, Progress};
use crate::source::RemoteSource;

/// Requirement targets handed to an installer tool must match this.
static TARGET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9<=>.\-]+$").expect("invalid regex"));

/// Installs a declared requirement with an external tool.
pub trait DependencyInstaller {
    /// Run `tool install target`.
    ///
    /// # Errors
    ///
    /// Returns a [`DependencyError`] if the tool cannot be started or fails.
    fn install(&self, tool: &str, target: &str) -> Result<(), DependencyError>;
}

/// Runs `<tool> install <target>` as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandInstaller;

impl DependencyInstaller for CommandInstaller {
    fn install(&self, tool: &str, target: &str) -> Result<(), DependencyError> {
        info!(tool, target, "installing requirement");
        let output = Command::new(tool)
            .args(["install", target])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DependencyError::Spawn {
                tool: tool.to_owned(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(DependencyError::Exit {
            tool: tool.to_owned(),
            target: target.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Installs, removes and lists namespace bindings.
///
/// Bindings are persisted through the [`SettingsStore`] after every change.
/// Fetched sources land in the install root.
pub struct Installer {
    store: SettingsStore,
    install_root: PathBuf,
    dependencies: Box<dyn DependencyInstaller>,
    warnings: Vec<InstallWarning>,
}

impl Installer {
    /// Create an installer fetching into `install_root`.
    pub fn new(store: SettingsStore, install_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            install_root: install_root.into(),
            dependencies: Box::new(CommandInstaller),
            warnings: Vec::new(),
        }
    }

    /// Replace the tool runner used for declared requirements.
    #[must_use]
    pub fn with_dependency_installer(mut self, installer: impl DependencyInstaller + 'static) -> Self {
        self.dependencies = Box::new(installer);
        self
    }

    /// Directory fetched sources are placed in.
    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// The underlying settings store.
    #[must_use]
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Consume the installer, returning its settings store.
    #[must_use]
    pub fn into_store(self) -> SettingsStore {
        self.store
    }

    /// Current namespace bindings.
    #[must_use]
    pub fn installed(&self) -> &BTreeMap<String, PathBuf> {
        self.store.search_paths()
    }

    /// Take the warnings collected so far.
    pub fn drain_warnings(&mut self) -> Vec<InstallWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Bind the directory at `path` as a namespace.
    ///
    /// The name defaults to the normalized directory name. Returns the bound
    /// name, or `None` if the name or the path was already bound (a warning
    /// is recorded and nothing changes).
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotADirectory`] or
    /// [`InstallError::InvalidNamespace`] for bad input, and
    /// [`InstallError::Config`] if the bindings cannot be saved.
    pub fn install_from_path(
        &mut self,
        path: &Path,
        namespace: Option<&str>,
    ) -> InstallResult<Option<String>> {
        let path = std::path::absolute(path)?;
        if !path.is_dir() {
            return Err(InstallError::NotADirectory { path });
        }
        let name = match namespace {
            Some(name) => name.to_owned(),
            None => normalize_namespace(&dir_name(&path)),
        };
        if !is_valid_namespace(&name) {
            return Err(InstallError::InvalidNamespace { name });
        }

        let mut bindings = self.store.search_paths().clone();
        for (bound, bound_path) in &bindings {
            let clash = if *bound == name {
                Some(false)
            } else if *bound_path == path {
                Some(true)
            } else {
                None
            };
            if let Some(by_path) = clash {
                self.warn(InstallWarning::AlreadyBound {
                    namespace: bound.clone(),
                    path: bound_path.clone(),
                    by_path,
                });
                return Ok(None);
            }
        }

        bindings.insert(name.clone(), path.clone());
        self.store.set_search_paths(bindings);
        self.store.save()?;
        info!(namespace = %name, path = %path.display(), "installed namespace");
        Ok(Some(name))
    }

    /// Fetch `url` and bind every top-level directory it provides.
    ///
    /// `namespace` names the binding only when the source yields exactly
    /// one directory. When enabled in the settings, declared requirements
    /// of each fetched namespace are installed afterwards. Fetch and
    /// requirement failures are recorded as warnings; a failed fetch
    /// installs nothing, and a directory with an unusable name is skipped
    /// with a warning. Returns the newly bound names.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnsupportedSource`] or
    /// [`InstallError::InvalidSource`] for a URL that cannot be fetched at
    /// all, and any error of [`install_from_path`](Self::install_from_path).
    pub fn install_from_url(
        &mut self,
        url: &str,
        namespace: Option<&str>,
        progress: &mut dyn FnMut(Progress),
    ) -> InstallResult<Vec<String>> {
        let source = RemoteSource::parse(url)?;
        debug!(source = %source, root = %self.install_root.display(), "fetching source");

        let directories = match fetch::fetch(&source, &self.install_root, progress) {
            Ok(directories) => directories,
            Err(error) => {
                self.warn(InstallWarning::Fetch {
                    url: url.to_owned(),
                    error,
                });
                return Ok(Vec::new());
            },
        };

        let namespace = match namespace {
            Some(name) if directories.len() != 1 => {
                self.warn(InstallWarning::NamespaceIgnored {
                    namespace: name.to_owned(),
                    directories: directories.len(),
                });
                None
            },
            other => other,
        };

        let mut installed = Vec::new();
        for dir in &directories {
            let bound = match self.install_from_path(dir, namespace) {
                Ok(bound) => bound,
                Err(
                    error @ (InstallError::InvalidNamespace { .. }
                    | InstallError::NotADirectory { .. }),
                ) => {
                    self.warn(InstallWarning::Skipped {
                        path: dir.clone(),
                        error,
                    });
                    continue;
                },
                Err(error) => return Err(error),
            };
            let name = match (&bound, namespace) {
                (Some(name), _) => name.clone(),
                (None, Some(name)) => name.to_owned(),
                (None, None) => normalize_namespace(&dir_name(dir)),
            };
            if self.store.get().auto_install_requirements {
                self.install_requirements(&name, dir);
            }
            installed.extend(bound);
        }
        Ok(installed)
    }

    /// Remove the binding named `target`, or bound to the directory
    /// `target`. Returns the root that was unbound.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Config`] if the bindings cannot be saved.
    pub fn uninstall(&mut self, target: &str) -> InstallResult<Option<PathBuf>> {
        let as_path = std::path::absolute(target).ok();
        let mut bindings = self.store.search_paths().clone();
        let found = bindings
            .iter()
            .find(|(name, path)| {
                name.as_str() == target || as_path.as_ref().is_some_and(|p| p == *path)
            })
            .map(|(name, _)| name.clone());

        let Some(name) = found else {
            self.warn(InstallWarning::NotInstalled {
                target: target.to_owned(),
            });
            return Ok(None);
        };
        let removed = bindings.remove(&name);
        self.store.set_search_paths(bindings);
        self.store.save()?;
        info!(namespace = %name, "uninstalled namespace");
        Ok(removed)
    }

    fn install_requirements(&mut self, namespace: &str, dir: &Path) {
        let filename = self.store.get().namespace_config_filename.clone();
        let meta = match NamespaceMeta::load(dir, &filename) {
            Ok(meta) => meta,
            Err(e) => {
                self.warn(InstallWarning::InvalidMetadata {
                    namespace: namespace.to_owned(),
                    message: e.to_string(),
                });
                return;
            },
        };

        let default_tool = self.store.get().default_installer.clone();
        for requirement in meta.requirements {
            if !is_installable(&requirement, &default_tool) {
                self.warn(InstallWarning::InvalidRequirement {
                    namespace: namespace.to_owned(),
                    requirement,
                });
                continue;
            }
            let result = self
                .dependencies
                .install(requirement.tool(&default_tool), requirement.target());
            if let Err(error) = result {
                self.warn(InstallWarning::Installer {
                    namespace: namespace.to_owned(),
                    requirement,
                    error,
                });
            }
        }
    }

    fn warn(&mut self, warning: InstallWarning) {
        warning.log();
        self.warnings.push(warning);
    }
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("store", &self.store)
            .field("install_root", &self.install_root)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

fn is_safe_target(target: &str) -> bool {
    !target.starts_with('-') && TARGET_PATTERN.is_match(target)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether `requirement` would be handed to an installer tool.
#[must_use]
pub fn is_installable(requirement: &Requirement, default_tool: &str) -> bool {
    is_safe_target(requirement.target()) && is_safe_target(requirement.tool(default_tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_targets_are_filtered() {
        assert!(is_installable(&Requirement::Plain("numpy>=1.20".into()), "pip"));
        assert!(is_installable(
            &Requirement::Tool {
                url: "torch".into(),
                tool: "conda".into()
            },
            "pip"
        ));
        assert!(!is_installable(&Requirement::Plain("numpy; rm -rf /".into()), "pip"));
        assert!(!is_installable(&Requirement::Plain("--index-url=x".into()), "pip"));
        assert!(!is_installable(
            &Requirement::Tool {
                url: "torch".into(),
                tool: "sh -c".into()
            },
            "pip"
        ));
    }

    #[test]
    fn missing_tool_is_a_spawn_error() {
        let err = CommandInstaller
            .install("tessera-no-such-installer", "numpy")
            .unwrap_err();
        assert!(matches!(err, DependencyError::Spawn { .. }));
    }
}
