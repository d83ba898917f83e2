//! Namespace names, metadata files and the namespace table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::Warning;
use crate::value::Metadata;

/// Name of the implicit namespace bound to the current directory.
pub const MAIN_NAMESPACE: &str = "main";

/// Metadata key holding the dependency list.
pub const REQUIREMENTS_KEY: &str = "requirements";

/// Lowercase `raw` and map `-` and `.` to `_`.
#[must_use]
pub fn normalize_namespace(raw: &str) -> String {
    raw.to_lowercase().replace(['-', '.'], "_")
}

/// Whether `name` matches `^[a-z][a-z0-9_]*$`.
#[must_use]
pub fn is_valid_namespace(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A declared dependency of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    /// A target for the default installer tool.
    Plain(String),
    /// A target with an explicit installer tool.
    Tool {
        /// Install target (package spec or URL).
        url: String,
        /// Installer tool, e.g. `pip` or `conda`.
        tool: String,
    },
}

impl Requirement {
    /// The install target.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Plain(target) | Self::Tool { url: target, .. } => target,
        }
    }

    /// The installer tool, falling back to `default_tool`.
    #[must_use]
    pub fn tool<'a>(&'a self, default_tool: &'a str) -> &'a str {
        match self {
            Self::Plain(_) => default_tool,
            Self::Tool { tool, .. } => tool,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(target) => f.write_str(target),
            Self::Tool { url, tool } => write!(f, "{url} ({tool})"),
        }
    }
}

/// Contents of a namespace metadata file (`namespace.yml` by default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Directory holding the source units, relative to the namespace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<PathBuf>,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub author: Option<String>,
    /// Version.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub version: Option<String>,
    /// Compute backend.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub backend: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    /// Any other keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Accept any YAML scalar (`version: 1.0`) as a string.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!("expected a scalar, got {other}"))),
    }
}

/// A namespace metadata file that could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceMetaError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a valid metadata mapping.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error.
        source: serde_yaml::Error,
    },
}

impl NamespaceMeta {
    /// Load `root/filename`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`NamespaceMetaError`] if the file exists but is invalid.
    pub fn load(root: &Path, filename: &str) -> Result<Self, NamespaceMetaError> {
        let path = root.join(filename);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| NamespaceMetaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| NamespaceMetaError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The metadata as an open map, without the dependency list.
    #[must_use]
    pub fn shared(&self) -> Metadata {
        let mut map = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Metadata::new(),
        };
        map.remove(REQUIREMENTS_KEY);
        map
    }
}

/// A namespace known to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// Normalized name.
    pub name: String,
    /// Bound root directory.
    pub root: PathBuf,
    /// Directory scanned for source units.
    pub module_path: PathBuf,
    /// Parsed metadata file.
    pub meta: NamespaceMeta,
}

/// Namespace name to namespace, rebuilt on every refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceTable {
    namespaces: BTreeMap<String, Namespace>,
}

impl NamespaceTable {
    /// Build the table from persisted `bindings` plus the implicit
    /// [`MAIN_NAMESPACE`] for `current_dir`.
    ///
    /// Bindings whose root or module path is not a directory are dropped
    /// with a warning. `main` is added unless `current_dir` is already the
    /// module path of some namespace.
    pub fn derive(
        bindings: &BTreeMap<String, PathBuf>,
        current_dir: Option<&Path>,
        metadata_filename: &str,
        warnings: &mut Vec<Warning>,
    ) -> Self {
        let mut namespaces = BTreeMap::new();
        for (name, root) in bindings {
            if !root.is_dir() {
                warnings.push(Warning::InvalidNamespacePath {
                    namespace: name.clone(),
                    path: root.clone(),
                });
                continue;
            }
            let meta = NamespaceMeta::load(root, metadata_filename).unwrap_or_else(|e| {
                warnings.push(Warning::InvalidNamespaceMetadata {
                    namespace: name.clone(),
                    message: e.to_string(),
                });
                NamespaceMeta::default()
            });
            let module_path = absolute(&meta.module_path.as_ref().map_or_else(|| root.clone(), |p| root.join(p)));
            if !module_path.is_dir() {
                warnings.push(Warning::InvalidNamespacePath {
                    namespace: name.clone(),
                    path: module_path,
                });
                continue;
            }
            namespaces.insert(
                name.clone(),
                Namespace {
                    name: name.clone(),
                    root: root.clone(),
                    module_path,
                    meta,
                },
            );
        }

        if let Some(cwd) = current_dir {
            let cwd = absolute(cwd);
            let taken = namespaces.values().any(|ns: &Namespace| same_dir(&ns.module_path, &cwd));
            if !taken && !namespaces.contains_key(MAIN_NAMESPACE) {
                debug!(path = %cwd.display(), "binding current directory as main namespace");
                namespaces.insert(
                    MAIN_NAMESPACE.to_owned(),
                    Namespace {
                        name: MAIN_NAMESPACE.to_owned(),
                        root: cwd.clone(),
                        module_path: cwd,
                        meta: NamespaceMeta::default(),
                    },
                );
            }
        }
        Self { namespaces }
    }

    /// Look up a namespace.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    /// Namespaces in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    /// Number of namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
