//! Installer error and warning types.

use std::fmt;
use std::path::PathBuf;

use tessera_config::ConfigError;
use tessera_registry::Requirement;
use tracing::warn;

/// Errors that abort an install, uninstall or pack operation.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The URL is neither a zip archive, a git remote nor a known shorthand.
    #[error(
        "unsupported source '{url}': only .zip archives, .git remotes, \
         <provider>@<org>/<repo>[:<branch>] and file@<path> are supported"
    )]
    UnsupportedSource {
        /// The rejected URL.
        url: String,
    },

    /// A shorthand component or git ref failed validation.
    #[error("invalid {label} in '{url}': {message}")]
    InvalidSource {
        /// The URL being parsed.
        url: String,
        /// Which part was rejected (org, repo, branch).
        label: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The namespace name is not a lowercase identifier.
    #[error("invalid namespace name '{name}': expected [a-z][a-z0-9_]*")]
    InvalidNamespace {
        /// The rejected name.
        name: String,
    },

    /// The path to install or pack is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// Two pack sources would land under the same archive directory.
    #[error("pack sources {first} and {second} share the directory name '{name}'")]
    DuplicateSource {
        /// The shared directory name.
        name: String,
        /// The source seen first.
        first: PathBuf,
        /// The later source.
        second: PathBuf,
    },

    /// Persisting the namespace bindings failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing an archive failed.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Walking a source tree failed.
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Why fetching a remote source failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed or returned an error status.
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The download exceeds the size limit.
    #[error("download is too large ({size} bytes, limit {limit})")]
    TooLarge {
        /// Bytes seen so far or announced by the server.
        size: u64,
        /// The limit.
        limit: u64,
    },

    /// Filesystem error while caching or extracting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive is not a valid zip file.
    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An archive member would be written outside the destination.
    #[error("archive member escapes the destination: {name}")]
    UnsafePath {
        /// Member name as stored in the archive.
        name: String,
    },

    /// The archive exceeds the entry count or extracted size limits.
    #[error("archive exceeds {what} limit ({limit})")]
    ArchiveLimit {
        /// Which limit was hit.
        what: &'static str,
        /// The limit.
        limit: u64,
    },

    /// `git clone` failed.
    #[error("git clone failed: {message}")]
    Git {
        /// Error output of git.
        message: String,
    },
}

/// Why installing a declared requirement failed.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// The installer tool could not be started.
    #[error("failed to run '{tool}': {source}")]
    Spawn {
        /// Installer tool.
        tool: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The installer tool exited with a failure status.
    #[error("'{tool} install {target}' exited with {status}: {stderr}")]
    Exit {
        /// Installer tool.
        tool: String,
        /// Install target.
        target: String,
        /// Rendered exit status.
        status: String,
        /// Captured error output.
        stderr: String,
    },
}

/// A non-fatal condition met during an install sweep.
///
/// Warnings are logged when they occur and kept on the
/// [`Installer`](crate::Installer) until drained.
#[derive(Debug)]
pub enum InstallWarning {
    /// Downloading, cloning or extracting a source failed; nothing was
    /// installed from it.
    Fetch {
        /// Source URL as given.
        url: String,
        /// The failure.
        error: FetchError,
    },
    /// The namespace name or the path is already bound; nothing changed.
    AlreadyBound {
        /// The existing namespace.
        namespace: String,
        /// Its bound root.
        path: PathBuf,
        /// Whether the clash was on the path rather than the name.
        by_path: bool,
    },
    /// An explicit namespace was given but the source held several
    /// directories, so names were derived from each directory instead.
    NamespaceIgnored {
        /// The requested namespace.
        namespace: String,
        /// Number of fetched directories.
        directories: usize,
    },
    /// The namespace metadata file of a fetched directory is invalid.
    InvalidMetadata {
        /// Namespace whose metadata failed.
        namespace: String,
        /// Parse or read error.
        message: String,
    },
    /// A requirement target contains characters an installer must not see.
    InvalidRequirement {
        /// Namespace declaring it.
        namespace: String,
        /// The requirement.
        requirement: Requirement,
    },
    /// Installing a declared requirement failed.
    Installer {
        /// Namespace declaring it.
        namespace: String,
        /// The requirement.
        requirement: Requirement,
        /// The failure.
        error: DependencyError,
    },
    /// A fetched directory could not be bound; the others still were.
    Skipped {
        /// The fetched directory.
        path: PathBuf,
        /// Why it was not bound.
        error: InstallError,
    },
    /// Nothing matched the uninstall target.
    NotInstalled {
        /// Namespace name or path given.
        target: String,
    },
}

impl InstallWarning {
    pub(crate) fn log(&self) {
        match self {
            Self::Fetch { url, error } => warn!(url, error = %error, "{self}"),
            Self::AlreadyBound {
                namespace, path, ..
            } => warn!(namespace, path = %path.display(), "{self}"),
            Self::NamespaceIgnored { namespace, directories } => {
                warn!(namespace, directories, "{self}");
            },
            Self::InvalidMetadata { namespace, message } => {
                warn!(namespace, error = %message, "invalid namespace metadata");
            },
            Self::InvalidRequirement {
                namespace,
                requirement,
            } => warn!(namespace, requirement = %requirement, "{self}"),
            Self::Installer {
                namespace,
                requirement,
                error,
            } => warn!(namespace, requirement = %requirement, error = %error, "{self}"),
            Self::Skipped { path, error } => {
                warn!(path = %path.display(), error = %error, "skipped fetched directory");
            },
            Self::NotInstalled { target } => warn!(target, "{self}"),
        }
    }
}

impl fmt::Display for InstallWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { url, error } => write!(f, "could not fetch '{url}': {error}"),
            Self::AlreadyBound {
                namespace,
                path,
                by_path: false,
            } => write!(
                f,
                "namespace '{namespace}' is already bound to '{}'",
                path.display()
            ),
            Self::AlreadyBound {
                namespace,
                path,
                by_path: true,
            } => write!(
                f,
                "'{}' is already installed under namespace '{namespace}'",
                path.display()
            ),
            Self::NamespaceIgnored {
                namespace,
                directories,
            } => write!(
                f,
                "namespace '{namespace}' ignored: the source provides {directories} directories"
            ),
            Self::InvalidMetadata { namespace, message } => {
                write!(f, "namespace '{namespace}' has invalid metadata: {message}")
            },
            Self::InvalidRequirement {
                namespace,
                requirement,
            } => write!(
                f,
                "invalid install requirement '{requirement}' for namespace '{namespace}'"
            ),
            Self::Installer {
                namespace,
                requirement,
                error,
            } => write!(
                f,
                "failed to install '{requirement}' for '{namespace}', please install it manually: {error}"
            ),
            Self::Skipped { path, error } => {
                write!(f, "skipped '{}': {error}", path.display())
            },
            Self::NotInstalled { target } => write!(f, "'{target}' is not installed"),
        }
    }
}
