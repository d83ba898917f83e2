//! Registry error and warning types.
//!
//! Errors abort the operation that raised them. Warnings describe
//! conditions that are reported and survived: a refresh or lookup carries
//! on after emitting one.

use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::entry::EntryId;
use crate::loader::UnitId;

/// A callable's declaration violates the definition invariants. Raised
/// when an entry is constructed, never at call time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// A parameter has no declared type.
    #[error("param '{param}' of entry '{entry}' is not explicitly typed")]
    UnannotatedParam {
        /// Entry name.
        entry: String,
        /// Parameter name.
        param: String,
    },

    /// A default value does not satisfy its own parameter's type.
    #[error("param '{param}' of entry '{entry}' has a default of type '{found}', incompatible with '{expected}'")]
    IncompatibleDefault {
        /// Entry name.
        entry: String,
        /// Rendered parameter.
        param: String,
        /// Declared type.
        expected: String,
        /// Kind of the default value.
        found: String,
    },

    /// The callable carries no documentation.
    #[error("documentation of entry '{entry}' is missing")]
    MissingDocumentation {
        /// Entry name.
        entry: String,
    },

    /// The return type is not declared.
    #[error("return type of entry '{entry}' is not explicitly declared")]
    MissingReturnType {
        /// Entry name.
        entry: String,
    },

    /// Two parameters share a name.
    #[error("entry '{entry}' declares param '{param}' more than once")]
    DuplicateParam {
        /// Entry name.
        entry: String,
        /// Parameter name.
        param: String,
    },

    /// A parameter uses a reserved name.
    #[error("param name '{param}' of entry '{entry}' is reserved")]
    ReservedParam {
        /// Entry name.
        entry: String,
        /// Parameter name.
        param: String,
    },

    /// The entry name is not an identifier.
    #[error("'{name}' is not a valid entry name")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

/// Arguments supplied to an entry do not fit its signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// Keys that are not parameters of the entry.
    #[error("unexpected param(s) '{}' for entry:\n{signature}", params.join(", "))]
    Unexpected {
        /// Entry name.
        entry: String,
        /// The unknown keys.
        params: Vec<String>,
        /// Rendered entry, for reference.
        signature: String,
    },

    /// A parameter without default received no value.
    #[error("required param '{param}' of entry '{entry}' is missing")]
    MissingRequired {
        /// Entry name.
        entry: String,
        /// Rendered parameter.
        param: String,
    },

    /// A value does not satisfy its parameter's type.
    #[error(
        "param '{param}' of entry '{entry}' should be of type '{expected}', got {found}{}",
        hint.as_deref().map(|h| format!(". {h}")).unwrap_or_default()
    )]
    TypeMismatch {
        /// Entry name.
        entry: String,
        /// Parameter name.
        param: String,
        /// Declared type.
        expected: String,
        /// The offending value.
        found: String,
        /// Extra guidance, set when the value is a partially bound entry.
        hint: Option<String>,
    },

    /// A parameter received both a positional and a keyword value.
    #[error("entry '{entry}' got multiple values for param '{param}'")]
    DuplicateBinding {
        /// Entry name.
        entry: String,
        /// Parameter name.
        param: String,
    },

    /// More positional arguments than open parameters.
    #[error(
        "entry '{entry}' accepts at most {} positional param(s) '{}', got {got}",
        expected.len(),
        expected.join(", ")
    )]
    TooManyPositional {
        /// Entry name.
        entry: String,
        /// Parameters that positional arguments map onto.
        expected: Vec<String>,
        /// Number of positional arguments supplied.
        got: usize,
    },
}

/// The value produced by a callable does not satisfy its declared return
/// type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entry '{entry}' should return '{expected}', got {found}")]
pub struct ReturnTypeError {
    /// Entry name.
    pub entry: String,
    /// Declared return type.
    pub expected: String,
    /// The produced value.
    pub found: String,
}

/// A lookup found nothing or could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No entry matches.
    #[error("could not find an entry matching '{query}'")]
    NotFound {
        /// The query as given.
        query: String,
    },

    /// The regex or glob does not compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// No namespace of that name is known.
    #[error("unknown namespace '{namespace}'")]
    UnknownNamespace {
        /// The requested namespace.
        namespace: String,
    },
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Invalid callable declaration.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Invalid invocation arguments.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// Invalid return value.
    #[error(transparent)]
    ReturnType(#[from] ReturnTypeError),

    /// Failed lookup.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The wrapped callable itself failed.
    #[error("entry '{entry}' failed: {message}")]
    Execution {
        /// Entry name.
        entry: String,
        /// Rendered error chain.
        message: String,
    },

    /// Settings could not be loaded.
    #[error(transparent)]
    Config(#[from] tessera_config::ConfigError),

    /// I/O error outside of unit loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A source unit that could not be loaded. The unit contributes no new
/// entries; entries from its last good revision stay registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    /// Unit that failed.
    pub unit: UnitId,
    /// File that was loaded.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
    /// Name of the unresolved package or symbol, when that was the cause.
    pub missing: Option<String>,
    /// Install suggestion for a declared requirement resembling `missing`.
    pub tip: Option<String>,
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self.reason.trim_end_matches('.');
        write!(
            f,
            "{reason}. The unit '{}' under namespace '{}' could not be loaded.",
            self.unit.stem(),
            self.unit.namespace()
        )?;
        if let Some(tip) = &self.tip {
            write!(f, " {tip}")?;
        }
        Ok(())
    }
}

/// Non-fatal conditions reported during refresh and lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Several entries matched; the first in id order was returned.
    Ambiguity {
        /// The lookup key.
        query: String,
        /// The returned entry.
        chosen: EntryId,
        /// Every match rendered as `id (signature)`.
        matches: Vec<String>,
    },

    /// An entry id was already registered by another unit; the later
    /// registration was dropped.
    DuplicateRegistration {
        /// The contested id.
        id: EntryId,
        /// The unit whose registration was dropped.
        unit: UnitId,
        /// The unit owning the registered entry, if known.
        owner: Option<UnitId>,
    },

    /// A source unit failed to load.
    ImportFailure(ImportFailure),

    /// A bound namespace points at a missing directory and was skipped.
    InvalidNamespacePath {
        /// Namespace name.
        namespace: String,
        /// The missing directory.
        path: PathBuf,
    },

    /// A namespace metadata file could not be parsed; defaults were used.
    InvalidNamespaceMetadata {
        /// Namespace name.
        namespace: String,
        /// Parser message.
        message: String,
    },
}

impl Warning {
    /// Emit the warning on the `tracing` facade.
    pub(crate) fn log(&self) {
        match self {
            Self::Ambiguity { query, chosen, .. } => {
                warn!(query, chosen = %chosen, "{self}");
            },
            Self::DuplicateRegistration { id, unit, .. } => {
                warn!(entry_id = %id, unit = %unit, "duplicate entry registration dropped");
            },
            Self::ImportFailure(failure) => {
                warn!(unit = %failure.unit, path = %failure.path.display(), "{failure}");
            },
            Self::InvalidNamespacePath { namespace, path } => {
                warn!(namespace, path = %path.display(), "namespace path is not a directory, skipping");
            },
            Self::InvalidNamespaceMetadata { namespace, message } => {
                warn!(namespace, error = %message, "invalid namespace metadata, using defaults");
            },
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambiguity {
                query,
                chosen,
                matches,
            } => {
                write!(
                    f,
                    "multiple entries match '{query}'. The returned entry is '{chosen}'; refine the query to pick another:"
                )?;
                for (i, m) in matches.iter().enumerate() {
                    write!(f, "\n[{i}] {m}")?;
                }
                Ok(())
            },
            Self::DuplicateRegistration { id, unit, owner } => {
                write!(
                    f,
                    "there are duplicate '{}' entries under namespace '{}'; the one from unit '{unit}' was dropped",
                    id.name(),
                    id.namespace()
                )?;
                if let Some(owner) = owner {
                    write!(f, " (registered by '{owner}')")?;
                }
                Ok(())
            },
            Self::ImportFailure(failure) => write!(f, "{failure}"),
            Self::InvalidNamespacePath { namespace, path } => write!(
                f,
                "namespace '{namespace}' has an invalid module path '{}'",
                path.display()
            ),
            Self::InvalidNamespaceMetadata { namespace, message } => {
                write!(f, "namespace '{namespace}' has invalid metadata: {message}")
            },
        }
    }
}
