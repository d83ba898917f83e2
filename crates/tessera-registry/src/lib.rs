//! Dynamic component registry for the Tessera runtime.
//!
//! Components are host callables wrapped as [`Entry`] values with a
//! validated [`Signature`]. Source units (TOML files) spread across
//! namespaces declare which host callables become entries, with what
//! types, defaults and pre-bound values. The [`Catalog`] discovers the
//! units, hot-reloads them when their files change and answers lookups:
//!
//! - [`Catalog::get`]: by short name
//! - [`Catalog::query`]: `$<id>`, `r/<regex>` or a glob
//! - [`Catalog::namespace`]: one namespace at a time
//!
//! Lookups always hand out clones, so bindings made by one caller are never
//! seen by another.
//!
//! # Partial application
//!
//! [`Entry::bind`] pre-fills parameters. [`Entry::invoke`] with
//! [`CallArgs::deferred`] returns [`Invocation::NeedsMore`] instead of
//! failing while required parameters are still open, which lets pipeline
//! stages be assembled over several steps.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod catalog;
pub mod entry;
pub mod error;
pub mod library;
pub mod loader;
pub mod namespace;
pub mod query;
pub mod signature;
pub mod types;
pub mod unit;
pub mod value;

pub use catalog::{Catalog, CatalogBuilder, NamespaceView, RefreshState};
pub use entry::{Args, CallArgs, Callable, Entry, EntryDef, EntryId, Invocation, Params, callable};
pub use error::{
    DefinitionError, ImportFailure, LookupError, ParamError, RegistryError, RegistryResult,
    ReturnTypeError, Warning,
};
pub use library::Library;
pub use loader::{LoadOutcome, SourceUnit, UnitId, Units};
pub use namespace::{
    MAIN_NAMESPACE, Namespace, NamespaceMeta, NamespaceTable, Requirement, is_valid_namespace,
    normalize_namespace,
};
pub use query::Query;
pub use signature::{DEFER_KEY, ParamSpec, Signature};
pub use types::TypeSpec;
pub use value::{Context, Metadata, Opaque, Value};
