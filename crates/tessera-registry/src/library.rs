//! Host library of native callables.
//!
//! Source units are declarative; the code they wire up lives in the host
//! process. The host registers each callable under a dotted symbol such
//! as `optim.sgd`, whose first segment is its package. A unit lists the
//! packages it imports and points each entry at a symbol.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::entry::{Args, Callable};
use crate::value::Value;

/// Symbol table of host callables, keyed by dotted symbol.
#[derive(Clone, Default)]
pub struct Library {
    symbols: BTreeMap<String, Arc<dyn Callable>>,
}

impl Library {
    /// An empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure under `symbol`, replacing any previous one.
    pub fn register<F>(&mut self, symbol: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_shared(symbol, Arc::new(f))
    }

    /// Register a [`Callable`] implementation under `symbol`.
    pub fn register_callable(&mut self, symbol: impl Into<String>, callable: impl Callable + 'static) -> &mut Self {
        self.register_shared(symbol, Arc::new(callable))
    }

    /// Register an already shared callable.
    pub fn register_shared(&mut self, symbol: impl Into<String>, callable: Arc<dyn Callable>) -> &mut Self {
        let symbol = symbol.into();
        debug!(symbol, "registered host callable");
        self.symbols.insert(symbol, callable);
        self
    }

    /// Look up a symbol.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<Arc<dyn Callable>> {
        self.symbols.get(symbol).cloned()
    }

    /// Whether any symbol lives in `package`.
    #[must_use]
    pub fn has_package(&self, package: &str) -> bool {
        self.symbols.keys().any(|s| package_of(s) == package)
    }

    /// Registered packages, sorted and deduplicated.
    #[must_use]
    pub fn packages(&self) -> Vec<&str> {
        let mut packages: Vec<&str> = self.symbols.keys().map(|s| package_of(s)).collect();
        packages.sort_unstable();
        packages.dedup();
        packages
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// The package of a dotted symbol: everything before the first `.`.
#[must_use]
pub fn package_of(symbol: &str) -> &str {
    symbol.split_once('.').map_or(symbol, |(pkg, _)| pkg)
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("symbols", &self.symbols.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Args) -> anyhow::Result<Value> {
        Ok(Value::None)
    }

    #[test]
    fn packages_are_first_symbol_segment() {
        let mut lib = Library::new();
        lib.register("optim.sgd", noop)
            .register("optim.adam", noop)
            .register("data.mnist.load", noop)
            .register("standalone", noop);

        assert_eq!(lib.packages(), vec!["data", "optim", "standalone"]);
        assert!(lib.has_package("optim"));
        assert!(!lib.has_package("opt"));
        assert!(lib.resolve("optim.sgd").is_some());
        assert!(lib.resolve("optim.rmsprop").is_none());
        assert_eq!(lib.len(), 4);
    }
}
