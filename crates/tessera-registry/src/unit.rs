//! Source unit format and evaluation.
//!
//! A source unit is a TOML file declaring entries over host callables:
//!
//! ```toml
//! imports = ["optim"]
//!
//! [meta]
//! author = "jane"
//!
//! [[entry]]
//! name = "sgd"
//! call = "optim.sgd"
//! doc = "Stochastic gradient descent."
//! returns = "Optimizer"
//! meta = { backend = "cpu" }
//! params = [{ name = "lr", type = "float", default = 0.01 }]
//!
//! [[entry]]
//! name = "trainer"
//! call = "train.loop"
//! doc = "Training loop."
//! returns = "none"
//! params = [{ name = "optimizer", type = "callable[..., Optimizer]" }]
//! bind = { optimizer = { entry = "sgd" } }
//! ```
//!
//! Evaluation happens in a fresh [`UnitScope`]. Entries are evaluated in
//! file order; a `bind` value of the form `{ entry = "name" }` refers to an
//! entry evaluated earlier in the same unit. Entries whose name starts with
//! `_` stay private to the unit.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::entry::{Entry, EntryDef, Params};
use crate::error::{DefinitionError, ParamError};
use crate::library::{Library, package_of};
use crate::signature::{ParamSpec, Signature};
use crate::types::{TypeParseError, TypeSpec};
use crate::value::{Metadata, Value, merge_metadata};

/// Key marking a `bind` value as a reference to another entry.
const ENTRY_REF_KEY: &str = "entry";

/// On-disk shape of a unit file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitFile {
    /// Host packages this unit needs.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Metadata shared by every entry of the unit.
    #[serde(default)]
    pub meta: Metadata,
    /// Entry declarations, in file order.
    #[serde(default, rename = "entry")]
    pub entries: Vec<EntryDecl>,
}

/// One `[[entry]]` table: the registration directive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryDecl {
    /// Short name.
    pub name: String,
    /// Host symbol to wrap.
    pub call: String,
    /// Documentation.
    #[serde(default)]
    pub doc: String,
    /// Return type constraint.
    #[serde(default)]
    pub returns: Option<String>,
    /// Skip registration entirely.
    #[serde(default)]
    pub ignored: bool,
    /// Metadata merged into the unit's shared metadata.
    #[serde(default)]
    pub meta: Metadata,
    /// Parameters in call order.
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    /// Pre-bound values.
    #[serde(default)]
    pub bind: serde_json::Map<String, serde_json::Value>,
}

/// One declared parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    /// Parameter name.
    pub name: String,
    /// Type constraint text.
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    /// Default value.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// Why a unit failed to evaluate.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The file could not be read.
    #[error("failed to read unit: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid unit.
    #[error("failed to parse unit: {0}")]
    Parse(#[from] toml::de::Error),

    /// An imported package is not provided by the host library.
    #[error("no package named '{package}'")]
    UnresolvedImport {
        /// The missing package.
        package: String,
    },

    /// An entry calls a symbol whose package was not imported.
    #[error("name '{package}' is not imported (used by '{symbol}')")]
    NotImported {
        /// The package.
        package: String,
        /// The full symbol.
        symbol: String,
    },

    /// An entry calls a symbol the host library does not provide.
    #[error("cannot find '{symbol}' in the host library")]
    UnresolvedSymbol {
        /// The missing symbol.
        symbol: String,
    },

    /// A `bind` value refers to an entry not defined earlier in the unit.
    #[error("name '{name}' is not defined")]
    UnresolvedReference {
        /// The referenced entry name.
        name: String,
    },

    /// A type constraint does not parse.
    #[error(transparent)]
    InvalidType(#[from] TypeParseError),

    /// An entry declaration violates the definition invariants.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// A `bind` table does not fit the entry's signature.
    #[error(transparent)]
    Param(#[from] ParamError),
}

impl UnitError {
    /// The unresolved package name, when the failure is an unresolved
    /// reference to host code.
    #[must_use]
    pub fn unresolved_name(&self) -> Option<&str> {
        match self {
            Self::UnresolvedImport { package } => Some(package),
            Self::UnresolvedSymbol { symbol } => Some(package_of(symbol)),
            _ => None,
        }
    }
}

/// The isolated symbol table a unit is evaluated into.
#[derive(Debug, Default)]
pub struct UnitScope {
    meta: Metadata,
    entries: BTreeMap<String, Entry>,
}

impl UnitScope {
    /// A scope seeded with `meta`.
    #[must_use]
    pub fn new(meta: Metadata) -> Self {
        Self {
            meta,
            entries: BTreeMap::new(),
        }
    }

    /// Parse `source` and evaluate it into a fresh scope seeded with
    /// `seed`.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] on the first problem; nothing of a failing
    /// unit is kept.
    pub fn evaluate(source: &str, library: &Library, seed: Metadata) -> Result<Self, UnitError> {
        let file: UnitFile = toml::from_str(source)?;
        let mut scope = Self::new(seed);
        scope.execute(file, library)?;
        Ok(scope)
    }

    fn execute(&mut self, file: UnitFile, library: &Library) -> Result<(), UnitError> {
        for package in &file.imports {
            if !library.has_package(package) {
                return Err(UnitError::UnresolvedImport {
                    package: package.clone(),
                });
            }
        }
        merge_metadata(&mut self.meta, &file.meta);

        for decl in file.entries {
            if decl.ignored {
                continue;
            }
            let entry = self.build(decl, &file.imports, library)?;
            self.entries.insert(entry.name().to_owned(), entry);
        }
        Ok(())
    }

    fn build(&mut self, decl: EntryDecl, imports: &[String], library: &Library) -> Result<Entry, UnitError> {
        merge_metadata(&mut self.meta, &decl.meta);

        let package = package_of(&decl.call);
        if !imports.iter().any(|i| i == package) {
            return Err(UnitError::NotImported {
                package: package.to_owned(),
                symbol: decl.call,
            });
        }
        let callable = library
            .resolve(&decl.call)
            .ok_or_else(|| UnitError::UnresolvedSymbol {
                symbol: decl.call.clone(),
            })?;

        let mut params = Vec::with_capacity(decl.params.len());
        for p in decl.params {
            let ty = p.ty.as_deref().map(TypeSpec::parse).transpose()?;
            params.push(ParamSpec {
                name: p.name,
                ty,
                default: p.default.as_ref().map(Value::from_json),
            });
        }
        let returns = decl.returns.as_deref().map(TypeSpec::parse).transpose()?;

        let def = EntryDef::new(decl.name, Signature::new(params, returns), callable)
            .with_doc(decl.doc)
            .with_metadata(self.meta.clone());
        let entry = Entry::new(def, Params::new())?;

        if decl.bind.is_empty() {
            return Ok(entry);
        }
        let mut bound = Params::new();
        for (key, raw) in &decl.bind {
            bound.insert(key.clone(), self.bind_value(raw)?);
        }
        Ok(entry.bind(bound)?)
    }

    fn bind_value(&self, raw: &serde_json::Value) -> Result<Value, UnitError> {
        if let serde_json::Value::Object(map) = raw
            && map.len() == 1
            && let Some(serde_json::Value::String(name)) = map.get(ENTRY_REF_KEY)
        {
            return self
                .entries
                .get(name)
                .map(|e| Value::Entry(Box::new(e.clone())))
                .ok_or_else(|| UnitError::UnresolvedReference { name: name.clone() });
        }
        Ok(Value::from_json(raw))
    }

    /// Shared metadata after evaluation.
    #[must_use]
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Every entry defined by the unit, private ones included.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    /// Consume the scope, keeping entries whose name does not start with
    /// `_`.
    #[must_use]
    pub fn into_public(self) -> Vec<(String, Entry)> {
        self.entries
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CallArgs;

    fn library() -> Library {
        let mut lib = Library::new();
        lib.register("math.add", |args| {
            Ok(Value::Int(args.int("a")?.saturating_add(args.int("b")?)))
        })
        .register("math.apply", |args| {
            Ok(args.entry("f")?.call(CallArgs::new().arg(args.int("x")?))?)
        });
        lib
    }

    const UNIT: &str = r#"
imports = ["math"]

[meta]
author = "jane"

[[entry]]
name = "add"
call = "math.add"
doc = "Add two integers."
returns = "int"
meta = { backend = "cpu" }
params = [{ name = "a", type = "int" }, { name = "b", type = "int", default = 1 }]

[[entry]]
name = "_add_ten"
call = "math.add"
doc = "Add ten."
returns = "int"
params = [{ name = "a", type = "int" }, { name = "b", type = "int" }]
bind = { b = 10 }

[[entry]]
name = "apply"
call = "math.apply"
doc = "Apply f to x."
returns = "int"
params = [{ name = "f", type = "callable[[int], int]" }, { name = "x", type = "int" }]
bind = { f = { entry = "_add_ten" } }

[[entry]]
name = "skipped"
call = "math.missing"
ignored = true
meta = { hidden = true }
"#;

    #[test]
    fn evaluates_entries_and_harvests_public_ones() {
        let scope = UnitScope::evaluate(UNIT, &library(), Metadata::new()).unwrap();
        assert_eq!(scope.entries().len(), 3);
        assert_eq!(scope.meta()["author"], "jane");
        assert!(!scope.meta().contains_key("hidden"));

        let public = scope.into_public();
        let names: Vec<&str> = public.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["add", "apply"]);

        let apply = &public[1].1;
        assert_eq!(apply.call(CallArgs::new().arg(5)).unwrap(), Value::Int(15));
        assert_eq!(apply.metadata()["backend"], "cpu");
    }

    #[test]
    fn seed_metadata_reaches_entries() {
        let seed = serde_json::json!({"version": "1.0"}).as_object().cloned().unwrap();
        let scope = UnitScope::evaluate(UNIT, &library(), seed).unwrap();
        assert_eq!(scope.entries()["add"].metadata()["version"], "1.0");
    }

    #[test]
    fn unknown_import_names_the_package() {
        let err = UnitScope::evaluate("imports = [\"torchvision\"]", &library(), Metadata::new()).unwrap_err();
        assert_eq!(err.unresolved_name(), Some("torchvision"));
    }

    #[test]
    fn missing_symbol_is_unresolved() {
        let src = r#"
imports = ["math"]
[[entry]]
name = "mul"
call = "math.mul"
doc = "Multiply."
returns = "int"
"#;
        let err = UnitScope::evaluate(src, &library(), Metadata::new()).unwrap_err();
        assert!(matches!(err, UnitError::UnresolvedSymbol { .. }));
        assert_eq!(err.unresolved_name(), Some("math"));
    }

    #[test]
    fn definition_errors_fail_the_unit() {
        let src = r#"
imports = ["math"]
[[entry]]
name = "add"
call = "math.add"
returns = "int"
params = [{ name = "a", type = "int" }, { name = "b", type = "int" }]
"#;
        let err = UnitScope::evaluate(src, &library(), Metadata::new()).unwrap_err();
        assert!(matches!(
            err,
            UnitError::Definition(DefinitionError::MissingDocumentation { .. })
        ));
    }

    #[test]
    fn forward_references_are_rejected() {
        let src = r#"
imports = ["math"]
[[entry]]
name = "apply"
call = "math.apply"
doc = "Apply."
returns = "int"
params = [{ name = "f", type = "callable[[int], int]" }, { name = "x", type = "int" }]
bind = { f = { entry = "later" } }
"#;
        let err = UnitScope::evaluate(src, &library(), Metadata::new()).unwrap_err();
        assert!(matches!(err, UnitError::UnresolvedReference { ref name } if name == "later"));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = UnitScope::evaluate("improts = []", &library(), Metadata::new()).unwrap_err();
        assert!(matches!(err, UnitError::Parse(_)));
    }
}
