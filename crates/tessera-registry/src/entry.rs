//! Registered callables.
//!
//! An [`Entry`] wraps a host [`Callable`] together with its validated
//! [`Signature`], its metadata and a set of pre-bound parameter values.
//! Entries are cheap to clone: the definition is shared behind an `Arc`
//! while every clone owns an independent binding set.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};

use crate::error::{DefinitionError, LookupError, ParamError, RegistryError, RegistryResult, ReturnTypeError};
use crate::signature::{DEFER_KEY, ParamSpec, Signature};
use crate::types::TypeSpec;
use crate::value::{Context, Metadata, Value};

/// Parameter name to value.
pub type Params = BTreeMap<String, Value>;

/// A host function that can be registered as an entry.
///
/// Implemented for every `Fn(&Args) -> anyhow::Result<Value>` closure.
pub trait Callable: Send + Sync {
    /// Run with fully resolved arguments.
    ///
    /// # Errors
    ///
    /// Any failure of the wrapped computation.
    fn call(&self, args: &Args) -> anyhow::Result<Value>;
}

impl<F> Callable for F
where
    F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(&self, args: &Args) -> anyhow::Result<Value> {
        self(args)
    }
}

/// Share a closure as a [`Callable`].
pub fn callable<F>(f: F) -> Arc<dyn Callable>
where
    F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fully resolved arguments handed to a [`Callable`]: every declared
/// parameter has a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Params,
}

impl Args {
    /// Wrap resolved values.
    #[must_use]
    pub fn new(values: Params) -> Self {
        Self { values }
    }

    /// The value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The value of `name`.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not present.
    pub fn value(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("argument '{name}' is missing"))
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> anyhow::Result<T> {
        let value = self.value(name)?;
        extract(value).with_context(|| format!("argument '{name}' should be {expected}, got {}", value.kind()))
    }

    /// The boolean argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a boolean.
    pub fn bool(&self, name: &str) -> anyhow::Result<bool> {
        self.typed(name, "a bool", Value::as_bool)
    }

    /// The integer argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not an integer.
    pub fn int(&self, name: &str) -> anyhow::Result<i64> {
        self.typed(name, "an int", Value::as_int)
    }

    /// The numeric argument `name` as a float.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a number.
    pub fn float(&self, name: &str) -> anyhow::Result<f64> {
        self.typed(name, "a float", Value::as_float)
    }

    /// The string argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a string.
    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.typed(name, "a str", Value::as_str)
    }

    /// The list argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a list.
    pub fn list(&self, name: &str) -> anyhow::Result<&[Value]> {
        self.typed(name, "a list", Value::as_list)
    }

    /// The entry argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not an entry.
    pub fn entry(&self, name: &str) -> anyhow::Result<&Entry> {
        self.typed(name, "an entry", Value::as_entry)
    }

    /// The context argument `name`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a context.
    pub fn context(&self, name: &str) -> anyhow::Result<&Context> {
        self.typed(name, "a context", Value::as_context)
    }

    /// The opaque host object `name`, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Fails if absent or not a `T`.
    pub fn opaque<T: std::any::Any>(&self, name: &str) -> anyhow::Result<&T> {
        self.typed(name, std::any::type_name::<T>(), Value::downcast_ref::<T>)
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_params(self) -> Params {
        self.values
    }
}

/// Arguments of one invocation.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    keywords: Params,
    defer: bool,
}

impl CallArgs {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Request deferred resolution: missing required parameters yield a
    /// further bindable entry instead of an error.
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.defer = true;
        self
    }

    /// Split off the deferral flag, including the reserved keyword form.
    fn take_defer(&mut self) -> bool {
        let keyword = self
            .keywords
            .remove(DEFER_KEY)
            .is_some_and(|v| v.as_bool().unwrap_or(false));
        self.defer || keyword
    }
}

impl From<Params> for CallArgs {
    fn from(keywords: Params) -> Self {
        Self {
            keywords,
            ..Self::default()
        }
    }
}

/// Outcome of [`Entry::invoke`].
#[derive(Debug, Clone)]
pub enum Invocation {
    /// The callable ran and produced a value.
    Ready(Value),
    /// Deferred resolution with required parameters still open: a clone
    /// carrying every value supplied so far.
    NeedsMore(Entry),
}

impl Invocation {
    /// Whether the callable ran.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The produced value, if the callable ran.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Ready(v) => Some(v),
            Self::NeedsMore(_) => None,
        }
    }

    /// The partially bound entry, if resolution was deferred.
    #[must_use]
    pub fn into_partial(self) -> Option<Entry> {
        match self {
            Self::Ready(_) => None,
            Self::NeedsMore(e) => Some(e),
        }
    }
}

/// Catalog identity of an entry: namespace plus short name, rendered
/// `namespace.name`. Ordered lexically by namespace, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    namespace: String,
    name: String,
}

impl EntryId {
    /// Build an id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Short name component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for EntryId {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('.') => {
                Ok(Self::new(ns, name))
            },
            _ => Err(LookupError::NotFound {
                query: s.to_owned(),
            }),
        }
    }
}

/// The immutable part of an entry, shared by all its clones.
pub struct EntryDef {
    name: String,
    doc: String,
    signature: Signature,
    metadata: Metadata,
    callable: Arc<dyn Callable>,
}

impl EntryDef {
    /// A definition with empty documentation and metadata.
    pub fn new(name: impl Into<String>, signature: Signature, callable: Arc<dyn Callable>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            signature,
            metadata: Metadata::new(),
            callable,
        }
    }

    /// Set the documentation.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if !is_identifier(&self.name) {
            return Err(DefinitionError::InvalidName {
                name: self.name.clone(),
            });
        }
        if self.doc.trim().is_empty() {
            return Err(DefinitionError::MissingDocumentation {
                entry: self.name.clone(),
            });
        }
        self.signature.validate(&self.name)
    }
}

impl fmt::Debug for EntryDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A registered callable plus its current partial bindings.
pub struct Entry {
    id: Option<EntryId>,
    def: Arc<EntryDef>,
    bound: Params,
}

impl Entry {
    /// Validate `def` and wrap it with `bound` pre-filled values.
    ///
    /// Parameters typed `context` without a default and without a bound
    /// value receive a fresh, empty [`Context`].
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] if the definition is invalid.
    pub fn new(def: EntryDef, bound: Params) -> Result<Self, DefinitionError> {
        def.validate()?;
        Ok(Self::from_shared(None, Arc::new(def), bound))
    }

    fn from_shared(id: Option<EntryId>, def: Arc<EntryDef>, mut bound: Params) -> Self {
        for param in def.signature.params() {
            if Self::takes_context(param) && !bound.contains_key(&param.name) {
                bound.insert(param.name.clone(), Value::Context(Context::new()));
            }
        }
        Self { id, def, bound }
    }

    fn takes_context(param: &ParamSpec) -> bool {
        param.ty == Some(TypeSpec::Context) && param.default.is_none()
    }

    /// Catalog id, once registered.
    #[must_use]
    pub fn id(&self) -> Option<&EntryId> {
        self.id.as_ref()
    }

    pub(crate) fn set_id(&mut self, id: EntryId) {
        self.id = Some(id);
    }

    /// Short name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Documentation.
    #[must_use]
    pub fn doc(&self) -> &str {
        &self.def.doc
    }

    /// Declared signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.def.signature
    }

    /// Attached metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.def.metadata
    }

    /// Currently bound values.
    #[must_use]
    pub fn bound(&self) -> &Params {
        &self.bound
    }

    /// Parameters that are neither bound nor defaulted, in declared order.
    #[must_use]
    pub fn required_params(&self) -> Vec<&ParamSpec> {
        self.def
            .signature
            .params()
            .iter()
            .filter(|p| !p.has_default() && !self.bound.contains_key(&p.name))
            .collect()
    }

    /// A new entry sharing this one's definition with `bound` as its
    /// binding set, replacing the current one. Contexts in `bound` are
    /// kept; unbound context parameters get a fresh one.
    #[must_use]
    pub fn clone_with(&self, bound: Params) -> Self {
        Self::from_shared(self.id.clone(), Arc::clone(&self.def), bound)
    }

    /// A clone whose bindings are the current ones merged with `params`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if a key is not a parameter or a value does
    /// not satisfy its parameter type.
    pub fn bind(&self, params: Params) -> Result<Self, ParamError> {
        let mut merged = self.bound.clone();
        merged.extend(params);
        self.check_provided(&merged)?;
        Ok(Self {
            id: self.id.clone(),
            def: Arc::clone(&self.def),
            bound: merged,
        })
    }

    /// Invoke with call-time arguments.
    ///
    /// Positional arguments fill the parameters that are neither bound nor
    /// defaulted, in declared order. Call-time values override bound ones.
    /// With deferral requested and only required parameters missing, the
    /// result is [`Invocation::NeedsMore`].
    ///
    /// # Errors
    ///
    /// [`ParamError`] for invalid arguments, [`ReturnTypeError`] for an
    /// invalid result, [`RegistryError::Execution`] if the callable fails.
    pub fn invoke(&self, args: CallArgs) -> RegistryResult<Invocation> {
        self.resolve(args, true)
    }

    /// Invoke strictly, ignoring any deferral request.
    ///
    /// # Errors
    ///
    /// See [`Entry::invoke`]; missing required parameters are always an
    /// error.
    pub fn call(&self, args: CallArgs) -> RegistryResult<Value> {
        match self.resolve(args, false)? {
            Invocation::Ready(value) => Ok(value),
            Invocation::NeedsMore(partial) => Err(self.missing_error(&partial.bound).into()),
        }
    }

    fn resolve(&self, mut args: CallArgs, allow_defer: bool) -> RegistryResult<Invocation> {
        let defer = args.take_defer() && allow_defer;
        let mut merged = self.bound.clone();

        let open: Vec<&str> = self
            .required_params()
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        if args.positional.len() > open.len() {
            return Err(ParamError::TooManyPositional {
                entry: self.name().to_owned(),
                expected: open.iter().map(|s| (*s).to_owned()).collect(),
                got: args.positional.len(),
            }
            .into());
        }
        for (name, value) in open.iter().zip(args.positional) {
            if args.keywords.contains_key(*name) {
                return Err(ParamError::DuplicateBinding {
                    entry: self.name().to_owned(),
                    param: (*name).to_owned(),
                }
                .into());
            }
            merged.insert((*name).to_owned(), value);
        }
        merged.extend(args.keywords);

        self.check_provided(&merged)?;

        let missing = self.missing(&merged);
        if !missing.is_empty() {
            if defer {
                return Ok(Invocation::NeedsMore(self.clone_with(merged)));
            }
            return Err(self.missing_error(&merged).into());
        }

        for param in self.def.signature.params() {
            if let Some(default) = &param.default {
                merged
                    .entry(param.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }

        let value = self
            .def
            .callable
            .call(&Args::new(merged))
            .map_err(|e| RegistryError::Execution {
                entry: self.name().to_owned(),
                message: format!("{e:#}"),
            })?;

        if let Some(returns) = self.def.signature.returns()
            && !returns.accepts(&value)
        {
            return Err(ReturnTypeError {
                entry: self.name().to_owned(),
                expected: returns.to_string(),
                found: value.kind(),
            }
            .into());
        }
        Ok(Invocation::Ready(value))
    }

    /// Reject unknown keys, then values that do not fit their type.
    fn check_provided(&self, values: &Params) -> Result<(), ParamError> {
        let unexpected: Vec<String> = values
            .keys()
            .filter(|k| !self.def.signature.contains(k))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(ParamError::Unexpected {
                entry: self.name().to_owned(),
                params: unexpected,
                signature: self.describe(),
            });
        }

        for param in self.def.signature.params() {
            let (Some(value), Some(ty)) = (values.get(&param.name), &param.ty) else {
                continue;
            };
            if ty.accepts(value) {
                continue;
            }
            let hint = value.as_entry().map(|sub| {
                let required: Vec<String> = sub.required_params().iter().map(ToString::to_string).collect();
                format!(
                    "Check that the required params of entry '{}' are bound: ({})",
                    sub.name(),
                    required.join(", ")
                )
            });
            return Err(ParamError::TypeMismatch {
                entry: self.name().to_owned(),
                param: param.name.clone(),
                expected: ty.to_string(),
                found: value.kind(),
                hint,
            });
        }
        Ok(())
    }

    fn missing<'a>(&'a self, values: &Params) -> Vec<&'a ParamSpec> {
        self.def
            .signature
            .params()
            .iter()
            .filter(|p| !p.has_default() && !values.contains_key(&p.name))
            .collect()
    }

    fn missing_error(&self, values: &Params) -> ParamError {
        let param = self
            .missing(values)
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        ParamError::MissingRequired {
            entry: self.name().to_owned(),
            param,
        }
    }

    /// Render the signature, marking bound parameters with `[✓]`.
    #[must_use]
    pub fn describe(&self) -> String {
        let params = self.def.signature.params();
        let mut out = format!("{}(", self.name());
        for (i, param) in params.iter().enumerate() {
            let mark = if self.bound.contains_key(&param.name) {
                "[✓] "
            } else {
                "    "
            };
            out.push('\n');
            out.push_str(mark);
            out.push_str(&param.to_string());
            if i.saturating_add(1) < params.len() {
                out.push(',');
            }
        }
        out.push(')');
        if let Some(returns) = self.def.signature.returns() {
            out.push_str(" -> ");
            out.push_str(&returns.to_string());
        }
        out
    }

    /// Wrap into a [`Value`] for wiring into another entry.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Entry(Box::new(self))
    }
}

impl Clone for Entry {
    /// Keeps the current bindings except contexts, which start empty.
    fn clone(&self) -> Self {
        let mut bound = self.bound.clone();
        for param in self.def.signature.params() {
            if Self::takes_context(param) {
                bound.remove(&param.name);
            }
        }
        self.clone_with(bound)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.id == other.id && self.bound == other.bound
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("name", &self.def.name)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat() -> EntryDef {
        let sig = Signature::builder()
            .param("a", TypeSpec::Int)
            .param_with_default("b", TypeSpec::Str, "x")
            .returns(TypeSpec::Str)
            .build();
        EntryDef::new(
            "concat",
            sig,
            callable(|args| Ok(Value::from(format!("{}{}", args.int("a")?, args.str("b")?)))),
        )
        .with_doc("Concatenate a number and a suffix.")
    }

    fn entry() -> Entry {
        Entry::new(concat(), Params::new()).unwrap()
    }

    #[test]
    fn default_fills_missing_optional_param() {
        let out = entry().call(CallArgs::new().kwarg("a", 1)).unwrap();
        assert_eq!(out, Value::from("1x"));
    }

    #[test]
    fn unexpected_param_is_rejected() {
        let err = entry()
            .call(CallArgs::new().kwarg("a", 1).kwarg("c", 2))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::Unexpected { ref params, .. }) if params == &["c"]
        ));
    }

    #[test]
    fn missing_required_param_is_rejected() {
        let err = entry().call(CallArgs::new()).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::MissingRequired { ref param, .. }) if param == "a: int"
        ));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let err = entry().call(CallArgs::new().kwarg("a", "one")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::TypeMismatch { ref param, .. }) if param == "a"
        ));
    }

    #[test]
    fn partial_binding_matches_single_call() {
        let partial = entry().bind(Params::from([("a".to_owned(), Value::Int(1))])).unwrap();
        let staged = partial.call(CallArgs::new().kwarg("b", "y")).unwrap();
        let direct = entry()
            .call(CallArgs::new().kwarg("a", 1).kwarg("b", "y"))
            .unwrap();
        assert_eq!(staged, direct);
    }

    #[test]
    fn clones_bind_independently() {
        let original = entry();
        let left = original.bind(Params::from([("a".to_owned(), Value::Int(1))])).unwrap();
        let right = original.clone_with(Params::from([("a".to_owned(), Value::Int(2))]));
        assert_eq!(left.bound()["a"], Value::Int(1));
        assert_eq!(right.bound()["a"], Value::Int(2));
        assert!(original.bound().is_empty());
    }

    #[test]
    fn positional_args_fill_open_params_in_order() {
        let out = entry().call(CallArgs::new().arg(7)).unwrap();
        assert_eq!(out, Value::from("7x"));

        let err = entry().call(CallArgs::new().arg(1).arg(2)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::TooManyPositional { got: 2, .. })
        ));

        let err = entry()
            .call(CallArgs::new().arg(1).kwarg("a", 2))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::DuplicateBinding { .. })
        ));
    }

    #[test]
    fn deferred_invocation_returns_partial_entry() {
        let partial = entry()
            .invoke(CallArgs::new().kwarg("b", "z").deferred())
            .unwrap()
            .into_partial()
            .unwrap();
        assert_eq!(partial.bound()["b"], Value::from("z"));

        let keyword = entry()
            .invoke(CallArgs::new().kwarg(DEFER_KEY, true))
            .unwrap();
        assert!(!keyword.is_ready());

        let done = partial.invoke(CallArgs::new().kwarg("a", 3)).unwrap();
        assert_eq!(done.into_value(), Some(Value::from("3z")));
    }

    #[test]
    fn strict_call_ignores_deferral() {
        let err = entry().call(CallArgs::new().deferred()).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::MissingRequired { .. })
        ));
    }

    #[test]
    fn wrong_return_type_is_rejected() {
        let sig = Signature::builder().returns(TypeSpec::Int).build();
        let def = EntryDef::new("bad", sig, callable(|_| Ok(Value::from("nope"))))
            .with_doc("Returns the wrong thing.");
        let err = Entry::new(def, Params::new())
            .unwrap()
            .call(CallArgs::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::ReturnType(_)));
    }

    #[test]
    fn callable_failure_becomes_execution_error() {
        let sig = Signature::builder().returns(TypeSpec::None).build();
        let def = EntryDef::new("boom", sig, callable(|_| Err(anyhow!("kaput"))))
            .with_doc("Always fails.");
        let err = Entry::new(def, Params::new())
            .unwrap()
            .call(CallArgs::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Execution { ref message, .. } if message == "kaput"));
    }

    #[test]
    fn missing_documentation_is_rejected() {
        let def = concat().with_doc("  ");
        assert!(matches!(
            Entry::new(def, Params::new()),
            Err(DefinitionError::MissingDocumentation { .. })
        ));
    }

    #[test]
    fn context_param_gets_fresh_context_per_clone() {
        let sig = Signature::builder()
            .param("ctx", TypeSpec::Context)
            .returns(TypeSpec::Int)
            .build();
        let def = EntryDef::new(
            "count",
            sig,
            callable(|args| {
                let ctx = args.context("ctx")?;
                let next = ctx.get("n").and_then(|v| v.as_int()).unwrap_or(0).saturating_add(1);
                ctx.set("n", next);
                Ok(Value::Int(next))
            }),
        )
        .with_doc("Count invocations.");
        let counter = Entry::new(def, Params::new()).unwrap();
        assert!(counter.required_params().is_empty());
        assert_eq!(counter.call(CallArgs::new()).unwrap(), Value::Int(1));
        assert_eq!(counter.call(CallArgs::new()).unwrap(), Value::Int(2));
        assert_eq!(counter.clone().call(CallArgs::new()).unwrap(), Value::Int(1));
    }

    #[test]
    fn bound_context_is_kept() {
        let sig = Signature::builder()
            .param("ctx", TypeSpec::Context)
            .param("offset", TypeSpec::Int)
            .returns(TypeSpec::Int)
            .build();
        let def = EntryDef::new(
            "read",
            sig,
            callable(|args| {
                let ctx = args.context("ctx")?;
                let k = ctx.get("k").and_then(|v| v.as_int()).unwrap_or(-1);
                let offset = args.get("offset").and_then(Value::as_int).unwrap_or(0);
                Ok(Value::Int(k.saturating_add(offset)))
            }),
        )
        .with_doc("Read a key from the context.");
        let shared = Context::new();
        shared.set("k", 42);
        let bound = Params::from([("ctx".to_owned(), Value::Context(shared.clone()))]);

        let reader = Entry::new(def, bound.clone()).unwrap();
        assert_eq!(reader.call(CallArgs::new().arg(0)).unwrap(), Value::Int(42));
        assert_eq!(
            reader.clone_with(bound).call(CallArgs::new().arg(0)).unwrap(),
            Value::Int(42)
        );
        assert_eq!(reader.clone().call(CallArgs::new().arg(0)).unwrap(), Value::Int(-1));

        let other = Context::new();
        other.set("k", 7);
        let partial = reader
            .invoke(CallArgs::new().kwarg("ctx", Value::Context(other)).deferred())
            .unwrap()
            .into_partial()
            .unwrap();
        assert_eq!(partial.call(CallArgs::new().arg(1)).unwrap(), Value::Int(8));
    }

    #[test]
    fn entry_values_satisfy_callable_params() {
        let inner = entry();
        let sig = Signature::builder()
            .param("f", TypeSpec::parse("callable[[int], str]").unwrap())
            .returns(TypeSpec::Str)
            .build();
        let def = EntryDef::new(
            "apply",
            sig,
            callable(|args| Ok(args.entry("f")?.call(CallArgs::new().arg(5))?)),
        )
        .with_doc("Apply f to 5.");
        let apply = Entry::new(def, Params::new()).unwrap();
        let out = apply.call(CallArgs::new().kwarg("f", inner.clone())).unwrap();
        assert_eq!(out, Value::from("5x"));

        let bound = inner.bind(Params::from([("a".to_owned(), Value::Int(1))])).unwrap();
        let err = apply.call(CallArgs::new().kwarg("f", bound)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Param(ParamError::TypeMismatch { hint: Some(_), .. })
        ));
    }

    #[test]
    fn describe_marks_bound_params() {
        let partial = entry().bind(Params::from([("a".to_owned(), Value::Int(1))])).unwrap();
        assert_eq!(
            partial.describe(),
            "concat(\n[✓] a: int,\n    b: str = \"x\") -> str"
        );
    }

    #[test]
    fn entry_ids_order_and_parse() {
        let a = EntryId::new("a", "z");
        let b: EntryId = "b.a".parse().unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "b.a");
        assert!("nodot".parse::<EntryId>().is_err());
    }
}
