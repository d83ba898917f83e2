//! Dynamic values passed to and returned from entries.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::entry::Entry;

/// Open, string-keyed metadata attached to namespaces and entries
/// (author, version, backend, tags, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Deep-merge `overlay` into `base`. Nested objects merge key by key;
/// every other value in `overlay` replaces the one in `base`.
pub fn merge_metadata(base: &mut Metadata, overlay: &Metadata) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                merge_metadata(existing, incoming);
            },
            _ => {
                base.insert(key.clone(), value.clone());
            },
        }
    }
}

/// A value flowing through an entry invocation.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    None,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// A (possibly partially bound) entry, used to wire pipeline stages.
    Entry(Box<Entry>),
    /// Shared mutable scratch space handed to an entry.
    Context(Context),
    /// A host object produced by a native callable.
    Opaque(Opaque),
}

impl Value {
    /// Short name of the runtime kind, used in error messages.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::None => "none".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) => "int".to_owned(),
            Self::Float(_) => "float".to_owned(),
            Self::Str(_) => "str".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Map(_) => "dict".to_owned(),
            Self::Entry(e) => format!("entry '{}'", e.name()),
            Self::Context(_) => "context".to_owned(),
            Self::Opaque(o) => o.type_name().to_owned(),
        }
    }

    /// Whether this is [`Value::None`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The number as a float; integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The map, if this is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The entry, if this is one.
    #[must_use]
    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Self::Entry(e) => Some(e),
            _ => None,
        }
    }

    /// The context, if this is one.
    #[must_use]
    pub fn as_context(&self) -> Option<&Context> {
        match self {
            Self::Context(c) => Some(c),
            _ => None,
        }
    }

    /// Downcast an opaque host object.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(o) => o.downcast_ref(),
            _ => None,
        }
    }

    /// Convert JSON-shaped data (as produced by TOML or YAML
    /// deserialization) into a value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::None),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            },
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Entry(a), Self::Entry(b)) => a == b,
            (Self::Context(a), Self::Context(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            },
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            },
            Self::Entry(e) => write!(f, "<entry {}>", e.name()),
            Self::Context(_) => f.write_str("<context>"),
            Self::Opaque(o) => write!(f, "<{}>", o.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<Entry> for Value {
    fn from(entry: Entry) -> Self {
        Self::Entry(Box::new(entry))
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        Self::Context(ctx)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Self::Opaque(o)
    }
}

/// Shared, mutable, string-keyed scratch space.
///
/// An entry declaring a `context` parameter without a default or a bound
/// value receives a fresh, empty context when it is constructed or cloned. Clones of a
/// `Context` handle share the same storage.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl Context {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock().insert(key.into(), value.into())
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Whether both handles share the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("keys", &self.keys()).finish()
    }
}

/// A host object carried through the registry under a declared type name.
///
/// Type constraints refer to opaque objects by that name, e.g. a parameter
/// typed `Optimizer` accepts `Opaque::new("Optimizer", sgd)`.
#[derive(Clone)]
pub struct Opaque {
    type_name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    /// Wrap `value` under `type_name`.
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: Arc::from(type_name.into()),
            inner: Arc::new(value),
        }
    }

    /// The declared type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the wrapped object as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Whether both handles wrap the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_conversion_keeps_shape() {
        let json = serde_json::json!({"lr": 0.1, "epochs": 3, "tags": ["a", "b"], "x": null});
        let value = Value::from_json(&json);
        let map = value.as_map().unwrap();
        assert_eq!(map["lr"], Value::Float(0.1));
        assert_eq!(map["epochs"], Value::Int(3));
        assert_eq!(map["tags"], Value::List(vec!["a".into(), "b".into()]));
        assert!(map["x"].is_none());
    }

    #[test]
    fn ints_widen_to_float() {
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::Str("2".into()).as_float(), None);
    }

    #[test]
    fn context_clones_share_storage() {
        let ctx = Context::new();
        let alias = ctx.clone();
        alias.set("step", 3);
        assert_eq!(ctx.get("step"), Some(Value::Int(3)));
        assert!(ctx.ptr_eq(&alias));
        assert!(!ctx.ptr_eq(&Context::new()));
    }

    #[test]
    fn opaque_downcasts_to_wrapped_type() {
        #[derive(Debug, PartialEq)]
        struct Sgd {
            lr: f64,
        }
        let value = Value::from(Opaque::new("Optimizer", Sgd { lr: 0.5 }));
        assert_eq!(value.kind(), "Optimizer");
        assert_eq!(value.downcast_ref::<Sgd>(), Some(&Sgd { lr: 0.5 }));
        assert_eq!(value.downcast_ref::<String>(), None);
    }

    #[test]
    fn metadata_merges_nested_objects() {
        let mut base = serde_json::json!({"author": "a", "extra": {"x": 1}})
            .as_object()
            .cloned()
            .unwrap();
        let overlay = serde_json::json!({"version": "2", "extra": {"y": 2}})
            .as_object()
            .cloned()
            .unwrap();
        merge_metadata(&mut base, &overlay);
        assert_eq!(
            serde_json::Value::Object(base),
            serde_json::json!({"author": "a", "version": "2", "extra": {"x": 1, "y": 2}})
        );
    }

    #[test]
    fn display_renders_nested_values() {
        let value = Value::List(vec![Value::Str("a".into()), Value::Float(1.0), Value::None]);
        assert_eq!(value.to_string(), r#"["a", 1.0, none]"#);
    }
}
