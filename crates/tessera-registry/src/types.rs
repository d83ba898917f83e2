//! Type constraints for entry parameters and return values.
//!
//! Constraints are written as text in unit files and parsed into a
//! [`TypeSpec`]:
//!
//! ```text
//! any  none  bool  int  float  str  context
//! list[T]  dict[T]  optional[T]  A | B
//! callable[[A, B], R]   callable[..., R]   callable
//! Optimizer            (any other identifier names an opaque host type)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::value::Value;

/// A parsed type constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    /// Matches every value.
    Any,
    /// Matches only [`Value::None`].
    None,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Float; integers are accepted too.
    Float,
    /// String.
    Str,
    /// List whose items all match the inner type.
    List(Box<TypeSpec>),
    /// String-keyed map whose values all match the inner type.
    Dict(Box<TypeSpec>),
    /// `none` or the inner type.
    Optional(Box<TypeSpec>),
    /// Any one of the member types.
    Union(Vec<TypeSpec>),
    /// An entry with a compatible interface. `params` of `None` accepts
    /// any parameter list.
    Callable {
        /// Types of the parameters the entry still requires, in order.
        params: Option<Vec<TypeSpec>>,
        /// Return type the entry must produce.
        returns: Box<TypeSpec>,
    },
    /// The context-object capability.
    Context,
    /// An opaque host type, matched by name.
    Named(String),
}

/// A type constraint that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type '{spec}': {message}")]
pub struct TypeParseError {
    /// The offending text.
    pub spec: String,
    /// What went wrong.
    pub message: String,
}

impl TypeSpec {
    /// Parse a type constraint.
    ///
    /// # Errors
    ///
    /// Returns a [`TypeParseError`] on malformed input.
    pub fn parse(spec: &str) -> Result<Self, TypeParseError> {
        let mut parser = Parser {
            src: spec,
            pos: 0,
            depth: 0,
        };
        let ty = parser.union()?;
        parser.skip_ws();
        if parser.pos < spec.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }

    /// Whether `value` satisfies this constraint.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _)
            | (Self::None, Value::None)
            | (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_) | Value::Int(_))
            | (Self::Str, Value::Str(_))
            | (Self::Context, Value::Context(_)) => true,
            (Self::List(inner), Value::List(items)) => items.iter().all(|v| inner.accepts(v)),
            (Self::Dict(inner), Value::Map(map)) => map.values().all(|v| inner.accepts(v)),
            (Self::Optional(inner), v) => v.is_none() || inner.accepts(v),
            (Self::Union(members), v) => members.iter().any(|m| m.accepts(v)),
            (Self::Callable { params, returns }, Value::Entry(entry)) => {
                let Some(entry_returns) = entry.signature().returns() else {
                    return false;
                };
                if !entry_returns.is_assignable_to(returns) {
                    return false;
                }
                let Some(expected) = params else {
                    return true;
                };
                let required = entry.required_params();
                required.len() == expected.len()
                    && required.iter().zip(expected).all(|(param, given)| {
                        param.ty.as_ref().is_some_and(|ty| given.is_assignable_to(ty))
                    })
            },
            (Self::Named(name), Value::Opaque(o)) => o.type_name() == name,
            _ => false,
        }
    }

    /// Whether every value of type `self` also satisfies `target`.
    #[must_use]
    pub fn is_assignable_to(&self, target: &Self) -> bool {
        if self == target || matches!(target, Self::Any) {
            return true;
        }
        match (self, target) {
            (Self::Union(members), _) => members.iter().all(|m| m.is_assignable_to(target)),
            (_, Self::Union(members)) => members.iter().any(|m| self.is_assignable_to(m)),
            (Self::Optional(inner), Self::Optional(t)) => inner.is_assignable_to(t),
            (Self::None, Self::Optional(_)) | (Self::Int, Self::Float) => true,
            (_, Self::Optional(t)) => self.is_assignable_to(t),
            (Self::List(a), Self::List(b)) | (Self::Dict(a), Self::Dict(b)) => a.is_assignable_to(b),
            (
                Self::Callable {
                    params: own_params,
                    returns: own_returns,
                },
                Self::Callable { params, returns },
            ) => {
                if !own_returns.is_assignable_to(returns) {
                    return false;
                }
                match (own_params, params) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(own), Some(wanted)) => {
                        own.len() == wanted.len()
                            && own.iter().zip(wanted).all(|(o, w)| w.is_assignable_to(o))
                    },
                }
            },
            _ => false,
        }
    }
}

impl FromStr for TypeSpec {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::None => f.write_str("none"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::Context => f.write_str("context"),
            Self::List(inner) => write!(f, "list[{inner}]"),
            Self::Dict(inner) => write!(f, "dict[{inner}]"),
            Self::Optional(inner) => write!(f, "optional[{inner}]"),
            Self::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            },
            Self::Callable { params, returns } => {
                f.write_str("callable[")?;
                match params {
                    None => f.write_str("...")?,
                    Some(params) => {
                        f.write_str("[")?;
                        for (i, p) in params.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{p}")?;
                        }
                        f.write_str("]")?;
                    },
                }
                write!(f, ", {returns}]")
            },
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Deepest nesting of bracketed types the parser accepts.
pub const MAX_TYPE_DEPTH: usize = 32;

/// Recursive-descent parser over the constraint grammar.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> TypeParseError {
        TypeParseError {
            spec: self.src.to_owned(),
            message: format!("{message} at offset {}", self.pos),
        }
    }

    fn rest(&self) -> &str {
        self.src.get(self.pos..).unwrap_or_default()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos = self.pos.saturating_add(rest.len().saturating_sub(trimmed.len()));
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos = self.pos.saturating_add(token.len());
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), TypeParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{token}'")))
        }
    }

    fn ident(&mut self) -> Result<&str, TypeParseError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_alphabetic() || c == '_' || (i > 0 && (c.is_ascii_digit() || c == '.')))
            })
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        let start = self.pos;
        self.pos = self.pos.saturating_add(len);
        Ok(self.src.get(start..self.pos).unwrap_or_default())
    }

    fn union(&mut self) -> Result<TypeSpec, TypeParseError> {
        if self.depth >= MAX_TYPE_DEPTH {
            return Err(self.error(&format!("nesting deeper than {MAX_TYPE_DEPTH}")));
        }
        self.depth = self.depth.saturating_add(1);
        let result = self.union_members();
        self.depth = self.depth.saturating_sub(1);
        result
    }

    fn union_members(&mut self) -> Result<TypeSpec, TypeParseError> {
        let mut members = vec![self.primary()?];
        while self.eat("|") {
            members.push(self.primary()?);
        }
        if members.len() == 1 {
            Ok(members.remove(0))
        } else {
            Ok(TypeSpec::Union(members))
        }
    }

    fn bracketed(&mut self) -> Result<Option<TypeSpec>, TypeParseError> {
        if !self.eat("[") {
            return Ok(None);
        }
        let inner = self.union()?;
        self.expect("]")?;
        Ok(Some(inner))
    }

    fn primary(&mut self) -> Result<TypeSpec, TypeParseError> {
        let name = self.ident()?.to_owned();
        let boxed = |inner: Option<TypeSpec>| Box::new(inner.unwrap_or(TypeSpec::Any));
        let ty = match name.as_str() {
            "any" => TypeSpec::Any,
            "none" => TypeSpec::None,
            "bool" => TypeSpec::Bool,
            "int" => TypeSpec::Int,
            "float" => TypeSpec::Float,
            "str" => TypeSpec::Str,
            "context" => TypeSpec::Context,
            "list" => TypeSpec::List(boxed(self.bracketed()?)),
            "dict" => TypeSpec::Dict(boxed(self.bracketed()?)),
            "optional" => match self.bracketed()? {
                Some(inner) => TypeSpec::Optional(Box::new(inner)),
                None => return Err(self.error("optional requires an inner type")),
            },
            "callable" => self.callable()?,
            _ => TypeSpec::Named(name),
        };
        Ok(ty)
    }

    fn callable(&mut self) -> Result<TypeSpec, TypeParseError> {
        if !self.eat("[") {
            return Ok(TypeSpec::Callable {
                params: None,
                returns: Box::new(TypeSpec::Any),
            });
        }
        let params = if self.eat("...") {
            None
        } else {
            self.expect("[")?;
            let mut params = Vec::new();
            if !self.eat("]") {
                loop {
                    params.push(self.union()?);
                    if self.eat("]") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            Some(params)
        };
        self.expect(",")?;
        let returns = self.union()?;
        self.expect("]")?;
        Ok(TypeSpec::Callable {
            params,
            returns: Box::new(returns),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> TypeSpec {
        TypeSpec::parse(s).unwrap()
    }

    #[test]
    fn parses_builtin_and_nested_types() {
        assert_eq!(ty("int"), TypeSpec::Int);
        assert_eq!(ty("list[str]"), TypeSpec::List(Box::new(TypeSpec::Str)));
        assert_eq!(ty("list"), TypeSpec::List(Box::new(TypeSpec::Any)));
        assert_eq!(
            ty("optional[dict[float]]"),
            TypeSpec::Optional(Box::new(TypeSpec::Dict(Box::new(TypeSpec::Float))))
        );
        assert_eq!(
            ty("int | str"),
            TypeSpec::Union(vec![TypeSpec::Int, TypeSpec::Str])
        );
        assert_eq!(ty("Optimizer"), TypeSpec::Named("Optimizer".into()));
    }

    #[test]
    fn parses_callable_forms() {
        assert_eq!(
            ty("callable[[int, str], float]"),
            TypeSpec::Callable {
                params: Some(vec![TypeSpec::Int, TypeSpec::Str]),
                returns: Box::new(TypeSpec::Float),
            }
        );
        assert_eq!(
            ty("callable[[], none]"),
            TypeSpec::Callable {
                params: Some(vec![]),
                returns: Box::new(TypeSpec::None),
            }
        );
        assert_eq!(
            ty("callable[..., Model]"),
            TypeSpec::Callable {
                params: None,
                returns: Box::new(TypeSpec::Named("Model".into())),
            }
        );
    }

    #[test]
    fn display_round_trips() {
        for s in [
            "int",
            "list[optional[str]]",
            "int | float",
            "callable[[int], str]",
            "callable[..., any]",
            "dict[Model]",
        ] {
            assert_eq!(ty(s).to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(TypeSpec::parse("").is_err());
        assert!(TypeSpec::parse("list[int").is_err());
        assert!(TypeSpec::parse("optional").is_err());
        assert!(TypeSpec::parse("int str").is_err());
        assert!(TypeSpec::parse("callable[int, str]").is_err());
    }

    #[test]
    fn rejects_runaway_nesting() {
        let nested = |depth: usize| format!("{}int{}", "list[".repeat(depth), "]".repeat(depth));
        assert!(TypeSpec::parse(&nested(MAX_TYPE_DEPTH - 1)).is_ok());

        let err = TypeSpec::parse(&nested(10_000)).unwrap_err();
        assert!(err.message.contains("nesting deeper than"));
    }

    #[test]
    fn accepts_matching_values() {
        assert!(ty("float").accepts(&Value::Int(1)));
        assert!(!ty("int").accepts(&Value::Float(1.0)));
        assert!(ty("optional[str]").accepts(&Value::None));
        assert!(ty("list[int]").accepts(&Value::List(vec![Value::Int(1), Value::Int(2)])));
        assert!(!ty("list[int]").accepts(&Value::List(vec![Value::Str("x".into())])));
        assert!(ty("int | str").accepts(&Value::Str("x".into())));
        assert!(ty("any").accepts(&Value::None));
    }

    #[test]
    fn assignability() {
        assert!(ty("int").is_assignable_to(&ty("float")));
        assert!(ty("int").is_assignable_to(&ty("optional[int]")));
        assert!(ty("int | none").is_assignable_to(&ty("optional[int]")));
        assert!(!ty("float").is_assignable_to(&ty("int")));
        assert!(ty("list[int]").is_assignable_to(&ty("list[float]")));
        assert!(ty("callable[[float], int]").is_assignable_to(&ty("callable[[int], float]")));
        assert!(!ty("callable[[int], int]").is_assignable_to(&ty("callable[[float], int]")));
    }
}
