//! Parameter descriptors and signatures.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::DefinitionError;
use crate::types::TypeSpec;
use crate::value::Value;

/// Keyword that switches an invocation to deferred resolution. It can
/// never be declared as a parameter.
pub const DEFER_KEY: &str = "_defer";

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type; `None` means the declaration omitted it, which is a
    /// definition error.
    pub ty: Option<TypeSpec>,
    /// Default value, if any.
    pub default: Option<Value>,
}

impl ParamSpec {
    /// A required, typed parameter.
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            default: None,
        }
    }

    /// A parameter declared without a type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    /// Attach a default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether the parameter has a default.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(ty) = &self.ty {
            write!(f, ": {ty}")?;
        }
        if let Some(default) = &self.default {
            write!(f, " = {default}")?;
        }
        Ok(())
    }
}

/// Ordered parameters plus the return type of a callable.
///
/// Built once per callable and shared by every clone of its entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    params: Vec<ParamSpec>,
    returns: Option<TypeSpec>,
}

impl Signature {
    /// A signature from its parts.
    #[must_use]
    pub fn new(params: Vec<ParamSpec>, returns: Option<TypeSpec>) -> Self {
        Self { params, returns }
    }

    /// Start building a signature.
    #[must_use]
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// Parameters in call order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Whether a parameter named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Declared return type.
    #[must_use]
    pub fn returns(&self) -> Option<&TypeSpec> {
        self.returns.as_ref()
    }

    /// Check the definition invariants for the callable named `entry`.
    pub(crate) fn validate(&self, entry: &str) -> Result<(), DefinitionError> {
        let mut seen = BTreeSet::new();
        for param in &self.params {
            if param.name == DEFER_KEY {
                return Err(DefinitionError::ReservedParam {
                    entry: entry.to_owned(),
                    param: param.name.clone(),
                });
            }
            if !seen.insert(param.name.as_str()) {
                return Err(DefinitionError::DuplicateParam {
                    entry: entry.to_owned(),
                    param: param.name.clone(),
                });
            }
            let Some(ty) = &param.ty else {
                return Err(DefinitionError::UnannotatedParam {
                    entry: entry.to_owned(),
                    param: param.name.clone(),
                });
            };
            if let Some(default) = &param.default
                && !ty.accepts(default)
            {
                return Err(DefinitionError::IncompatibleDefault {
                    entry: entry.to_owned(),
                    param: param.to_string(),
                    expected: ty.to_string(),
                    found: default.kind(),
                });
            }
        }

        if self.returns.is_none() {
            return Err(DefinitionError::MissingReturnType {
                entry: entry.to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")?;
        if let Some(returns) = &self.returns {
            write!(f, " -> {returns}")?;
        }
        Ok(())
    }
}

/// Fluent construction of a [`Signature`].
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    params: Vec<ParamSpec>,
    returns: Option<TypeSpec>,
}

impl SignatureBuilder {
    /// Append a required parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: TypeSpec) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Append a parameter with a default.
    #[must_use]
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeSpec,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec::new(name, ty).with_default(default));
        self
    }

    /// Append an already built descriptor.
    #[must_use]
    pub fn push(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Declare the return type.
    #[must_use]
    pub fn returns(mut self, ty: TypeSpec) -> Self {
        self.returns = Some(ty);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Signature {
        Signature::new(self.params, self.returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_types_and_defaults() {
        let sig = Signature::builder()
            .param("a", TypeSpec::Int)
            .param_with_default("b", TypeSpec::Str, "x")
            .returns(TypeSpec::Str)
            .build();
        assert_eq!(sig.to_string(), r#"(a: int, b: str = "x") -> str"#);
    }

    #[test]
    fn untyped_param_is_rejected() {
        let sig = Signature::builder()
            .push(ParamSpec::untyped("a"))
            .returns(TypeSpec::Int)
            .build();
        assert!(matches!(
            sig.validate("f"),
            Err(DefinitionError::UnannotatedParam { param, .. }) if param == "a"
        ));
    }

    #[test]
    fn incompatible_default_is_rejected() {
        let sig = Signature::builder()
            .param_with_default("n", TypeSpec::Int, "three")
            .returns(TypeSpec::Int)
            .build();
        assert!(matches!(
            sig.validate("f"),
            Err(DefinitionError::IncompatibleDefault { .. })
        ));
    }

    #[test]
    fn missing_return_type_is_rejected() {
        let sig = Signature::builder().param("a", TypeSpec::Int).build();
        assert!(matches!(
            sig.validate("f"),
            Err(DefinitionError::MissingReturnType { .. })
        ));
    }

    #[test]
    fn duplicate_and_reserved_names_are_rejected() {
        let dup = Signature::builder()
            .param("a", TypeSpec::Int)
            .param("a", TypeSpec::Str)
            .returns(TypeSpec::None)
            .build();
        assert!(matches!(
            dup.validate("f"),
            Err(DefinitionError::DuplicateParam { .. })
        ));

        let reserved = Signature::builder()
            .param(DEFER_KEY, TypeSpec::Bool)
            .returns(TypeSpec::None)
            .build();
        assert!(matches!(
            reserved.validate("f"),
            Err(DefinitionError::ReservedParam { .. })
        ));
    }
}
