//! Type, method and field references
//!
//! References compare structurally: two `TypeRef`s naming the same type with
//! the same generic arguments are equal even when they were produced by
//! different lookups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeRefError {
    /// Empty type name
    #[error("Empty type name")]
    Empty,

    /// Unbalanced or misplaced generic brackets
    #[error("Unbalanced generic arguments in '{0}'")]
    Unbalanced(String),

    /// A generic argument list with an empty entry
    #[error("Empty generic argument in '{0}'")]
    EmptyArgument(String),
}

/// Reference to a (possibly generic) type, e.g. `App.Workers.Worker<App.Job>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeRef {
    /// Dotted namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
    /// Generic arguments, in declaration order
    pub generic_args: Vec<TypeRef>,
}

impl TypeRef {
    /// Create a non-generic type reference
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            generic_args: Vec::new(),
        }
    }

    /// Create a generic instantiation
    pub fn generic(
        namespace: impl Into<String>,
        name: impl Into<String>,
        generic_args: Vec<TypeRef>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            generic_args,
        }
    }

    /// Parse a dotted type name with optional `<...>` generic arguments
    pub fn parse(text: &str) -> Result<Self, TypeRefError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TypeRefError::Empty);
        }

        let (head, generic_args) = match text.find('<') {
            None => {
                if text.contains('>') {
                    return Err(TypeRefError::Unbalanced(text.to_string()));
                }
                (text, Vec::new())
            }
            Some(open) => {
                if !text.ends_with('>') {
                    return Err(TypeRefError::Unbalanced(text.to_string()));
                }
                let inner = &text[open + 1..text.len() - 1];
                let args = split_generic_args(inner, text)?
                    .into_iter()
                    .map(TypeRef::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                (&text[..open], args)
            }
        };

        let (namespace, name) = match head.rsplit_once('.') {
            Some((ns, name)) => (ns, name),
            None => ("", head),
        };
        if name.is_empty() {
            return Err(TypeRefError::Empty);
        }

        Ok(Self::generic(namespace, name, generic_args))
    }

    /// The `System.Void` type
    pub fn void() -> Self {
        Self::new("System", "Void")
    }

    /// The `System.Int32` type
    pub fn int32() -> Self {
        Self::new("System", "Int32")
    }

    /// The `System.Object` type
    pub fn object() -> Self {
        Self::new("System", "Object")
    }

    /// Whether this is `System.Void`
    pub fn is_void(&self) -> bool {
        self.namespace == "System" && self.name == "Void" && self.generic_args.is_empty()
    }

    /// Whether this is a generic instantiation
    pub fn is_generic(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Namespace-qualified name without generic arguments
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

fn split_generic_args<'a>(inner: &'a str, whole: &str) -> Result<Vec<&'a str>, TypeRefError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(TypeRefError::Unbalanced(whole.to_string()));
                }
            }
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TypeRefError::Unbalanced(whole.to_string()));
    }
    parts.push(&inner[start..]);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(TypeRefError::EmptyArgument(whole.to_string()));
    }
    Ok(parts)
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}.", self.namespace)?;
        }
        f.write_str(&self.name)?;
        if !self.generic_args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl FromStr for TypeRef {
    type Err = TypeRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeRef::parse(s)
    }
}

impl TryFrom<String> for TypeRef {
    type Error = TypeRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRef::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Reference to a method as it appears at a call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Type declaring the method
    pub declaring_type: TypeRef,
    /// Method name
    pub name: String,
    /// Whether the method takes an implicit receiver
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_this: bool,
    /// Parameter types, receiver excluded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeRef>,
    /// Return type
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    /// Generic method arguments of this instantiation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_args: Vec<TypeRef>,
}

impl MethodRef {
    /// Reference to a static method
    pub fn new_static(
        declaring_type: TypeRef,
        name: impl Into<String>,
        params: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            has_this: false,
            params,
            return_type,
            generic_args: Vec::new(),
        }
    }

    /// Reference to an instance method
    pub fn new_instance(
        declaring_type: TypeRef,
        name: impl Into<String>,
        params: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            has_this: true,
            ..Self::new_static(declaring_type, name, params, return_type)
        }
    }

    /// Attach generic method arguments
    pub fn with_generic_args(mut self, generic_args: Vec<TypeRef>) -> Self {
        self.generic_args = generic_args;
        self
    }

    /// Number of stack slots consumed by a call
    pub fn stack_inputs(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Number of stack slots produced by a call
    pub fn stack_outputs(&self) -> usize {
        usize::from(!self.return_type.is_void())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.return_type, self.declaring_type, self.name)?;
        if !self.generic_args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(">")?;
        }
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

/// Reference to a field as it appears at an access site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Type declaring the field
    pub declaring_type: TypeRef,
    /// Field name
    pub name: String,
    /// Static type of the stored value
    #[serde(rename = "type")]
    pub field_type: TypeRef,
    /// Whether the field is static
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_static: bool,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// A declared method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl Parameter {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A typed local variable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    /// Debug name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Local type
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl Local {
    /// Create an unnamed local
    pub fn new(ty: TypeRef) -> Self {
        Self { name: None, ty }
    }
}
