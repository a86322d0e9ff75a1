//! Module format
//!
//! A module is the unit the rewrite passes run over. It is stored as JSON:
//!
//! ```json
//! {
//!   "name": "App",
//!   "types": [
//!     {
//!       "name": "App.Program",
//!       "methods": [
//!         { "name": "Main", "is_static": true, "return_type": "System.Int32",
//!           "body": { "instructions": [ { "op": "ldc.i4", "operand": { "i32": 0 } },
//!                                       { "op": "ret" } ] } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::body::MethodBody;
use crate::types::{MethodRef, Parameter, TypeRef};

/// Module loading errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Malformed JSON
    #[error("Invalid module JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Two type definitions with the same name
    #[error("Duplicate type definition: {0}")]
    DuplicateType(String),
}

/// Kind of type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Reference type
    #[default]
    Class,
    /// Value type
    Struct,
    /// Interface
    Interface,
    /// Delegate type
    Delegate,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// Whether the field is static
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_static: bool,
}

/// Method definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Whether the method has no receiver
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_static: bool,
    /// Declared parameters, receiver excluded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Parameter>,
    /// Return type
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    /// Method body; `None` for abstract, interface and extern methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Create a method definition without body
    pub fn new(name: impl Into<String>, is_static: bool, params: Vec<Parameter>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            is_static,
            params,
            return_type,
            body: None,
        }
    }

    /// Attach a body, aligning its receiver flag with this definition
    pub fn with_body(mut self, mut body: MethodBody) -> Self {
        body.set_has_this(!self.is_static);
        self.body = Some(body);
        self
    }

    /// Call-site reference to this method
    pub fn method_ref(&self, declaring_type: &TypeRef) -> MethodRef {
        MethodRef {
            declaring_type: declaring_type.clone(),
            name: self.name.clone(),
            has_this: !self.is_static,
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            return_type: self.return_type.clone(),
            generic_args: Vec::new(),
        }
    }

    /// Check if this definition can be the target of `method`
    pub fn matches(&self, method: &MethodRef) -> bool {
        self.name == method.name
            && self.params.len() == method.params.len()
            && self.params.iter().zip(&method.params).all(|(p, t)| &p.ty == t)
    }
}

/// Type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Type name
    #[serde(rename = "name")]
    pub ty: TypeRef,
    /// Kind of type
    #[serde(default)]
    pub kind: TypeKind,
    /// Native call signature for delegate types exposed as native callbacks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_signature: Option<String>,
    /// Field definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDef>,
    /// Method definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Create an empty type definition
    pub fn new(ty: TypeRef, kind: TypeKind) -> Self {
        Self {
            ty,
            kind,
            native_signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Find a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Find a static method by name
    pub fn static_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.is_static && m.name == name)
    }
}

/// A managed module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Type definitions
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// Parse a module from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ModuleError> {
        let mut module: Module = serde_json::from_str(json)?;
        module.validate()?;
        module.link();
        Ok(module)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ModuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), ModuleError> {
        let mut seen = FxHashSet::default();
        for def in &self.types {
            if !seen.insert(&def.ty) {
                return Err(ModuleError::DuplicateType(def.ty.to_string()));
            }
        }
        Ok(())
    }

    /// Propagate method-level facts into bodies
    pub fn link(&mut self) {
        for def in &mut self.types {
            for method in &mut def.methods {
                let has_this = !method.is_static;
                if let Some(body) = method.body.as_mut() {
                    body.set_has_this(has_this);
                }
            }
        }
    }

    /// Find a type definition
    pub fn find_type(&self, ty: &TypeRef) -> Option<&TypeDef> {
        self.types.iter().find(|def| &def.ty == ty)
    }

    /// Resolve a call-site reference to its definition
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&MethodDef> {
        self.find_type(&method.declaring_type)?
            .methods
            .iter()
            .find(|def| def.matches(method))
    }

    /// Iterate every method definition with its declaring type
    pub fn methods(&self) -> impl Iterator<Item = (&TypeDef, &MethodDef)> + '_ {
        self.types
            .iter()
            .flat_map(|def| def.methods.iter().map(move |m| (def, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Instruction;
    use crate::opcode::Opcode;

    const SAMPLE: &str = r#"{
        "name": "App",
        "types": [
            {
                "name": "App.Program",
                "methods": [
                    {
                        "name": "Main",
                        "is_static": true,
                        "return_type": "System.Int32",
                        "body": {
                            "instructions": [
                                { "op": "ldc.i4", "operand": { "i32": 0 } },
                                { "op": "ret" }
                            ]
                        }
                    },
                    {
                        "name": "Run",
                        "params": [ { "name": "count", "type": "System.Int32" } ],
                        "body": { "instructions": [ { "op": "ret" } ] }
                    }
                ]
            },
            { "name": "App.ICallback", "kind": "interface" }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let module = Module::from_json(SAMPLE).unwrap();
        assert_eq!(module.name, "App");
        assert_eq!(module.types.len(), 2);

        let program = module.find_type(&TypeRef::new("App", "Program")).unwrap();
        let main = program.static_method("Main").unwrap();
        assert_eq!(main.return_type, TypeRef::int32());
        assert!(!main.body.as_ref().unwrap().has_this());

        let run = program.method("Run").unwrap();
        assert!(run.body.as_ref().unwrap().has_this());
        assert_eq!(run.return_type, TypeRef::void());

        let iface = module.find_type(&TypeRef::new("App", "ICallback")).unwrap();
        assert_eq!(iface.kind, TypeKind::Interface);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let json = r#"{ "name": "M", "types": [ { "name": "A.B" }, { "name": "A.B" } ] }"#;
        assert!(matches!(Module::from_json(json), Err(ModuleError::DuplicateType(_))));
    }

    #[test]
    fn test_resolve_method() {
        let module = Module::from_json(SAMPLE).unwrap();
        let program = TypeRef::new("App", "Program");
        let run = MethodRef::new_instance(program.clone(), "Run", vec![TypeRef::int32()], TypeRef::void());
        assert_eq!(module.resolve_method(&run).unwrap().name, "Run");

        let wrong_arity = MethodRef::new_instance(program, "Run", vec![], TypeRef::void());
        assert!(module.resolve_method(&wrong_arity).is_none());
    }

    #[test]
    fn test_json_roundtrip_keeps_bodies() {
        let mut module = Module::new("M");
        let mut def = TypeDef::new(TypeRef::new("M", "T"), TypeKind::Class);
        def.methods.push(
            MethodDef::new("F", true, vec![], TypeRef::void()).with_body(MethodBody::from_instructions(
                false,
                vec![Instruction::simple(Opcode::Nop), Instruction::simple(Opcode::Ret)],
            )),
        );
        module.types.push(def);

        let back = Module::from_json(&module.to_json().unwrap()).unwrap();
        let body = back.types[0].methods[0].body.as_ref().unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body.instructions()[1].opcode, Opcode::Ret);
    }
}
