//! Registries injected into the rewrite rules.
//!
//! [`TypeRewriteRegistry`] decides which types are resolved statically and
//! which adapter class stands in for an interface. [`CallbackRegistry`]
//! hands out integer handles for native-exported methods.

use ilbridge_bytecode::{MethodRef, TypeRef};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Type designations consumed by the interface-call rewriter
pub trait TypeRewriteRegistry {
    /// Check if values of `ty` are elided and calls on it retargeted
    fn should_rewrite(&self, ty: &TypeRef) -> bool;

    /// Adapter class whose static methods implement `interface`
    fn find_class_for_interface(&self, interface: &TypeRef) -> Option<TypeRef>;
}

/// Build-time table of rewritten types and interface adapters.
///
/// Deserializes from `{ "rewrite": [type, ...], "adapters": { interface: adapter } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticTypeRegistry {
    #[serde(default)]
    rewrite: FxHashSet<TypeRef>,
    #[serde(default)]
    adapters: FxHashMap<TypeRef, TypeRef>,
}

impl StaticTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a registry from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut registry: StaticTypeRegistry = serde_json::from_str(json)?;
        let interfaces: Vec<TypeRef> = registry.adapters.keys().cloned().collect();
        registry.rewrite.extend(interfaces);
        Ok(registry)
    }

    /// Mark `ty` for rewriting
    pub fn rewrite(&mut self, ty: TypeRef) -> &mut Self {
        self.rewrite.insert(ty);
        self
    }

    /// Map `interface` to `adapter`; the interface is also marked for rewriting
    pub fn adapter(&mut self, interface: TypeRef, adapter: TypeRef) -> &mut Self {
        self.rewrite.insert(interface.clone());
        self.adapters.insert(interface, adapter);
        self
    }

    /// Number of adapter mappings
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }
}

impl TypeRewriteRegistry for StaticTypeRegistry {
    fn should_rewrite(&self, ty: &TypeRef) -> bool {
        self.rewrite.contains(ty)
    }

    fn find_class_for_interface(&self, interface: &TypeRef) -> Option<TypeRef> {
        self.adapters.get(interface).cloned()
    }
}

/// Handle assignment for native-exported callback targets
pub trait CallbackRegistry {
    /// Register `method` under the native `signature`, returning its handle
    fn add_method(&mut self, signature: &str, method: &MethodRef) -> u32;
}

/// One registered callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackEntry {
    /// Handle, equal to the entry's position in the table
    pub handle: u32,
    /// Native call signature template
    pub signature: String,
    /// Target method
    pub method: MethodRef,
}

/// Default callback registry: dense zero-based handles in registration order.
///
/// Registering the same method twice yields two handles.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CallbackTable {
    entries: Vec<CallbackEntry>,
}

impl CallbackTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered callbacks, ordered by handle
    pub fn entries(&self) -> &[CallbackEntry] {
        &self.entries
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CallbackRegistry for CallbackTable {
    fn add_method(&mut self, signature: &str, method: &MethodRef) -> u32 {
        let handle = self.entries.len() as u32;
        self.entries.push(CallbackEntry {
            handle,
            signature: signature.to_string(),
            method: method.clone(),
        });
        handle
    }
}
