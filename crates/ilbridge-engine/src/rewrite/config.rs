//! Rewrite pass configuration, loaded from `[rewrite]` in `ilbridge.toml`.

use ilbridge_bytecode::TypeRef;
use serde::{Deserialize, Serialize};

/// The lookup operation whose generic argument names a worker type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFactory {
    /// Type declaring the lookup method
    pub declaring_type: TypeRef,
    /// Lookup method name; every overload with this name matches
    pub method: String,
}

impl WorkerFactory {
    /// Create a factory description
    pub fn new(declaring_type: TypeRef, method: impl Into<String>) -> Self {
        Self {
            declaring_type,
            method: method.into(),
        }
    }
}

impl Default for WorkerFactory {
    fn default() -> Self {
        Self::new(TypeRef::new("Runtime.Workers", "WorkerHost"), "GetWorker")
    }
}

fn default_verify() -> bool {
    true
}

/// Configuration for the rewrite pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Worker factory lookup (default: `Runtime.Workers.WorkerHost::GetWorker`)
    #[serde(default)]
    pub worker_factory: WorkerFactory,

    /// Run the stack verifier over the module after the pass (default: true)
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            worker_factory: WorkerFactory::default(),
            verify: default_verify(),
        }
    }
}

impl RewriteConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable post-pass verification
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}
