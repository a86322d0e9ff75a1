//! Rule: worker-types
//!
//! Read-only. Collects the type argument of every call to the configured
//! worker factory lookup, e.g. `WorkerHost.GetWorker<App.Indexer>(key)`, so
//! the native host can instantiate each worker type ahead of time.

use indexmap::IndexSet;
use ilbridge_bytecode::{InstrId, MethodRef, TypeRef};

use crate::rewrite::config::WorkerFactory;
use crate::rewrite::error::RewriteError;
use crate::rewrite::rule::{RewriteContext, RewriteRule};

/// Collects worker types in first-seen order.
pub struct WorkerTypeCollector {
    factory: WorkerFactory,
    types: IndexSet<TypeRef>,
}

impl WorkerTypeCollector {
    /// Create a collector for calls to `factory`.
    pub fn new(factory: WorkerFactory) -> Self {
        Self {
            factory,
            types: IndexSet::new(),
        }
    }

    /// Worker types found so far.
    pub fn types(&self) -> &IndexSet<TypeRef> {
        &self.types
    }

    /// Consume the collector, returning the worker types.
    pub fn into_types(self) -> IndexSet<TypeRef> {
        self.types
    }

    fn is_factory(&self, method: &MethodRef) -> bool {
        method.name == self.factory.method
            && method.declaring_type.namespace == self.factory.declaring_type.namespace
            && method.declaring_type.name == self.factory.declaring_type.name
    }
}

impl RewriteRule for WorkerTypeCollector {
    fn name(&self) -> &'static str {
        "worker-types"
    }

    fn call(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, method: &MethodRef) -> Result<(), RewriteError> {
        if !self.is_factory(method) {
            return Ok(());
        }
        let [worker] = method.generic_args.as_slice() else {
            return Err(RewriteError::WorkerArity {
                method: ctx.method_name(),
                lookup: method.to_string(),
                count: method.generic_args.len(),
            });
        };
        if self.types.insert(worker.clone()) {
            tracing::debug!(method = %ctx.method_name(), %at, "worker type {}", worker);
        }
        Ok(())
    }
}
