//! Rule: callback-handle
//!
//! Native code cannot call back through a managed delegate, so delegates
//! whose type carries a native call signature are replaced by an integer
//! handle into the native callback table. The recognized idiom is
//!
//! ```text
//! <receiver load>      ldnull | ldarg* | ldloc* | ldsfld
//! ldftn   Target
//! newobj  Delegate::.ctor
//! ```
//!
//! which becomes `ldc.i4 <handle>`. Any other shape is left alone.

use ilbridge_bytecode::{InstrId, Instruction, MethodRef, Opcode};

use crate::rewrite::error::RewriteError;
use crate::rewrite::registry::CallbackRegistry;
use crate::rewrite::rule::{RewriteContext, RewriteRule};

/// Replaces native-callback delegate construction with handle loads.
pub struct CallbackHandleRewriter<R> {
    registry: R,
}

impl<R: CallbackRegistry> CallbackHandleRewriter<R> {
    /// Create the rule over `registry`.
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// The injected registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Consume the rule, returning the registry.
    pub fn into_registry(self) -> R {
        self.registry
    }
}

/// Ids of the receiver load and `ldftn` preceding `at`, with the target.
fn match_idiom(ctx: &RewriteContext<'_>, at: InstrId) -> Option<(InstrId, InstrId, MethodRef)> {
    let (ftn, ldftn) = ctx.previous(at)?;
    if ldftn.opcode != Opcode::Ldftn {
        return None;
    }
    let target = ldftn.method()?.clone();

    let (receiver, load) = ctx.previous(ftn)?;
    if !load.opcode.is_plain_load() {
        return None;
    }
    Some((receiver, ftn, target))
}

impl<R: CallbackRegistry> RewriteRule for CallbackHandleRewriter<R> {
    fn name(&self) -> &'static str {
        "callback-handle"
    }

    fn new_object(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, ctor: &MethodRef) -> Result<(), RewriteError> {
        if !ctx.body.is_live(at) {
            return Ok(());
        }
        let module = ctx.module;
        let Some(signature) = module
            .find_type(&ctor.declaring_type)
            .and_then(|def| def.native_signature.as_deref())
        else {
            return Ok(());
        };
        let Some((receiver, ftn, target)) = match_idiom(ctx, at) else {
            return Ok(());
        };

        let handle = self.registry.add_method(signature, &target);
        let operand = i32::try_from(handle).map_err(|_| RewriteError::HandleOverflow {
            method: ctx.method_name(),
            target: target.to_string(),
            handle,
        })?;
        tracing::debug!(
            method = %ctx.method_name(),
            %at,
            handle,
            "delegate {} to {} replaced by handle",
            ctor.declaring_type,
            target
        );

        ctx.replace(receiver, Instruction::ldc_i4(operand))?;
        ctx.remove(ftn)?;
        ctx.remove(at)?;
        Ok(())
    }
}
