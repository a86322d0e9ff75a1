//! Rewrite rule trait and supporting types.
//!
//! Each rewrite rule implements `RewriteRule` and overrides the hooks for the
//! instruction categories it cares about. Operands arrive already resolved:
//! argument indices as the declared [`Parameter`], local indices as the
//! declared [`Local`], field and method references as written.

use ilbridge_bytecode::{
    Category, FieldRef, InstrId, Instruction, Local, MethodBody, MethodDef, MethodRef, Module, Parameter, TypeRef,
};

use super::error::RewriteError;

/// Context passed to each rule for the method being rewritten.
///
/// The body is detached from `module` for the duration of the method, so
/// looking the current method up through `module` finds it without a body.
pub struct RewriteContext<'a> {
    /// The module being rewritten.
    pub module: &'a Module,
    /// Type declaring the current method.
    pub declaring_type: &'a TypeRef,
    /// Definition of the current method.
    pub method: &'a MethodDef,
    /// Body of the current method.
    pub body: &'a mut MethodBody,
}

impl<'a> RewriteContext<'a> {
    /// `Namespace.Type::Method`, as used in diagnostics.
    pub fn method_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.method.name)
    }

    /// Overwrite the instruction at `at`, keeping its id.
    pub fn replace(&mut self, at: InstrId, instr: Instruction) -> Result<Instruction, RewriteError> {
        self.body.replace(at, instr).map_err(|source| RewriteError::Edit {
            method: self.method_name(),
            source,
        })
    }

    /// Remove the instruction at `at` from the live order.
    pub fn remove(&mut self, at: InstrId) -> Result<Instruction, RewriteError> {
        self.body.remove(at).map_err(|source| RewriteError::Edit {
            method: self.method_name(),
            source,
        })
    }

    /// Live instruction immediately before `at`, with its id.
    pub fn previous(&self, at: InstrId) -> Option<(InstrId, &Instruction)> {
        let id = self.body.previous(at)?;
        self.body.get(id).map(|instr| (id, instr))
    }

    /// Check if `instr` loads the receiver of the current method.
    pub fn is_receiver_load(&self, instr: &Instruction) -> bool {
        self.body.has_this() && instr.opcode.category() == Category::LoadArgument && instr.index() == Some(0)
    }
}

/// Trait that every rewrite rule must implement.
///
/// Hooks receive one instruction at a time together with its resolved
/// operand. Default implementations do nothing, so rules only need to
/// override the hooks relevant to them. An error from any hook aborts the
/// pass.
///
/// The receiver of an instance method (argument 0) is never delivered to
/// `load_argument` or `store_argument`.
#[allow(unused_variables)]
pub trait RewriteRule {
    /// Rule name, e.g. "interface-call".
    fn name(&self) -> &'static str;

    /// `ldarg` in any encoding.
    fn load_argument(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        index: u16,
        param: &Parameter,
    ) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `starg` in any encoding.
    fn store_argument(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        index: u16,
        param: &Parameter,
    ) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `ldloc` in any encoding.
    fn load_local(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        index: u16,
        local: &Local,
    ) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `stloc` in any encoding.
    fn store_local(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        index: u16,
        local: &Local,
    ) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `ldfld` and `ldsfld`.
    fn load_field(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, field: &FieldRef) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `stfld` and `stsfld`.
    fn store_field(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, field: &FieldRef) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `call` and `callvirt`.
    fn call(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, method: &MethodRef) -> Result<(), RewriteError> {
        Ok(())
    }

    /// `newobj`.
    fn new_object(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, ctor: &MethodRef) -> Result<(), RewriteError> {
        Ok(())
    }

    /// Every other opcode.
    fn other(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, instr: &Instruction) -> Result<(), RewriteError> {
        Ok(())
    }
}
