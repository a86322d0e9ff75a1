//! Rule: interface-call
//!
//! Resolves interfaces designated by the type registry at build time. Calls
//! through such an interface become direct calls to the static method of the
//! same name on its adapter class, and values of designated types are never
//! materialized: every load and store of one is deleted.

use ilbridge_bytecode::{FieldRef, InstrId, Instruction, Local, MethodRef, Opcode, Parameter, TypeRef};

use crate::rewrite::error::RewriteError;
use crate::rewrite::registry::TypeRewriteRegistry;
use crate::rewrite::rule::{RewriteContext, RewriteRule};

/// Retargets interface calls to adapters and elides designated values.
pub struct InterfaceCallRewriter<R> {
    registry: R,
}

impl<R: TypeRewriteRegistry> InterfaceCallRewriter<R> {
    /// Create the rule over `registry`.
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// The injected registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn elide(&self, ctx: &mut RewriteContext<'_>, at: InstrId, ty: &TypeRef) -> Result<(), RewriteError> {
        if !self.registry.should_rewrite(ty) || !ctx.body.is_live(at) {
            return Ok(());
        }
        tracing::debug!(method = %ctx.method_name(), %at, "eliding value of {}", ty);
        ctx.remove(at)?;
        Ok(())
    }

    fn elide_field(&self, ctx: &mut RewriteContext<'_>, at: InstrId, field: &FieldRef) -> Result<(), RewriteError> {
        if !self.registry.should_rewrite(&field.field_type) || !ctx.body.is_live(at) {
            return Ok(());
        }

        if !field.is_static {
            // The object operand is only known when it is the receiver load
            // right before the access.
            let receiver = match ctx.previous(at) {
                Some((prev, instr)) if ctx.is_receiver_load(instr) => Some(prev),
                _ => None,
            };
            match receiver {
                Some(prev) => {
                    ctx.remove(prev)?;
                }
                None => tracing::warn!(
                    method = %ctx.method_name(),
                    %at,
                    "object operand of {} is not the receiver; left in place",
                    field
                ),
            }
        }

        tracing::debug!(method = %ctx.method_name(), %at, "eliding field {}", field);
        ctx.remove(at)?;
        Ok(())
    }
}

impl<R: TypeRewriteRegistry> RewriteRule for InterfaceCallRewriter<R> {
    fn name(&self) -> &'static str {
        "interface-call"
    }

    fn load_argument(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        _index: u16,
        param: &Parameter,
    ) -> Result<(), RewriteError> {
        self.elide(ctx, at, &param.ty)
    }

    fn store_argument(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        _index: u16,
        param: &Parameter,
    ) -> Result<(), RewriteError> {
        self.elide(ctx, at, &param.ty)
    }

    fn load_local(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        _index: u16,
        local: &Local,
    ) -> Result<(), RewriteError> {
        self.elide(ctx, at, &local.ty)
    }

    fn store_local(
        &mut self,
        ctx: &mut RewriteContext<'_>,
        at: InstrId,
        _index: u16,
        local: &Local,
    ) -> Result<(), RewriteError> {
        self.elide(ctx, at, &local.ty)
    }

    fn load_field(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, field: &FieldRef) -> Result<(), RewriteError> {
        self.elide_field(ctx, at, field)
    }

    fn store_field(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, field: &FieldRef) -> Result<(), RewriteError> {
        self.elide_field(ctx, at, field)
    }

    fn call(&mut self, ctx: &mut RewriteContext<'_>, at: InstrId, method: &MethodRef) -> Result<(), RewriteError> {
        let Some(adapter) = self.registry.find_class_for_interface(&method.declaring_type) else {
            return Ok(());
        };
        if !ctx.body.is_live(at) {
            return Ok(());
        }

        let def = ctx
            .module
            .find_type(&adapter)
            .ok_or_else(|| RewriteError::MissingAdapterType {
                method: method.to_string(),
                adapter: adapter.to_string(),
            })?;
        let target = def
            .methods
            .iter()
            .find(|m| m.is_static && m.matches(method))
            .or_else(|| def.static_method(&method.name))
            .ok_or_else(|| RewriteError::MissingAdapterMethod {
                method: method.to_string(),
                adapter: adapter.to_string(),
            })?
            .method_ref(&adapter)
            .with_generic_args(method.generic_args.clone());

        tracing::debug!(method = %ctx.method_name(), %at, "retargeting {} to {}", method, target);
        ctx.replace(at, Instruction::with_method(Opcode::Call, target))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::config::RewriteConfig;
    use crate::rewrite::registry::StaticTypeRegistry;
    use crate::rewrite::runner::Rewriter;
    use ilbridge_bytecode::{
        Evaluator, MethodBody, MethodDef, Module, TypeDef, TypeKind, Value,
    };

    fn iface() -> TypeRef {
        TypeRef::new("App", "IValueSource")
    }

    fn adapter() -> TypeRef {
        TypeRef::new("App", "ImplementingClass")
    }

    fn get_value() -> MethodRef {
        MethodRef::new_instance(iface(), "GetValue", vec![], TypeRef::int32())
    }

    fn registry() -> StaticTypeRegistry {
        let mut registry = StaticTypeRegistry::new();
        registry.adapter(iface(), adapter());
        registry
    }

    /// Interface, adapter returning 123, and a caller invoking the interface
    fn module(caller: MethodDef) -> Module {
        let mut source = TypeDef::new(iface(), TypeKind::Interface);
        source
            .methods
            .push(MethodDef::new("GetValue", false, vec![], TypeRef::int32()));

        let mut implementing = TypeDef::new(adapter(), TypeKind::Class);
        implementing.methods.push(
            MethodDef::new("GetValue", true, vec![], TypeRef::int32()).with_body(MethodBody::from_instructions(
                false,
                vec![Instruction::ldc_i4(123), Instruction::simple(Opcode::Ret)],
            )),
        );

        let mut program = TypeDef::new(TypeRef::new("App", "Program"), TypeKind::Class);
        program.methods.push(caller);

        let mut module = Module::new("App");
        module.types.extend([source, implementing, program]);
        module
    }

    fn run(module: &mut Module, rule: &mut InterfaceCallRewriter<StaticTypeRegistry>) -> Result<(), RewriteError> {
        Rewriter::new(RewriteConfig::new()).register(rule).run(module).map(|_| ())
    }

    #[test]
    fn test_call_becomes_static_adapter_call() {
        // static int Read(IValueSource source) => source.GetValue();
        let caller = MethodDef::new(
            "Read",
            true,
            vec![Parameter::new("source", iface())],
            TypeRef::int32(),
        )
        .with_body(MethodBody::from_instructions(
            false,
            vec![
                Instruction::simple(Opcode::Ldarg0),
                Instruction::with_method(Opcode::Callvirt, get_value()),
                Instruction::simple(Opcode::Ret),
            ],
        ));
        let mut module = module(caller);
        let mut rule = InterfaceCallRewriter::new(registry());
        run(&mut module, &mut rule).unwrap();

        let program = module.find_type(&TypeRef::new("App", "Program")).unwrap();
        let body = program.method("Read").unwrap().body.as_ref().unwrap();
        let expected = MethodRef::new_static(adapter(), "GetValue", vec![], TypeRef::int32());
        assert_eq!(
            body.instructions(),
            vec![
                Instruction::with_method(Opcode::Call, expected),
                Instruction::simple(Opcode::Ret),
            ]
        );

        // The parameter is no longer read, so any value will do.
        let read = MethodRef::new_static(TypeRef::new("App", "Program"), "Read", vec![iface()], TypeRef::int32());
        let result = Evaluator::new(&module).call(&read, vec![Value::Null]).unwrap();
        assert_eq!(result, Value::I32(123));
    }

    #[test]
    fn test_field_store_reduces_to_ret() {
        // void Store(IValueSource source) { this.source = source; }
        let field = FieldRef {
            declaring_type: TypeRef::new("App", "Program"),
            name: "source".to_string(),
            field_type: iface(),
            is_static: false,
        };
        let caller = MethodDef::new("Store", false, vec![Parameter::new("source", iface())], TypeRef::void())
            .with_body(MethodBody::from_instructions(
                true,
                vec![
                    Instruction::simple(Opcode::Ldarg0),
                    Instruction::simple(Opcode::Ldarg1),
                    Instruction::with_field(Opcode::Stfld, field),
                    Instruction::simple(Opcode::Ret),
                ],
            ));
        let mut module = module(caller);
        let mut rule = InterfaceCallRewriter::new(registry());
        run(&mut module, &mut rule).unwrap();

        let program = module.find_type(&TypeRef::new("App", "Program")).unwrap();
        let body = program.method("Store").unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions(), vec![Instruction::simple(Opcode::Ret)]);
    }

    #[test]
    fn test_static_field_and_local() {
        let field = FieldRef {
            declaring_type: TypeRef::new("App", "Program"),
            name: "shared".to_string(),
            field_type: iface(),
            is_static: true,
        };
        let mut body = MethodBody::new(false);
        body.add_local(ilbridge_bytecode::Local::new(iface()));
        body.push(Instruction::with_field(Opcode::Ldsfld, field));
        body.push(Instruction::simple(Opcode::Stloc0));
        body.push(Instruction::simple(Opcode::Ret));
        let caller = MethodDef::new("Cache", true, vec![], TypeRef::void()).with_body(body);

        let mut module = module(caller);
        let mut rule = InterfaceCallRewriter::new(registry());
        run(&mut module, &mut rule).unwrap();

        let program = module.find_type(&TypeRef::new("App", "Program")).unwrap();
        let body = program.method("Cache").unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions(), vec![Instruction::simple(Opcode::Ret)]);
    }

    #[test]
    fn test_missing_adapter_method_names_both() {
        let other = MethodRef::new_instance(iface(), "Reset", vec![], TypeRef::void());
        let caller = MethodDef::new("Reset", true, vec![], TypeRef::void()).with_body(
            MethodBody::from_instructions(
                false,
                vec![
                    Instruction::simple(Opcode::Ldnull),
                    Instruction::with_method(Opcode::Callvirt, other),
                    Instruction::simple(Opcode::Ret),
                ],
            ),
        );
        let mut module = module(caller);
        let mut rule = InterfaceCallRewriter::new(registry());
        let err = run(&mut module, &mut rule).unwrap_err();

        assert!(matches!(err, RewriteError::MissingAdapterMethod { .. }));
        let message = err.to_string();
        assert!(message.contains("App.ImplementingClass"), "{message}");
        assert!(message.contains("App.IValueSource::Reset"), "{message}");
    }

    #[test]
    fn test_missing_adapter_type() {
        let mut registry = StaticTypeRegistry::new();
        registry.adapter(TypeRef::new("App", "IMissing"), TypeRef::new("App", "Nowhere"));
        let call = MethodRef::new_instance(TypeRef::new("App", "IMissing"), "Run", vec![], TypeRef::void());
        let caller = MethodDef::new("Go", true, vec![], TypeRef::void()).with_body(MethodBody::from_instructions(
            false,
            vec![
                Instruction::simple(Opcode::Ldnull),
                Instruction::with_method(Opcode::Callvirt, call),
                Instruction::simple(Opcode::Ret),
            ],
        ));
        let mut module = module(caller);
        let mut rule = InterfaceCallRewriter::new(registry);
        let err = run(&mut module, &mut rule).unwrap_err();
        assert!(matches!(err, RewriteError::MissingAdapterType { ref adapter, .. } if adapter == "App.Nowhere"));
    }

    #[test]
    fn test_unrelated_code_untouched() {
        let caller = MethodDef::new("Add", true, vec![Parameter::new("a", TypeRef::int32())], TypeRef::int32())
            .with_body(MethodBody::from_instructions(
                false,
                vec![
                    Instruction::simple(Opcode::Ldarg0),
                    Instruction::ldc_i4(1),
                    Instruction::simple(Opcode::Add),
                    Instruction::simple(Opcode::Ret),
                ],
            ));
        let mut module = module(caller);
        let before = module.types[2].methods[0].body.as_ref().unwrap().instructions();
        let mut rule = InterfaceCallRewriter::new(registry());
        run(&mut module, &mut rule).unwrap();
        assert_eq!(module.types[2].methods[0].body.as_ref().unwrap().instructions(), before);
    }
}
