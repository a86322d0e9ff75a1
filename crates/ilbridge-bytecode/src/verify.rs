//! Stack verification
//!
//! Abstract interpretation of evaluation-stack depth over a method body.
//! The rewrite passes delete and replace instructions; running the verifier
//! afterwards turns an unbalanced edit into an error naming the method
//! instead of a miscompile further down the toolchain.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::body::{HandlerKind, InstrId, Instruction, MethodBody};
use crate::module::Module;
use crate::opcode::Opcode;

/// Maximum evaluation stack depth accepted by the verifier
pub const MAX_STACK_DEPTH: usize = 1024;

/// Stack verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Operand shape does not fit the opcode
    #[error("Operand mismatch for '{opcode}' at {at}")]
    OperandMismatch {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Instruction id
        at: InstrId,
    },

    /// Instruction pops more values than are on the stack
    #[error("Stack underflow at {at} ('{opcode}' needs {needed}, stack has {depth})")]
    StackUnderflow {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Instruction id
        at: InstrId,
        /// Values needed
        needed: usize,
        /// Current depth
        depth: usize,
    },

    /// Stack grew past `MAX_STACK_DEPTH`
    #[error("Stack overflow at {0}")]
    StackOverflow(InstrId),

    /// Two paths reach an instruction with different depths
    #[error("Inconsistent stack depth at {at}: {first} vs {second}")]
    DepthMismatch {
        /// Instruction id
        at: InstrId,
        /// Depth recorded first
        first: usize,
        /// Depth on the other path
        second: usize,
    },

    /// Values left on the stack at `ret`
    #[error("Stack not empty at return {at} ({depth} extra values)")]
    UnbalancedReturn {
        /// Instruction id
        at: InstrId,
        /// Extra values
        depth: usize,
    },

    /// Branch to an instruction that is not part of the body
    #[error("Invalid branch target {target} at {at}")]
    InvalidTarget {
        /// Branch target
        target: InstrId,
        /// Branch instruction
        at: InstrId,
    },

    /// Execution runs past the last instruction
    #[error("Execution falls off end of body after {0}")]
    FallOffEnd(InstrId),
}

/// Verification failure for a specific method
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method}: {error}")]
pub struct MethodVerifyError {
    /// Fully qualified method name
    pub method: String,
    /// Underlying failure
    #[source]
    pub error: VerifyError,
}

/// Verify every method body of a module
pub fn verify_module(module: &Module) -> Result<(), MethodVerifyError> {
    for (def, method) in module.methods() {
        if let Some(body) = &method.body {
            verify_body(body, !method.return_type.is_void()).map_err(|error| MethodVerifyError {
                method: format!("{}::{}", def.ty, method.name),
                error,
            })?;
        }
    }
    Ok(())
}

/// Verify one body
///
/// `returns_value` tells whether `ret` consumes a value.
pub fn verify_body(body: &MethodBody, returns_value: bool) -> Result<(), VerifyError> {
    if body.is_empty() {
        return Ok(());
    }

    let live: Vec<(InstrId, &Instruction)> = body.iter().collect();
    let ids = body.ids();
    let positions: FxHashMap<InstrId, usize> =
        ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();

    let mut depths: Vec<Option<usize>> = vec![None; ids.len()];
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];
    for handler in body.handlers() {
        if let Some(&pos) = positions.get(&handler.handler_start) {
            let depth = match handler.kind {
                HandlerKind::Catch => 1,
                HandlerKind::Finally => 0,
            };
            worklist.push((pos, depth));
        }
    }

    while let Some((pos, depth)) = worklist.pop() {
        let id = ids[pos];
        match depths[pos] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::DepthMismatch {
                    at: id,
                    first: seen,
                    second: depth,
                })
            }
            None => depths[pos] = Some(depth),
        }

        let instr = live[pos].1;
        let (pops, pushes) = stack_effect(instr, returns_value, id)?;
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                opcode: instr.opcode.name(),
                at: id,
                needed: pops,
                depth,
            });
        }
        let after = depth - pops + pushes;
        if after > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow(id));
        }

        if instr.opcode == Opcode::Ret && after != 0 {
            return Err(VerifyError::UnbalancedReturn { at: id, depth: after });
        }

        if let Some(target) = instr.target() {
            let target_pos = *positions
                .get(&target)
                .ok_or(VerifyError::InvalidTarget { target, at: id })?;
            worklist.push((target_pos, after));
        }

        if !instr.opcode.is_terminator() {
            if pos + 1 >= ids.len() {
                return Err(VerifyError::FallOffEnd(id));
            }
            worklist.push((pos + 1, after));
        }
    }

    Ok(())
}

/// Stack effect of one instruction as (pops, pushes)
pub fn stack_effect(
    instr: &Instruction,
    returns_value: bool,
    at: InstrId,
) -> Result<(usize, usize), VerifyError> {
    if !instr.operand_matches() {
        return Err(VerifyError::OperandMismatch {
            opcode: instr.opcode.name(),
            at,
        });
    }

    let effect = match instr.opcode {
        Opcode::Nop | Opcode::Br => (0, 0),
        Opcode::Ldnull
        | Opcode::LdcI4
        | Opcode::LdcI4S
        | Opcode::LdcI8
        | Opcode::Ldstr
        | Opcode::Ldarg0
        | Opcode::Ldarg1
        | Opcode::Ldarg2
        | Opcode::Ldarg3
        | Opcode::LdargS
        | Opcode::Ldarg
        | Opcode::Ldloc0
        | Opcode::Ldloc1
        | Opcode::Ldloc2
        | Opcode::Ldloc3
        | Opcode::LdlocS
        | Opcode::Ldloc
        | Opcode::Ldsfld
        | Opcode::Ldftn => (0, 1),
        Opcode::StargS
        | Opcode::Starg
        | Opcode::Stloc0
        | Opcode::Stloc1
        | Opcode::Stloc2
        | Opcode::Stloc3
        | Opcode::StlocS
        | Opcode::Stloc
        | Opcode::Stsfld
        | Opcode::Pop
        | Opcode::Brtrue
        | Opcode::Brfalse
        | Opcode::Throw => (1, 0),
        Opcode::Ldfld | Opcode::Ldvirtftn | Opcode::Castclass => (1, 1),
        Opcode::Stfld => (2, 0),
        Opcode::Dup => (1, 2),
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Ceq | Opcode::Clt => (2, 1),
        Opcode::Ret => (usize::from(returns_value), 0),
        Opcode::Call | Opcode::Callvirt => {
            let method = instr.method().ok_or(VerifyError::OperandMismatch {
                opcode: instr.opcode.name(),
                at,
            })?;
            (method.stack_inputs(), method.stack_outputs())
        }
        Opcode::Newobj => {
            let ctor = instr.method().ok_or(VerifyError::OperandMismatch {
                opcode: instr.opcode.name(),
                at,
            })?;
            (ctor.params.len(), 1)
        }
    };
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldRef, MethodRef, TypeRef};

    fn static_call(params: usize, returns: bool) -> Instruction {
        let ret = if returns { TypeRef::int32() } else { TypeRef::void() };
        Instruction::with_method(
            Opcode::Call,
            MethodRef::new_static(TypeRef::new("App", "Lib"), "F", vec![TypeRef::int32(); params], ret),
        )
    }

    #[test]
    fn test_balanced_body() {
        let body = MethodBody::from_instructions(
            false,
            vec![
                Instruction::ldc_i4(1),
                Instruction::ldc_i4(2),
                static_call(2, true),
                Instruction::simple(Opcode::Ret),
            ],
        );
        verify_body(&body, true).unwrap();
    }

    #[test]
    fn test_underflow() {
        let body = MethodBody::from_instructions(
            false,
            vec![Instruction::ldc_i4(1), static_call(2, false), Instruction::simple(Opcode::Ret)],
        );
        assert!(matches!(
            verify_body(&body, false),
            Err(VerifyError::StackUnderflow { needed: 2, depth: 1, .. })
        ));
    }

    #[test]
    fn test_leftover_value_at_return() {
        let body = MethodBody::from_instructions(
            false,
            vec![Instruction::simple(Opcode::Ldnull), Instruction::simple(Opcode::Ret)],
        );
        assert!(matches!(
            verify_body(&body, false),
            Err(VerifyError::UnbalancedReturn { depth: 1, .. })
        ));
    }

    #[test]
    fn test_branch_join_mismatch() {
        // 0: ldarg.0  1: brtrue 3  2: ldc.i4 1  3: ret
        let body = MethodBody::from_instructions(
            false,
            vec![
                Instruction::simple(Opcode::Ldarg0),
                Instruction::branch(Opcode::Brtrue, InstrId(3)),
                Instruction::ldc_i4(1),
                Instruction::simple(Opcode::Ret),
            ],
        );
        let err = verify_body(&body, false).unwrap_err();
        assert!(
            matches!(err, VerifyError::DepthMismatch { .. } | VerifyError::UnbalancedReturn { .. }),
            "{err}"
        );
    }

    #[test]
    fn test_fall_off_end() {
        let body = MethodBody::from_instructions(false, vec![Instruction::simple(Opcode::Nop)]);
        assert_eq!(verify_body(&body, false), Err(VerifyError::FallOffEnd(InstrId(0))));
    }

    #[test]
    fn test_instance_field_store() {
        let field = FieldRef {
            declaring_type: TypeRef::new("App", "Holder"),
            name: "value".to_string(),
            field_type: TypeRef::int32(),
            is_static: false,
        };
        let body = MethodBody::from_instructions(
            true,
            vec![
                Instruction::simple(Opcode::Ldarg0),
                Instruction::ldc_i4(7),
                Instruction::with_field(Opcode::Stfld, field),
                Instruction::simple(Opcode::Ret),
            ],
        );
        verify_body(&body, false).unwrap();
    }

    #[test]
    fn test_operand_mismatch() {
        let body = MethodBody::from_instructions(
            false,
            vec![Instruction::simple(Opcode::Call), Instruction::simple(Opcode::Ret)],
        );
        assert!(matches!(
            verify_body(&body, false),
            Err(VerifyError::OperandMismatch { opcode: "call", .. })
        ));
    }
}
