//! Reference evaluator
//!
//! Executes static methods of a module over a small value domain. It exists
//! to check that a rewritten call site still computes what the original did;
//! objects, fields and virtual dispatch are deliberately unsupported and
//! report [`EvalError::Unsupported`].

use std::fmt;

use thiserror::Error;

use crate::body::{InstrId, Instruction, MethodBody, Operand};
use crate::module::Module;
use crate::opcode::Opcode;
use crate::types::MethodRef;

/// Default instruction budget per top-level call
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Maximum nesting of managed calls
pub const MAX_CALL_DEPTH: usize = 256;

/// Evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Call target not defined in the module
    #[error("Unresolved method: {0}")]
    UnresolvedMethod(String),

    /// Call target has no body
    #[error("Method has no body: {0}")]
    NoBody(String),

    /// Opcode outside the evaluator's domain
    #[error("Unsupported opcode '{opcode}' in {method}")]
    Unsupported {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Method being executed
        method: String,
    },

    /// Pop from an empty stack
    #[error("Stack underflow in {0}")]
    StackUnderflow(String),

    /// Operand values of the wrong type
    #[error("Type mismatch for '{opcode}' in {method}")]
    TypeMismatch {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Method being executed
        method: String,
    },

    /// Argument or local index out of range
    #[error("Bad slot index {index} in {method}")]
    BadIndex {
        /// Slot index
        index: u16,
        /// Method being executed
        method: String,
    },

    /// Wrong number of arguments supplied
    #[error("{method} expects {expected} arguments, got {actual}")]
    ArityMismatch {
        /// Method being called
        method: String,
        /// Declared parameters
        expected: usize,
        /// Supplied arguments
        actual: usize,
    },

    /// Step budget exhausted
    #[error("Step limit exceeded in {0}")]
    StepLimit(String),

    /// Managed calls nested deeper than [`MAX_CALL_DEPTH`]
    #[error("Call depth limit exceeded calling {0}")]
    CallDepth(String),
}

/// Runtime value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Null reference, also the result of a void call
    #[default]
    Null,
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// String
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::I32(v) => *v != 0,
            Value::I64(v) => *v != 0,
            Value::Str(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}L", v),
            Value::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Interpreter over the static subset of a module
pub struct Evaluator<'m> {
    module: &'m Module,
    step_limit: usize,
}

struct Frame<'b> {
    method: String,
    body: &'b MethodBody,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'b> Frame<'b> {
    fn pop(&mut self) -> Result<Value, EvalError> {
        self.stack
            .pop()
            .ok_or_else(|| EvalError::StackUnderflow(self.method.clone()))
    }

    fn unsupported(&self, opcode: Opcode) -> EvalError {
        EvalError::Unsupported {
            opcode: opcode.name(),
            method: self.method.clone(),
        }
    }

    fn mismatch(&self, opcode: Opcode) -> EvalError {
        EvalError::TypeMismatch {
            opcode: opcode.name(),
            method: self.method.clone(),
        }
    }

    fn bad_index(&self, index: u16) -> EvalError {
        EvalError::BadIndex {
            index,
            method: self.method.clone(),
        }
    }
}

impl<'m> Evaluator<'m> {
    /// Create an evaluator with the default step limit
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Override the instruction budget
    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Call a static method
    pub fn call(&self, method: &MethodRef, args: Vec<Value>) -> Result<Value, EvalError> {
        let mut steps = 0;
        self.invoke(method, args, &mut steps, 0)
    }

    fn invoke(
        &self,
        method: &MethodRef,
        args: Vec<Value>,
        steps: &mut usize,
        depth: usize,
    ) -> Result<Value, EvalError> {
        let name = format!("{}::{}", method.declaring_type, method.name);
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth(name));
        }
        let def = self
            .module
            .resolve_method(method)
            .ok_or_else(|| EvalError::UnresolvedMethod(method.to_string()))?;
        if !def.is_static {
            return Err(EvalError::Unsupported {
                opcode: Opcode::Call.name(),
                method: name,
            });
        }
        let body = def.body.as_ref().ok_or_else(|| EvalError::NoBody(name.clone()))?;
        if args.len() != def.params.len() {
            return Err(EvalError::ArityMismatch {
                method: name,
                expected: def.params.len(),
                actual: args.len(),
            });
        }

        let mut frame = Frame {
            method: name,
            body,
            args,
            locals: vec![Value::Null; body.locals().len()],
            stack: Vec::new(),
        };
        self.run(&mut frame, !def.return_type.is_void(), steps, depth)
    }

    fn run(
        &self,
        frame: &mut Frame<'_>,
        returns_value: bool,
        steps: &mut usize,
        depth: usize,
    ) -> Result<Value, EvalError> {
        let body = frame.body;
        let code: Vec<(InstrId, &Instruction)> = body.iter().collect();
        let mut pc = 0;

        while let Some(&(_, instr)) = code.get(pc) {
            *steps += 1;
            if *steps > self.step_limit {
                return Err(EvalError::StepLimit(frame.method.clone()));
            }
            pc += 1;

            let op = instr.opcode;
            match op {
                Opcode::Nop => {}
                Opcode::Ldnull => frame.stack.push(Value::Null),
                Opcode::LdcI4 | Opcode::LdcI4S => match instr.operand {
                    Operand::I32(v) => frame.stack.push(Value::I32(v)),
                    _ => return Err(frame.mismatch(op)),
                },
                Opcode::LdcI8 => match instr.operand {
                    Operand::I64(v) => frame.stack.push(Value::I64(v)),
                    _ => return Err(frame.mismatch(op)),
                },
                Opcode::Ldstr => match &instr.operand {
                    Operand::String(s) => frame.stack.push(Value::Str(s.clone())),
                    _ => return Err(frame.mismatch(op)),
                },
                Opcode::Ldarg0
                | Opcode::Ldarg1
                | Opcode::Ldarg2
                | Opcode::Ldarg3
                | Opcode::LdargS
                | Opcode::Ldarg => {
                    let index = instr.index().ok_or_else(|| frame.mismatch(op))?;
                    let value = frame
                        .args
                        .get(index as usize)
                        .cloned()
                        .ok_or_else(|| frame.bad_index(index))?;
                    frame.stack.push(value);
                }
                Opcode::StargS | Opcode::Starg => {
                    let index = instr.index().ok_or_else(|| frame.mismatch(op))?;
                    if index as usize >= frame.args.len() {
                        return Err(frame.bad_index(index));
                    }
                    let value = frame.pop()?;
                    frame.args[index as usize] = value;
                }
                Opcode::Ldloc0
                | Opcode::Ldloc1
                | Opcode::Ldloc2
                | Opcode::Ldloc3
                | Opcode::LdlocS
                | Opcode::Ldloc => {
                    let index = instr.index().ok_or_else(|| frame.mismatch(op))?;
                    let value = frame
                        .locals
                        .get(index as usize)
                        .cloned()
                        .ok_or_else(|| frame.bad_index(index))?;
                    frame.stack.push(value);
                }
                Opcode::Stloc0
                | Opcode::Stloc1
                | Opcode::Stloc2
                | Opcode::Stloc3
                | Opcode::StlocS
                | Opcode::Stloc => {
                    let index = instr.index().ok_or_else(|| frame.mismatch(op))?;
                    if index as usize >= frame.locals.len() {
                        return Err(frame.bad_index(index));
                    }
                    let value = frame.pop()?;
                    frame.locals[index as usize] = value;
                }
                Opcode::Pop => {
                    frame.pop()?;
                }
                Opcode::Dup => {
                    let value = frame.pop()?;
                    frame.stack.push(value.clone());
                    frame.stack.push(value);
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Ceq | Opcode::Clt => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    let result = binary(op, a, b).ok_or_else(|| frame.mismatch(op))?;
                    frame.stack.push(result);
                }
                Opcode::Br | Opcode::Brtrue | Opcode::Brfalse => {
                    let target = instr.target().ok_or_else(|| frame.mismatch(op))?;
                    let taken = match op {
                        Opcode::Br => true,
                        Opcode::Brtrue => frame.pop()?.truthy(),
                        _ => !frame.pop()?.truthy(),
                    };
                    if taken {
                        pc = body.position(target).ok_or_else(|| frame.mismatch(op))?;
                    }
                }
                Opcode::Call => {
                    let callee = instr.method().ok_or_else(|| frame.mismatch(op))?;
                    if callee.has_this {
                        return Err(frame.unsupported(op));
                    }
                    if frame.stack.len() < callee.params.len() {
                        return Err(EvalError::StackUnderflow(frame.method.clone()));
                    }
                    let args = frame.stack.split_off(frame.stack.len() - callee.params.len());
                    let result = self.invoke(callee, args, steps, depth + 1)?;
                    if callee.stack_outputs() == 1 {
                        frame.stack.push(result);
                    }
                }
                Opcode::Ret => {
                    return if returns_value { frame.pop() } else { Ok(Value::Null) };
                }
                _ => return Err(frame.unsupported(op)),
            }
        }

        Err(EvalError::StackUnderflow(frame.method.clone()))
    }
}

fn binary(op: Opcode, a: Value, b: Value) -> Option<Value> {
    let value = match (a, b) {
        (Value::I32(a), Value::I32(b)) => match op {
            Opcode::Add => Value::I32(a.wrapping_add(b)),
            Opcode::Sub => Value::I32(a.wrapping_sub(b)),
            Opcode::Mul => Value::I32(a.wrapping_mul(b)),
            Opcode::Ceq => Value::I32(i32::from(a == b)),
            Opcode::Clt => Value::I32(i32::from(a < b)),
            _ => return None,
        },
        (Value::I64(a), Value::I64(b)) => match op {
            Opcode::Add => Value::I64(a.wrapping_add(b)),
            Opcode::Sub => Value::I64(a.wrapping_sub(b)),
            Opcode::Mul => Value::I64(a.wrapping_mul(b)),
            Opcode::Ceq => Value::I32(i32::from(a == b)),
            Opcode::Clt => Value::I32(i32::from(a < b)),
            _ => return None,
        },
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{MethodDef, TypeDef, TypeKind};
    use crate::types::{Parameter, TypeRef};

    fn math_module() -> Module {
        let ty = TypeRef::new("App", "Math");
        let mut def = TypeDef::new(ty.clone(), TypeKind::Class);

        // static int Add(int a, int b) => a + b;
        def.methods.push(
            MethodDef::new(
                "Add",
                true,
                vec![Parameter::new("a", TypeRef::int32()), Parameter::new("b", TypeRef::int32())],
                TypeRef::int32(),
            )
            .with_body(MethodBody::from_instructions(
                false,
                vec![
                    Instruction::simple(Opcode::Ldarg0),
                    Instruction::simple(Opcode::Ldarg1),
                    Instruction::simple(Opcode::Add),
                    Instruction::simple(Opcode::Ret),
                ],
            )),
        );

        // static int Max(int a, int b) => a < b ? b : a;
        def.methods.push(
            MethodDef::new(
                "Max",
                true,
                vec![Parameter::new("a", TypeRef::int32()), Parameter::new("b", TypeRef::int32())],
                TypeRef::int32(),
            )
            .with_body(MethodBody::from_instructions(
                false,
                vec![
                    Instruction::simple(Opcode::Ldarg0),
                    Instruction::simple(Opcode::Ldarg1),
                    Instruction::simple(Opcode::Clt),
                    Instruction::branch(Opcode::Brfalse, InstrId(6)),
                    Instruction::simple(Opcode::Ldarg1),
                    Instruction::simple(Opcode::Ret),
                    Instruction::simple(Opcode::Ldarg0),
                    Instruction::simple(Opcode::Ret),
                ],
            )),
        );

        let mut module = Module::new("App");
        module.types.push(def);
        module
    }

    fn math(name: &str) -> MethodRef {
        MethodRef::new_static(
            TypeRef::new("App", "Math"),
            name,
            vec![TypeRef::int32(), TypeRef::int32()],
            TypeRef::int32(),
        )
    }

    #[test]
    fn test_add() {
        let module = math_module();
        let result = Evaluator::new(&module)
            .call(&math("Add"), vec![Value::I32(40), Value::I32(2)])
            .unwrap();
        assert_eq!(result, Value::I32(42));
    }

    #[test]
    fn test_conditional_branch() {
        let module = math_module();
        let eval = Evaluator::new(&module);
        assert_eq!(eval.call(&math("Max"), vec![Value::I32(1), Value::I32(2)]).unwrap(), Value::I32(2));
        assert_eq!(eval.call(&math("Max"), vec![Value::I32(5), Value::I32(2)]).unwrap(), Value::I32(5));
        crate::verify::verify_module(&module).unwrap();
    }

    #[test]
    fn test_unresolved() {
        let module = math_module();
        let missing = MethodRef::new_static(TypeRef::new("App", "Math"), "Nope", vec![], TypeRef::void());
        assert!(matches!(
            Evaluator::new(&module).call(&missing, vec![]),
            Err(EvalError::UnresolvedMethod(_))
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let module = math_module();
        assert!(matches!(
            Evaluator::new(&module).call(&math("Add"), vec![Value::I32(1)]),
            Err(EvalError::ArityMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_step_limit() {
        let ty = TypeRef::new("App", "Loop");
        let mut def = TypeDef::new(ty.clone(), TypeKind::Class);
        def.methods.push(
            MethodDef::new("Spin", true, vec![], TypeRef::void()).with_body(MethodBody::from_instructions(
                false,
                vec![Instruction::branch(Opcode::Br, InstrId(0))],
            )),
        );
        let mut module = Module::new("App");
        module.types.push(def);

        let spin = MethodRef::new_static(ty, "Spin", vec![], TypeRef::void());
        assert!(matches!(
            Evaluator::new(&module).with_step_limit(50).call(&spin, vec![]),
            Err(EvalError::StepLimit(_))
        ));
    }

    #[test]
    fn test_unbounded_recursion_is_an_error() {
        // static void Recurse() { Recurse(); }
        let ty = TypeRef::new("App", "Loop");
        let recurse = MethodRef::new_static(ty.clone(), "Recurse", vec![], TypeRef::void());
        let mut def = TypeDef::new(ty, TypeKind::Class);
        def.methods.push(
            MethodDef::new("Recurse", true, vec![], TypeRef::void()).with_body(MethodBody::from_instructions(
                false,
                vec![
                    Instruction::with_method(Opcode::Call, recurse.clone()),
                    Instruction::simple(Opcode::Ret),
                ],
            )),
        );
        let mut module = Module::new("App");
        module.types.push(def);

        let err = Evaluator::new(&module).call(&recurse, vec![]).unwrap_err();
        assert_eq!(err, EvalError::CallDepth("App.Loop::Recurse".to_string()));
    }
}
