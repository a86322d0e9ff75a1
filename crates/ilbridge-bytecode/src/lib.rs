//! ilbridge Bytecode Model
//!
//! This crate provides the instruction set, the arena-backed method body,
//! the module format and the stack verifier used by the ilbridge rewrite
//! passes.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod body;
pub mod eval;
pub mod module;
pub mod opcode;
pub mod types;
pub mod verify;

pub use body::{BodyError, ExceptionHandler, HandlerKind, InstrId, Instruction, MethodBody, Operand};
pub use eval::{EvalError, Evaluator, Value};
pub use module::{FieldDef, MethodDef, Module, ModuleError, TypeDef, TypeKind};
pub use opcode::{Category, Opcode, OperandKind};
pub use types::{FieldRef, Local, MethodRef, Parameter, TypeRef, TypeRefError};
pub use verify::{verify_body, verify_module, MethodVerifyError, VerifyError};
