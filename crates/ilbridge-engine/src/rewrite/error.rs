//! Rewrite pass errors.

use ilbridge_bytecode::{BodyError, InstrId, MethodVerifyError};
use thiserror::Error;

/// Fatal rewrite errors; any of these aborts the whole pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// Operand shape does not fit the opcode
    #[error("Operand mismatch for '{opcode}' at {at} in {method}")]
    OperandMismatch {
        /// Method being rewritten
        method: String,
        /// Instruction id
        at: InstrId,
        /// Opcode mnemonic
        opcode: &'static str,
    },

    /// Argument index without a declared parameter
    #[error("Argument {index} at {at} in {method} has no declaration")]
    UnknownArgument {
        /// Method being rewritten
        method: String,
        /// Instruction id
        at: InstrId,
        /// Argument index, receiver included
        index: u16,
    },

    /// Local index without a declared local
    #[error("Local {index} at {at} in {method} has no declaration")]
    UnknownLocal {
        /// Method being rewritten
        method: String,
        /// Instruction id
        at: InstrId,
        /// Local index
        index: u16,
    },

    /// Adapter class is not defined in the module
    #[error("Adapter class {adapter} for {method} is not defined in the module")]
    MissingAdapterType {
        /// Interface method being retargeted
        method: String,
        /// Adapter class
        adapter: String,
    },

    /// Adapter class lacks a static method with the interface method's name
    #[error("Adapter class {adapter} has no static method matching {method}")]
    MissingAdapterMethod {
        /// Interface method being retargeted
        method: String,
        /// Adapter class
        adapter: String,
    },

    /// Worker lookup with a generic argument count other than one
    #[error("Worker lookup {lookup} in {method} takes {count} generic arguments, expected 1")]
    WorkerArity {
        /// Method containing the call site
        method: String,
        /// The lookup being called
        lookup: String,
        /// Generic arguments found
        count: usize,
    },

    /// A callback handle that does not fit the `ldc.i4` operand
    #[error("Callback handle {handle} for {target} in {method} exceeds the int32 range")]
    HandleOverflow {
        /// Method containing the delegate construction
        method: String,
        /// Callback target
        target: String,
        /// Handle returned by the registry
        handle: u32,
    },

    /// An edit was rejected by the method body
    #[error("{method}: {source}")]
    Edit {
        /// Method being rewritten
        method: String,
        /// Underlying body error
        #[source]
        source: BodyError,
    },

    /// The rewritten module failed stack verification
    #[error("Rewritten method failed verification: {0}")]
    Verify(#[from] MethodVerifyError),
}
