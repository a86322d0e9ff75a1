//! Instruction opcodes
//!
//! The opcode set is the subset of the managed bytecode instruction set the
//! rewrite passes have to understand. Every opcode belongs to exactly one
//! [`Category`], which decides the rewrite hook it is delivered to, and
//! expects exactly one [`OperandKind`].
//!
//! Short forms (`ldarg.0`, `ldloc.s`, ...) fold their index into the opcode
//! or use a narrower encoding. [`Opcode::short_index`] and
//! [`Instruction::index`](crate::body::Instruction::index) normalize them so
//! rules never see the difference.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rewrite hook an instruction is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Pushes an argument
    LoadArgument,
    /// Pushes a local
    LoadLocal,
    /// Pushes an instance or static field
    LoadField,
    /// Pops into an argument
    StoreArgument,
    /// Pops into a local
    StoreLocal,
    /// Pops into an instance or static field
    StoreField,
    /// Direct or virtual method call
    Call,
    /// Object construction
    NewObject,
    /// Everything else
    Other,
}

/// Shape of the operand an opcode expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// Argument or local index
    Index,
    /// 32-bit integer literal
    I32,
    /// 64-bit integer literal
    I64,
    /// String literal
    String,
    /// Type reference
    Type,
    /// Method reference
    Method,
    /// Field reference
    Field,
    /// Branch target
    Target,
}

impl OperandKind {
    /// Human-readable operand kind
    pub fn name(self) -> &'static str {
        match self {
            OperandKind::None => "none",
            OperandKind::Index => "index",
            OperandKind::I32 => "int32",
            OperandKind::I64 => "int64",
            OperandKind::String => "string",
            OperandKind::Type => "type",
            OperandKind::Method => "method",
            OperandKind::Field => "field",
            OperandKind::Target => "branch target",
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $name:literal, $category:ident, $operand:ident; )*) => {
        /// Bytecode opcode enumeration
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $variant, )*
        }

        impl Opcode {
            /// All opcodes, in table order
            pub const ALL: &'static [Opcode] = &[$( Opcode::$variant, )*];

            /// Assembly mnemonic, e.g. `ldarg.s`
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $name, )*
                }
            }

            /// Look up an opcode by mnemonic
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Opcode::$variant), )*
                    _ => None,
                }
            }

            /// Rewrite hook this opcode is delivered to
            pub fn category(self) -> Category {
                match self {
                    $( Opcode::$variant => Category::$category, )*
                }
            }

            /// Operand this opcode expects
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $( Opcode::$variant => OperandKind::$operand, )*
                }
            }
        }
    };
}

opcodes! {
    /// No operation
    Nop = "nop", Other, None;
    /// Push null
    Ldnull = "ldnull", Other, None;
    /// Push 32-bit integer
    LdcI4 = "ldc.i4", Other, I32;
    /// Push 32-bit integer (short encoding)
    LdcI4S = "ldc.i4.s", Other, I32;
    /// Push 64-bit integer
    LdcI8 = "ldc.i8", Other, I64;
    /// Push string literal
    Ldstr = "ldstr", Other, String;

    /// Load argument 0
    Ldarg0 = "ldarg.0", LoadArgument, None;
    /// Load argument 1
    Ldarg1 = "ldarg.1", LoadArgument, None;
    /// Load argument 2
    Ldarg2 = "ldarg.2", LoadArgument, None;
    /// Load argument 3
    Ldarg3 = "ldarg.3", LoadArgument, None;
    /// Load argument (short index)
    LdargS = "ldarg.s", LoadArgument, Index;
    /// Load argument
    Ldarg = "ldarg", LoadArgument, Index;
    /// Store argument (short index)
    StargS = "starg.s", StoreArgument, Index;
    /// Store argument
    Starg = "starg", StoreArgument, Index;

    /// Load local 0
    Ldloc0 = "ldloc.0", LoadLocal, None;
    /// Load local 1
    Ldloc1 = "ldloc.1", LoadLocal, None;
    /// Load local 2
    Ldloc2 = "ldloc.2", LoadLocal, None;
    /// Load local 3
    Ldloc3 = "ldloc.3", LoadLocal, None;
    /// Load local (short index)
    LdlocS = "ldloc.s", LoadLocal, Index;
    /// Load local
    Ldloc = "ldloc", LoadLocal, Index;
    /// Store local 0
    Stloc0 = "stloc.0", StoreLocal, None;
    /// Store local 1
    Stloc1 = "stloc.1", StoreLocal, None;
    /// Store local 2
    Stloc2 = "stloc.2", StoreLocal, None;
    /// Store local 3
    Stloc3 = "stloc.3", StoreLocal, None;
    /// Store local (short index)
    StlocS = "stloc.s", StoreLocal, Index;
    /// Store local
    Stloc = "stloc", StoreLocal, Index;

    /// Load instance field: pop object, push value
    Ldfld = "ldfld", LoadField, Field;
    /// Load static field: push value
    Ldsfld = "ldsfld", LoadField, Field;
    /// Store instance field: pop value, pop object
    Stfld = "stfld", StoreField, Field;
    /// Store static field: pop value
    Stsfld = "stsfld", StoreField, Field;

    /// Non-virtual call
    Call = "call", Call, Method;
    /// Virtual call
    Callvirt = "callvirt", Call, Method;
    /// Allocate and construct: pop ctor args, push object
    Newobj = "newobj", NewObject, Method;
    /// Push pointer to method
    Ldftn = "ldftn", Other, Method;
    /// Pop object, push pointer to its virtual method
    Ldvirtftn = "ldvirtftn", Other, Method;
    /// Pop object, push it cast to type
    Castclass = "castclass", Other, Type;

    /// Return from method
    Ret = "ret", Other, None;
    /// Discard top of stack
    Pop = "pop", Other, None;
    /// Duplicate top of stack
    Dup = "dup", Other, None;
    /// Integer addition
    Add = "add", Other, None;
    /// Integer subtraction
    Sub = "sub", Other, None;
    /// Integer multiplication
    Mul = "mul", Other, None;
    /// Push 1 if equal, else 0
    Ceq = "ceq", Other, None;
    /// Push 1 if less than, else 0
    Clt = "clt", Other, None;
    /// Unconditional branch
    Br = "br", Other, Target;
    /// Pop, branch if non-zero / non-null
    Brtrue = "brtrue", Other, Target;
    /// Pop, branch if zero / null
    Brfalse = "brfalse", Other, Target;
    /// Pop exception object and throw
    Throw = "throw", Other, None;
}

impl Opcode {
    /// Index folded into a macro opcode (`ldarg.2` → 2)
    pub fn short_index(self) -> Option<u16> {
        match self {
            Opcode::Ldarg0 | Opcode::Ldloc0 | Opcode::Stloc0 => Some(0),
            Opcode::Ldarg1 | Opcode::Ldloc1 | Opcode::Stloc1 => Some(1),
            Opcode::Ldarg2 | Opcode::Ldloc2 | Opcode::Stloc2 => Some(2),
            Opcode::Ldarg3 | Opcode::Ldloc3 | Opcode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Check if this opcode may transfer control to a branch target
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Brtrue | Opcode::Brfalse)
    }

    /// Check if this opcode is a conditional branch
    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::Brtrue | Opcode::Brfalse)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Throw | Opcode::Br)
    }

    /// Check if this is a call (direct or virtual)
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::Callvirt)
    }

    /// Check if this pushes a single value without consuming any
    ///
    /// These are the loads that may stand for a delegate receiver.
    pub fn is_plain_load(self) -> bool {
        matches!(
            self.category(),
            Category::LoadArgument | Category::LoadLocal
        ) || matches!(self, Opcode::Ldnull | Opcode::Ldsfld)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Opcode::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown opcode '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_name(op.name()), Some(op), "{}", op);
        }
        assert_eq!(Opcode::from_name("ldarg.9"), None);
    }

    #[test]
    fn test_short_and_long_forms_share_category() {
        assert_eq!(Opcode::Ldarg1.category(), Opcode::Ldarg.category());
        assert_eq!(Opcode::LdargS.category(), Opcode::Ldarg.category());
        assert_eq!(Opcode::Stloc3.category(), Opcode::Stloc.category());
        assert_eq!(Opcode::Ldarg2.short_index(), Some(2));
        assert_eq!(Opcode::Ldarg.short_index(), None);
    }

    #[test]
    fn test_macro_forms_take_no_operand() {
        for &op in Opcode::ALL {
            if op.short_index().is_some() {
                assert_eq!(op.operand_kind(), OperandKind::None, "{}", op);
            }
        }
    }

    #[test]
    fn test_field_and_call_categories() {
        assert_eq!(Opcode::Ldsfld.category(), Category::LoadField);
        assert_eq!(Opcode::Stfld.category(), Category::StoreField);
        assert_eq!(Opcode::Callvirt.category(), Category::Call);
        assert_eq!(Opcode::Newobj.category(), Category::NewObject);
        assert_eq!(Opcode::Ldftn.category(), Category::Other);
    }

    #[test]
    fn test_plain_loads() {
        assert!(Opcode::Ldnull.is_plain_load());
        assert!(Opcode::Ldarg0.is_plain_load());
        assert!(Opcode::LdlocS.is_plain_load());
        assert!(Opcode::Ldsfld.is_plain_load());
        assert!(!Opcode::Ldfld.is_plain_load());
        assert!(!Opcode::LdcI4.is_plain_load());
    }

    #[test]
    fn test_terminators() {
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::Br.is_terminator());
        assert!(!Opcode::Brtrue.is_terminator());
        assert!(Opcode::Brtrue.is_branch());
    }
}
