//! Method bodies
//!
//! A [`MethodBody`] stores its instructions in an arena and keeps the live
//! order as a separate list of [`InstrId`]s. An id stays valid for the whole
//! life of the body: replacing an instruction rewrites its arena slot in
//! place, and removing one only takes it out of the live order. Branch
//! targets and exception-handler boundaries hold ids, so they survive any
//! edit that does not remove the instruction they point at; removal
//! re-points them at the live successor.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::opcode::{Opcode, OperandKind};
use crate::types::{FieldRef, Local, MethodRef, TypeRef};

/// Method body editing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    /// Id does not name an instruction of this body
    #[error("Unknown instruction id {0}")]
    UnknownInstruction(InstrId),

    /// Id names an instruction that was already removed
    #[error("Instruction {0} is no longer part of the body")]
    RemovedInstruction(InstrId),

    /// Removing the instruction would leave a branch or handler pointing nowhere
    #[error("Instruction {0} is a branch or handler target and has no successor")]
    DanglingReference(InstrId),

    /// Serialized branch target outside the instruction list
    #[error("Branch target {target} out of range (body has {len} instructions)")]
    TargetOutOfRange {
        /// Target position
        target: u32,
        /// Instruction count
        len: usize,
    },
}

/// Stable identity of an instruction within one body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04}", self.0)
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// No operand
    #[default]
    None,
    /// Argument or local index
    Index(u16),
    /// 32-bit integer literal
    I32(i32),
    /// 64-bit integer literal
    I64(i64),
    /// String literal
    String(String),
    /// Type reference
    Type(TypeRef),
    /// Method reference
    Method(MethodRef),
    /// Field reference
    Field(FieldRef),
    /// Branch target
    Target(InstrId),
}

impl Operand {
    /// Shape of this operand
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Index(_) => OperandKind::Index,
            Operand::I32(_) => OperandKind::I32,
            Operand::I64(_) => OperandKind::I64,
            Operand::String(_) => OperandKind::String,
            Operand::Type(_) => OperandKind::Type,
            Operand::Method(_) => OperandKind::Method,
            Operand::Field(_) => OperandKind::Field,
            Operand::Target(_) => OperandKind::Target,
        }
    }

    /// Check if there is no operand
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }
}

/// One instruction: opcode plus operand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode
    #[serde(rename = "op")]
    pub opcode: Opcode,
    /// Operand
    #[serde(default, skip_serializing_if = "Operand::is_none")]
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Create an instruction without operand
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// `ldc.i4 value`
    pub fn ldc_i4(value: i32) -> Self {
        Self::new(Opcode::LdcI4, Operand::I32(value))
    }

    /// Argument/local index operand (`ldarg.s 5`, `stloc 7`)
    pub fn with_index(opcode: Opcode, index: u16) -> Self {
        Self::new(opcode, Operand::Index(index))
    }

    /// Method operand (`call`, `callvirt`, `newobj`, `ldftn`)
    pub fn with_method(opcode: Opcode, method: MethodRef) -> Self {
        Self::new(opcode, Operand::Method(method))
    }

    /// Field operand (`ldfld`, `stsfld`, ...)
    pub fn with_field(opcode: Opcode, field: FieldRef) -> Self {
        Self::new(opcode, Operand::Field(field))
    }

    /// Branch to `target`
    pub fn branch(opcode: Opcode, target: InstrId) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// Check the operand shape against the opcode
    pub fn operand_matches(&self) -> bool {
        self.opcode.operand_kind() == self.operand.kind()
    }

    /// Normalized argument/local index
    ///
    /// `ldarg.1`, `ldarg.s 1` and `ldarg 1` all return `Some(1)`.
    pub fn index(&self) -> Option<u16> {
        if let Some(index) = self.opcode.short_index() {
            return Some(index);
        }
        match self.operand {
            Operand::Index(index) => Some(index),
            _ => None,
        }
    }

    /// Method operand, if any
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Field operand, if any
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Branch target, if any
    pub fn target(&self) -> Option<InstrId> {
        match self.operand {
            Operand::Target(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Index(i) => write!(f, " {}", i),
            Operand::I32(v) => write!(f, " {}", v),
            Operand::I64(v) => write!(f, " {}", v),
            Operand::String(s) => write!(f, " {:?}", s),
            Operand::Type(t) => write!(f, " {}", t),
            Operand::Method(m) => write!(f, " {}", m),
            Operand::Field(fl) => write!(f, " {}", fl),
            Operand::Target(t) => write!(f, " {}", t),
        }
    }
}

/// Kind of exception handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Typed catch clause; the handler starts with the exception on the stack
    Catch,
    /// Finally clause
    Finally,
}

/// Protected region with its handler
///
/// `*_end` fields name the first instruction after the region, `None` meaning
/// the end of the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Handler kind
    pub kind: HandlerKind,
    /// First protected instruction
    pub try_start: InstrId,
    /// First instruction after the protected region
    #[serde(default)]
    pub try_end: Option<InstrId>,
    /// First handler instruction
    pub handler_start: InstrId,
    /// First instruction after the handler
    #[serde(default)]
    pub handler_end: Option<InstrId>,
    /// Caught type for `Catch` handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_type: Option<TypeRef>,
}

impl ExceptionHandler {
    fn ids_mut(&mut self) -> impl Iterator<Item = &mut InstrId> {
        [
            Some(&mut self.try_start),
            self.try_end.as_mut(),
            Some(&mut self.handler_start),
            self.handler_end.as_mut(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Mutable instruction sequence of one method
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Every instruction ever added, indexed by `InstrId`
    arena: Vec<Instruction>,
    /// Live instructions in execution order
    order: Vec<InstrId>,
    locals: Vec<Local>,
    handlers: Vec<ExceptionHandler>,
    has_this: bool,
}

impl MethodBody {
    /// Create an empty body
    ///
    /// `has_this` marks an instance method, whose argument 0 is the receiver.
    pub fn new(has_this: bool) -> Self {
        Self {
            has_this,
            ..Self::default()
        }
    }

    /// Create a body from instructions; ids are assigned by position
    pub fn from_instructions(has_this: bool, instructions: Vec<Instruction>) -> Self {
        let mut body = Self::new(has_this);
        for instr in instructions {
            body.push(instr);
        }
        body
    }

    /// Whether argument 0 is the implicit receiver
    pub fn has_this(&self) -> bool {
        self.has_this
    }

    /// Set the instance-method flag
    pub fn set_has_this(&mut self, has_this: bool) {
        self.has_this = has_this;
    }

    /// Append an instruction, returning its id
    pub fn push(&mut self, instr: Instruction) -> InstrId {
        let id = self.alloc(instr);
        self.order.push(id);
        id
    }

    fn alloc(&mut self, instr: Instruction) -> InstrId {
        let id = InstrId(self.arena.len() as u32);
        self.arena.push(instr);
        id
    }

    /// Number of live instructions
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the body has no live instructions
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Live instruction ids in execution order
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// Copy of the live order, safe to iterate while editing the body
    pub fn snapshot(&self) -> Vec<InstrId> {
        self.order.clone()
    }

    /// Iterate live instructions in order
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order.iter().map(move |&id| (id, &self.arena[id.0 as usize]))
    }

    /// Live instructions in order, cloned
    pub fn instructions(&self) -> Vec<Instruction> {
        self.iter().map(|(_, instr)| instr.clone()).collect()
    }

    /// Instruction by id, including removed ones
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id.0 as usize)
    }

    /// Check if `id` is part of the live order
    pub fn is_live(&self, id: InstrId) -> bool {
        self.position(id).is_some()
    }

    /// Position of `id` in the live order
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|&i| i == id)
    }

    /// Live instruction immediately before `id`
    pub fn previous(&self, id: InstrId) -> Option<InstrId> {
        let pos = self.position(id)?;
        pos.checked_sub(1).map(|p| self.order[p])
    }

    /// Live instruction immediately after `id`
    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        let pos = self.position(id)?;
        self.order.get(pos + 1).copied()
    }

    fn live_position(&self, id: InstrId) -> Result<usize, BodyError> {
        if self.get(id).is_none() {
            return Err(BodyError::UnknownInstruction(id));
        }
        self.position(id).ok_or(BodyError::RemovedInstruction(id))
    }

    /// Overwrite an instruction in place, keeping its id
    ///
    /// Returns the previous instruction.
    pub fn replace(&mut self, id: InstrId, instr: Instruction) -> Result<Instruction, BodyError> {
        self.live_position(id)?;
        Ok(std::mem::replace(&mut self.arena[id.0 as usize], instr))
    }

    /// Take an instruction out of the live order
    ///
    /// Branches and handler boundaries naming `id` are moved to its live
    /// successor.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction, BodyError> {
        let pos = self.live_position(id)?;
        let successor = self.order.get(pos + 1).copied();

        if self.is_referenced(id) {
            let successor = successor.ok_or(BodyError::DanglingReference(id))?;
            self.retarget(id, successor);
        }
        // A region ending at the removed instruction now ends at its successor,
        // or at the end of the body.
        for handler in &mut self.handlers {
            if handler.try_end == Some(id) {
                handler.try_end = successor;
            }
            if handler.handler_end == Some(id) {
                handler.handler_end = successor;
            }
        }

        self.order.remove(pos);
        Ok(self.arena[id.0 as usize].clone())
    }

    /// Insert before a live instruction
    pub fn insert_before(&mut self, anchor: InstrId, instr: Instruction) -> Result<InstrId, BodyError> {
        let pos = self.live_position(anchor)?;
        let id = self.alloc(instr);
        self.order.insert(pos, id);
        Ok(id)
    }

    /// Insert after a live instruction
    pub fn insert_after(&mut self, anchor: InstrId, instr: Instruction) -> Result<InstrId, BodyError> {
        let pos = self.live_position(anchor)?;
        let id = self.alloc(instr);
        self.order.insert(pos + 1, id);
        Ok(id)
    }

    /// Check if a branch or handler start refers to `id`
    pub fn is_referenced(&self, id: InstrId) -> bool {
        self.iter().any(|(_, instr)| instr.target() == Some(id))
            || self
                .handlers
                .iter()
                .any(|h| h.try_start == id || h.handler_start == id)
    }

    fn retarget(&mut self, from: InstrId, to: InstrId) {
        for instr in &mut self.arena {
            if let Operand::Target(target) = &mut instr.operand {
                if *target == from {
                    *target = to;
                }
            }
        }
        for handler in &mut self.handlers {
            if handler.try_start == from {
                handler.try_start = to;
            }
            if handler.handler_start == from {
                handler.handler_start = to;
            }
        }
    }

    /// Declared locals
    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    /// Local by index
    pub fn local(&self, index: u16) -> Option<&Local> {
        self.locals.get(index as usize)
    }

    /// Declare a local, returning its index
    pub fn add_local(&mut self, local: Local) -> u16 {
        self.locals.push(local);
        (self.locals.len() - 1) as u16
    }

    /// Exception handlers
    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    /// Add an exception handler
    pub fn add_handler(&mut self, handler: ExceptionHandler) {
        self.handlers.push(handler);
    }

    fn to_repr(&self) -> BodyRepr {
        let position_of = |id: InstrId| -> InstrId {
            InstrId(self.position(id).map_or(self.order.len(), |p| p) as u32)
        };

        let instructions = self
            .iter()
            .map(|(_, instr)| match instr.operand {
                Operand::Target(target) => Instruction::branch(instr.opcode, position_of(target)),
                _ => instr.clone(),
            })
            .collect();

        let handlers = self
            .handlers
            .iter()
            .map(|h| {
                let mut h = h.clone();
                for id in h.ids_mut() {
                    *id = position_of(*id);
                }
                h
            })
            .collect();

        BodyRepr {
            locals: self.locals.clone(),
            instructions,
            handlers,
        }
    }

    fn from_repr(repr: BodyRepr) -> Result<Self, BodyError> {
        let len = repr.instructions.len();
        for instr in &repr.instructions {
            if let Some(target) = instr.target() {
                if target.0 as usize >= len {
                    return Err(BodyError::TargetOutOfRange { target: target.0, len });
                }
            }
        }

        let mut body = MethodBody::from_instructions(false, repr.instructions);
        body.locals = repr.locals;
        for mut handler in repr.handlers {
            for start in [handler.try_start, handler.handler_start] {
                if start.0 as usize >= len {
                    return Err(BodyError::TargetOutOfRange { target: start.0, len });
                }
            }
            for end in [handler.try_end, handler.handler_end].into_iter().flatten() {
                if end.0 as usize > len {
                    return Err(BodyError::TargetOutOfRange { target: end.0, len });
                }
            }
            // Region ends equal to the length mean "end of body".
            handler.try_end = handler.try_end.filter(|id| (id.0 as usize) < len);
            handler.handler_end = handler.handler_end.filter(|id| (id.0 as usize) < len);
            body.handlers.push(handler);
        }
        Ok(body)
    }
}

/// Serialized form: branch targets are positions in `instructions`
#[derive(Serialize, Deserialize)]
struct BodyRepr {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locals: Vec<Local>,
    instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    handlers: Vec<ExceptionHandler>,
}

impl Serialize for MethodBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_repr().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MethodBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = BodyRepr::deserialize(deserializer)?;
        MethodBody::from_repr(repr).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with_branch() -> (MethodBody, [InstrId; 4]) {
        // 0: ldarg.0  1: brtrue -> 3  2: nop  3: ret
        let mut body = MethodBody::new(false);
        let a = body.push(Instruction::simple(Opcode::Ldarg0));
        let b = body.push(Instruction::branch(Opcode::Brtrue, InstrId(3)));
        let c = body.push(Instruction::simple(Opcode::Nop));
        let d = body.push(Instruction::simple(Opcode::Ret));
        (body, [a, b, c, d])
    }

    #[test]
    fn test_replace_keeps_identity() {
        let (mut body, [_, branch, _, ret]) = body_with_branch();
        let old = body.replace(ret, Instruction::simple(Opcode::Throw)).unwrap();
        assert_eq!(old.opcode, Opcode::Ret);
        assert_eq!(body.get(branch).unwrap().target(), Some(ret));
        assert_eq!(body.get(ret).unwrap().opcode, Opcode::Throw);
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_remove_retargets_branches() {
        let mut body = MethodBody::new(false);
        let br = body.push(Instruction::branch(Opcode::Br, InstrId(1)));
        let nop = body.push(Instruction::simple(Opcode::Nop));
        let ret = body.push(Instruction::simple(Opcode::Ret));

        body.remove(nop).unwrap();
        assert_eq!(body.get(br).unwrap().target(), Some(ret));
        assert!(!body.is_live(nop));
        // Removed instructions stay readable.
        assert_eq!(body.get(nop).unwrap().opcode, Opcode::Nop);
    }

    #[test]
    fn test_remove_last_referenced_fails() {
        let (mut body, [_, _, _, ret]) = body_with_branch();
        assert_eq!(body.remove(ret), Err(BodyError::DanglingReference(ret)));
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_remove_twice_fails() {
        let (mut body, [_, _, nop, _]) = body_with_branch();
        body.remove(nop).unwrap();
        assert_eq!(body.remove(nop), Err(BodyError::RemovedInstruction(nop)));
        assert_eq!(
            body.remove(InstrId(99)),
            Err(BodyError::UnknownInstruction(InstrId(99)))
        );
    }

    #[test]
    fn test_previous_skips_removed() {
        let (mut body, [a, _, c, d]) = body_with_branch();
        body.remove(c).unwrap();
        assert_eq!(body.previous(d), Some(InstrId(1)));
        assert_eq!(body.previous(a), None);
        assert_eq!(body.previous(c), None);
        assert_eq!(body.next(a), Some(InstrId(1)));
    }

    #[test]
    fn test_insert_before_and_after() {
        let (mut body, [a, _, _, d]) = body_with_branch();
        let x = body.insert_before(a, Instruction::simple(Opcode::Nop)).unwrap();
        let y = body.insert_after(d, Instruction::simple(Opcode::Nop)).unwrap();
        assert_eq!(body.ids().first(), Some(&x));
        assert_eq!(body.ids().last(), Some(&y));
        assert_eq!(body.len(), 6);
    }

    #[test]
    fn test_handler_boundaries_follow_removal() {
        let mut body = MethodBody::new(false);
        let start = body.push(Instruction::simple(Opcode::Nop));
        let next = body.push(Instruction::simple(Opcode::Nop));
        let handler = body.push(Instruction::simple(Opcode::Pop));
        body.push(Instruction::simple(Opcode::Ret));
        body.add_handler(ExceptionHandler {
            kind: HandlerKind::Catch,
            try_start: start,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: None,
            catch_type: Some(TypeRef::new("System", "Exception")),
        });

        body.remove(start).unwrap();
        assert_eq!(body.handlers()[0].try_start, next);
    }

    #[test]
    fn test_index_normalization() {
        let short = Instruction::simple(Opcode::Ldarg2);
        let narrow = Instruction::with_index(Opcode::LdargS, 2);
        let long = Instruction::with_index(Opcode::Ldarg, 2);
        assert_eq!(short.index(), Some(2));
        assert_eq!(narrow.index(), Some(2));
        assert_eq!(long.index(), Some(2));
        assert!(short.operand_matches());
        assert!(!Instruction::simple(Opcode::Ldarg).operand_matches());
    }

    #[test]
    fn test_serde_compacts_targets() {
        let (mut body, [_, _, nop, _]) = body_with_branch();
        body.remove(nop).unwrap();
        let json = serde_json::to_string(&body).unwrap();
        let back: MethodBody = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), 3);
        // ret moved from position 3 to position 2
        assert_eq!(back.get(InstrId(1)).unwrap().target(), Some(InstrId(2)));
        assert_eq!(back.get(InstrId(2)).unwrap().opcode, Opcode::Ret);
    }

    #[test]
    fn test_deserialize_rejects_bad_target() {
        let json = r#"{"instructions":[{"op":"br","operand":{"target":5}}]}"#;
        let result: Result<MethodBody, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
