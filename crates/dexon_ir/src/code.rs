//! Method bodies over a closed instruction set.
//!
//! Branch targets, try ranges and line positions address instructions by
//! their index in [`Code::instructions`], never by code-unit offset. The dex
//! writer picks instruction formats and computes offsets when it lays out the
//! final image, since offsets depend on pool indices (jumbo strings) and on
//! branch widening.

use crate::refs::{CallSite, FieldRef, MethodHandle, MethodRef, Prototype};
use serde::{Deserialize, Serialize};

/// Which register class a move or return operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// A 32-bit non-reference value.
    Single,
    /// A 64-bit register pair.
    Wide,
    /// An object reference.
    Object,
}

/// The value class a field access moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// `int` or `float`.
    Int,
    /// `long` or `double`.
    Wide,
    /// Any reference type.
    Object,
    /// `boolean`.
    Boolean,
    /// `byte`.
    Byte,
    /// `char`.
    Char,
    /// `short`.
    Short,
}

impl ValueKind {
    /// Returns the access kind matching a field type descriptor.
    pub fn for_type(desc: &str) -> Self {
        match desc {
            "J" | "D" => ValueKind::Wide,
            "Z" => ValueKind::Boolean,
            "B" => ValueKind::Byte,
            "C" => ValueKind::Char,
            "S" => ValueKind::Short,
            "I" | "F" => ValueKind::Int,
            _ => ValueKind::Object,
        }
    }
}

/// Direction of a field access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldOp {
    /// Read the field into a register.
    Get,
    /// Write a register into the field.
    Put,
}

/// Dispatch mode of an invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    /// Virtual dispatch.
    Virtual,
    /// Superclass dispatch.
    Super,
    /// Non-virtual call of a private method or constructor.
    Direct,
    /// Static call.
    Static,
    /// Interface dispatch.
    Interface,
}

impl InvokeKind {
    /// Returns `true` if the receiver is passed as the first argument.
    pub fn has_receiver(self) -> bool {
        self != InvokeKind::Static
    }
}

/// Comparison performed by a conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IfTest {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

/// A 32-bit integer arithmetic operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    Ushr,
}

/// One instruction.
///
/// Register operands are typed by the widest register number their narrowest
/// dex encoding admits; forms that only take 4-bit registers are checked by
/// the encoder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// No operation.
    Nop,
    /// Register-to-register move.
    Move {
        /// Register class.
        kind: MoveKind,
        /// Destination register.
        dst: u16,
        /// Source register.
        src: u16,
    },
    /// Move the result of the preceding invoke.
    MoveResult {
        /// Register class.
        kind: MoveKind,
        /// Destination register.
        dst: u8,
    },
    /// Move the caught exception (first instruction of a handler).
    MoveException {
        /// Destination register.
        dst: u8,
    },
    /// Return from a `void` method.
    ReturnVoid,
    /// Return a value.
    Return {
        /// Register class.
        kind: MoveKind,
        /// Source register.
        src: u8,
    },
    /// Load a 32-bit constant.
    Const {
        /// Destination register.
        dst: u8,
        /// Value.
        value: i32,
    },
    /// Load a 64-bit constant into a register pair.
    ConstWide {
        /// First register of the pair.
        dst: u8,
        /// Value.
        value: i64,
    },
    /// Load a string constant.
    ConstString {
        /// Destination register.
        dst: u8,
        /// The string.
        value: String,
    },
    /// Load a class literal.
    ConstClass {
        /// Destination register.
        dst: u8,
        /// Type descriptor.
        type_: String,
    },
    /// Load a method handle constant.
    ConstMethodHandle {
        /// Destination register.
        dst: u8,
        /// The handle.
        handle: MethodHandle,
    },
    /// Load a method type constant.
    ConstMethodType {
        /// Destination register.
        dst: u8,
        /// The prototype.
        proto: Prototype,
    },
    /// Checked cast.
    CheckCast {
        /// Register holding the reference.
        reg: u8,
        /// Target type.
        type_: String,
    },
    /// Type test (4-bit registers).
    InstanceOf {
        /// Destination register.
        dst: u8,
        /// Register holding the reference.
        object: u8,
        /// Tested type.
        type_: String,
    },
    /// Array length (4-bit registers).
    ArrayLength {
        /// Destination register.
        dst: u8,
        /// Register holding the array.
        array: u8,
    },
    /// Allocate an instance.
    NewInstance {
        /// Destination register.
        dst: u8,
        /// Class to instantiate.
        type_: String,
    },
    /// Allocate an array (4-bit registers).
    NewArray {
        /// Destination register.
        dst: u8,
        /// Register holding the length.
        size: u8,
        /// Array type descriptor.
        type_: String,
    },
    /// Throw the exception in a register.
    Throw {
        /// Source register.
        src: u8,
    },
    /// Unconditional branch.
    Goto {
        /// Target instruction index.
        target: u32,
    },
    /// Two-register conditional branch (4-bit registers).
    If {
        /// Comparison.
        test: IfTest,
        /// First operand.
        a: u8,
        /// Second operand.
        b: u8,
        /// Target instruction index.
        target: u32,
    },
    /// Compare-with-zero conditional branch.
    IfZero {
        /// Comparison.
        test: IfTest,
        /// Operand.
        reg: u8,
        /// Target instruction index.
        target: u32,
    },
    /// Instance field access (4-bit registers).
    InstanceField {
        /// Get or put.
        op: FieldOp,
        /// Value class.
        kind: ValueKind,
        /// Value register.
        value: u8,
        /// Object register.
        object: u8,
        /// Accessed field.
        field: FieldRef,
    },
    /// Static field access.
    StaticField {
        /// Get or put.
        op: FieldOp,
        /// Value class.
        kind: ValueKind,
        /// Value register.
        value: u8,
        /// Accessed field.
        field: FieldRef,
    },
    /// Method call with up to five 4-bit argument registers.
    Invoke {
        /// Dispatch mode.
        kind: InvokeKind,
        /// Called method.
        method: MethodRef,
        /// Argument registers, receiver first; wide values take two.
        args: Vec<u8>,
    },
    /// Method call over a contiguous register range.
    InvokeRange {
        /// Dispatch mode.
        kind: InvokeKind,
        /// Called method.
        method: MethodRef,
        /// First argument register.
        first: u16,
        /// Number of argument registers.
        count: u8,
    },
    /// Dynamically linked call through a call site.
    InvokeCustom {
        /// The call site.
        call_site: CallSite,
        /// Argument registers (4-bit).
        args: Vec<u8>,
    },
    /// Integer arithmetic.
    BinaryOp {
        /// Operation.
        op: BinaryOp,
        /// Destination register.
        dst: u8,
        /// First operand.
        a: u8,
        /// Second operand.
        b: u8,
    },
}

impl Instruction {
    /// Returns the branch target, if this is a branch.
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Instruction::Goto { target }
            | Instruction::If { target, .. }
            | Instruction::IfZero { target, .. } => Some(*target),
            _ => None,
        }
    }
}

/// A handler for one exception type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatchHandler {
    /// Caught exception type.
    pub exception_type: String,
    /// Handler instruction index.
    pub target: u32,
}

/// A protected instruction range.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TryBlock {
    /// First covered instruction index.
    pub start: u32,
    /// One past the last covered instruction index.
    pub end: u32,
    /// Typed handlers, in match order.
    pub handlers: Vec<CatchHandler>,
    /// Catch-all handler instruction index.
    pub catch_all: Option<u32>,
}

/// Maps an instruction to a source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinePosition {
    /// Instruction index.
    pub insn: u32,
    /// Source line.
    pub line: u32,
}

/// Line table and parameter names of a method.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Line of the first position.
    pub line_start: u32,
    /// Parameter names, `None` where unknown.
    pub parameter_names: Vec<Option<String>>,
    /// Positions, sorted by instruction index.
    pub positions: Vec<LinePosition>,
}

/// A method body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code {
    /// Number of registers used.
    pub registers: u16,
    /// Number of incoming argument registers (the last `ins` registers).
    pub ins: u16,
    /// Largest outgoing argument register count of any call.
    pub outs: u16,
    /// The instructions.
    pub instructions: Vec<Instruction>,
    /// Protected ranges, sorted by start and non-overlapping.
    pub tries: Vec<TryBlock>,
    /// Line table.
    pub debug_info: Option<DebugInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_for_type() {
        assert_eq!(ValueKind::for_type("J"), ValueKind::Wide);
        assert_eq!(ValueKind::for_type("F"), ValueKind::Int);
        assert_eq!(ValueKind::for_type("[I"), ValueKind::Object);
        assert_eq!(ValueKind::for_type("C"), ValueKind::Char);
    }

    #[test]
    fn branch_targets() {
        assert_eq!(Instruction::Goto { target: 3 }.branch_target(), Some(3));
        assert_eq!(
            Instruction::IfZero {
                test: IfTest::Eq,
                reg: 0,
                target: 7
            }
            .branch_target(),
            Some(7)
        );
        assert_eq!(Instruction::ReturnVoid.branch_target(), None);
    }

    #[test]
    fn receiver() {
        assert!(!InvokeKind::Static.has_receiver());
        assert!(InvokeKind::Interface.has_receiver());
    }
}
