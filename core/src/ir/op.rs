//! file: core/src/ir/op.rs
//! description: instruction and terminator definitions.
//!
//! Instructions produce at most one value whose type is recorded on the
//! owning `Inst`. Block terminators are kept apart from instructions so a
//! block can hold at most one of them.

use std::fmt;

use super::types::IrType;
use super::value::{BlockId, FuncId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    pub fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    BitCast,
    IntToPtr,
    PtrToInt,
    Trunc,
    ZExt,
    SExt,
    SIToFP,
    FPToSI,
    FPExt,
    FPTrunc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Alloca { ty: IrType },
    Load { ptr: Value },
    Store { value: Value, ptr: Value },
    /// Address arithmetic: the first index scales the pointer, later ones
    /// step into struct fields or array elements.
    Gep { ptr: Value, indices: Vec<Value> },
    Cast { op: CastOp, value: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Not { value: Value },
    ICmp { pred: IntPredicate, lhs: Value, rhs: Value },
    FCmp { pred: FloatPredicate, lhs: Value, rhs: Value },
    Select { cond: Value, then: Value, else_: Value },
    Phi { incoming: Vec<(Value, BlockId)> },
    Call { callee: FuncId, args: Vec<Value> },
    Malloc { ty: IrType },
    ArrayMalloc { ty: IrType, count: Value },
    ExtractValue { agg: Value, index: u32 },
}

impl InstKind {
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::Malloc { .. } => Vec::new(),
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Gep { ptr, indices } => std::iter::once(ptr).chain(indices.iter()).collect(),
            InstKind::Cast { value, .. } | InstKind::Not { value } => vec![value],
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } | InstKind::FCmp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstKind::Select { cond, then, else_ } => vec![cond, then, else_],
            InstKind::Phi { incoming } => incoming.iter().map(|(v, _)| v).collect(),
            InstKind::Call { args, .. } => args.iter().collect(),
            InstKind::ArrayMalloc { count, .. } => vec![count],
            InstKind::ExtractValue { agg, .. } => vec![agg],
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            InstKind::Alloca { .. } => "alloca",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::Gep { .. } => "getelementptr",
            InstKind::Cast { op, .. } => op.mnemonic(),
            InstKind::Binary { op, .. } => op.mnemonic(),
            InstKind::Not { .. } => "not",
            InstKind::ICmp { .. } => "icmp",
            InstKind::FCmp { .. } => "fcmp",
            InstKind::Select { .. } => "select",
            InstKind::Phi { .. } => "phi",
            InstKind::Call { .. } => "call",
            InstKind::Malloc { .. } => "malloc",
            InstKind::ArrayMalloc { .. } => "array_malloc",
            InstKind::ExtractValue { .. } => "extractvalue",
        }
    }
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::BitCast => "bitcast",
            CastOp::IntToPtr => "inttoptr",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::SIToFP => "sitofp",
            CastOp::FPToSI => "fptosi",
            CastOp::FPExt => "fpext",
            CastOp::FPTrunc => "fptrunc",
        }
    }
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        }
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for FloatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::One => "one",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Value, then: BlockId, else_: BlockId },
    Ret(Option<Value>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(b) => vec![*b],
            Terminator::CondBr { then, else_, .. } => {
                if then == else_ { vec![*then] } else { vec![*then, *else_] }
            }
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}
