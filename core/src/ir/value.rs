//! file: core/src/ir/value.rs
//! description: operands of IR instructions.

use super::types::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

macro_rules! id_index {
    ($($t:ty),*) => {
        $(impl $t {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        })*
    };
}

id_index!(FuncId, GlobalId, BlockId, InstId);

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int { bits: u32, value: i64 },
    Float { double: bool, value: f64 },
    /// All-zero value of any type: null pointer, zero struct, zero array.
    Null(IrType),
    Array { elem: IrType, values: Vec<Constant> },
    /// Address of a global, reinterpreted as `ty`.
    GlobalAddr { global: GlobalId, ty: IrType },
    Undef(IrType),
}

impl Constant {
    pub fn ty(&self) -> IrType {
        match self {
            Constant::Int { bits, .. } => IrType::Int(*bits),
            Constant::Float { double, .. } => if *double { IrType::Double } else { IrType::Float },
            Constant::Null(t) | Constant::Undef(t) => t.clone(),
            Constant::Array { elem, values } => IrType::Array(Box::new(elem.clone()), values.len() as u64),
            Constant::GlobalAddr { ty, .. } => ty.clone(),
        }
    }

    pub fn bytes(elem_bytes: &[u8]) -> Constant {
        Constant::Array {
            elem: IrType::i8(),
            values: elem_bytes.iter().map(|b| Constant::Int { bits: 8, value: i64::from(*b) }).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(Constant),
    Inst(InstId),
    Param(u32),
    Global(GlobalId),
}

impl Value {
    pub fn int(bits: u32, value: i64) -> Value {
        Value::Const(Constant::Int { bits, value })
    }

    pub fn i1(value: bool) -> Value {
        Value::int(1, i64::from(value))
    }

    pub fn i8(value: i64) -> Value {
        Value::int(8, value)
    }

    pub fn i32(value: i64) -> Value {
        Value::int(32, value)
    }

    pub fn i64(value: i64) -> Value {
        Value::int(64, value)
    }

    pub fn null(ty: IrType) -> Value {
        Value::Const(Constant::Null(ty))
    }

    pub fn undef(ty: IrType) -> Value {
        Value::Const(Constant::Undef(ty))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::Const(Constant::Int { value, .. }) => Some(*value),
            Value::Const(Constant::Null(IrType::Int(_))) => Some(0),
            _ => None,
        }
    }

    pub fn as_const_bool(&self) -> Option<bool> {
        match self {
            Value::Const(Constant::Int { bits: 1, value }) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Const(Constant::Undef(_)))
    }
}
