//! file: core/src/ir/builder.rs
//! description: positioned instruction builder over a `Module`.
//!
//! `IrBuilder` owns the module being generated and an insertion point
//! (function, block). Emission into a block that already has a terminator
//! is dropped: the code after a `return` or `break` in a source block is
//! dead and must not end up behind the terminator. Trivial constant
//! operations are folded on the way in so the generator can tell
//! compile-time decisions from run-time ones.

use super::module::{Block, Function, Inst, Linkage, Module, Param};
use super::op::{BinOp, CastOp, FloatPredicate, InstKind, IntPredicate, Terminator};
use super::types::IrType;
use super::value::{BlockId, Constant, FuncId, InstId, Value};
use crate::location::Location;

pub struct IrBuilder {
    pub module: Module,
    position: Option<(FuncId, BlockId)>,
    loc: Option<Location>,
}

impl IrBuilder {
    pub fn new(module_name: &str) -> Self {
        IrBuilder { module: Module::new(module_name), position: None, loc: None }
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        ret: IrType,
        linkage: Linkage,
        varargs: bool,
    ) -> FuncId {
        self.module.add_function(Function::new(name, params, ret, linkage, varargs))
    }

    /// Append a new empty block. Repeated names get a numeric suffix.
    pub fn append_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let f = self.module.function_mut(func);
        let id = BlockId(f.blocks.len() as u32);
        let name = if f.blocks.iter().any(|b| b.name == name) {
            format!("{}{}", name, id.0)
        } else {
            name.to_string()
        };
        f.blocks.push(Block { name, insts: Vec::new(), term: None });
        id
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.position = Some((func, block));
    }

    pub fn position(&self) -> Option<(FuncId, BlockId)> {
        self.position
    }

    pub fn current_function(&self) -> Option<FuncId> {
        self.position.map(|(f, _)| f)
    }

    pub fn insert_block(&self) -> Option<BlockId> {
        self.position.map(|(_, b)| b)
    }

    pub fn set_location(&mut self, loc: Option<Location>) {
        self.loc = loc;
    }

    pub fn location(&self) -> Option<&Location> {
        self.loc.as_ref()
    }

    pub fn block_terminated(&self, func: FuncId, block: BlockId) -> bool {
        self.module.function(func).block(block).term.is_some()
    }

    /// True when nothing emitted now would execute.
    pub fn is_terminated(&self) -> bool {
        match self.position {
            Some((f, b)) => self.block_terminated(f, b),
            None => true,
        }
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        match self.position {
            Some((f, _)) => self.module.function(f).predecessors(block),
            None => Vec::new(),
        }
    }

    pub fn type_of(&self, value: &Value) -> IrType {
        match (value, self.position) {
            (Value::Const(c), _) => c.ty(),
            (Value::Global(g), _) => self.module.global(*g).ty.clone().ptr_to(),
            (_, Some((f, _))) => self.module.value_type(f, value),
            (_, None) => IrType::Void,
        }
    }

    fn push_into(&mut self, func: FuncId, block: BlockId, kind: InstKind, ty: IrType, name: Option<&str>) -> Value {
        if self.block_terminated(func, block) {
            return Value::undef(ty);
        }
        let loc = self.loc.clone();
        let f = self.module.function_mut(func);
        let id = InstId(f.insts.len() as u32);
        f.insts.push(Inst { kind, ty, name: name.map(|n| n.to_string()), loc });
        f.block_mut(block).insts.push(id);
        Value::Inst(id)
    }

    fn push(&mut self, kind: InstKind, ty: IrType, name: Option<&str>) -> Value {
        match self.position {
            Some((f, b)) => self.push_into(f, b, kind, ty, name),
            None => Value::undef(ty),
        }
    }

    /// Stack slot placed in `block`, normally the function's alloca block.
    pub fn alloca_at(&mut self, func: FuncId, block: BlockId, ty: IrType, name: Option<&str>) -> Value {
        let ptr_ty = ty.clone().ptr_to();
        self.push_into(func, block, InstKind::Alloca { ty }, ptr_ty, name)
    }

    pub fn load(&mut self, ptr: Value, name: Option<&str>) -> Value {
        let ty = self.type_of(&ptr).pointee().cloned().unwrap_or(IrType::Void);
        self.push(InstKind::Load { ptr }, ty, name)
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        self.push(InstKind::Store { value, ptr }, IrType::Void, None);
    }

    pub fn gep(&mut self, ptr: Value, indices: Vec<Value>) -> Value {
        let mut cur = self.type_of(&ptr).pointee().cloned();
        for idx in indices.iter().skip(1) {
            cur = match (&cur, idx.as_const_int()) {
                (Some(IrType::Struct(fields)), Some(i)) => fields.get(i as usize).cloned(),
                (Some(IrType::Array(elem, _)), _) => Some((**elem).clone()),
                _ => None,
            };
        }
        let ty = cur.map(|t| t.ptr_to()).unwrap_or(IrType::Void);
        self.push(InstKind::Gep { ptr, indices }, ty, None)
    }

    /// Address of field `index` of the struct `ptr` points to.
    pub fn struct_gep(&mut self, ptr: Value, index: u32) -> Value {
        self.gep(ptr, vec![Value::i32(0), Value::i32(i64::from(index))])
    }

    pub fn cast(&mut self, op: CastOp, value: Value, to: IrType) -> Value {
        let from = self.type_of(&value);
        if from == to && matches!(op, CastOp::BitCast) {
            return value;
        }
        match (op, &value) {
            (CastOp::BitCast, Value::Const(Constant::Null(_))) => return Value::null(to),
            (CastOp::BitCast, Value::Const(Constant::GlobalAddr { global, .. })) => {
                return Value::Const(Constant::GlobalAddr { global: *global, ty: to });
            }
            (CastOp::BitCast, Value::Global(g)) => {
                return Value::Const(Constant::GlobalAddr { global: *g, ty: to });
            }
            (CastOp::IntToPtr, v) if v.as_const_int() == Some(0) => return Value::null(to),
            (CastOp::PtrToInt, Value::Const(Constant::Null(_))) => {
                return Value::int(to.int_bits().unwrap_or(64), 0);
            }
            (CastOp::Trunc | CastOp::ZExt | CastOp::SExt, v) => {
                if let (Some(c), Some(bits)) = (v.as_const_int(), to.int_bits()) {
                    return Value::int(bits, fold_int_cast(op, c, from.int_bits().unwrap_or(64), bits));
                }
            }
            _ => {}
        }
        self.push(InstKind::Cast { op, value }, to, None)
    }

    pub fn bitcast(&mut self, value: Value, to: IrType) -> Value {
        self.cast(CastOp::BitCast, value, to)
    }

    pub fn int_to_ptr(&mut self, value: Value, to: IrType) -> Value {
        self.cast(CastOp::IntToPtr, value, to)
    }

    pub fn ptr_to_int(&mut self, value: Value, to: IrType) -> Value {
        self.cast(CastOp::PtrToInt, value, to)
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.type_of(&lhs);
        if ty == IrType::i1() {
            match (op, lhs.as_const_bool(), rhs.as_const_bool()) {
                (BinOp::And, Some(false), _) | (BinOp::And, _, Some(false)) => return Value::i1(false),
                (BinOp::And, Some(true), _) => return rhs,
                (BinOp::And, _, Some(true)) => return lhs,
                (BinOp::Or, Some(true), _) | (BinOp::Or, _, Some(true)) => return Value::i1(true),
                (BinOp::Or, Some(false), _) => return rhs,
                (BinOp::Or, _, Some(false)) => return lhs,
                _ => {}
            }
        }
        self.push(InstKind::Binary { op, lhs, rhs }, ty, None)
    }

    pub fn and(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn not(&mut self, value: Value) -> Value {
        if let Some(b) = value.as_const_bool() {
            return Value::i1(!b);
        }
        let ty = self.type_of(&value);
        self.push(InstKind::Not { value }, ty, None)
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        if let (Some(a), Some(b)) = (lhs.as_const_int(), rhs.as_const_int()) {
            let r = match pred {
                IntPredicate::Eq => a == b,
                IntPredicate::Ne => a != b,
                IntPredicate::Slt => a < b,
                IntPredicate::Sle => a <= b,
                IntPredicate::Sgt => a > b,
                IntPredicate::Sge => a >= b,
            };
            return Value::i1(r);
        }
        self.push(InstKind::ICmp { pred, lhs, rhs }, IrType::i1(), None)
    }

    pub fn fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        self.push(InstKind::FCmp { pred, lhs, rhs }, IrType::i1(), None)
    }

    pub fn select(&mut self, cond: Value, then: Value, else_: Value) -> Value {
        match cond.as_const_bool() {
            Some(true) => then,
            Some(false) => else_,
            None => {
                let ty = self.type_of(&then);
                self.push(InstKind::Select { cond, then, else_ }, ty, None)
            }
        }
    }

    pub fn phi(&mut self, ty: IrType, incoming: Vec<(Value, BlockId)>) -> Value {
        self.push(InstKind::Phi { incoming }, ty, None)
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<Value>) -> Value {
        let ty = self.module.function(callee).ret.clone();
        self.push(InstKind::Call { callee, args }, ty, None)
    }

    pub fn malloc(&mut self, ty: IrType) -> Value {
        let ptr_ty = ty.clone().ptr_to();
        self.push(InstKind::Malloc { ty }, ptr_ty, None)
    }

    pub fn array_malloc(&mut self, ty: IrType, count: Value) -> Value {
        let ptr_ty = ty.clone().ptr_to();
        self.push(InstKind::ArrayMalloc { ty, count }, ptr_ty, None)
    }

    pub fn extract_value(&mut self, agg: Value, index: u32, name: Option<&str>) -> Value {
        let ty = self.type_of(&agg).element(index as usize).cloned().unwrap_or(IrType::Void);
        self.push(InstKind::ExtractValue { agg, index }, ty, name)
    }

    // ---- terminators ----

    fn terminate(&mut self, term: Terminator) {
        if let Some((f, b)) = self.position {
            let block = self.module.function_mut(f).block_mut(b);
            if block.term.is_none() {
                block.term = Some(term);
            }
        }
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    /// A constant condition becomes an unconditional branch.
    pub fn cond_br(&mut self, cond: Value, then: BlockId, else_: BlockId) {
        match cond.as_const_bool() {
            Some(true) => self.br(then),
            Some(false) => self.br(else_),
            None => self.terminate(Terminator::CondBr { cond, then, else_ }),
        }
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}

fn fold_int_cast(op: CastOp, value: i64, from_bits: u32, to_bits: u32) -> i64 {
    let mask = |bits: u32| if bits >= 64 { -1i64 } else { (1i64 << bits) - 1 };
    match op {
        CastOp::Trunc | CastOp::ZExt => {
            let v = value & mask(from_bits.min(to_bits));
            if to_bits == 1 { v & 1 } else { v }
        }
        CastOp::SExt => {
            if from_bits >= 64 || to_bits <= from_bits {
                value
            } else {
                let shift = 64 - from_bits;
                (value << shift) >> shift
            }
        }
        _ => value,
    }
}
