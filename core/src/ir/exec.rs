//! file: core/src/ir/exec.rs
//! description: reference executor for generated modules.
//!
//! Interprets a `Module` directly: every allocation (stack slot, heap
//! block, global) is a little-endian byte vector and a pointer is the pair
//! (allocation, offset) packed as `(allocation + 1) << 32 | offset`, so the
//! null pointer is zero. Phi nodes are resolved when a block is entered.
//! Foreign declarations are served by a small set of built-ins.

use std::fmt;

use crate::error::{BasaltErrorExt, Level};
use crate::ir::module::{Function, Module};
use crate::ir::op::{BinOp, CastOp, FloatPredicate, InstKind, IntPredicate, Terminator};
use crate::ir::types::IrType;
use crate::ir::value::{BlockId, Constant, FuncId, InstId, Value};
use crate::location::Location;

pub const ENTRY_FUNCTION: &str = "basalt_main";
const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Void,
    Int { bits: u32, value: i64 },
    F32(f32),
    F64(f64),
    Ptr(u64),
    /// Aggregates travel as their raw bytes.
    Bytes(Vec<u8>),
}

impl RtValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RtValue::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RtValue::F32(f) => Some(f64::from(*f)),
            RtValue::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> Option<u64> {
        match self {
            RtValue::Ptr(p) => Some(*p),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            RtValue::Int { value, .. } => *value != 0,
            RtValue::Ptr(p) => *p != 0,
            _ => false,
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Void => write!(f, "void"),
            RtValue::Int { bits: 1, value } => write!(f, "{}", *value != 0),
            RtValue::Int { value, .. } => write!(f, "{}", value),
            RtValue::F32(v) => write!(f, "{}", v),
            RtValue::F64(v) => write!(f, "{}", v),
            RtValue::Ptr(0) => write!(f, "null"),
            RtValue::Ptr(p) => write!(f, "ptr({}+{})", (p >> 32).wrapping_sub(1), p & 0xffff_ffff),
            RtValue::Bytes(b) => write!(f, "bytes{:?}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    MissingEntry(String),
    Unreachable { function: String, block: String },
    NullDereference,
    OutOfBounds { ptr: u64, len: u64 },
    UseAfterFree(u64),
    DivisionByZero,
    UnknownExternal(String),
    BadOperand(String),
    StepLimit(u64),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::MissingEntry(name) => write!(f, "module has no function @{}", name),
            ExecError::Unreachable { function, block } => {
                write!(f, "reached unreachable in @{} %{}", function, block)
            }
            ExecError::NullDereference => write!(f, "null pointer dereference"),
            ExecError::OutOfBounds { ptr, len } => write!(f, "access of {} byte(s) at {:#x} is out of bounds", len, ptr),
            ExecError::UseAfterFree(ptr) => write!(f, "access through released pointer {:#x}", ptr),
            ExecError::DivisionByZero => write!(f, "integer division by zero"),
            ExecError::UnknownExternal(name) => write!(f, "no built-in for external @{}", name),
            ExecError::BadOperand(msg) => write!(f, "bad operand: {}", msg),
            ExecError::StepLimit(n) => write!(f, "step limit of {} exceeded", n),
        }
    }
}

impl std::error::Error for ExecError {}

impl BasaltErrorExt for ExecError {
    fn level(&self) -> Level {
        Level::Error
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn issuer(&self) -> String {
        "exec".to_string()
    }

    fn location(&self) -> Option<Location> {
        None
    }
}

type ExecResult<T> = std::result::Result<T, ExecError>;

struct Allocation {
    bytes: Vec<u8>,
    live: bool,
}

struct Frame {
    args: Vec<RtValue>,
    values: Vec<Option<RtValue>>,
    stack: Vec<u64>,
}

pub struct ExecState<'m> {
    module: &'m Module,
    memory: Vec<Allocation>,
    globals: Vec<u64>,
    steps: u64,
    step_limit: u64,
    output: String,
}

const OFFSET_MASK: u64 = 0xffff_ffff;

fn pack(alloc: usize, offset: u64) -> u64 {
    ((alloc as u64 + 1) << 32) | offset
}

/// `ptr` moved by `delta` bytes, or `None` once it would leave its allocation's
/// address range.
fn offset_within(ptr: u64, delta: i64) -> Option<u64> {
    let moved = ((ptr & OFFSET_MASK) as i64).checked_add(delta)?;
    if !(0..=OFFSET_MASK as i64).contains(&moved) {
        return None;
    }
    Some((ptr & !OFFSET_MASK) | moved as u64)
}

fn norm(bits: u32, value: i64) -> i64 {
    match bits {
        1 => value & 1,
        b if b >= 64 => value,
        b => {
            let shift = 64 - b;
            (value << shift) >> shift
        }
    }
}

fn zero_of(ty: &IrType) -> RtValue {
    match ty {
        IrType::Void => RtValue::Void,
        IrType::Int(bits) => RtValue::Int { bits: *bits, value: 0 },
        IrType::Float => RtValue::F32(0.0),
        IrType::Double => RtValue::F64(0.0),
        IrType::Ptr(_) => RtValue::Ptr(0),
        IrType::Array(..) | IrType::Struct(_) => RtValue::Bytes(vec![0; ty.size_of() as usize]),
    }
}

fn encode(value: &RtValue, ty: &IrType) -> Vec<u8> {
    let size = ty.size_of() as usize;
    let mut out = match value {
        RtValue::Void => Vec::new(),
        RtValue::Int { value, .. } => value.to_le_bytes().to_vec(),
        RtValue::F32(v) => v.to_le_bytes().to_vec(),
        RtValue::F64(v) => v.to_le_bytes().to_vec(),
        RtValue::Ptr(p) => p.to_le_bytes().to_vec(),
        RtValue::Bytes(b) => b.clone(),
    };
    out.resize(size, 0);
    out
}

fn decode(bytes: &[u8], ty: &IrType) -> RtValue {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    match ty {
        IrType::Void => RtValue::Void,
        IrType::Int(bits) => RtValue::Int { bits: *bits, value: norm(*bits, i64::from_le_bytes(buf)) },
        IrType::Float => {
            let mut b4 = [0u8; 4];
            b4.copy_from_slice(&buf[..4]);
            RtValue::F32(f32::from_le_bytes(b4))
        }
        IrType::Double => RtValue::F64(f64::from_le_bytes(buf)),
        IrType::Ptr(_) => RtValue::Ptr(u64::from_le_bytes(buf)),
        IrType::Array(..) | IrType::Struct(_) => RtValue::Bytes(bytes.to_vec()),
    }
}

impl<'m> ExecState<'m> {
    pub fn new(module: &'m Module) -> Self {
        let mut state = ExecState {
            module,
            memory: Vec::new(),
            globals: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            output: String::new(),
        };
        for g in module.globals.iter() {
            let ptr = state.allocate(g.ty.size_of());
            state.globals.push(ptr);
        }
        for (i, g) in module.globals.iter().enumerate() {
            if let Some(init) = &g.init {
                let bytes = state.const_bytes(init);
                let _ = state.write(state.globals[i], &bytes);
            }
        }
        state
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Text written through `puts`.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    // ---- memory ----

    fn allocate(&mut self, size: u64) -> u64 {
        self.memory.push(Allocation { bytes: vec![0; size.max(1) as usize], live: true });
        pack(self.memory.len() - 1, 0)
    }

    fn release(&mut self, ptr: u64) {
        if let Some(a) = self.memory.get_mut(((ptr >> 32) as usize).wrapping_sub(1)) {
            a.live = false;
        }
    }

    fn locate(&self, ptr: u64, len: u64) -> ExecResult<(usize, usize)> {
        if ptr == 0 {
            return Err(ExecError::NullDereference);
        }
        let alloc = ((ptr >> 32) as usize).wrapping_sub(1);
        let offset = (ptr & OFFSET_MASK) as usize;
        let a = self.memory.get(alloc).ok_or(ExecError::OutOfBounds { ptr, len })?;
        if !a.live {
            return Err(ExecError::UseAfterFree(ptr));
        }
        if offset + len as usize > a.bytes.len() {
            return Err(ExecError::OutOfBounds { ptr, len });
        }
        Ok((alloc, offset))
    }

    fn read(&self, ptr: u64, len: u64) -> ExecResult<Vec<u8>> {
        let (alloc, offset) = self.locate(ptr, len)?;
        Ok(self.memory[alloc].bytes[offset..offset + len as usize].to_vec())
    }

    fn write(&mut self, ptr: u64, bytes: &[u8]) -> ExecResult<()> {
        let (alloc, offset) = self.locate(ptr, bytes.len() as u64)?;
        self.memory[alloc].bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Bytes of a NUL-terminated string starting at `ptr`.
    pub fn read_c_string(&self, ptr: u64) -> ExecResult<String> {
        let (alloc, offset) = self.locate(ptr, 0)?;
        let bytes = &self.memory[alloc].bytes[offset..];
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Contents of a length-prefixed string object.
    pub fn read_string_object(&self, ptr: u64) -> ExecResult<String> {
        let len = decode(&self.read(ptr, 4)?, &IrType::i32()).as_int().unwrap_or(0).max(0) as u64;
        let bytes = self.read(ptr + 4, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Load a value of type `ty` from `ptr`.
    pub fn load(&self, ptr: u64, ty: &IrType) -> ExecResult<RtValue> {
        Ok(decode(&self.read(ptr, ty.size_of())?, ty))
    }

    fn const_bytes(&self, c: &Constant) -> Vec<u8> {
        match c {
            Constant::Array { elem, values } => values.iter().flat_map(|v| encode(&self.const_value(v), elem)).collect(),
            other => encode(&self.const_value(other), &other.ty()),
        }
    }

    fn const_value(&self, c: &Constant) -> RtValue {
        match c {
            Constant::Int { bits, value } => RtValue::Int { bits: *bits, value: norm(*bits, *value) },
            Constant::Float { double: true, value } => RtValue::F64(*value),
            Constant::Float { double: false, value } => RtValue::F32(*value as f32),
            Constant::Null(t) | Constant::Undef(t) => zero_of(t),
            Constant::Array { .. } => RtValue::Bytes(self.const_bytes(c)),
            Constant::GlobalAddr { global, .. } => RtValue::Ptr(self.globals.get(global.index()).copied().unwrap_or(0)),
        }
    }

    // ---- execution ----

    fn tick(&mut self) -> ExecResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(ExecError::StepLimit(self.step_limit));
        }
        Ok(())
    }

    fn operand(&self, frame: &Frame, value: &Value) -> ExecResult<RtValue> {
        match value {
            Value::Const(c) => Ok(self.const_value(c)),
            Value::Inst(id) => frame
                .values
                .get(id.index())
                .cloned()
                .flatten()
                .ok_or_else(|| ExecError::BadOperand(format!("%{} used before definition", id.0))),
            Value::Param(i) => frame
                .args
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| ExecError::BadOperand(format!("parameter {} missing", i))),
            Value::Global(g) => Ok(RtValue::Ptr(self.globals.get(g.index()).copied().unwrap_or(0))),
        }
    }

    fn int_operand(&self, frame: &Frame, value: &Value) -> ExecResult<i64> {
        match self.operand(frame, value)? {
            RtValue::Int { value, .. } => Ok(value),
            RtValue::Ptr(p) => Ok(p as i64),
            other => Err(ExecError::BadOperand(format!("expected integer, found {}", other))),
        }
    }

    fn ptr_operand(&self, frame: &Frame, value: &Value) -> ExecResult<u64> {
        match self.operand(frame, value)? {
            RtValue::Ptr(p) => Ok(p),
            other => Err(ExecError::BadOperand(format!("expected pointer, found {}", other))),
        }
    }

    pub fn call(&mut self, func: FuncId, args: Vec<RtValue>) -> ExecResult<RtValue> {
        let module = self.module;
        let f = module.function(func);
        if f.is_declaration() {
            return self.call_builtin(f, args);
        }
        let mut frame = Frame { args, values: vec![None; f.insts.len()], stack: Vec::new() };
        let result = self.run_function(f, func, &mut frame);
        for ptr in frame.stack.drain(..) {
            self.release(ptr);
        }
        result
    }

    fn run_function(&mut self, f: &'m Function, func: FuncId, frame: &mut Frame) -> ExecResult<RtValue> {
        let mut prev: Option<BlockId> = None;
        let mut cur = BlockId(0);
        loop {
            let block = f.block(cur);

            // phis read their inputs as of the edge taken, all at once
            let mut resolved: Vec<(InstId, RtValue)> = Vec::new();
            for id in block.insts.iter() {
                if let InstKind::Phi { incoming } = &f.inst(*id).kind {
                    let from = prev.ok_or_else(|| ExecError::BadOperand("phi in entry block".to_string()))?;
                    let (v, _) = incoming
                        .iter()
                        .find(|(_, b)| *b == from)
                        .ok_or_else(|| ExecError::BadOperand(format!("phi %{} has no edge from %{}", id.0, f.block(from).name)))?;
                    resolved.push((*id, self.operand(frame, v)?));
                }
            }
            for (id, v) in resolved {
                frame.values[id.index()] = Some(v);
            }

            for id in block.insts.iter() {
                let inst = f.inst(*id);
                if inst.kind.is_phi() {
                    continue;
                }
                self.tick()?;
                let v = self.exec_inst(func, frame, &inst.kind, &inst.ty)?;
                frame.values[id.index()] = Some(v);
            }

            self.tick()?;
            let next = match &block.term {
                Some(Terminator::Br(b)) => *b,
                Some(Terminator::CondBr { cond, then, else_ }) => {
                    if self.operand(frame, cond)?.truthy() { *then } else { *else_ }
                }
                Some(Terminator::Ret(v)) => {
                    return match v {
                        Some(v) => self.operand(frame, v),
                        None => Ok(RtValue::Void),
                    };
                }
                Some(Terminator::Unreachable) | None => {
                    return Err(ExecError::Unreachable { function: f.name.clone(), block: block.name.clone() });
                }
            };
            prev = Some(cur);
            cur = next;
        }
    }

    fn exec_inst(&mut self, func: FuncId, frame: &mut Frame, kind: &InstKind, ty: &IrType) -> ExecResult<RtValue> {
        let module = self.module;
        let type_of = |v: &Value| module.value_type(func, v);
        match kind {
            InstKind::Alloca { ty: slot } => {
                let ptr = self.allocate(slot.size_of());
                frame.stack.push(ptr);
                Ok(RtValue::Ptr(ptr))
            }
            InstKind::Load { ptr } => {
                let p = self.ptr_operand(frame, ptr)?;
                self.load(p, ty)
            }
            InstKind::Store { value, ptr } => {
                let p = self.ptr_operand(frame, ptr)?;
                let v = self.operand(frame, value)?;
                let bytes = encode(&v, &type_of(value));
                self.write(p, &bytes)?;
                Ok(RtValue::Void)
            }
            InstKind::Gep { ptr, indices } => {
                let base = self.ptr_operand(frame, ptr)?;
                let mut cur = type_of(ptr).pointee().cloned().unwrap_or(IrType::Void);
                let overflow = || ExecError::OutOfBounds { ptr: base, len: 0 };
                let mut offset: i64 = 0;
                for (n, idx) in indices.iter().enumerate() {
                    let i = self.int_operand(frame, idx)?;
                    let step = if n == 0 {
                        i.checked_mul(cur.size_of() as i64)
                    } else {
                        let field = cur.field_offset(i.max(0) as usize) as i64;
                        cur = cur.element(i.max(0) as usize).cloned().unwrap_or(IrType::Void);
                        Some(field)
                    };
                    offset = step.and_then(|s| offset.checked_add(s)).ok_or_else(overflow)?;
                }
                if base == 0 {
                    return Ok(RtValue::Ptr(0));
                }
                Ok(RtValue::Ptr(offset_within(base, offset).ok_or_else(overflow)?))
            }
            InstKind::Cast { op, value } => {
                let v = self.operand(frame, value)?;
                Ok(cast(*op, v, &type_of(value), ty))
            }
            InstKind::Binary { op, lhs, rhs } => {
                let a = self.operand(frame, lhs)?;
                let b = self.operand(frame, rhs)?;
                binary(*op, a, b, ty)
            }
            InstKind::Not { value } => {
                let bits = ty.int_bits().unwrap_or(1);
                let v = self.int_operand(frame, value)?;
                Ok(RtValue::Int { bits, value: norm(bits, !v) })
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                let a = self.int_operand(frame, lhs)?;
                let b = self.int_operand(frame, rhs)?;
                let r = match pred {
                    IntPredicate::Eq => a == b,
                    IntPredicate::Ne => a != b,
                    IntPredicate::Slt => a < b,
                    IntPredicate::Sle => a <= b,
                    IntPredicate::Sgt => a > b,
                    IntPredicate::Sge => a >= b,
                };
                Ok(RtValue::Int { bits: 1, value: i64::from(r) })
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                let a = self.operand(frame, lhs)?.as_f64().unwrap_or(f64::NAN);
                let b = self.operand(frame, rhs)?.as_f64().unwrap_or(f64::NAN);
                let r = match pred {
                    FloatPredicate::Oeq => a == b,
                    FloatPredicate::One => a != b && !a.is_nan() && !b.is_nan(),
                    FloatPredicate::Olt => a < b,
                    FloatPredicate::Ole => a <= b,
                    FloatPredicate::Ogt => a > b,
                    FloatPredicate::Oge => a >= b,
                };
                Ok(RtValue::Int { bits: 1, value: i64::from(r) })
            }
            InstKind::Select { cond, then, else_ } => {
                if self.operand(frame, cond)?.truthy() {
                    self.operand(frame, then)
                } else {
                    self.operand(frame, else_)
                }
            }
            InstKind::Phi { .. } => Err(ExecError::BadOperand("phi after non-phi".to_string())),
            InstKind::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args.iter() {
                    values.push(self.operand(frame, a)?);
                }
                self.call(*callee, values)
            }
            InstKind::Malloc { ty: elem } => Ok(RtValue::Ptr(self.allocate(elem.size_of()))),
            InstKind::ArrayMalloc { ty: elem, count } => {
                let n = self.int_operand(frame, count)?.max(0) as u64;
                let size = elem.size_of().checked_mul(n).filter(|s| *s <= OFFSET_MASK);
                let size = size.ok_or(ExecError::OutOfBounds { ptr: 0, len: n })?;
                Ok(RtValue::Ptr(self.allocate(size)))
            }
            InstKind::ExtractValue { agg, index } => {
                let agg_ty = type_of(agg);
                let bytes = match self.operand(frame, agg)? {
                    RtValue::Bytes(b) => b,
                    other => return Err(ExecError::BadOperand(format!("extractvalue on {}", other))),
                };
                let start = agg_ty.field_offset(*index as usize) as usize;
                let end = (start + ty.size_of() as usize).min(bytes.len());
                Ok(decode(&bytes[start.min(end)..end], ty))
            }
        }
    }

    fn call_builtin(&mut self, f: &Function, args: Vec<RtValue>) -> ExecResult<RtValue> {
        let int = |i: usize| args.get(i).and_then(|a| a.as_int().or(a.as_ptr().map(|p| p as i64))).unwrap_or(0);
        let ptr = |i: usize| args.get(i).and_then(|a| a.as_ptr()).unwrap_or(0);
        match f.name.as_str() {
            "malloc" => Ok(RtValue::Ptr(self.allocate(int(0).max(0) as u64))),
            "realloc" => {
                let old = ptr(0);
                let size = int(1).max(0) as u64;
                let new = self.allocate(size);
                if old != 0 {
                    let (alloc, offset) = self.locate(old, 0)?;
                    let keep = (self.memory[alloc].bytes.len() - offset).min(size as usize);
                    let bytes = self.read(old, keep as u64)?;
                    self.write(new, &bytes)?;
                    self.release(old);
                }
                Ok(RtValue::Ptr(new))
            }
            "memset" => {
                let len = int(2).max(0) as usize;
                self.write(ptr(0), &vec![int(1) as u8; len])?;
                Ok(RtValue::Ptr(ptr(0)))
            }
            "memcpy" => {
                let len = int(2).max(0) as u64;
                let bytes = self.read(ptr(1), len)?;
                self.write(ptr(0), &bytes)?;
                Ok(RtValue::Ptr(ptr(0)))
            }
            "puts" => {
                let s = self.read_c_string(ptr(0))?;
                self.output.push_str(&s);
                self.output.push('\n');
                Ok(RtValue::Int { bits: 32, value: 0 })
            }
            other => Err(ExecError::UnknownExternal(other.to_string())),
        }
    }

    /// Run the program entry function with `args` as its argument vector.
    pub fn run_main(&mut self, args: &[String]) -> ExecResult<RtValue> {
        let main = self
            .module
            .find_function(ENTRY_FUNCTION)
            .ok_or_else(|| ExecError::MissingEntry(ENTRY_FUNCTION.to_string()))?;
        let argv = self.allocate(8 * args.len() as u64);
        for (i, a) in args.iter().enumerate() {
            let mut bytes = a.as_bytes().to_vec();
            bytes.push(0);
            let s = self.allocate(bytes.len() as u64);
            self.write(s, &bytes)?;
            self.write(argv + 8 * i as u64, &s.to_le_bytes())?;
        }
        let argc = RtValue::Int { bits: 32, value: args.len() as i64 };
        self.call(main, vec![argc, RtValue::Ptr(argv)])
    }
}

fn cast(op: CastOp, v: RtValue, from: &IrType, to: &IrType) -> RtValue {
    let to_bits = to.int_bits().unwrap_or(64);
    match (op, v) {
        (CastOp::BitCast, RtValue::Ptr(p)) => RtValue::Ptr(p),
        (CastOp::BitCast, v) => decode(&encode(&v, from), to),
        (CastOp::IntToPtr, RtValue::Int { value, .. }) => RtValue::Ptr(value as u64),
        (CastOp::PtrToInt, RtValue::Ptr(p)) => RtValue::Int { bits: to_bits, value: norm(to_bits, p as i64) },
        (CastOp::Trunc, RtValue::Int { value, .. }) => RtValue::Int { bits: to_bits, value: norm(to_bits, value) },
        (CastOp::ZExt, RtValue::Int { bits, value }) => {
            let masked = if bits >= 64 { value } else { value & ((1i64 << bits) - 1) };
            RtValue::Int { bits: to_bits, value: norm(to_bits, masked) }
        }
        (CastOp::SExt, RtValue::Int { bits, value }) => {
            let v = if bits == 1 { -value } else { value };
            RtValue::Int { bits: to_bits, value: norm(to_bits, v) }
        }
        (CastOp::SIToFP, RtValue::Int { value, .. }) => match to {
            IrType::Float => RtValue::F32(value as f32),
            _ => RtValue::F64(value as f64),
        },
        (CastOp::FPToSI, v) => {
            let f = v.as_f64().unwrap_or(0.0);
            RtValue::Int { bits: to_bits, value: norm(to_bits, f as i64) }
        }
        (CastOp::FPExt, v) => RtValue::F64(v.as_f64().unwrap_or(0.0)),
        (CastOp::FPTrunc, v) => RtValue::F32(v.as_f64().unwrap_or(0.0) as f32),
        (_, v) => v,
    }
}

fn binary(op: BinOp, a: RtValue, b: RtValue, ty: &IrType) -> ExecResult<RtValue> {
    if op.is_float() {
        let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        let r = match op {
            BinOp::FAdd => x + y,
            BinOp::FSub => x - y,
            BinOp::FMul => x * y,
            _ => x / y,
        };
        return Ok(match ty {
            IrType::Float => RtValue::F32(r as f32),
            _ => RtValue::F64(r),
        });
    }
    let bits = ty.int_bits().unwrap_or(64);
    let (x, y) = match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(ExecError::BadOperand(format!("{} on non-integers", op.mnemonic()))),
    };
    let r = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::SDiv => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            x.wrapping_div(y)
        }
        BinOp::SRem => {
            if y == 0 {
                return Err(ExecError::DivisionByZero);
            }
            x.wrapping_rem(y)
        }
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        _ => 0,
    };
    Ok(RtValue::Int { bits, value: norm(bits, r) })
}

/// Execute the entry function of `module` and return its result.
pub fn run_main(module: &Module, args: &[String]) -> ExecResult<RtValue> {
    ExecState::new(module).run_main(args)
}

/// Like `run_main`, also returning everything the program wrote.
pub fn run_main_with_output(module: &Module, args: &[String]) -> ExecResult<(RtValue, String)> {
    let mut state = ExecState::new(module);
    let value = state.run_main(args)?;
    Ok((value, state.output().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::module::{Linkage, Param};

    fn main_fn(b: &mut IrBuilder, ret: IrType) -> (FuncId, BlockId) {
        let params = vec![
            Param { name: "argc".into(), ty: IrType::i32() },
            Param { name: "argv".into(), ty: IrType::byte_ptr().ptr_to() },
        ];
        let f = b.declare_function(ENTRY_FUNCTION, params, ret, Linkage::External, false);
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        (f, entry)
    }

    #[test]
    fn loop_with_phi_sums_to_ten() {
        let mut b = IrBuilder::new("sum");
        let (f, entry) = main_fn(&mut b, IrType::i32());
        let head = b.append_block(f, "head");
        let body = b.append_block(f, "body");
        let exit = b.append_block(f, "exit");
        b.br(head);
        b.position_at_end(f, head);
        // i and acc are phis; their back-edge values are patched in below
        let i = b.phi(IrType::i32(), vec![]);
        let acc = b.phi(IrType::i32(), vec![]);
        let done = b.icmp(IntPredicate::Sge, i.clone(), Value::i32(5));
        b.cond_br(done, exit, body);
        b.position_at_end(f, body);
        let acc2 = b.binary(BinOp::Add, acc.clone(), i.clone());
        let i2 = b.binary(BinOp::Add, i.clone(), Value::i32(1));
        b.br(head);
        let func = b.module.function_mut(f);
        for (phi, init, next) in [(&i, Value::i32(0), i2), (&acc, Value::i32(0), acc2)] {
            if let Value::Inst(id) = phi {
                func.insts[id.index()].kind = InstKind::Phi { incoming: vec![(init, entry), (next, body)] };
            }
        }
        b.position_at_end(f, exit);
        b.ret(Some(acc));
        let result = run_main(&b.module, &[]).expect("run");
        assert_eq!(result.as_int(), Some(10));
    }

    #[test]
    fn unreachable_traps() {
        let mut b = IrBuilder::new("trap");
        main_fn(&mut b, IrType::Void);
        b.unreachable();
        let err = run_main(&b.module, &[]).unwrap_err();
        assert!(matches!(err, ExecError::Unreachable { .. }));
    }

    #[test]
    fn null_load_traps() {
        let mut b = IrBuilder::new("null");
        main_fn(&mut b, IrType::i32());
        let p = b.int_to_ptr(Value::i64(0), IrType::i32().ptr_to());
        let v = b.load(p, None);
        b.ret(Some(v));
        assert_eq!(run_main(&b.module, &[]).unwrap_err(), ExecError::NullDereference);
    }

    fn load_past_first_allocation(elements: i64) -> ExecResult<RtValue> {
        let mut b = IrBuilder::new("oob");
        main_fn(&mut b, IrType::i32());
        let p = b.malloc(IrType::i32());
        let q = b.malloc(IrType::i32());
        b.store(Value::i32(77), q);
        let far = b.gep(p, vec![Value::i64(elements)]);
        let v = b.load(far, None);
        b.ret(Some(v));
        run_main(&b.module, &[])
    }

    #[test]
    fn gep_cannot_reach_a_neighbouring_allocation() {
        assert!(matches!(load_past_first_allocation(1 << 30), Err(ExecError::OutOfBounds { .. })));
        assert!(matches!(load_past_first_allocation(2), Err(ExecError::OutOfBounds { .. })));
        assert!(matches!(load_past_first_allocation(i64::MAX), Err(ExecError::OutOfBounds { .. })));
        assert!(matches!(load_past_first_allocation(-1), Err(ExecError::OutOfBounds { .. })));
    }

    #[test]
    fn argc_is_passed_through() {
        let mut b = IrBuilder::new("argc");
        main_fn(&mut b, IrType::i32());
        b.ret(Some(Value::Param(0)));
        let args = vec!["prog".to_string(), "x".to_string()];
        assert_eq!(run_main(&b.module, &args).expect("run").as_int(), Some(2));
    }
}
