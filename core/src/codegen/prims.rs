//! file: core/src/codegen/prims.rs
//! description: bodies of primitive definitions.
//!
//! A primitive body reads `self` and the definition's arguments straight
//! from the function parameters and produces a value already shaped as the
//! definition's return type.

use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{BinOp, CastOp, FloatPredicate, IntPredicate, IrType, Value};
use crate::program::{BinaryPrim, Def, PrimitiveOp, TypeId, TypeKind};

/// Arithmetic class of a primitive operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Num {
    /// Width in bits; `unsigned` for chars and bools.
    Int { bits: u32, unsigned: bool },
    Float { double: bool },
}

fn prim_error(msg: impl Into<String>) -> CodegenError {
    CodegenError::internal(msg, None)
}

impl<'p> CodeGen<'p> {
    pub(super) fn visit_primitive(&mut self, op: &'p PrimitiveOp) -> Result<Value> {
        let def = self.def.ok_or_else(|| prim_error("primitive outside of a definition"))?;
        log::trace!("primitive {:?} in {}", op, def.name);
        match op {
            PrimitiveOp::Binary { op } => self.prim_binary(def, *op),
            PrimitiveOp::Convert => {
                let (v, from) = self.prim_self()?;
                let to = self.prim_return(def)?;
                self.numeric_cast(v, from, to)
            }
            PrimitiveOp::Allocate | PrimitiveOp::StructAlloc => {
                let ty = self.prim_return(def)?;
                let body = super::layout::struct_body(self.types, ty);
                let size = body.size_of();
                let obj = self.b.malloc(body);
                self.zero_fill(obj.clone(), Value::i64(size as i64));
                Ok(obj)
            }
            PrimitiveOp::StructGet { field } => {
                let (obj, ty) = self.prim_self()?;
                let (ptr, fty) = self.field_ptr(obj, ty, field)?;
                if self.types.is_address_held(fty) {
                    Ok(ptr)
                } else {
                    Ok(self.b.load(ptr, Some(field.as_str())))
                }
            }
            PrimitiveOp::StructSet { field } => {
                let (obj, ty) = self.prim_self()?;
                let (value, vty) = self.prim_arg(def, 0)?;
                let (ptr, fty) = self.field_ptr(obj, ty, field)?;
                self.assign(ptr, fty, vty, value.clone())?;
                Ok(value)
            }
            PrimitiveOp::PointerMalloc => {
                let ty = self.prim_return(def)?;
                let elem = self.pointer_elem(ty)?;
                let (count, count_ty) = self.prim_arg(def, 0)?;
                let count = self.to_i64(count, count_ty)?;
                let ptr = self.b.array_malloc(self.llvm(elem), count.clone());
                let bytes = self.scaled_size(count, elem);
                self.zero_fill(ptr.clone(), bytes);
                Ok(ptr)
            }
            PrimitiveOp::PointerRealloc => {
                let (ptr, ty) = self.prim_self()?;
                let elem = self.pointer_elem(ty)?;
                let (count, count_ty) = self.prim_arg(def, 0)?;
                let count = self.to_i64(count, count_ty)?;
                let bytes = self.scaled_size(count, elem);
                let realloc = self.runtime_function("realloc", &[IrType::byte_ptr(), IrType::i64()], IrType::byte_ptr());
                let raw = self.b.bitcast(ptr, IrType::byte_ptr());
                let grown = self.b.call(realloc, vec![raw, bytes]);
                Ok(self.b.bitcast(grown, self.llvm(ty)))
            }
            PrimitiveOp::PointerGetValue => {
                let (ptr, ty) = self.prim_self()?;
                let elem = self.pointer_elem(ty)?;
                if self.types.is_address_held(elem) {
                    Ok(ptr)
                } else {
                    Ok(self.b.load(ptr, Some("value")))
                }
            }
            PrimitiveOp::PointerSetValue => {
                let (ptr, ty) = self.prim_self()?;
                let elem = self.pointer_elem(ty)?;
                let (value, vty) = self.prim_arg(def, 0)?;
                self.assign(ptr, elem, vty, value.clone())?;
                Ok(value)
            }
            PrimitiveOp::PointerAdd => {
                let (ptr, _) = self.prim_self()?;
                let (offset, offset_ty) = self.prim_arg(def, 0)?;
                let offset = self.to_i64(offset, offset_ty)?;
                Ok(self.b.gep(ptr, vec![offset]))
            }
            PrimitiveOp::PointerCast => {
                let (ptr, _) = self.prim_self()?;
                let ty = self.prim_return(def)?;
                Ok(self.b.bitcast(ptr, self.llvm(ty)))
            }
            PrimitiveOp::PointerCopyFrom => {
                let (dest, ty) = self.prim_self()?;
                let elem = self.pointer_elem(ty)?;
                let (source, _) = self.prim_arg(def, 0)?;
                let (count, count_ty) = self.prim_arg(def, 1)?;
                let count = self.to_i64(count, count_ty)?;
                let bytes = self.scaled_size(count, elem);
                let memcpy = self.runtime_function(
                    "memcpy",
                    &[IrType::byte_ptr(), IrType::byte_ptr(), IrType::i64()],
                    IrType::byte_ptr(),
                );
                let d = self.b.bitcast(dest.clone(), IrType::byte_ptr());
                let s = self.b.bitcast(source, IrType::byte_ptr());
                self.b.call(memcpy, vec![d, s, bytes]);
                Ok(dest)
            }
            PrimitiveOp::PointerAddress => {
                let (ptr, _) = self.prim_self()?;
                Ok(self.b.ptr_to_int(ptr, IrType::i64()))
            }
            PrimitiveOp::SymbolToS => {
                let (index, _) = self.prim_self()?;
                self.symbol_name(index)
            }
        }
    }

    fn prim_self(&self) -> Result<(Value, TypeId)> {
        self.act
            .vars
            .get("self")
            .map(|v| (v.ptr.clone(), v.ty))
            .ok_or_else(|| prim_error("primitive needs a receiver"))
    }

    fn prim_arg(&self, def: &Def, index: usize) -> Result<(Value, TypeId)> {
        def.args
            .get(index)
            .and_then(|a| self.act.vars.get(&a.name))
            .map(|v| (v.ptr.clone(), v.ty))
            .ok_or_else(|| prim_error(format!("`{}` has no argument {}", def.name, index)))
    }

    fn prim_return(&self, def: &Def) -> Result<TypeId> {
        def.ty.ok_or_else(|| prim_error(format!("`{}` returns nothing", def.name)))
    }

    fn pointer_elem(&self, ty: TypeId) -> Result<TypeId> {
        match self.types.kind(ty) {
            TypeKind::Pointer { elem } => Ok(*elem),
            _ => Err(prim_error(format!("{} is not a pointer type", self.types.name(ty)))),
        }
    }

    fn num(&self, ty: TypeId) -> Option<Num> {
        match self.types.kind(ty) {
            TypeKind::Int { bits } => Some(Num::Int { bits: *bits, unsigned: false }),
            TypeKind::Char => Some(Num::Int { bits: 8, unsigned: true }),
            TypeKind::Bool => Some(Num::Int { bits: 1, unsigned: true }),
            TypeKind::Symbol => Some(Num::Int { bits: 32, unsigned: false }),
            TypeKind::Float { double } => Some(Num::Float { double: *double }),
            _ => None,
        }
    }

    /// Address of `field` in the record `obj` points to, typed as the field.
    fn field_ptr(&mut self, obj: Value, ty: TypeId, field: &str) -> Result<(Value, TypeId)> {
        let (index, fty) = self
            .types
            .field_index(ty, field)
            .ok_or_else(|| prim_error(format!("{} has no field `{}`", self.types.name(ty), field)))?;
        let raw = self.b.struct_gep(obj, index as u32);
        Ok((self.b.bitcast(raw, self.llvm(fty).ptr_to()), fty))
    }

    fn to_i64(&mut self, value: Value, ty: TypeId) -> Result<Value> {
        match self.num(ty) {
            Some(Num::Int { bits: 64, .. }) => Ok(value),
            Some(Num::Int { unsigned: true, .. }) => Ok(self.b.cast(CastOp::ZExt, value, IrType::i64())),
            Some(Num::Int { .. }) => Ok(self.b.cast(CastOp::SExt, value, IrType::i64())),
            _ => Err(prim_error(format!("{} is not an integer type", self.types.name(ty)))),
        }
    }

    fn scaled_size(&mut self, count: Value, elem: TypeId) -> Value {
        let size = self.llvm(elem).size_of().max(1);
        self.b.binary(BinOp::Mul, count, Value::i64(size as i64))
    }

    fn zero_fill(&mut self, ptr: Value, bytes: Value) {
        let memset = self.runtime_function(
            "memset",
            &[IrType::byte_ptr(), IrType::i8(), IrType::i64()],
            IrType::byte_ptr(),
        );
        let raw = self.b.bitcast(ptr, IrType::byte_ptr());
        self.b.call(memset, vec![raw, Value::i8(0), bytes]);
    }

    /// Integer resize, int/float conversion or float resize of `value`.
    fn numeric_cast(&mut self, value: Value, from: TypeId, to: TypeId) -> Result<Value> {
        let (Some(f), Some(t)) = (self.num(from), self.num(to)) else {
            return Err(prim_error(format!(
                "no numeric conversion from {} to {}",
                self.types.name(from),
                self.types.name(to)
            )));
        };
        let want = self.llvm(to);
        let v = match (f, t) {
            (Num::Int { bits: a, unsigned }, Num::Int { bits: b, .. }) => {
                if a == b {
                    value
                } else if a > b {
                    self.b.cast(CastOp::Trunc, value, want)
                } else if unsigned {
                    self.b.cast(CastOp::ZExt, value, want)
                } else {
                    self.b.cast(CastOp::SExt, value, want)
                }
            }
            (Num::Int { .. }, Num::Float { .. }) => self.b.cast(CastOp::SIToFP, value, want),
            (Num::Float { .. }, Num::Int { .. }) => self.b.cast(CastOp::FPToSI, value, want),
            (Num::Float { double: a }, Num::Float { double: b }) => match (a, b) {
                (false, true) => self.b.cast(CastOp::FPExt, value, want),
                (true, false) => self.b.cast(CastOp::FPTrunc, value, want),
                _ => value,
            },
        };
        Ok(v)
    }

    fn prim_binary(&mut self, def: &Def, op: BinaryPrim) -> Result<Value> {
        let (l, lt) = self.prim_self()?;
        let (r, rt) = self.prim_arg(def, 0)?;
        let (Some(ln), Some(rn)) = (self.num(lt), self.num(rt)) else {
            return Err(prim_error(format!(
                "{:?} on {} and {}",
                op,
                self.types.name(lt),
                self.types.name(rt)
            )));
        };
        let result = match (ln, rn) {
            (Num::Int { bits: a, .. }, Num::Int { bits: b, .. }) => {
                let bits = a.max(b);
                let common = self.int_type_of_width(bits, if a >= b { lt } else { rt });
                let l = self.numeric_cast(l, lt, common)?;
                let r = self.numeric_cast(r, rt, common)?;
                self.int_binary(op, l, r)?
            }
            _ => {
                let double = matches!(ln, Num::Float { double: true }) || matches!(rn, Num::Float { double: true });
                let l = self.to_float(l, ln, double);
                let r = self.to_float(r, rn, double);
                self.float_binary(op, l, r)?
            }
        };
        match def.ty {
            Some(ret) if !self.types.is_bool(ret) && self.num(ret).is_some() => {
                let result_ty = self.b.type_of(&result);
                if result_ty == self.llvm(ret) {
                    Ok(result)
                } else {
                    let from = self.widest_operand(lt, rt);
                    self.numeric_cast(result, from, ret)
                }
            }
            _ => Ok(result),
        }
    }

    /// Whichever operand type the arithmetic was carried out in.
    fn widest_operand(&self, lt: TypeId, rt: TypeId) -> TypeId {
        match (self.num(lt), self.num(rt)) {
            (Some(Num::Float { double: true }), _) => lt,
            (_, Some(Num::Float { double: true })) => rt,
            (Some(Num::Float { .. }), _) => lt,
            (_, Some(Num::Float { .. })) => rt,
            (Some(Num::Int { bits: a, .. }), Some(Num::Int { bits: b, .. })) if b > a => rt,
            _ => lt,
        }
    }

    fn int_type_of_width(&self, bits: u32, fallback: TypeId) -> TypeId {
        self.types.int(bits).unwrap_or(fallback)
    }

    fn to_float(&mut self, value: Value, num: Num, double: bool) -> Value {
        let want = if double { IrType::Double } else { IrType::Float };
        match num {
            Num::Int { .. } => self.b.cast(CastOp::SIToFP, value, want),
            Num::Float { double: d } if d == double => value,
            Num::Float { .. } => self.b.cast(CastOp::FPExt, value, want),
        }
    }

    fn int_binary(&mut self, op: BinaryPrim, l: Value, r: Value) -> Result<Value> {
        let v = match op {
            BinaryPrim::Add => self.b.binary(BinOp::Add, l, r),
            BinaryPrim::Sub => self.b.binary(BinOp::Sub, l, r),
            BinaryPrim::Mul => self.b.binary(BinOp::Mul, l, r),
            BinaryPrim::Div => self.b.binary(BinOp::SDiv, l, r),
            BinaryPrim::Rem => self.b.binary(BinOp::SRem, l, r),
            BinaryPrim::And => self.b.and(l, r),
            BinaryPrim::Or => self.b.or(l, r),
            BinaryPrim::Eq => self.b.icmp(IntPredicate::Eq, l, r),
            BinaryPrim::Ne => self.b.icmp(IntPredicate::Ne, l, r),
            BinaryPrim::Lt => self.b.icmp(IntPredicate::Slt, l, r),
            BinaryPrim::Le => self.b.icmp(IntPredicate::Sle, l, r),
            BinaryPrim::Gt => self.b.icmp(IntPredicate::Sgt, l, r),
            BinaryPrim::Ge => self.b.icmp(IntPredicate::Sge, l, r),
        };
        Ok(v)
    }

    fn float_binary(&mut self, op: BinaryPrim, l: Value, r: Value) -> Result<Value> {
        let v = match op {
            BinaryPrim::Add => self.b.binary(BinOp::FAdd, l, r),
            BinaryPrim::Sub => self.b.binary(BinOp::FSub, l, r),
            BinaryPrim::Mul => self.b.binary(BinOp::FMul, l, r),
            BinaryPrim::Div => self.b.binary(BinOp::FDiv, l, r),
            BinaryPrim::Eq => self.b.fcmp(FloatPredicate::Oeq, l, r),
            BinaryPrim::Ne => self.b.fcmp(FloatPredicate::One, l, r),
            BinaryPrim::Lt => self.b.fcmp(FloatPredicate::Olt, l, r),
            BinaryPrim::Le => self.b.fcmp(FloatPredicate::Ole, l, r),
            BinaryPrim::Gt => self.b.fcmp(FloatPredicate::Ogt, l, r),
            BinaryPrim::Ge => self.b.fcmp(FloatPredicate::Oge, l, r),
            BinaryPrim::Rem | BinaryPrim::And | BinaryPrim::Or => {
                return Err(prim_error(format!("{:?} is not defined on floats", op)));
            }
        };
        Ok(v)
    }
}
