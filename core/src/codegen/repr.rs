//! file: core/src/codegen/repr.rs
//! description: value representations and the conversions between them.
//!
//! Every static type is held in one of four shapes. Conversions match on
//! the (target, source) pair; a pair the type stage can never produce is an
//! internal inconsistency, not a reinterpretation.
//!
//! Address-held shapes (`Tagged`, `Boxed`) travel as the address of their
//! storage; the other two travel as register values.

use super::layout::{self, hierarchy_struct};
use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{IntPredicate, IrType, Value};
use crate::program::{TypeId, TypeKind, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    /// A single register value.
    Scalar,
    /// `{ i32 type_id, [payload x i8] }`
    Tagged { payload: u64 },
    /// `{T, Nil}` over a pointer-like `T`: the bare pointer, null for nil.
    NilableSlot { member: TypeId },
    /// `{ i32 type_id, i8* object }`
    Boxed { base: TypeId },
}

impl Repr {
    pub fn is_address_held(self) -> bool {
        matches!(self, Repr::Tagged { .. } | Repr::Boxed { .. })
    }
}

impl TypeTable {
    pub fn repr(&self, ty: TypeId) -> Repr {
        match self.kind(ty) {
            TypeKind::Union { .. } => match self.nilable_member(ty) {
                Some(member) => Repr::NilableSlot { member },
                None => Repr::Tagged { payload: layout::union_payload_size(self, ty) },
            },
            TypeKind::Hierarchy { base } => Repr::Boxed { base: *base },
            _ => Repr::Scalar,
        }
    }
}

fn type_id(ty: TypeId) -> Value {
    Value::i32(i64::from(ty.0))
}

impl<'p> CodeGen<'p> {
    pub(super) fn repr(&self, ty: TypeId) -> Repr {
        self.types.repr(ty)
    }

    pub(super) fn load_tag(&mut self, addr: Value) -> Value {
        let p = self.b.struct_gep(addr, 0);
        self.b.load(p, Some("type_id"))
    }

    /// Payload of a tagged union (or object slot of a box), typed as `as_ty`.
    fn payload_ptr(&mut self, addr: Value, as_ty: IrType) -> Value {
        let p = self.b.struct_gep(addr, 1);
        self.b.bitcast(p, as_ty.ptr_to())
    }

    pub(super) fn is_null(&mut self, value: Value) -> Value {
        let i = self.b.ptr_to_int(value, IrType::i64());
        self.b.icmp(IntPredicate::Eq, i, Value::i64(0))
    }

    pub(super) fn not_null(&mut self, value: Value) -> Value {
        let i = self.b.ptr_to_int(value, IrType::i64());
        self.b.icmp(IntPredicate::Ne, i, Value::i64(0))
    }

    /// Reinterpret between IR shapes that differ only in pointee or in an
    /// integer standing for nil.
    pub(super) fn coerce(&mut self, value: Value, to: &IrType) -> Value {
        let from = self.b.type_of(&value);
        if from == *to {
            value
        } else if from.is_ptr() && to.is_ptr() {
            self.b.bitcast(value, to.clone())
        } else if from.is_int() && to.is_ptr() {
            self.b.int_to_ptr(value, to.clone())
        } else {
            value
        }
    }

    pub(super) fn store_coerced(&mut self, value: Value, ptr: Value) {
        let value = match self.b.type_of(&ptr).pointee().cloned() {
            Some(want) => self.coerce(value, &want),
            None => value,
        };
        self.b.store(value, ptr);
    }

    /// Store `value`, of static type `from`, into the `to`-typed slot at `ptr`.
    pub(super) fn assign(&mut self, ptr: Value, to: TypeId, from: TypeId, value: Value) -> Result<()> {
        if to == from {
            if self.types.is_address_held(to) {
                let v = self.b.load(value, None);
                self.b.store(v, ptr);
            } else {
                self.store_coerced(value, ptr);
            }
            return Ok(());
        }
        match self.repr(to) {
            Repr::Tagged { .. } => self.assign_to_union(ptr, to, from, value),
            Repr::Boxed { .. } if self.repr(from) == Repr::Scalar => {
                self.fill_box(ptr, from, value);
                Ok(())
            }
            Repr::Boxed { .. } => {
                let boxed = self.convert(value, from, to)?;
                let v = self.b.load(boxed, None);
                self.b.store(v, ptr);
                Ok(())
            }
            Repr::NilableSlot { .. } | Repr::Scalar => {
                let v = self.convert(value, from, to)?;
                self.store_coerced(v, ptr);
                Ok(())
            }
        }
    }

    fn assign_to_union(&mut self, ptr: Value, to: TypeId, from: TypeId, value: Value) -> Result<()> {
        match self.repr(from) {
            Repr::Tagged { .. } => {
                // Tags are global, so the bytes copy over unchanged.
                let (src, dst) = (self.llvm(from), self.llvm(to));
                let copy = if src.size_of() <= dst.size_of() { src } else { dst };
                let s = self.b.bitcast(value, copy.clone().ptr_to());
                let v = self.b.load(s, None);
                let d = self.b.bitcast(ptr, copy.ptr_to());
                self.b.store(v, d);
            }
            Repr::NilableSlot { member } => {
                let null = self.is_null(value.clone());
                let tag = self.b.select(null, type_id(self.nil), type_id(member));
                let tag_ptr = self.b.struct_gep(ptr.clone(), 0);
                self.b.store(tag, tag_ptr);
                let from_ir = self.llvm(from);
                let payload = self.payload_ptr(ptr, from_ir);
                self.b.store(value, payload);
            }
            Repr::Boxed { .. } => {
                if self.types.members(to).contains(&from) {
                    let tag_ptr = self.b.struct_gep(ptr.clone(), 0);
                    self.b.store(type_id(from), tag_ptr);
                    let boxed = self.b.load(value, None);
                    let payload = self.payload_ptr(ptr, hierarchy_struct());
                    self.b.store(boxed, payload);
                } else {
                    let tag = self.load_tag(value.clone());
                    let obj_ptr = self.b.struct_gep(value, 1);
                    let obj = self.b.load(obj_ptr, None);
                    let tag_ptr = self.b.struct_gep(ptr.clone(), 0);
                    self.b.store(tag, tag_ptr);
                    let payload = self.payload_ptr(ptr, IrType::byte_ptr());
                    self.b.store(obj, payload);
                }
            }
            Repr::Scalar => {
                let members = self.types.members(to);
                let hierarchy = if members.contains(&from) {
                    None
                } else {
                    members
                        .iter()
                        .copied()
                        .find(|m| self.types.is_hierarchy(*m) && self.types.implements(from, *m))
                };
                let tag_ptr = self.b.struct_gep(ptr.clone(), 0);
                match hierarchy {
                    Some(h) => {
                        self.b.store(type_id(h), tag_ptr);
                        let payload = self.payload_ptr(ptr, hierarchy_struct());
                        self.fill_box(payload, from, value);
                    }
                    None => {
                        self.b.store(type_id(from), tag_ptr);
                        let from_ir = self.llvm(from);
                        let payload = self.payload_ptr(ptr, from_ir);
                        self.store_coerced(value, payload);
                    }
                }
            }
        }
        Ok(())
    }

    /// Write `(type_id, object)` into the hierarchy box at `slot`.
    fn fill_box(&mut self, slot: Value, obj_ty: TypeId, value: Value) {
        let tag_ptr = self.b.struct_gep(slot.clone(), 0);
        self.b.store(type_id(obj_ty), tag_ptr);
        let obj = self.b.bitcast(value, IrType::byte_ptr());
        let obj_ptr = self.b.struct_gep(slot, 1);
        self.b.store(obj, obj_ptr);
    }

    /// Box a concrete object as a hierarchy value in a fresh slot.
    pub(super) fn box_object_in_hierarchy(&mut self, obj_ty: TypeId, value: Value) -> Value {
        let slot = self.alloca(hierarchy_struct(), Some("box"));
        self.fill_box(slot.clone(), obj_ty, value);
        slot
    }

    /// `to ⊆ from`: reading `from` storage as `to` needs no copy.
    fn is_narrowing(&self, from: TypeId, to: TypeId) -> bool {
        let wide = self.types.members(from);
        self.types.members(to).iter().all(|m| wide.contains(m))
    }

    /// Produce the `to`-typed view of `value`, held as `from`.
    pub(super) fn convert(&mut self, value: Value, from: TypeId, to: TypeId) -> Result<Value> {
        if from == to {
            return Ok(value);
        }
        let to_ir = self.llvm(to);
        let v = match (self.repr(to), self.repr(from)) {
            (Repr::Tagged { .. }, Repr::Tagged { .. }) if self.is_narrowing(from, to) => {
                self.b.bitcast(value, to_ir.ptr_to())
            }
            (Repr::Tagged { .. }, _) => {
                let slot = self.alloca(to_ir, None);
                self.assign_to_union(slot.clone(), to, from, value)?;
                slot
            }
            (Repr::Boxed { .. }, Repr::Boxed { .. }) => value,
            (Repr::Boxed { .. }, Repr::Scalar) => self.box_object_in_hierarchy(from, value),
            (Repr::Boxed { .. }, Repr::NilableSlot { member }) => self.box_object_in_hierarchy(member, value),
            (Repr::Boxed { .. }, Repr::Tagged { .. }) => {
                if self.types.members(from).contains(&to) {
                    self.payload_ptr(value, hierarchy_struct())
                } else {
                    let slot = self.alloca(hierarchy_struct(), Some("box"));
                    let tag = self.load_tag(value.clone());
                    let obj_src = self.payload_ptr(value, IrType::byte_ptr());
                    let obj = self.b.load(obj_src, None);
                    let tag_ptr = self.b.struct_gep(slot.clone(), 0);
                    self.b.store(tag, tag_ptr);
                    let obj_ptr = self.b.struct_gep(slot.clone(), 1);
                    self.b.store(obj, obj_ptr);
                    slot
                }
            }
            (Repr::NilableSlot { .. }, Repr::Tagged { .. }) => {
                let tag = self.load_tag(value.clone());
                let is_nil = self.b.icmp(IntPredicate::Eq, tag, type_id(self.nil));
                let src = self.payload_ptr(value, to_ir.clone());
                let obj = self.b.load(src, None);
                self.b.select(is_nil, Value::null(to_ir), obj)
            }
            (Repr::NilableSlot { .. } | Repr::Scalar, Repr::Boxed { .. }) => {
                let obj_ptr = self.b.struct_gep(value, 1);
                let obj = self.b.load(obj_ptr, None);
                self.b.bitcast(obj, to_ir)
            }
            (Repr::NilableSlot { .. }, _) => {
                if self.types.is_nil(from) {
                    Value::null(to_ir)
                } else {
                    self.coerce(value, &to_ir)
                }
            }
            (Repr::Scalar, _) if self.types.is_nil(to) => Value::i1(false),
            (Repr::Scalar, Repr::Tagged { .. }) => {
                let src = self.payload_ptr(value, to_ir);
                self.b.load(src, None)
            }
            (Repr::Scalar, Repr::NilableSlot { .. }) => self.coerce(value, &to_ir),
            (Repr::Scalar, Repr::Scalar) => {
                let from_ir = self.llvm(from);
                if from_ir == to_ir {
                    value
                } else if from_ir.is_ptr() && to_ir.is_ptr() {
                    self.b.bitcast(value, to_ir)
                } else {
                    return Err(CodegenError::internal(
                        format!("no conversion from {} to {}", self.types.name(from), self.types.name(to)),
                        None,
                    ));
                }
            }
        };
        Ok(v)
    }

    /// Whether `value` (static type `from`) is at run time a `target`.
    pub(super) fn is_a(&mut self, value: Value, from: TypeId, target: TypeId) -> Value {
        match self.repr(from) {
            Repr::Tagged { .. } => {
                let members = self.types.members(from);
                let matching: Vec<TypeId> =
                    members.iter().copied().filter(|m| self.types.implements(*m, target)).collect();
                if matching.is_empty() {
                    return Value::i1(false);
                }
                if matching.len() == members.len() {
                    return Value::i1(true);
                }
                let tag = self.load_tag(value);
                self.match_any_of(tag, &matching)
            }
            Repr::NilableSlot { member } => {
                if self.types.is_nil(target) {
                    self.is_null(value)
                } else if self.types.implements(member, target) {
                    self.not_null(value)
                } else {
                    Value::i1(false)
                }
            }
            Repr::Boxed { .. } | Repr::Scalar => Value::i1(self.types.implements(from, target)),
        }
    }

    fn match_any_of(&mut self, tag: Value, ids: &[TypeId]) -> Value {
        let mut acc = Value::i1(false);
        for id in ids {
            let eq = self.b.icmp(IntPredicate::Eq, tag.clone(), type_id(*id));
            acc = self.b.or(acc, eq);
        }
        acc
    }

    /// Whether the runtime type id `tag` denotes a value of `ty`.
    pub(super) fn match_any_type_id(&mut self, ty: TypeId, tag: Value) -> Value {
        let mut ids = vec![ty];
        for id in self.types.members(ty).iter().copied().chain(self.types.runtime_ids(ty)) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.match_any_of(tag, &ids)
    }
}
