//! file: core/src/codegen/layout.rs
//! description: mapping from source types to IR types.
//!
//! Objects (classes, C structs, strings) are pointers to their record.
//! Inside a record, a field holding another object is an opaque `i8*`, so
//! self-referential classes have a finite layout; reads and writes of such
//! fields are cast at the access site.

use crate::ir::IrType;
use crate::program::{TypeId, TypeKind, TypeTable};

/// `{ i32 length, [0 x i8] bytes }*`
pub fn string_type() -> IrType {
    IrType::Struct(vec![IrType::i32(), IrType::Array(Box::new(IrType::i8()), 0)]).ptr_to()
}

/// `{ i32 type_id, i8* object }`
pub fn hierarchy_struct() -> IrType {
    IrType::Struct(vec![IrType::i32(), IrType::byte_ptr()])
}

pub fn llvm_type(types: &TypeTable, ty: TypeId) -> IrType {
    match types.kind(ty) {
        TypeKind::Program | TypeKind::Nil | TypeKind::Bool => IrType::i1(),
        TypeKind::Char => IrType::i8(),
        TypeKind::Int { bits } => IrType::Int(*bits),
        TypeKind::Float { double } => if *double { IrType::Double } else { IrType::Float },
        TypeKind::Symbol | TypeKind::Metaclass { .. } => IrType::i32(),
        TypeKind::Str => string_type(),
        TypeKind::Class { .. } | TypeKind::Struct { .. } => struct_body(types, ty).ptr_to(),
        TypeKind::Pointer { elem } => llvm_type(types, *elem).ptr_to(),
        TypeKind::Union { .. } => match types.nilable_member(ty) {
            Some(member) => llvm_type(types, member),
            None => union_struct(types, ty),
        },
        TypeKind::Hierarchy { .. } => hierarchy_struct(),
    }
}

/// The record an object type points to.
pub fn struct_body(types: &TypeTable, ty: TypeId) -> IrType {
    match types.kind(ty) {
        TypeKind::Class { ivars: fields, .. } | TypeKind::Struct { fields, .. } => {
            IrType::Struct(fields.iter().map(|f| field_type(types, f.ty)).collect())
        }
        TypeKind::Str => IrType::Struct(vec![IrType::i32(), IrType::Array(Box::new(IrType::i8()), 0)]),
        TypeKind::Hierarchy { base } => struct_body(types, *base),
        _ => IrType::Struct(Vec::new()),
    }
}

/// Storage type of a record field of type `ty`. Anything held as a single
/// pointer is stored as `i8*`.
pub fn field_type(types: &TypeTable, ty: TypeId) -> IrType {
    if is_single_pointer(types, ty) {
        IrType::byte_ptr()
    } else {
        llvm_type(types, ty)
    }
}

fn is_single_pointer(types: &TypeTable, ty: TypeId) -> bool {
    types.is_pointer_like(ty) || types.is_nilable(ty)
}

/// Size of a value of `ty`, computed without expanding object records.
pub fn storage_size(types: &TypeTable, ty: TypeId) -> u64 {
    if is_single_pointer(types, ty) {
        crate::ir::types::POINTER_SIZE
    } else {
        llvm_type(types, ty).size_of()
    }
}

/// Bytes needed to hold any member of a tagged union.
pub fn union_payload_size(types: &TypeTable, ty: TypeId) -> u64 {
    types.members(ty).iter().map(|m| storage_size(types, *m)).max().unwrap_or(0).max(1)
}

fn union_struct(types: &TypeTable, ty: TypeId) -> IrType {
    let payload = union_payload_size(types, ty);
    IrType::Struct(vec![IrType::i32(), IrType::Array(Box::new(IrType::i8()), payload)])
}

/// How a value of `ty` crosses a call boundary: address-held values are
/// passed by reference and copied by the callee.
pub fn arg_type(types: &TypeTable, ty: TypeId) -> IrType {
    if types.is_address_held(ty) {
        llvm_type(types, ty).ptr_to()
    } else {
        llvm_type(types, ty)
    }
}

pub fn return_type(types: &TypeTable, ty: Option<TypeId>) -> IrType {
    match ty {
        Some(t) => llvm_type(types, t),
        None => IrType::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramBuilder;

    #[test]
    fn self_referential_class_has_finite_layout() {
        let mut b = ProgramBuilder::new();
        let int = b.std.int32;
        let node = b.class("Node", None, &[("value", int)]);
        let nil = b.std.nil;
        let next = b.union(&[node, nil]);
        if let TypeKind::Class { ivars, .. } = &mut b.types.info_mut(node).kind {
            ivars.push(crate::program::Field::new("next", next));
        }
        let body = struct_body(&b.types, node);
        assert_eq!(body, IrType::Struct(vec![IrType::i32(), IrType::byte_ptr()]));
        assert_eq!(llvm_type(&b.types, next), body.ptr_to());
    }

    #[test]
    fn tagged_union_payload_fits_largest_member() {
        let mut b = ProgramBuilder::new();
        let (int, float, nil) = (b.std.int32, b.std.float64, b.std.nil);
        let u = b.union(&[int, float, nil]);
        assert_eq!(union_payload_size(&b.types, u), 8);
        assert_eq!(llvm_type(&b.types, u).to_string(), "{ i32, [8 x i8] }");
        assert_eq!(arg_type(&b.types, u), llvm_type(&b.types, u).ptr_to());
    }

    #[test]
    fn nilable_object_is_a_bare_pointer() {
        let mut b = ProgramBuilder::new();
        let foo = b.class("Foo", None, &[]);
        let nil = b.std.nil;
        let u = b.union(&[nil, foo]);
        assert_eq!(llvm_type(&b.types, u), llvm_type(&b.types, foo));
        assert!(llvm_type(&b.types, u).is_ptr());
    }
}
