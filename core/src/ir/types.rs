//! file: core/src/ir/types.rs
//! description: first-class types of the target IR and their memory layout.
//!
//! Layout follows natural alignment on a 64-bit target: pointers are 8
//! bytes, `i1` occupies one byte, struct fields are padded to their own
//! alignment and the struct is rounded up to its largest field alignment.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    Int(u32),
    Float,
    Double,
    Ptr(Box<IrType>),
    Array(Box<IrType>, u64),
    Struct(Vec<IrType>),
}

pub const POINTER_SIZE: u64 = 8;

impl IrType {
    pub fn i1() -> IrType {
        IrType::Int(1)
    }

    pub fn i8() -> IrType {
        IrType::Int(8)
    }

    pub fn i32() -> IrType {
        IrType::Int(32)
    }

    pub fn i64() -> IrType {
        IrType::Int(64)
    }

    /// `i8*`, the opaque byte pointer.
    pub fn byte_ptr() -> IrType {
        IrType::Ptr(Box::new(IrType::Int(8)))
    }

    pub fn ptr_to(self) -> IrType {
        IrType::Ptr(Box::new(self))
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, IrType::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::Float | IrType::Double)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, IrType::Array(..) | IrType::Struct(_))
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            IrType::Int(b) => Some(*b),
            _ => None,
        }
    }

    pub fn size_of(&self) -> u64 {
        match self {
            IrType::Void => 0,
            IrType::Int(bits) => u64::from(*bits).div_ceil(8).next_power_of_two(),
            IrType::Float => 4,
            IrType::Double => 8,
            IrType::Ptr(_) => POINTER_SIZE,
            IrType::Array(elem, n) => elem.size_of() * n,
            IrType::Struct(fields) => {
                let mut offset = 0u64;
                for f in fields.iter() {
                    offset = align_to(offset, f.align_of()) + f.size_of();
                }
                align_to(offset, self.align_of())
            }
        }
    }

    pub fn align_of(&self) -> u64 {
        match self {
            IrType::Void => 1,
            IrType::Int(_) | IrType::Float | IrType::Double | IrType::Ptr(_) => self.size_of().max(1),
            IrType::Array(elem, _) => elem.align_of(),
            IrType::Struct(fields) => fields.iter().map(|f| f.align_of()).max().unwrap_or(1),
        }
    }

    /// Byte offset of field `index` of a struct type, or of element `index`
    /// of an array type.
    pub fn field_offset(&self, index: usize) -> u64 {
        match self {
            IrType::Struct(fields) => {
                let mut offset = 0u64;
                for (i, f) in fields.iter().enumerate() {
                    offset = align_to(offset, f.align_of());
                    if i == index {
                        return offset;
                    }
                    offset += f.size_of();
                }
                offset
            }
            IrType::Array(elem, _) => elem.size_of() * index as u64,
            _ => 0,
        }
    }

    /// Type reached by stepping into a struct field or array element.
    pub fn element(&self, index: usize) -> Option<&IrType> {
        match self {
            IrType::Struct(fields) => fields.get(index),
            IrType::Array(elem, _) => Some(elem),
            _ => None,
        }
    }
}

fn align_to(offset: u64, align: u64) -> u64 {
    if align <= 1 { offset } else { offset.div_ceil(align) * align }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Float => write!(f, "float"),
            IrType::Double => write!(f, "double"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Array(elem, n) => write!(f, "[{} x {}]", n, elem),
            IrType::Struct(fields) => {
                let parts: Vec<String> = fields.iter().map(|t| t.to_string()).collect();
                write!(f, "{{ {} }}", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_pads_to_natural_alignment() {
        let s = IrType::Struct(vec![IrType::i1(), IrType::i32(), IrType::byte_ptr()]);
        assert_eq!(s.field_offset(0), 0);
        assert_eq!(s.field_offset(1), 4);
        assert_eq!(s.field_offset(2), 8);
        assert_eq!(s.size_of(), 16);
        assert_eq!(s.align_of(), 8);
    }

    #[test]
    fn union_buffer_layout() {
        let u = IrType::Struct(vec![IrType::i32(), IrType::Array(Box::new(IrType::i8()), 8)]);
        assert_eq!(u.field_offset(1), 4);
        assert_eq!(u.size_of(), 12);
        assert_eq!(u.to_string(), "{ i32, [8 x i8] }");
    }
}
