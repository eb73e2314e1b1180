//! file: core/src/program/types.rs
//! description: the resolved type table handed over by the type stage.
//!
//! A type's position in the table is its runtime type id. Ids are assigned
//! once for the whole program, so a member keeps the same tag in every union
//! that contains it.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeId,
}

impl Field {
    pub fn new(name: &str, ty: TypeId) -> Self {
        Field { name: name.to_string(), ty }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    /// The top-level scope; never passed as `self`.
    Program,
    Nil,
    Bool,
    Char,
    Int { bits: u32 },
    Float {
        #[serde(default)]
        double: bool,
    },
    Symbol,
    Str,
    /// Heap object referenced by pointer.
    Class {
        name: String,
        #[serde(default)]
        parent: Option<TypeId>,
        #[serde(default)]
        ivars: Vec<Field>,
    },
    /// C-layout record, also referenced by pointer.
    Struct {
        name: String,
        #[serde(default)]
        fields: Vec<Field>,
    },
    Pointer { elem: TypeId },
    Union { members: Vec<TypeId> },
    /// "Some concrete subclass of `base`", boxed as (type id, pointer).
    Hierarchy { base: TypeId },
    Metaclass { instance: TypeId },
}

fn default_allocated() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(flatten)]
    pub kind: TypeKind,
    /// False when no value of this type can exist at this point of the
    /// compilation; dispatch candidates over such types are never called.
    #[serde(default = "default_allocated")]
    pub allocated: bool,
}

impl TypeInfo {
    pub fn new(kind: TypeKind) -> Self {
        TypeInfo { kind, allocated: true }
    }
}

lazy_static! {
    static ref INT_NAMES: HashMap<u32, &'static str> = {
        let mut m = HashMap::new();
        m.insert(8, "Int8");
        m.insert(16, "Int16");
        m.insert(32, "Int32");
        m.insert(64, "Int64");
        m
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable { types: Vec::new() }
    }

    pub fn push(&mut self, info: TypeInfo) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(info);
        id
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, id: TypeId) -> bool {
        id.index() < self.types.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.types.len()).map(|i| TypeId(i as u32))
    }

    pub fn info(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn info_mut(&mut self, id: TypeId) -> &mut TypeInfo {
        &mut self.types[id.index()]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()].kind
    }

    pub fn allocated(&self, id: TypeId) -> bool {
        self.types[id.index()].allocated
    }

    fn find(&self, pred: impl Fn(&TypeKind) -> bool) -> Option<TypeId> {
        self.ids().find(|id| pred(self.kind(*id)))
    }

    pub fn nil(&self) -> Option<TypeId> {
        self.find(|k| matches!(k, TypeKind::Nil))
    }

    pub fn bool(&self) -> Option<TypeId> {
        self.find(|k| matches!(k, TypeKind::Bool))
    }

    pub fn str(&self) -> Option<TypeId> {
        self.find(|k| matches!(k, TypeKind::Str))
    }

    pub fn program(&self) -> Option<TypeId> {
        self.find(|k| matches!(k, TypeKind::Program))
    }

    pub fn int(&self, bits: u32) -> Option<TypeId> {
        self.find(|k| matches!(k, TypeKind::Int { bits: b } if *b == bits))
    }

    pub fn is_nil(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Nil)
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Bool)
    }

    pub fn is_union(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Union { .. })
    }

    pub fn is_hierarchy(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Hierarchy { .. })
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Pointer { .. })
    }

    /// Concrete object types: values are a single pointer to a record.
    pub fn is_object(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Class { .. } | TypeKind::Struct { .. } | TypeKind::Str)
    }

    /// Types whose representation has a distinguishable null state.
    pub fn is_pointer_like(&self, id: TypeId) -> bool {
        self.is_object(id) || self.is_pointer(id)
    }

    pub fn members(&self, id: TypeId) -> &[TypeId] {
        match self.kind(id) {
            TypeKind::Union { members } => members,
            _ => &[],
        }
    }

    pub fn has_member(&self, id: TypeId, pred: impl Fn(&TypeKind) -> bool) -> bool {
        self.members(id).iter().any(|m| pred(self.kind(*m)))
    }

    /// The non-nil member of a two-member `{T, Nil}` union whose `T` admits a
    /// null state. Such unions are stored without a tag.
    pub fn nilable_member(&self, id: TypeId) -> Option<TypeId> {
        let members = self.members(id);
        if members.len() != 2 {
            return None;
        }
        let (a, b) = (members[0], members[1]);
        let other = if self.is_nil(a) {
            b
        } else if self.is_nil(b) {
            a
        } else {
            return None;
        };
        if self.is_pointer_like(other) { Some(other) } else { None }
    }

    pub fn is_nilable(&self, id: TypeId) -> bool {
        self.nilable_member(id).is_some()
    }

    /// Tagged unions and hierarchy boxes are always handled through their
    /// address; everything else travels as a register value.
    pub fn is_address_held(&self, id: TypeId) -> bool {
        (self.is_union(id) && !self.is_nilable(id)) || self.is_hierarchy(id)
    }

    pub fn passed_as_self(&self, id: TypeId) -> bool {
        !matches!(self.kind(id), TypeKind::Program | TypeKind::Metaclass { .. })
    }

    pub fn parent(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Class { parent, .. } => *parent,
            _ => None,
        }
    }

    pub fn is_subclass_of(&self, id: TypeId, ancestor: TypeId) -> bool {
        let mut cur = Some(id);
        let mut guard = 0;
        while let Some(t) = cur {
            if t == ancestor {
                return true;
            }
            guard += 1;
            if guard > self.types.len() {
                return false;
            }
            cur = self.parent(t);
        }
        false
    }

    /// Whether every value of type `a` is also a value of type `b`.
    pub fn implements(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match self.kind(b) {
            TypeKind::Hierarchy { base } => return self.implements(a, *base),
            TypeKind::Union { members } => {
                if members.iter().any(|m| self.implements(a, *m)) {
                    return true;
                }
            }
            _ => {}
        }
        match self.kind(a) {
            TypeKind::Class { .. } => self.is_subclass_of(a, b),
            TypeKind::Hierarchy { base } => self.implements(*base, b),
            TypeKind::Union { members } => {
                !members.is_empty() && members.iter().all(|m| self.implements(*m, b))
            }
            _ => false,
        }
    }

    /// Every concrete class at or below `base`, in type-id order.
    pub fn concrete_subtypes(&self, base: TypeId) -> Vec<TypeId> {
        self.ids()
            .filter(|id| matches!(self.kind(*id), TypeKind::Class { .. }) && self.is_subclass_of(*id, base))
            .collect()
    }

    /// The runtime type ids a value of static type `id` may carry.
    pub fn runtime_ids(&self, id: TypeId) -> Vec<TypeId> {
        match self.kind(id) {
            TypeKind::Union { members } => members.iter().flat_map(|m| self.runtime_ids(*m)).collect(),
            TypeKind::Hierarchy { base } => self.concrete_subtypes(*base),
            _ => vec![id],
        }
    }

    pub fn field_index(&self, id: TypeId, name: &str) -> Option<(usize, TypeId)> {
        let fields = match self.kind(id) {
            TypeKind::Class { ivars, .. } => ivars,
            TypeKind::Struct { fields, .. } => fields,
            TypeKind::Hierarchy { base } => return self.field_index(*base, name),
            _ => return None,
        };
        fields.iter().position(|f| f.name == name).map(|i| (i, fields[i].ty))
    }

    pub fn name(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Program => "<Program>".to_string(),
            TypeKind::Nil => "Nil".to_string(),
            TypeKind::Bool => "Bool".to_string(),
            TypeKind::Char => "Char".to_string(),
            TypeKind::Int { bits } => match INT_NAMES.get(bits) {
                Some(n) => n.to_string(),
                None => format!("Int{}", bits),
            },
            TypeKind::Float { double } => if *double { "Float64" } else { "Float32" }.to_string(),
            TypeKind::Symbol => "Symbol".to_string(),
            TypeKind::Str => "String".to_string(),
            TypeKind::Class { name, .. } | TypeKind::Struct { name, .. } => name.clone(),
            TypeKind::Pointer { elem } => format!("Pointer({})", self.name(*elem)),
            TypeKind::Union { members } => {
                let names: Vec<String> = members.iter().map(|m| self.name(*m)).collect();
                format!("({})", names.join(" | "))
            }
            TypeKind::Hierarchy { base } => format!("{}+", self.name(*base)),
            TypeKind::Metaclass { instance } => format!("{}:Class", self.name(*instance)),
        }
    }

    /// Every type id referenced from inside a type description.
    pub fn referenced(&self, id: TypeId) -> Vec<TypeId> {
        match self.kind(id) {
            TypeKind::Class { parent, ivars, .. } => {
                let mut v: Vec<TypeId> = ivars.iter().map(|f| f.ty).collect();
                v.extend(parent.iter().copied());
                v
            }
            TypeKind::Struct { fields, .. } => fields.iter().map(|f| f.ty).collect(),
            TypeKind::Pointer { elem } => vec![*elem],
            TypeKind::Union { members } => members.clone(),
            TypeKind::Hierarchy { base } => vec![*base],
            TypeKind::Metaclass { instance } => vec![*instance],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (TypeTable, TypeId, TypeId, TypeId, TypeId, TypeId) {
        let mut t = TypeTable::new();
        let nil = t.push(TypeInfo::new(TypeKind::Nil));
        let int = t.push(TypeInfo::new(TypeKind::Int { bits: 32 }));
        let animal = t.push(TypeInfo::new(TypeKind::Class { name: "Animal".into(), parent: None, ivars: vec![] }));
        let dog = t.push(TypeInfo::new(TypeKind::Class { name: "Dog".into(), parent: Some(animal), ivars: vec![] }));
        let cat = t.push(TypeInfo::new(TypeKind::Class { name: "Cat".into(), parent: Some(animal), ivars: vec![] }));
        (t, nil, int, animal, dog, cat)
    }

    #[test]
    fn nilable_requires_pointer_like_member() {
        let (mut t, nil, int, animal, _, _) = table();
        let int_or_nil = t.push(TypeInfo::new(TypeKind::Union { members: vec![int, nil] }));
        let animal_or_nil = t.push(TypeInfo::new(TypeKind::Union { members: vec![nil, animal] }));
        assert_eq!(t.nilable_member(int_or_nil), None);
        assert_eq!(t.nilable_member(animal_or_nil), Some(animal));
    }

    #[test]
    fn hierarchy_subtypes_and_implements() {
        let (mut t, _, int, animal, dog, cat) = table();
        let animals = t.push(TypeInfo::new(TypeKind::Hierarchy { base: animal }));
        assert_eq!(t.concrete_subtypes(animal), vec![animal, dog, cat]);
        assert!(t.implements(dog, animals));
        assert!(t.implements(animals, animal));
        assert!(!t.implements(int, animals));
        assert_eq!(t.name(animals), "Animal+");
    }
}
