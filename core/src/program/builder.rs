//! file: core/src/program/builder.rs
//! description: in-code construction of typed programs.
//!
//! `ProgramBuilder` is how tests and tools assemble a `Program` without
//! going through JSON. It pre-registers the standard types, hands out node
//! ids and keeps the definition and constant tables in order.

use super::node::{Block, BlockArg, Call, ConstId, DefId, Node, NodeKind, PrimitiveOp};
use super::types::{Field, TypeId, TypeInfo, TypeKind, TypeTable};
use super::{Arg, ConstDef, Def, External, GlobalDef, Program};

/// Ids of the types every program starts with.
#[derive(Debug, Clone, Copy)]
pub struct StdTypes {
    pub program: TypeId,
    pub nil: TypeId,
    pub bool: TypeId,
    pub char: TypeId,
    pub int32: TypeId,
    pub int64: TypeId,
    pub float64: TypeId,
    pub symbol: TypeId,
    pub string: TypeId,
}

pub struct ProgramBuilder {
    pub types: TypeTable,
    pub std: StdTypes,
    defs: Vec<Def>,
    consts: Vec<ConstDef>,
    globals: Vec<GlobalDef>,
    next_id: usize,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        ProgramBuilder::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut types = TypeTable::new();
        let mut add = |k: TypeKind| types.push(TypeInfo::new(k));
        let std = StdTypes {
            program: add(TypeKind::Program),
            nil: add(TypeKind::Nil),
            bool: add(TypeKind::Bool),
            char: add(TypeKind::Char),
            int32: add(TypeKind::Int { bits: 32 }),
            int64: add(TypeKind::Int { bits: 64 }),
            float64: add(TypeKind::Float { double: true }),
            symbol: add(TypeKind::Symbol),
            string: add(TypeKind::Str),
        };
        ProgramBuilder { types, std, defs: Vec::new(), consts: Vec::new(), globals: Vec::new(), next_id: 0 }
    }

    // ---- types ----

    pub fn add_type(&mut self, kind: TypeKind) -> TypeId {
        self.types.push(TypeInfo::new(kind))
    }

    pub fn class(&mut self, name: &str, parent: Option<TypeId>, ivars: &[(&str, TypeId)]) -> TypeId {
        let ivars = ivars.iter().map(|(n, t)| Field::new(n, *t)).collect();
        self.add_type(TypeKind::Class { name: name.to_string(), parent, ivars })
    }

    pub fn struct_type(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
        let fields = fields.iter().map(|(n, t)| Field::new(n, *t)).collect();
        self.add_type(TypeKind::Struct { name: name.to_string(), fields })
    }

    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.add_type(TypeKind::Pointer { elem })
    }

    /// A union over `members`, reusing an identical earlier union.
    pub fn union(&mut self, members: &[TypeId]) -> TypeId {
        let existing = self.types.ids().find(|id| self.types.is_union(*id) && self.types.members(*id) == members);
        match existing {
            Some(id) => id,
            None => self.add_type(TypeKind::Union { members: members.to_vec() }),
        }
    }

    pub fn hierarchy(&mut self, base: TypeId) -> TypeId {
        self.add_type(TypeKind::Hierarchy { base })
    }

    pub fn metaclass(&mut self, instance: TypeId) -> TypeId {
        self.add_type(TypeKind::Metaclass { instance })
    }

    pub fn set_allocated(&mut self, ty: TypeId, allocated: bool) {
        self.types.info_mut(ty).allocated = allocated;
    }

    // ---- nodes ----

    pub fn node(&mut self, kind: NodeKind, ty: Option<TypeId>) -> Node {
        let id = self.next_id;
        self.next_id += 1;
        Node::new(id, kind, ty)
    }

    pub fn nil(&mut self) -> Node {
        let t = self.std.nil;
        self.node(NodeKind::NilLiteral, Some(t))
    }

    pub fn bool(&mut self, value: bool) -> Node {
        let t = self.std.bool;
        self.node(NodeKind::BoolLiteral { value }, Some(t))
    }

    pub fn int(&mut self, value: i64) -> Node {
        let t = self.std.int32;
        self.node(NodeKind::IntLiteral { value }, Some(t))
    }

    pub fn int64(&mut self, value: i64) -> Node {
        let t = self.std.int64;
        self.node(NodeKind::IntLiteral { value }, Some(t))
    }

    pub fn float(&mut self, value: f64) -> Node {
        let t = self.std.float64;
        self.node(NodeKind::FloatLiteral { value }, Some(t))
    }

    pub fn char(&mut self, value: u8) -> Node {
        let t = self.std.char;
        self.node(NodeKind::CharLiteral { value }, Some(t))
    }

    pub fn string(&mut self, value: &str) -> Node {
        let t = self.std.string;
        self.node(NodeKind::StringLiteral { value: value.to_string() }, Some(t))
    }

    pub fn symbol(&mut self, value: &str) -> Node {
        let t = self.std.symbol;
        self.node(NodeKind::SymbolLiteral { value: value.to_string() }, Some(t))
    }

    pub fn type_literal(&mut self, ty: TypeId) -> Node {
        self.node(NodeKind::TypeLiteral, Some(ty))
    }

    pub fn var(&mut self, name: &str, ty: TypeId) -> Node {
        self.node(NodeKind::Var { name: name.to_string() }, Some(ty))
    }

    pub fn assign(&mut self, target: Node, value: Node) -> Node {
        let ty = value.ty;
        self.node(NodeKind::Assign { target: Box::new(target), value: Box::new(value) }, ty)
    }

    /// `name = value` where the variable has static type `var_ty`.
    pub fn assign_var(&mut self, name: &str, var_ty: TypeId, value: Node) -> Node {
        let target = self.var(name, var_ty);
        self.assign(target, value)
    }

    pub fn multi_assign(&mut self, targets: Vec<Node>, values: Vec<Node>) -> Node {
        let t = self.std.nil;
        self.node(NodeKind::MultiAssign { targets, values }, Some(t))
    }

    pub fn ivar(&mut self, name: &str, ty: TypeId) -> Node {
        self.node(NodeKind::InstanceVar { name: name.to_string() }, Some(ty))
    }

    pub fn global(&mut self, name: &str, ty: TypeId) -> Node {
        self.node(NodeKind::Global { name: name.to_string() }, Some(ty))
    }

    pub fn const_ref(&mut self, id: ConstId) -> Node {
        let ty = self.consts[id.0 as usize].value.ty;
        self.node(NodeKind::Const { id }, ty)
    }

    pub fn seq(&mut self, expressions: Vec<Node>) -> Node {
        let ty = expressions.last().and_then(|e| e.ty);
        self.node(NodeKind::Expressions { expressions }, ty)
    }

    pub fn if_(&mut self, cond: Node, then: Option<Node>, else_: Option<Node>, ty: Option<TypeId>) -> Node {
        self.node(
            NodeKind::If { cond: Box::new(cond), then: then.map(Box::new), else_: else_.map(Box::new) },
            ty,
        )
    }

    pub fn while_(&mut self, cond: Node, body: Option<Node>, run_once: bool) -> Node {
        let t = self.std.nil;
        self.node(NodeKind::While { cond: Box::new(cond), body: body.map(Box::new), run_once }, Some(t))
    }

    pub fn ret(&mut self, value: Option<Node>) -> Node {
        self.node(NodeKind::Return { value: value.map(Box::new) }, None)
    }

    pub fn brk(&mut self, value: Option<Node>) -> Node {
        self.node(NodeKind::Break { value: value.map(Box::new) }, None)
    }

    pub fn yield_(&mut self, values: Vec<Node>, ty: Option<TypeId>) -> Node {
        self.node(NodeKind::Yield { values }, ty)
    }

    pub fn call(
        &mut self,
        obj: Option<Node>,
        name: &str,
        args: Vec<Node>,
        targets: Vec<DefId>,
        ty: Option<TypeId>,
    ) -> Node {
        let call = Call { obj: obj.map(Box::new), name: name.to_string(), args, targets, block: None, scope: None };
        self.node(NodeKind::Call(call), ty)
    }

    pub fn call_with_block(
        &mut self,
        obj: Option<Node>,
        name: &str,
        args: Vec<Node>,
        target: DefId,
        block: Block,
        ty: Option<TypeId>,
    ) -> Node {
        let call = Call {
            obj: obj.map(Box::new),
            name: name.to_string(),
            args,
            targets: vec![target],
            block: Some(block),
            scope: None,
        };
        self.node(NodeKind::Call(call), ty)
    }

    /// A call on the implicit receiver of type `scope`.
    pub fn self_call(&mut self, scope: TypeId, name: &str, args: Vec<Node>, targets: Vec<DefId>, ty: Option<TypeId>) -> Node {
        let call = Call { obj: None, name: name.to_string(), args, targets, block: None, scope: Some(scope) };
        self.node(NodeKind::Call(call), ty)
    }

    pub fn block(&self, args: &[(&str, TypeId)], body: Option<Node>) -> Block {
        Block {
            args: args.iter().map(|(n, t)| BlockArg { name: n.to_string(), ty: *t }).collect(),
            body: body.map(Box::new),
        }
    }

    pub fn is_a(&mut self, obj: Node, target: TypeId) -> Node {
        let t = self.std.bool;
        self.node(NodeKind::IsA { obj: Box::new(obj), target }, Some(t))
    }

    pub fn simple_or(&mut self, left: Node, right: Node) -> Node {
        let t = self.std.bool;
        self.node(NodeKind::SimpleOr { left: Box::new(left), right: Box::new(right) }, Some(t))
    }

    pub fn pointer_of(&mut self, target: Node, ptr_ty: TypeId) -> Node {
        self.node(NodeKind::PointerOf { target: Box::new(target) }, Some(ptr_ty))
    }

    pub fn nil_pointer(&mut self, ptr_ty: TypeId) -> Node {
        self.node(NodeKind::NilPointer, Some(ptr_ty))
    }

    pub fn argc(&mut self) -> Node {
        let t = self.std.int32;
        self.node(NodeKind::Argc, Some(t))
    }

    pub fn argv(&mut self, ty: TypeId) -> Node {
        self.node(NodeKind::Argv, Some(ty))
    }

    // ---- definitions ----

    /// Register a definition without a body; `define_body` completes it.
    /// Recursive definitions need their id before their body exists.
    pub fn declare_def(&mut self, name: &str, owner: TypeId, args: &[(&str, TypeId)], ty: Option<TypeId>) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(Def {
            name: name.to_string(),
            owner,
            args: args.iter().map(|(n, t)| Arg::new(n, *t)).collect(),
            ty,
            body: None,
            external: None,
            location: None,
        });
        id
    }

    pub fn define_body(&mut self, id: DefId, body: Node) {
        self.defs[id.0 as usize].body = Some(body);
    }

    pub fn def(&mut self, name: &str, owner: TypeId, args: &[(&str, TypeId)], ty: Option<TypeId>, body: Node) -> DefId {
        let id = self.declare_def(name, owner, args, ty);
        self.define_body(id, body);
        id
    }

    /// A top-level function on the program scope.
    pub fn fun(&mut self, name: &str, args: &[(&str, TypeId)], ty: Option<TypeId>, body: Node) -> DefId {
        let owner = self.std.program;
        self.def(name, owner, args, ty, body)
    }

    pub fn primitive(&mut self, name: &str, owner: TypeId, args: &[(&str, TypeId)], ty: Option<TypeId>, op: PrimitiveOp) -> DefId {
        let body = self.node(NodeKind::Primitive { op }, ty);
        self.def(name, owner, args, ty, body)
    }

    pub fn external(&mut self, name: &str, real_name: &str, args: Vec<Arg>, ty: Option<TypeId>, varargs: bool) -> DefId {
        let id = DefId(self.defs.len() as u32);
        let owner = self.std.program;
        self.defs.push(Def {
            name: name.to_string(),
            owner,
            args,
            ty,
            body: None,
            external: Some(External { real_name: real_name.to_string(), varargs }),
            location: None,
        });
        id
    }

    pub fn constant(&mut self, name: &str, value: Node) -> ConstId {
        let id = ConstId(self.consts.len() as u32);
        self.consts.push(ConstDef { name: name.to_string(), value });
        id
    }

    pub fn global_def(&mut self, name: &str, ty: TypeId) {
        self.globals.push(GlobalDef { name: name.to_string(), ty });
    }

    pub fn finish(self, root: Node) -> Program {
        Program {
            types: self.types,
            defs: self.defs,
            consts: self.consts,
            globals: self.globals,
            symbols: Vec::new(),
            root: Some(root),
            filename: None,
        }
    }

    pub fn finish_seq(mut self, expressions: Vec<Node>) -> Program {
        let root = self.seq(expressions);
        self.finish(root)
    }
}
