//! file: core/src/program/node.rs
//! description: typed AST node definitions.
//!
//! Every expression node carries the static type the type stage resolved
//! for it. Calls carry their ordered candidate definitions; constant
//! references carry the constant they resolve to.

use serde::{Deserialize, Serialize};

use super::types::TypeId;
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: usize,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeId>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryPrim {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Fixed low-level operations. They appear as the body of a definition and
/// address `self` and the definition's arguments positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "prim", rename_all = "snake_case")]
pub enum PrimitiveOp {
    /// `self <op> arg0` on numbers, chars and bools.
    Binary { op: BinaryPrim },
    /// Numeric conversion of `self` to the definition's return type.
    Convert,
    /// Zeroed heap record for the definition's return type.
    Allocate,
    StructAlloc,
    StructGet { field: String },
    StructSet { field: String },
    /// `Pointer(T).malloc(size)`.
    PointerMalloc,
    /// `ptr.realloc(size)`.
    PointerRealloc,
    PointerGetValue,
    PointerSetValue,
    /// `ptr + offset`, scaled by the element size.
    PointerAdd,
    PointerCast,
    /// `dest.copy_from(source, count)`.
    PointerCopyFrom,
    PointerAddress,
    /// Name of a symbol through the program's symbol table.
    SymbolToS,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeId,
}

/// A block literal attached to a call; inlined at every `yield`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub args: Vec<BlockArg>,
    #[serde(default)]
    pub body: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    #[serde(default)]
    pub obj: Option<Box<Node>>,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Node>,
    /// Candidate definitions in mutual-exclusion order.
    #[serde(default)]
    pub targets: Vec<DefId>,
    #[serde(default)]
    pub block: Option<Block>,
    /// Type of the implicit receiver when `obj` is absent.
    #[serde(default)]
    pub scope: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    /// Declarations (defs, class and lib definitions) that emit no code.
    Nop,
    NilLiteral,
    BoolLiteral { value: bool },
    IntLiteral { value: i64 },
    FloatLiteral { value: f64 },
    CharLiteral { value: u8 },
    StringLiteral { value: String },
    SymbolLiteral { value: String },
    TypeLiteral,
    Var { name: String },
    Assign { target: Box<Node>, value: Box<Node> },
    MultiAssign { targets: Vec<Node>, values: Vec<Node> },
    InstanceVar { name: String },
    Global { name: String },
    Const { id: ConstId },
    Expressions { expressions: Vec<Node> },
    If {
        cond: Box<Node>,
        #[serde(default)]
        then: Option<Box<Node>>,
        #[serde(default, rename = "else")]
        else_: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        #[serde(default)]
        body: Option<Box<Node>>,
        #[serde(default)]
        run_once: bool,
    },
    Return {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    Break {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    Yield {
        #[serde(default)]
        values: Vec<Node>,
    },
    Call(Call),
    IsA { obj: Box<Node>, target: TypeId },
    SimpleOr { left: Box<Node>, right: Box<Node> },
    PointerOf { target: Box<Node> },
    NilPointer,
    Argc,
    Argv,
    Primitive { op: PrimitiveOp },
}

impl Node {
    pub fn new(id: usize, kind: NodeKind, ty: Option<TypeId>) -> Self {
        Node { id, kind, ty, location: None }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Nop => "nop",
            NodeKind::NilLiteral => "nil_literal",
            NodeKind::BoolLiteral { .. } => "bool_literal",
            NodeKind::IntLiteral { .. } => "int_literal",
            NodeKind::FloatLiteral { .. } => "float_literal",
            NodeKind::CharLiteral { .. } => "char_literal",
            NodeKind::StringLiteral { .. } => "string_literal",
            NodeKind::SymbolLiteral { .. } => "symbol_literal",
            NodeKind::TypeLiteral => "type_literal",
            NodeKind::Var { .. } => "var",
            NodeKind::Assign { .. } => "assign",
            NodeKind::MultiAssign { .. } => "multi_assign",
            NodeKind::InstanceVar { .. } => "instance_var",
            NodeKind::Global { .. } => "global",
            NodeKind::Const { .. } => "const",
            NodeKind::Expressions { .. } => "expressions",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::Return { .. } => "return",
            NodeKind::Break { .. } => "break",
            NodeKind::Yield { .. } => "yield",
            NodeKind::Call(_) => "call",
            NodeKind::IsA { .. } => "is_a",
            NodeKind::SimpleOr { .. } => "simple_or",
            NodeKind::PointerOf { .. } => "pointer_of",
            NodeKind::NilPointer => "nil_pointer",
            NodeKind::Argc => "argc",
            NodeKind::Argv => "argv",
            NodeKind::Primitive { .. } => "primitive",
        }
    }

    /// Whether evaluating this node always ends in a `return`.
    pub fn returns(&self) -> bool {
        self.always(&|n| matches!(n.kind, NodeKind::Return { .. }))
    }

    /// Whether evaluating this node always ends in a `break`.
    pub fn breaks(&self) -> bool {
        self.always(&|n| matches!(n.kind, NodeKind::Break { .. }))
    }

    /// Whether evaluating this node always reaches a `yield`.
    pub fn yields(&self) -> bool {
        self.always(&|n| matches!(n.kind, NodeKind::Yield { .. }))
    }

    fn always(&self, leaf: &dyn Fn(&Node) -> bool) -> bool {
        if leaf(self) {
            return true;
        }
        let opt = |n: &Option<Box<Node>>| n.as_ref().is_some_and(|n| n.always(leaf));
        match &self.kind {
            NodeKind::Expressions { expressions } => expressions.iter().any(|e| e.always(leaf)),
            NodeKind::If { cond, then, else_ } => cond.always(leaf) || (opt(then) && opt(else_)),
            NodeKind::While { cond, .. } => cond.always(leaf),
            NodeKind::Assign { value, .. } => value.always(leaf),
            NodeKind::MultiAssign { values, .. } => values.iter().any(|v| v.always(leaf)),
            NodeKind::Return { value } | NodeKind::Break { value } => opt(value),
            NodeKind::Yield { values } => values.iter().any(|v| v.always(leaf)),
            NodeKind::Call(call) => opt(&call.obj) || call.args.iter().any(|a| a.always(leaf)),
            NodeKind::IsA { obj, .. } => obj.always(leaf),
            NodeKind::SimpleOr { left, right } => left.always(leaf) || right.always(leaf),
            _ => false,
        }
    }

    /// Direct children, the attached block body included.
    pub fn children(&self) -> Vec<&Node> {
        let mut out: Vec<&Node> = Vec::new();
        match &self.kind {
            NodeKind::Assign { target, value } => {
                out.push(target);
                out.push(value);
            }
            NodeKind::MultiAssign { targets, values } => {
                out.extend(targets.iter());
                out.extend(values.iter());
            }
            NodeKind::Expressions { expressions } => out.extend(expressions.iter()),
            NodeKind::If { cond, then, else_ } => {
                out.push(cond);
                out.extend(then.as_deref());
                out.extend(else_.as_deref());
            }
            NodeKind::While { cond, body, .. } => {
                out.push(cond);
                out.extend(body.as_deref());
            }
            NodeKind::Return { value } | NodeKind::Break { value } => out.extend(value.as_deref()),
            NodeKind::Yield { values } => out.extend(values.iter()),
            NodeKind::Call(call) => {
                out.extend(call.obj.as_deref());
                out.extend(call.args.iter());
                out.extend(call.block.as_ref().and_then(|b| b.body.as_deref()));
            }
            NodeKind::IsA { obj, .. } => out.push(obj),
            NodeKind::SimpleOr { left, right } => {
                out.push(left);
                out.push(right);
            }
            NodeKind::PointerOf { target } => out.push(target),
            _ => {}
        }
        out
    }

    /// Visit this node and every node below it.
    pub fn walk<'a, F: FnMut(&'a Node)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind_name(), self.id)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: NodeKind) -> Node {
        Node::new(0, kind, None)
    }

    #[test]
    fn if_returns_only_when_both_arms_return() {
        let ret = || Some(Box::new(n(NodeKind::Return { value: None })));
        let one_arm = n(NodeKind::If {
            cond: Box::new(n(NodeKind::BoolLiteral { value: true })),
            then: ret(),
            else_: None,
        });
        let both = n(NodeKind::If {
            cond: Box::new(n(NodeKind::BoolLiteral { value: true })),
            then: ret(),
            else_: ret(),
        });
        assert!(!one_arm.returns());
        assert!(both.returns());
        assert!(!both.breaks());
    }

    #[test]
    fn node_kind_decodes_from_json() {
        let raw = r#"{"node": "if", "cond": {"node": "bool_literal", "value": false, "type": 1},
                      "else": {"node": "int_literal", "value": 2, "type": 2}, "type": 2}"#;
        let node: Node = serde_json::from_str(raw).expect("decode");
        match node.kind {
            NodeKind::If { then, else_, .. } => {
                assert!(then.is_none());
                assert_eq!(else_.map(|e| e.kind), Some(NodeKind::IntLiteral { value: 2 }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
