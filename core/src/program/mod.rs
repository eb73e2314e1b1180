//! file: core/src/program/mod.rs
//! description: the fully typed program consumed by code generation.
//!
//! `Program` is what the type stage hands over: the type table, every
//! definition reachable from a call, whole-program constants and globals,
//! the symbol set and the root expression. It can be decoded from JSON or
//! assembled in code with `ProgramBuilder`.

pub mod builder;
pub mod node;
pub mod types;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::builder::{ProgramBuilder, StdTypes};
pub use self::node::{BinaryPrim, Block, BlockArg, Call, ConstId, DefId, Node, NodeKind, PrimitiveOp};
pub use self::types::{Field, TypeId, TypeInfo, TypeKind, TypeTable};

use crate::error::{CodegenError, Result};
use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeId,
    /// For foreign calls: the argument receives the address of the caller's
    /// variable instead of its value, and `ty` is the pointer type.
    #[serde(default)]
    pub out: bool,
}

impl Arg {
    pub fn new(name: &str, ty: TypeId) -> Self {
        Arg { name: name.to_string(), ty, out: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct External {
    pub real_name: String,
    #[serde(default)]
    pub varargs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub name: String,
    pub owner: TypeId,
    #[serde(default)]
    pub args: Vec<Arg>,
    /// Return type; `None` returns nothing.
    #[serde(default, rename = "type")]
    pub ty: Option<TypeId>,
    #[serde(default)]
    pub body: Option<Node>,
    #[serde(default)]
    pub external: Option<External>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Def {
    pub fn is_primitive(&self) -> bool {
        matches!(self.body.as_ref().map(|b| &b.kind), Some(NodeKind::Primitive { .. }))
    }

    /// Symbol name of the emitted function, specialised on the receiver.
    pub fn mangled_name(&self, types: &TypeTable, self_type: Option<TypeId>) -> String {
        if let Some(ext) = &self.external {
            return ext.real_name.clone();
        }
        let args: Vec<String> = self.args.iter().map(|a| types.name(a.ty)).collect();
        let owner = match self_type {
            Some(t) if types.passed_as_self(t) => format!("{}#", types.name(t)),
            _ => match types.kind(self.owner) {
                TypeKind::Program => String::new(),
                _ => format!("{}::", types.name(self.owner)),
            },
        };
        if args.is_empty() {
            format!("{}{}", owner, self.name)
        } else {
            format!("{}{}<{}>", owner, self.name, args.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDef {
    pub name: String,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    #[serde(default)]
    pub defs: Vec<Def>,
    #[serde(default)]
    pub consts: Vec<ConstDef>,
    #[serde(default)]
    pub globals: Vec<GlobalDef>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub root: Option<Node>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl Program {
    pub fn from_json(raw: &str) -> Result<Program> {
        let program: Program =
            serde_json::from_str(raw).map_err(|e| CodegenError::input(format!("parse program: {}", e)))?;
        program.validate()?;
        Ok(program)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Program> {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            CodegenError::input(format!("read program {}: {}", path.as_ref().display(), e))
        })?;
        let mut program = Program::from_json(&raw)?;
        if program.filename.is_none() {
            program.filename = Some(path.as_ref().display().to_string());
        }
        Ok(program)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CodegenError::input(format!("encode program: {}", e)))
    }

    pub fn def(&self, id: DefId) -> &Def {
        &self.defs[id.0 as usize]
    }

    pub fn constant(&self, id: ConstId) -> &ConstDef {
        &self.consts[id.0 as usize]
    }

    pub fn global(&self, name: &str) -> Option<&GlobalDef> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Every node of the program: root, definition bodies, constant values.
    pub fn nodes(&self) -> Vec<&Node> {
        fn collect<'a>(out: &mut Vec<&'a Node>, n: &'a Node) {
            n.walk(&mut |m| out.push(m));
        }
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            collect(&mut out, root);
        }
        for def in self.defs.iter() {
            if let Some(body) = &def.body {
                collect(&mut out, body);
            }
        }
        for c in self.consts.iter() {
            collect(&mut out, &c.value);
        }
        out
    }

    /// The declared symbol set plus every symbol literal, sorted.
    pub fn symbol_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.symbols.iter().cloned().collect();
        for node in self.nodes() {
            if let NodeKind::SymbolLiteral { value } = &node.kind {
                set.insert(value.clone());
            }
        }
        set
    }

    /// Check every cross reference the generator will follow.
    pub fn validate(&self) -> Result<()> {
        let types = &self.types;
        let check_ty = |ty: TypeId, what: &str, loc: Option<&Location>| -> Result<()> {
            if types.contains(ty) {
                Ok(())
            } else {
                Err(CodegenError::internal(format!("{} references unknown type {}", what, ty), loc.cloned()))
            }
        };

        for id in types.ids() {
            for r in types.referenced(id) {
                check_ty(r, &format!("type {}", id), None)?;
            }
            if let TypeKind::Union { members } = types.kind(id) {
                if members.is_empty() {
                    return Err(CodegenError::internal(format!("union {} has no members", id), None));
                }
            }
        }
        for def in self.defs.iter() {
            check_ty(def.owner, &format!("def {}", def.name), def.location.as_ref())?;
            for a in def.args.iter() {
                check_ty(a.ty, &format!("argument {} of {}", a.name, def.name), def.location.as_ref())?;
            }
            if let Some(t) = def.ty {
                check_ty(t, &format!("def {}", def.name), def.location.as_ref())?;
            }
            if def.body.is_none() && def.external.is_none() && def.ty.is_some() {
                log::warn!("def {} has a return type but no body", def.name);
            }
        }
        for g in self.globals.iter() {
            check_ty(g.ty, &format!("global {}", g.name), None)?;
        }
        for node in self.nodes() {
            let loc = node.location.as_ref();
            if let Some(t) = node.ty {
                check_ty(t, &format!("node {}", node), loc)?;
            }
            match &node.kind {
                NodeKind::Call(call) => {
                    for t in call.targets.iter() {
                        if t.0 as usize >= self.defs.len() {
                            return Err(CodegenError::internal(
                                format!("call {} targets unknown def {}", call.name, t.0),
                                loc.cloned(),
                            ));
                        }
                    }
                    if let Some(s) = call.scope {
                        check_ty(s, &format!("call {}", call.name), loc)?;
                    }
                    if let Some(block) = &call.block {
                        for a in block.args.iter() {
                            check_ty(a.ty, &format!("block argument {}", a.name), loc)?;
                        }
                    }
                }
                NodeKind::Const { id } => {
                    if id.0 as usize >= self.consts.len() {
                        return Err(CodegenError::internal(format!("unresolved constant {}", id.0), loc.cloned()));
                    }
                }
                NodeKind::IsA { target, .. } => check_ty(*target, "is_a target", loc)?,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_dangling_def() {
        let mut b = ProgramBuilder::new();
        let int = b.std.int32;
        let call = b.call(None, "missing", vec![], vec![DefId(7)], Some(int));
        let program = b.finish(call);
        let err = program.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::CodegenErrorKind::InternalInconsistency);
    }

    #[test]
    fn symbol_set_is_sorted_union_of_literals() {
        let mut b = ProgramBuilder::new();
        let zeta = b.symbol("zeta");
        let alpha = b.symbol("alpha");
        let mut program = b.finish_seq(vec![zeta, alpha]);
        program.symbols.push("mid".to_string());
        let set: Vec<String> = program.symbol_set().into_iter().collect();
        assert_eq!(set, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn nodes_cover_root_definitions_and_constants() {
        let mut b = ProgramBuilder::new();
        let int = b.std.int32;
        let in_const = b.symbol("from_const");
        b.constant("K", in_const);
        let in_def = b.symbol("from_def");
        b.fun("f", &[], Some(int), in_def);
        let in_root = b.symbol("from_root");
        let program = b.finish(in_root);

        assert_eq!(program.nodes().len(), 3);
        let set: Vec<String> = program.symbol_set().into_iter().collect();
        assert_eq!(set, vec!["from_const", "from_def", "from_root"]);
    }

    #[test]
    fn program_round_trips_through_json() {
        let mut b = ProgramBuilder::new();
        let one = b.int(1);
        let program = b.finish(one);
        let raw = program.to_json().expect("encode");
        let back = Program::from_json(&raw).expect("decode");
        assert_eq!(back, program);
    }
}
