//! file: core/src/ir/module.rs
//! description: the output module: functions, blocks, globals, metadata.
//!
//! A module is plain data. `IrBuilder` appends to it, the verifier checks
//! it, the executor runs it and `Display` renders it as LLVM-flavoured
//! assembly.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use super::op::{InstKind, Terminator};
use super::types::IrType;
use super::value::{BlockId, Constant, FuncId, GlobalId, InstId, Value};
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    External,
    Private,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Linkage::Internal => "internal",
            Linkage::External => "external",
            Linkage::Private => "private",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: IrType,
    pub name: Option<String>,
    pub loc: Option<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
    pub term: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: IrType,
    pub linkage: Linkage,
    pub varargs: bool,
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
}

impl Function {
    pub fn new(name: &str, params: Vec<Param>, ret: IrType, linkage: Linkage, varargs: bool) -> Self {
        Function { name: name.to_string(), params, ret, linkage, varargs, blocks: Vec::new(), insts: Vec::new() }
    }

    /// A function without blocks is a declaration resolved at link time.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(|i| BlockId(i as u32))
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.block_ids().find(|b| self.block(*b).name == name)
    }

    /// Blocks whose terminator can transfer control to `target`.
    pub fn predecessors(&self, target: BlockId) -> Vec<BlockId> {
        self.block_ids()
            .filter(|b| {
                self.block(*b).term.as_ref().is_some_and(|t| t.successors().contains(&target))
            })
            .collect()
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len() + usize::from(b.term.is_some())).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Option<Constant>,
    pub constant: bool,
    pub linkage: Linkage,
}

/// Source-level debug records attached to a module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugInfo {
    pub file: String,
    pub producer: String,
    pub subprograms: Vec<Subprogram>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subprogram {
    pub name: String,
    pub function: FuncId,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub debug: Option<DebugInfo>,
    function_names: HashMap<String, FuncId>,
    global_names: HashMap<String, GlobalId>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module { name: name.to_string(), ..Default::default() }
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.function_names.insert(function.name.clone(), id);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.function_names.get(name).copied()
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.global_names.insert(global.name.clone(), id);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut Global {
        &mut self.globals[id.index()]
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.global_names.get(name).copied()
    }

    /// A global name not yet taken, derived from `base`.
    pub fn unique_global_name(&self, base: &str) -> String {
        if !self.global_names.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}.{}", base, n);
            if !self.global_names.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn value_type(&self, func: FuncId, value: &Value) -> IrType {
        let f = self.function(func);
        match value {
            Value::Const(c) => c.ty(),
            Value::Inst(id) => f.inst(*id).ty.clone(),
            Value::Param(i) => f.params.get(*i as usize).map(|p| p.ty.clone()).unwrap_or(IrType::Void),
            Value::Global(g) => self.global(*g).ty.clone().ptr_to(),
        }
    }

    // ---- rendering ----

    fn fmt_const(&self, c: &Constant) -> String {
        match c {
            Constant::Int { value, .. } => value.to_string(),
            Constant::Float { value, .. } => format!("{:e}", value),
            Constant::Null(t) if t.is_ptr() => "null".to_string(),
            Constant::Null(_) => "zeroinitializer".to_string(),
            Constant::Undef(_) => "undef".to_string(),
            Constant::Array { elem, values } => {
                if *elem == IrType::i8() {
                    let mut s = String::from("c\"");
                    for v in values.iter() {
                        let b = match v {
                            Constant::Int { value, .. } => *value as u8,
                            _ => 0,
                        };
                        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
                            s.push(b as char);
                        } else {
                            let _ = write!(s, "\\{:02X}", b);
                        }
                    }
                    s.push('"');
                    s
                } else {
                    let parts: Vec<String> =
                        values.iter().map(|v| format!("{} {}", v.ty(), self.fmt_const(v))).collect();
                    format!("[{}]", parts.join(", "))
                }
            }
            Constant::GlobalAddr { global, ty } => {
                let g = self.global(*global);
                if g.ty.clone().ptr_to() == *ty {
                    format!("@{}", g.name)
                } else {
                    format!("bitcast ({}* @{} to {})", g.ty, g.name, ty)
                }
            }
        }
    }

    fn fmt_value(&self, func: FuncId, value: &Value) -> String {
        match value {
            Value::Const(c) => self.fmt_const(c),
            Value::Inst(id) => inst_name(self.function(func), *id),
            Value::Param(i) => match self.function(func).params.get(*i as usize) {
                Some(p) => format!("%{}", p.name),
                None => format!("%arg{}", i),
            },
            Value::Global(g) => format!("@{}", self.global(*g).name),
        }
    }

    fn fmt_typed(&self, func: FuncId, value: &Value) -> String {
        format!("{} {}", self.value_type(func, value), self.fmt_value(func, value))
    }

    fn fmt_inst(&self, func: FuncId, id: InstId) -> String {
        let f = self.function(func);
        let inst = f.inst(id);
        let v = |x: &Value| self.fmt_value(func, x);
        let tv = |x: &Value| self.fmt_typed(func, x);
        let body = match &inst.kind {
            InstKind::Alloca { ty } => format!("alloca {}", ty),
            InstKind::Load { ptr } => format!("load {}, {}", inst.ty, tv(ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", tv(value), tv(ptr)),
            InstKind::Gep { ptr, indices } => {
                let idx: Vec<String> = indices.iter().map(|i| tv(i)).collect();
                format!("getelementptr {}, {}", tv(ptr), idx.join(", "))
            }
            InstKind::Cast { op, value } => format!("{} {} to {}", op.mnemonic(), tv(value), inst.ty),
            InstKind::Binary { op, lhs, rhs } => format!("{} {}, {}", op.mnemonic(), tv(lhs), v(rhs)),
            InstKind::Not { value } => format!("xor {}, true", tv(value)),
            InstKind::ICmp { pred, lhs, rhs } => format!("icmp {} {}, {}", pred, tv(lhs), v(rhs)),
            InstKind::FCmp { pred, lhs, rhs } => format!("fcmp {} {}, {}", pred, tv(lhs), v(rhs)),
            InstKind::Select { cond, then, else_ } => format!("select {}, {}, {}", tv(cond), tv(then), tv(else_)),
            InstKind::Phi { incoming } => {
                let parts: Vec<String> =
                    incoming.iter().map(|(val, b)| format!("[ {}, %{} ]", v(val), f.block(*b).name)).collect();
                format!("phi {} {}", inst.ty, parts.join(", "))
            }
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| tv(a)).collect();
                format!("call {} @{}({})", inst.ty, self.function(*callee).name, args.join(", "))
            }
            InstKind::Malloc { ty } => format!("malloc {}", ty),
            InstKind::ArrayMalloc { ty, count } => format!("malloc {}, {}", ty, tv(count)),
            InstKind::ExtractValue { agg, index } => format!("extractvalue {}, {}", tv(agg), index),
        };
        let mut line = if inst.ty == IrType::Void {
            body
        } else {
            format!("{} = {}", inst_name(f, id), body)
        };
        if let Some(loc) = &inst.loc {
            let _ = write!(line, ", !dbg !{{line: {}, column: {}}}", loc.line, loc.column);
        }
        line
    }

    fn fmt_term(&self, func: FuncId, term: &Terminator) -> String {
        let f = self.function(func);
        match term {
            Terminator::Br(b) => format!("br label %{}", f.block(*b).name),
            Terminator::CondBr { cond, then, else_ } => format!(
                "br {}, label %{}, label %{}",
                self.fmt_typed(func, cond),
                f.block(*then).name,
                f.block(*else_).name
            ),
            Terminator::Ret(Some(v)) => format!("ret {}", self.fmt_typed(func, v)),
            Terminator::Ret(None) => "ret void".to_string(),
            Terminator::Unreachable => "unreachable".to_string(),
        }
    }
}

fn inst_name(f: &Function, id: InstId) -> String {
    match &f.inst(id).name {
        Some(n) => format!("%{}.{}", n, id.0),
        None => format!("%{}", id.0),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for g in self.globals.iter() {
            let kind = if g.constant { "constant" } else { "global" };
            let init = match &g.init {
                Some(c) => self.fmt_const(c),
                None => "zeroinitializer".to_string(),
            };
            writeln!(f, "@{} = {} {} {} {}", g.name, g.linkage, kind, g.ty, init)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            let id = FuncId(i as u32);
            writeln!(f)?;
            let mut params: Vec<String> = func
                .params
                .iter()
                .map(|p| if func.is_declaration() { p.ty.to_string() } else { format!("{} %{}", p.ty, p.name) })
                .collect();
            if func.varargs {
                params.push("...".to_string());
            }
            if func.is_declaration() {
                writeln!(f, "declare {} @{}({})", func.ret, func.name, params.join(", "))?;
                continue;
            }
            let dbg = match &self.debug {
                Some(d) => match d.subprograms.iter().position(|s| s.function == id) {
                    Some(n) => format!(" !dbg !{}", n + 1),
                    None => String::new(),
                },
                None => String::new(),
            };
            writeln!(f, "define {} {} @{}({}){} {{", func.linkage, func.ret, func.name, params.join(", "), dbg)?;
            for block in func.blocks.iter() {
                writeln!(f, "{}:", block.name)?;
                for inst in block.insts.iter() {
                    writeln!(f, "  {}", self.fmt_inst(id, *inst))?;
                }
                match &block.term {
                    Some(t) => writeln!(f, "  {}", self.fmt_term(id, t))?,
                    None => writeln!(f, "  ; <missing terminator>")?,
                }
            }
            writeln!(f, "}}")?;
        }
        if let Some(debug) = &self.debug {
            writeln!(f)?;
            writeln!(f, "!0 = !DICompileUnit(file: \"{}\", producer: \"{}\")", debug.file, debug.producer)?;
            for (n, sp) in debug.subprograms.iter().enumerate() {
                writeln!(f, "!{} = !DISubprogram(name: \"{}\", line: {}, unit: !0)", n + 1, sp.name, sp.line)?;
            }
        }
        Ok(())
    }
}
