//! file: core/src/codegen/mod.rs
//! description: typed program to IR module.
//!
//! `CodeGen` walks the typed tree once. Every visit returns the node's
//! value; address-held types (tagged unions, hierarchy boxes) come back as
//! the address of their storage. The most recent result is also kept in
//! `last` together with its static type.
//!
//! The entry function starts with three blocks chained in order:
//! `alloca` (every stack slot), `const` (hoisted constant initializers,
//! extended as constants are first referenced) and `entry` (user code).

pub mod call;
pub mod consts;
pub mod context;
pub mod control;
pub mod debug;
pub mod dispatch;
pub mod layout;
pub mod prims;
pub mod repr;
pub mod vars;

use std::collections::HashMap;

use crate::error::{CodegenError, Result};
use crate::ir::{BlockId, Constant, FuncId, GlobalId, IrBuilder, IrType, Linkage, Module, Param, Value, ENTRY_FUNCTION};
use crate::options::CodegenOptions;
use crate::program::{ConstId, Def, Node, NodeKind, Program, TypeId, TypeKind, TypeTable};

use self::context::{Activation, BlockFrame, FunctionState, Targets};
pub use self::repr::Repr;

#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: Value,
    pub ty: Option<TypeId>,
}

impl TypedValue {
    pub fn new(value: Value, ty: Option<TypeId>) -> Self {
        TypedValue { value, ty }
    }
}

pub struct CodeGen<'p> {
    program: &'p Program,
    types: &'p TypeTable,
    options: CodegenOptions,
    b: IrBuilder,
    nil: TypeId,
    last: TypedValue,
    act: Activation,
    fun: FunctionState,
    main: FunctionState,
    /// Definition whose function body is being generated.
    def: Option<&'p Def>,
    const_head: BlockId,
    const_tail: BlockId,
    blocks: Vec<BlockFrame<'p>>,
    targets: Targets,
    strings: HashMap<String, GlobalId>,
    symbols: HashMap<String, i64>,
    symbol_table: Option<GlobalId>,
    consts: HashMap<ConstId, GlobalId>,
    globals: HashMap<String, GlobalId>,
    runtime: HashMap<&'static str, FuncId>,
    argc_argv: Option<(GlobalId, GlobalId)>,
}

impl<'p> CodeGen<'p> {
    pub fn new(program: &'p Program, options: &CodegenOptions) -> Result<Self> {
        let types = &program.types;
        let nil = types
            .nil()
            .ok_or_else(|| CodegenError::internal("type table has no Nil type", None))?;
        let name = program.filename.clone().unwrap_or_else(|| "main".to_string());
        let mut b = IrBuilder::new(&name);

        let root_ty = program.root.as_ref().and_then(|r| r.ty);
        // A union result has no register form to hand back from the entry.
        let return_ty = root_ty.filter(|t| !types.is_address_held(*t));
        let params = vec![
            Param { name: "argc".to_string(), ty: IrType::i32() },
            Param { name: "argv".to_string(), ty: IrType::byte_ptr().ptr_to() },
        ];
        let func =
            b.declare_function(ENTRY_FUNCTION, params, layout::return_type(types, return_ty), Linkage::External, false);
        let alloca_block = b.append_block(func, "alloca");
        let const_head = b.append_block(func, "const");
        let entry_block = b.append_block(func, "entry");
        b.position_at_end(func, entry_block);

        let main = FunctionState { func, alloca_block, entry_block, return_ty, return_slot: None };
        let mut cg = CodeGen {
            program,
            types,
            options: options.clone(),
            b,
            nil,
            last: TypedValue::new(Value::i1(false), Some(nil)),
            act: Activation::new(types.program()),
            fun: main.clone(),
            main,
            def: None,
            const_head,
            const_tail: const_head,
            blocks: Vec::new(),
            targets: Targets::default(),
            strings: HashMap::new(),
            symbols: HashMap::new(),
            symbol_table: None,
            consts: HashMap::new(),
            globals: HashMap::new(),
            runtime: HashMap::new(),
            argc_argv: None,
        };
        if cg.options.debug_info {
            cg.init_debug_info();
            let line = program.root.as_ref().and_then(|r| r.location.as_ref()).map(|l| l.line).unwrap_or(1);
            cg.debug_subprogram(ENTRY_FUNCTION, func, line);
        }
        cg.build_symbol_table();
        Ok(cg)
    }

    /// Generate the whole program into the module.
    pub fn generate(&mut self) -> Result<()> {
        let program = self.program;
        let value = match &program.root {
            Some(root) => self.accept(root)?,
            None => self.nil_value(),
        };
        self.finish_main(value)
    }

    pub fn last(&self) -> &TypedValue {
        &self.last
    }

    pub fn module(&self) -> &Module {
        &self.b.module
    }

    pub fn into_module(self) -> Module {
        self.b.into_module()
    }

    fn finish_main(&mut self, value: Value) -> Result<()> {
        let main = self.main.clone();
        self.fun = main.clone();
        if !self.b.is_terminated() {
            match main.return_ty {
                Some(ty) => {
                    let from = self.last.ty.unwrap_or(self.nil);
                    let v = self.convert(value, from, ty)?;
                    let want = self.llvm(ty);
                    let v = self.coerce(v, &want);
                    self.b.ret(Some(v));
                }
                None => self.b.ret(None),
            }
        }
        self.b.position_at_end(main.func, self.const_tail);
        self.b.br(main.entry_block);
        self.b.position_at_end(main.func, main.alloca_block);
        self.b.br(self.const_head);
        log::debug!(
            "entry function done: {} function(s), {} global(s)",
            self.b.module.functions.len(),
            self.b.module.globals.len()
        );
        Ok(())
    }

    /// Visit `node`, record its result in `last` and return it.
    pub fn accept(&mut self, node: &'p Node) -> Result<Value> {
        log::trace!("visit {}", node);
        let saved_loc = self.enter_location(node);
        let result = self.visit(node).map_err(|e| e.or_at(node.location.as_ref()));
        self.leave_location(saved_loc);
        let value = result?;
        self.last = TypedValue::new(value.clone(), node.ty);
        Ok(value)
    }

    fn visit(&mut self, node: &'p Node) -> Result<Value> {
        match &node.kind {
            NodeKind::Nop | NodeKind::NilLiteral => Ok(self.nil_value()),
            NodeKind::BoolLiteral { value } => Ok(Value::i1(*value)),
            NodeKind::IntLiteral { value } => Ok(self.int_literal(node, *value)),
            NodeKind::FloatLiteral { value } => Ok(self.float_literal(node, *value)),
            NodeKind::CharLiteral { value } => Ok(Value::i8(i64::from(*value))),
            NodeKind::StringLiteral { value } => Ok(self.string_literal(value)),
            NodeKind::SymbolLiteral { value } => self.symbol_literal(value),
            NodeKind::TypeLiteral => Ok(self.type_literal(node)),
            NodeKind::Var { name } => self.visit_var(node, name),
            NodeKind::Assign { target, value } => self.visit_assign(node, target, value),
            NodeKind::MultiAssign { targets, values } => self.visit_multi_assign(targets, values),
            NodeKind::InstanceVar { name } => self.visit_ivar(node, name),
            NodeKind::Global { name } => self.visit_global(node, name),
            NodeKind::Const { id } => self.visit_const(*id),
            NodeKind::Expressions { expressions } => self.visit_expressions(expressions),
            NodeKind::If { cond, then, else_ } => self.visit_if(node, cond, then.as_deref(), else_.as_deref()),
            NodeKind::While { cond, body, run_once } => self.visit_while(cond, body.as_deref(), *run_once),
            NodeKind::Return { value } => self.visit_return(value.as_deref()),
            NodeKind::Break { value } => self.visit_break(value.as_deref()),
            NodeKind::Yield { values } => self.visit_yield(node, values),
            NodeKind::Call(call) => self.visit_call(node, call),
            NodeKind::IsA { obj, target } => self.visit_is_a(obj, *target),
            NodeKind::SimpleOr { left, right } => self.visit_simple_or(left, right),
            NodeKind::PointerOf { target } => self.visit_pointer_of(node, target),
            NodeKind::NilPointer => Ok(Value::null(self.llvm(self.ty_of(node)))),
            NodeKind::Argc => Ok(self.visit_argc()),
            NodeKind::Argv => Ok(self.visit_argv()),
            NodeKind::Primitive { op } => self.visit_primitive(op),
        }
    }

    // ---- literals ----

    fn int_literal(&self, node: &Node, value: i64) -> Value {
        match node.ty.map(|t| self.types.kind(t)) {
            Some(TypeKind::Int { bits }) => Value::int(*bits, value),
            Some(TypeKind::Float { double }) => Value::Const(Constant::Float { double: *double, value: value as f64 }),
            _ => Value::i32(value),
        }
    }

    fn float_literal(&self, node: &Node, value: f64) -> Value {
        let double = !matches!(node.ty.map(|t| self.types.kind(t)), Some(TypeKind::Float { double: false }));
        Value::Const(Constant::Float { double, value })
    }

    /// Runtime id of the instance type; metaclass values carry nothing else.
    fn type_literal(&self, node: &Node) -> Value {
        match node.ty.map(|t| self.types.kind(t)) {
            Some(TypeKind::Metaclass { instance }) => Value::i32(i64::from(instance.0)),
            _ => Value::i32(node.ty.map(|t| i64::from(t.0)).unwrap_or(0)),
        }
    }

    // ---- shared helpers ----

    pub(crate) fn llvm(&self, ty: TypeId) -> IrType {
        layout::llvm_type(self.types, ty)
    }

    pub(crate) fn ty_of(&self, node: &Node) -> TypeId {
        node.ty.unwrap_or(self.nil)
    }

    pub(crate) fn nil_value(&self) -> Value {
        Value::i1(false)
    }

    /// Whether a result of static type `ty` needs to be carried at all.
    pub(crate) fn carries_value(&self, ty: Option<TypeId>) -> bool {
        ty.is_some_and(|t| !self.types.is_nil(t))
    }

    /// Placeholder for the result of code that can never run.
    pub(crate) fn dead_value(&self, ty: Option<TypeId>) -> Value {
        match ty {
            Some(t) if self.types.is_address_held(t) => Value::undef(self.llvm(t).ptr_to()),
            Some(t) => Value::undef(self.llvm(t)),
            None => self.nil_value(),
        }
    }

    /// Stack slot in the current function's alloca block.
    pub(crate) fn alloca(&mut self, ty: IrType, name: Option<&str>) -> Value {
        self.b.alloca_at(self.fun.func, self.fun.alloca_block, ty, name)
    }

    pub(crate) fn current_block(&self) -> Result<BlockId> {
        self.b
            .insert_block()
            .ok_or_else(|| CodegenError::internal("no insertion point", None))
    }

    pub(crate) fn append_block(&mut self, name: &str) -> BlockId {
        self.b.append_block(self.fun.func, name)
    }

    pub(crate) fn position_at(&mut self, block: BlockId) {
        self.b.position_at_end(self.fun.func, block);
    }

    /// Run `f` with the insertion point at the end of `block`, then put the
    /// insertion point back.
    pub(crate) fn emit_in<T>(&mut self, func: FuncId, block: BlockId, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.b.position();
        self.b.position_at_end(func, block);
        let out = f(self);
        if let Some((func, block)) = saved {
            self.b.position_at_end(func, block);
        }
        out
    }

    /// Run `f` under `act`, restoring the current activation on every path.
    pub(crate) fn with_activation<T>(
        &mut self,
        act: Activation,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.act, act);
        let result = f(self);
        self.act = saved;
        result
    }

    /// Evaluate an optional operand; absent operands are nil.
    pub(crate) fn accept_opt(&mut self, node: Option<&'p Node>) -> Result<(Value, TypeId)> {
        match node {
            Some(n) => Ok((self.accept(n)?, self.ty_of(n))),
            None => Ok((self.nil_value(), self.nil)),
        }
    }

    /// Declare an external runtime function once.
    pub(crate) fn runtime_function(&mut self, name: &'static str, params: &[IrType], ret: IrType) -> FuncId {
        if let Some(f) = self.runtime.get(name) {
            return *f;
        }
        let params = params
            .iter()
            .enumerate()
            .map(|(i, ty)| Param { name: format!("arg{}", i), ty: ty.clone() })
            .collect();
        let f = self.b.declare_function(name, params, ret, Linkage::External, false);
        self.runtime.insert(name, f);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::check_module;
    use crate::program::ProgramBuilder;

    #[test]
    fn entry_function_chains_alloca_const_entry() {
        let mut pb = ProgramBuilder::new();
        let one = pb.int(1);
        let program = pb.finish(one);
        let mut cg = CodeGen::new(&program, &CodegenOptions::default()).unwrap();
        cg.generate().unwrap();
        assert_eq!(cg.last().ty, Some(program.types.int(32).unwrap()));
        let module = cg.into_module();
        let main = module.find_function(ENTRY_FUNCTION).map(|f| module.function(f)).unwrap();
        let names: Vec<&str> = main.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alloca", "const", "entry"]);
        assert_eq!(main.ret, IrType::i32());
        assert!(check_module(&module).is_empty());
    }
}
