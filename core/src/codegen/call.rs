//! file: core/src/codegen/call.rs
//! description: calls, function bodies, inlined blocks and `yield`.
//!
//! A call with a single candidate is emitted directly; several candidates
//! go through the dispatch chain in `dispatch.rs`. Definitions are
//! generated once per mangled name, the first time a call needs them.
//!
//! A call carrying a block is never a real call: the callee body is
//! inlined with a fresh activation whose `return` jumps to the end of the
//! inlined code, and every `yield` inside it inlines the block body back
//! in the caller's scope.

use super::context::{Activation, BlockFrame, BreakTarget, FunctionState, Variable};
use super::layout;
use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{FuncId, Linkage, Param, Value};
use crate::program::{Block, Call, Def, DefId, Node, NodeKind, TypeId, TypeKind};

impl<'p> CodeGen<'p> {
    pub(super) fn visit_call(&mut self, node: &'p Node, call: &'p Call) -> Result<Value> {
        match call.targets.as_slice() {
            [] => Err(CodegenError::internal(format!("call to `{}` has no target", call.name), None)),
            [def_id] => self.static_call(node, call, *def_id),
            _ => self.dispatch(node, call),
        }
    }

    /// Type `self` has inside `def` when called on a `receiver`; `None`
    /// when the definition takes no receiver argument.
    pub(super) fn self_type_for(&self, def: &Def, receiver: Option<TypeId>) -> Option<TypeId> {
        let owner = match self.types.kind(def.owner) {
            TypeKind::Program => return None,
            TypeKind::Class { .. } | TypeKind::Hierarchy { .. } | TypeKind::Metaclass { .. } => def.owner,
            _ => receiver.unwrap_or(def.owner),
        };
        Some(owner).filter(|t| self.types.passed_as_self(*t))
    }

    fn static_call(&mut self, node: &'p Node, call: &'p Call, def_id: DefId) -> Result<Value> {
        let program = self.program;
        let def = program.def(def_id);
        let receiver_ty = call.obj.as_deref().map(|o| self.ty_of(o)).or(call.scope);
        let self_type = self.self_type_for(def, receiver_ty);

        let mut args = Vec::with_capacity(call.args.len() + 1);
        match (call.obj.as_deref(), self_type) {
            (Some(obj), st) => {
                let v = self.accept(obj)?;
                if let Some(st) = st {
                    args.push(self.convert(v, self.ty_of(obj), st)?);
                }
            }
            (None, Some(st)) => args.push(self.implicit_self(st)?),
            (None, None) => {}
        }
        for (i, arg) in call.args.iter().enumerate() {
            if self.b.is_terminated() {
                break;
            }
            let param = def.args.get(i);
            match (&arg.kind, param) {
                (NodeKind::Var { name }, Some(p)) if p.out => {
                    let var = self.declare_var(name, self.ty_of(arg))?;
                    args.push(var.ptr);
                }
                _ => {
                    let v = self.accept(arg)?;
                    let v = match param {
                        Some(p) => self.convert(v, self.ty_of(arg), p.ty)?,
                        None => v,
                    };
                    args.push(v);
                }
            }
        }
        if self.b.is_terminated() {
            return Ok(self.dead_value(node.ty));
        }

        let (v, vty) = self.resolved_call(node, call, def_id, self_type, args)?;
        if self.b.is_terminated() {
            return Ok(self.dead_value(node.ty));
        }
        match node.ty {
            Some(t) if self.carries_value(node.ty) => self.convert(v, vty, t),
            _ => Ok(self.nil_value()),
        }
    }

    /// `self` of the current activation, viewed as `want`.
    pub(super) fn implicit_self(&mut self, want: TypeId) -> Result<Value> {
        let var = self
            .act
            .vars
            .get("self")
            .cloned()
            .ok_or_else(|| CodegenError::internal("call needs `self` but none is in scope", None))?;
        let held = if var.treated_as_pointer || self.types.is_address_held(var.ty) {
            var.ptr
        } else {
            self.b.load(var.ptr, Some("self"))
        };
        self.convert(held, var.ty, want)
    }

    /// Emit the call of one resolved candidate with arguments already in
    /// parameter shape. Returns the result with its static type.
    pub(super) fn resolved_call(
        &mut self,
        node: &'p Node,
        call: &'p Call,
        def_id: DefId,
        self_type: Option<TypeId>,
        args: Vec<Value>,
    ) -> Result<(Value, TypeId)> {
        match &call.block {
            Some(block) => self.inline_call(node, block, def_id, self_type, args),
            None => self.codegen_call(def_id, self_type, args),
        }
    }

    fn codegen_call(&mut self, def_id: DefId, self_type: Option<TypeId>, args: Vec<Value>) -> Result<(Value, TypeId)> {
        let program = self.program;
        let def = program.def(def_id);
        let name = def.mangled_name(self.types, self_type);
        let func = match self.b.module.find_function(&name) {
            Some(f) => f,
            None => self.codegen_fun(&name, def, self_type)?,
        };

        let params: Vec<_> = self.b.module.function(func).params.iter().map(|p| p.ty.clone()).collect();
        let mut call_args = Vec::with_capacity(args.len());
        for (i, a) in args.into_iter().enumerate() {
            call_args.push(match params.get(i) {
                Some(want) => self.coerce(a, want),
                None => a,
            });
        }
        let v = self.b.call(func, call_args);
        match def.ty {
            None => Ok((self.nil_value(), self.nil)),
            Some(t) if self.types.is_address_held(t) => {
                let slot = self.alloca(self.llvm(t), None);
                self.b.store(v, slot.clone());
                Ok((slot, t))
            }
            Some(t) => Ok((v, t)),
        }
    }

    fn codegen_fun(&mut self, name: &str, def: &'p Def, self_type: Option<TypeId>) -> Result<FuncId> {
        let types = self.types;
        let mut params = Vec::with_capacity(def.args.len() + 1);
        if let Some(st) = self_type {
            params.push(Param { name: "self".to_string(), ty: layout::arg_type(types, st) });
        }
        for a in &def.args {
            params.push(Param { name: a.name.clone(), ty: layout::arg_type(types, a.ty) });
        }
        let ret = layout::return_type(types, def.ty);
        let (linkage, varargs) = match &def.external {
            Some(ext) => (Linkage::External, ext.varargs),
            None => (Linkage::Internal, false),
        };
        let func = self.b.declare_function(name, params, ret, linkage, varargs);
        if self.options.debug_info {
            let line = def.location.as_ref().filter(|l| l.is_known()).map_or(0, |l| l.line);
            self.debug_subprogram(name, func, line);
        }
        if def.external.is_some() {
            log::debug!("declared external {}", name);
            return Ok(func);
        }
        log::debug!("generating {}", name);

        let saved_position = self.b.position();
        let alloca_block = self.b.append_block(func, "alloca");
        let entry_block = self.b.append_block(func, "entry");
        let state = FunctionState { func, alloca_block, entry_block, return_ty: def.ty, return_slot: None };
        let saved_fun = std::mem::replace(&mut self.fun, state);
        let saved_blocks = std::mem::take(&mut self.blocks);
        let saved_def = self.def.replace(def);
        self.b.position_at_end(func, entry_block);

        if let Some(t) = def.ty.filter(|t| types.is_address_held(*t)) {
            self.fun.return_slot = Some(self.alloca(self.llvm(t), Some("return")));
        }
        let result = self
            .function_activation(def, self_type)
            .and_then(|act| self.with_activation(act, |cg| cg.function_body(def)));

        self.b.position_at_end(func, alloca_block);
        self.b.br(entry_block);
        self.def = saved_def;
        self.blocks = saved_blocks;
        self.fun = saved_fun;
        if let Some((f, b)) = saved_position {
            self.b.position_at_end(f, b);
        }
        result.map(|_| func)
    }

    /// Bind `self` and the parameters of a freshly declared function.
    fn function_activation(&mut self, def: &'p Def, self_type: Option<TypeId>) -> Result<Activation> {
        let mut act = Activation::new(self_type);
        let primitive = def.is_primitive();
        let mut index = 0u32;
        if let Some(st) = self_type {
            let param = Value::Param(index);
            index += 1;
            let var = if primitive || !self.types.is_address_held(st) {
                Variable::direct(param, st)
            } else {
                self.copy_param(param, st, "self")
            };
            act.vars.insert("self".to_string(), var);
        }
        for a in &def.args {
            let param = Value::Param(index);
            index += 1;
            let var = if primitive {
                Variable::direct(param, a.ty)
            } else if self.types.is_address_held(a.ty) {
                self.copy_param(param, a.ty, &a.name)
            } else {
                let slot = self.alloca(self.llvm(a.ty), Some(&a.name));
                self.store_coerced(param, slot.clone());
                Variable::slot(slot, a.ty)
            };
            act.vars.insert(a.name.clone(), var);
        }
        Ok(act)
    }

    /// Own copy of an address-held value passed by address.
    fn copy_param(&mut self, addr: Value, ty: TypeId, name: &str) -> Variable {
        let slot = self.alloca(self.llvm(ty), Some(name));
        let v = self.b.load(addr, None);
        self.b.store(v, slot.clone());
        Variable::slot(slot, ty)
    }

    fn function_body(&mut self, def: &'p Def) -> Result<()> {
        let (value, value_ty) = self.accept_opt(def.body.as_ref())?;
        // Primitive results are already shaped as the return type.
        let value_ty = if def.is_primitive() { def.ty.unwrap_or(value_ty) } else { value_ty };
        if self.b.is_terminated() {
            return Ok(());
        }
        self.return_from_function(value, value_ty)
    }

    fn inline_call(
        &mut self,
        node: &'p Node,
        block: &'p Block,
        def_id: DefId,
        self_type: Option<TypeId>,
        args: Vec<Value>,
    ) -> Result<(Value, TypeId)> {
        let program = self.program;
        let def = program.def(def_id);
        let ty = node.ty;
        log::debug!("inlining {} with a block", def.name);

        let exit = self.append_block("return");
        let slot = match ty {
            Some(t) if self.types.is_address_held(t) => Some(self.alloca(self.llvm(t), None)),
            _ => None,
        };
        let target = self.targets.add(exit, ty, slot.clone());

        let mut act = Activation::new(self_type.or(self.act.scope));
        act.return_target = Some(target);
        let mut args = args.into_iter();
        let mut next_arg = |what: &str| {
            args.next()
                .ok_or_else(|| CodegenError::internal(format!("inlined `{}` is missing {}", def.name, what), None))
        };
        if let Some(st) = self_type {
            let v = next_arg("its receiver")?;
            let var = if self.types.is_address_held(st) {
                self.copy_param(v, st, "self")
            } else {
                Variable::direct(v, st)
            };
            act.vars.insert("self".to_string(), var);
        }
        for a in &def.args {
            let v = next_arg(&format!("argument `{}`", a.name))?;
            let var = if self.types.is_address_held(a.ty) {
                self.copy_param(v, a.ty, &a.name)
            } else {
                let arg_slot = self.alloca(self.llvm(a.ty), Some(&a.name));
                self.store_coerced(v, arg_slot.clone());
                Variable::slot(arg_slot, a.ty)
            };
            act.vars.insert(a.name.clone(), var);
        }

        let caller = std::mem::replace(&mut self.act, act);
        self.blocks.push(BlockFrame { block, caller });
        let result = self
            .accept_opt(def.body.as_ref())
            .and_then(|(v, vty)| self.jump_to_target(target, vty, v));
        match self.blocks.pop() {
            Some(frame) => self.act = frame.caller,
            None => return Err(CodegenError::internal("block stack underflow", None)),
        }
        result?;

        let incoming = std::mem::take(&mut self.targets.get_mut(target).incoming);
        let value = self.finish_merge(exit, ty, slot, incoming)?;
        Ok((value, self.ty_of(node)))
    }

    /// Inline the innermost pending block in the scope it was written in.
    pub(super) fn visit_yield(&mut self, node: &'p Node, values: &'p [Node]) -> Result<Value> {
        let frame = self
            .blocks
            .pop()
            .ok_or_else(|| CodegenError::internal("yield without a block", None))?;
        let result = self.inline_block(node, values, &frame);
        self.blocks.push(frame);
        result
    }

    fn inline_block(&mut self, node: &'p Node, values: &'p [Node], frame: &BlockFrame<'p>) -> Result<Value> {
        let block = frame.block;
        let mut vars = frame.caller.vars.clone();
        for (i, arg) in block.args.iter().enumerate() {
            let (v, vty) = self.accept_opt(values.get(i))?;
            if self.b.is_terminated() {
                return Ok(self.dead_value(node.ty));
            }
            let slot = self.alloca(self.llvm(arg.ty), Some(&arg.name));
            self.assign(slot.clone(), arg.ty, vty, v)?;
            vars.insert(arg.name.clone(), Variable::slot(slot, arg.ty));
        }
        for extra in values.iter().skip(block.args.len()) {
            self.accept(extra)?;
        }
        if self.b.is_terminated() {
            return Ok(self.dead_value(node.ty));
        }

        let act = Activation {
            vars,
            scope: frame.caller.scope,
            return_target: frame.caller.return_target,
            // `break` in the block leaves the call it was passed to.
            break_target: self.act.return_target.map(BreakTarget::Call),
        };
        let (v, vty) = self.with_activation(act, |cg| cg.accept_opt(block.body.as_deref()))?;
        if self.b.is_terminated() {
            return Ok(self.dead_value(node.ty));
        }
        match node.ty {
            Some(t) if self.carries_value(node.ty) => self.convert(v, vty, t),
            _ => Ok(self.nil_value()),
        }
    }
}
