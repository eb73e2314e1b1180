//! file: core/src/codegen/vars.rs
//! description: locals, instance variables, program globals and assignment.

use super::context::Variable;
use super::repr::Repr;
use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{Constant, Global, GlobalId, IrType, Linkage, Value};
use crate::program::{Node, NodeKind, TypeId};

impl<'p> CodeGen<'p> {
    /// The variable `name`, allocating its slot on first assignment.
    /// Union slots that admit nil start out as nil.
    pub(super) fn declare_var(&mut self, name: &str, ty: TypeId) -> Result<Variable> {
        if let Some(var) = self.act.vars.get(name) {
            return Ok(var.clone());
        }
        let slot = self.alloca(self.llvm(ty), Some(name));
        let (func, alloca_block) = (self.fun.func, self.fun.alloca_block);
        match self.repr(ty) {
            Repr::Tagged { .. } if self.types.members(ty).iter().any(|m| self.types.is_nil(*m)) => {
                let nil = self.nil;
                let init = self.nil_value();
                let target = slot.clone();
                self.emit_in(func, alloca_block, |cg| cg.assign(target, ty, nil, init))?;
            }
            Repr::NilableSlot { .. } => {
                let null = Value::null(self.llvm(ty));
                let target = slot.clone();
                self.emit_in(func, alloca_block, |cg| cg.b.store(null, target));
            }
            _ => {}
        }
        let var = Variable::slot(slot, ty);
        self.act.vars.insert(name.to_string(), var.clone());
        Ok(var)
    }

    pub(super) fn visit_var(&mut self, node: &'p Node, name: &str) -> Result<Value> {
        let var = self
            .act
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| CodegenError::internal(format!("undefined variable `{}`", name), None))?;
        let held = if var.treated_as_pointer || self.types.is_address_held(var.ty) {
            var.ptr
        } else {
            self.b.load(var.ptr, Some(name))
        };
        self.convert(held, var.ty, self.ty_of(node))
    }

    pub(super) fn visit_assign(&mut self, node: &'p Node, target: &'p Node, value: &'p Node) -> Result<Value> {
        let v = self.accept(value)?;
        let vty = self.ty_of(value);
        if self.b.is_terminated() {
            return Ok(v);
        }
        let (ptr, slot_ty) = self.target_slot(target)?;
        self.assign(ptr, slot_ty, vty, v.clone())?;
        self.convert(v, vty, self.ty_of(node))
    }

    /// `a, b = x, y`: every value is computed before the first store.
    pub(super) fn visit_multi_assign(&mut self, targets: &'p [Node], values: &'p [Node]) -> Result<Value> {
        if targets.len() != values.len() {
            return Err(CodegenError::internal(
                format!("multiple assignment of {} value(s) to {} target(s)", values.len(), targets.len()),
                None,
            ));
        }
        let mut evaluated = Vec::with_capacity(values.len());
        for value in values {
            let v = self.accept(value)?;
            let ty = self.ty_of(value);
            // Address-held values would alias a target written first.
            let v = if self.types.is_address_held(ty) {
                let copy = self.alloca(self.llvm(ty), None);
                self.assign(copy.clone(), ty, ty, v)?;
                copy
            } else {
                v
            };
            evaluated.push((v, ty));
        }
        for (target, (v, ty)) in targets.iter().zip(evaluated) {
            if self.b.is_terminated() {
                break;
            }
            let (ptr, slot_ty) = self.target_slot(target)?;
            self.assign(ptr, slot_ty, ty, v)?;
        }
        Ok(self.nil_value())
    }

    /// Storage written by an assignment to `target`, with its declared type.
    fn target_slot(&mut self, target: &'p Node) -> Result<(Value, TypeId)> {
        match &target.kind {
            NodeKind::Var { name } => {
                let var = self.declare_var(name, self.ty_of(target))?;
                if var.treated_as_pointer {
                    return Err(CodegenError::internal(format!("`{}` cannot be assigned", name), None));
                }
                Ok((var.ptr, var.ty))
            }
            NodeKind::InstanceVar { name } => self.ivar_slot(name),
            NodeKind::Global { name } => {
                let ty = self.program.global(name).map(|g| g.ty).unwrap_or(self.ty_of(target));
                let g = self.global_slot(name, ty);
                Ok((Value::Global(g), ty))
            }
            _ => Err(CodegenError::internal(format!("cannot assign to {}", target.kind_name()), None)),
        }
    }

    /// The object `self` denotes, as a pointer to its record.
    fn self_object(&mut self) -> Result<(Value, TypeId)> {
        let var = self
            .act
            .vars
            .get("self")
            .cloned()
            .ok_or_else(|| CodegenError::internal("instance variable outside of a method", None))?;
        match self.repr(var.ty) {
            Repr::Boxed { base } => {
                let obj = self.convert(var.ptr, var.ty, base)?;
                Ok((obj, base))
            }
            Repr::Scalar => {
                let obj = if var.treated_as_pointer { var.ptr } else { self.b.load(var.ptr, Some("self")) };
                Ok((obj, var.ty))
            }
            _ => Err(CodegenError::internal(
                format!("instance variable on `self` of type {}", self.types.name(var.ty)),
                None,
            )),
        }
    }

    /// Address of ivar `name`, typed as its declared type.
    fn ivar_slot(&mut self, name: &str) -> Result<(Value, TypeId)> {
        let (obj, owner) = self.self_object()?;
        let (index, ty) = self.types.field_index(owner, name).ok_or_else(|| {
            CodegenError::internal(format!("{} has no instance variable `{}`", self.types.name(owner), name), None)
        })?;
        let field = self.b.struct_gep(obj, index as u32);
        let typed = self.b.bitcast(field, self.llvm(ty).ptr_to());
        Ok((typed, ty))
    }

    pub(super) fn visit_ivar(&mut self, node: &'p Node, name: &str) -> Result<Value> {
        let (ptr, ty) = self.ivar_slot(name)?;
        let held = if self.types.is_address_held(ty) { ptr } else { self.b.load(ptr, Some(name)) };
        self.convert(held, ty, self.ty_of(node))
    }

    /// Program global `name`, zero-initialized on first reference.
    pub(super) fn global_slot(&mut self, name: &str, ty: TypeId) -> GlobalId {
        if let Some(g) = self.globals.get(name) {
            return *g;
        }
        let ir = self.llvm(ty);
        let global = Global {
            name: self.b.module.unique_global_name(name),
            ty: ir.clone(),
            init: Some(Constant::Null(ir)),
            constant: false,
            linkage: Linkage::Internal,
        };
        let g = self.b.module.add_global(global);
        self.globals.insert(name.to_string(), g);
        g
    }

    pub(super) fn visit_global(&mut self, node: &'p Node, name: &str) -> Result<Value> {
        let ty = self.program.global(name).map(|g| g.ty).unwrap_or(self.ty_of(node));
        let g = self.global_slot(name, ty);
        let held = if self.types.is_address_held(ty) { Value::Global(g) } else { self.b.load(Value::Global(g), Some(name)) };
        self.convert(held, ty, self.ty_of(node))
    }

    pub(super) fn visit_pointer_of(&mut self, node: &'p Node, target: &'p Node) -> Result<Value> {
        let ptr = match &target.kind {
            NodeKind::Var { name } => {
                let var = self.declare_var(name, self.ty_of(target))?;
                if var.treated_as_pointer {
                    // Parameters held in registers get a slot of their own.
                    let slot = self.alloca(self.llvm(var.ty), Some(name));
                    self.b.store(var.ptr, slot.clone());
                    let spilled = Variable::slot(slot.clone(), var.ty);
                    self.act.vars.insert(name.clone(), spilled);
                    slot
                } else {
                    var.ptr
                }
            }
            NodeKind::InstanceVar { name } => self.ivar_slot(name)?.0,
            NodeKind::Global { name } => {
                let ty = self.program.global(name).map(|g| g.ty).unwrap_or(self.ty_of(target));
                Value::Global(self.global_slot(name, ty))
            }
            _ => {
                return Err(CodegenError::internal(format!("pointerof({})", target.kind_name()), None));
            }
        };
        let want = self.llvm(self.ty_of(node));
        Ok(self.coerce(ptr, &want))
    }

    /// `argc`/`argv` are parked in globals by the entry function so any
    /// generated function can read them.
    fn entry_args(&mut self) -> (GlobalId, GlobalId) {
        if let Some(pair) = self.argc_argv {
            return pair;
        }
        let slot = |cg: &mut Self, name: &str, ty: IrType| {
            let global = Global {
                name: cg.b.module.unique_global_name(name),
                ty: ty.clone(),
                init: Some(Constant::Null(ty)),
                constant: false,
                linkage: Linkage::Internal,
            };
            cg.b.module.add_global(global)
        };
        let argc = slot(self, "argc", IrType::i32());
        let argv = slot(self, "argv", IrType::byte_ptr().ptr_to());
        let (func, alloca_block) = (self.main.func, self.main.alloca_block);
        self.emit_in(func, alloca_block, |cg| {
            cg.b.store(Value::Param(0), Value::Global(argc));
            cg.b.store(Value::Param(1), Value::Global(argv));
        });
        self.argc_argv = Some((argc, argv));
        (argc, argv)
    }

    pub(super) fn visit_argc(&mut self) -> Value {
        let (argc, _) = self.entry_args();
        self.b.load(Value::Global(argc), Some("argc"))
    }

    pub(super) fn visit_argv(&mut self) -> Value {
        let (_, argv) = self.entry_args();
        self.b.load(Value::Global(argv), Some("argv"))
    }
}
