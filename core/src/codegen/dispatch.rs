//! file: core/src/codegen/dispatch.rs
//! description: runtime selection among a call's candidate definitions.
//!
//! Candidates are tested in order. Each test compares the runtime type of
//! the receiver and of every argument against the candidate's parameter
//! types; the first match runs and jumps to a shared exit. Falling off the
//! end of the chain is unreachable because the candidates cover every
//! runtime combination the static types allow.

use super::repr::Repr;
use super::CodeGen;
use crate::error::Result;
use crate::ir::Value;
use crate::program::{Call, Def, Node, TypeId, TypeKind};

/// An evaluated operand of a dispatched call.
struct Operand {
    value: Value,
    ty: TypeId,
    /// Runtime discriminator: the union tag, the box tag, or for a nilable
    /// the pointer itself. Scalars carry none.
    type_id: Option<Value>,
}

impl<'p> CodeGen<'p> {
    pub(super) fn dispatch(&mut self, node: &'p Node, call: &'p Call) -> Result<Value> {
        let program = self.program;
        log::debug!("dispatch chain for `{}` over {} candidate(s)", call.name, call.targets.len());

        let receiver = match call.obj.as_deref() {
            Some(obj) => {
                let v = self.accept(obj)?;
                Some(self.operand(v, self.ty_of(obj)))
            }
            None => match self.act.vars.get("self").cloned() {
                Some(var) if call.scope.is_some_and(|s| self.types.passed_as_self(s)) => {
                    let held = if var.treated_as_pointer || self.types.is_address_held(var.ty) {
                        var.ptr
                    } else {
                        self.b.load(var.ptr, Some("self"))
                    };
                    Some(self.operand(held, var.ty))
                }
                _ => None,
            },
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let v = self.accept(arg)?;
            args.push(self.operand(v, self.ty_of(arg)));
            if self.b.is_terminated() {
                break;
            }
        }
        if self.b.is_terminated() {
            return Ok(self.dead_value(node.ty));
        }

        let ty = node.ty;
        let exit = self.append_block("exit");
        // One result slot shared by every candidate.
        let slot = match ty {
            Some(t) if self.types.is_address_held(t) => Some(self.alloca(self.llvm(t), None)),
            _ => None,
        };
        let mut incoming = Vec::new();

        for def_id in &call.targets {
            let def = program.def(*def_id);
            let guard = self.candidate_guard(def, receiver.as_ref(), &args);
            let current = self.append_block("current_def");
            let next = self.append_block("next_def");
            self.b.cond_br(guard, current, next);
            self.position_at(current);

            if !self.candidate_allocated(def) {
                log::warn!("`{}` on {} is never instantiated, skipping", def.name, self.types.name(def.owner));
                self.b.unreachable();
                self.position_at(next);
                continue;
            }

            let self_type = self.self_type_for(def, Some(def.owner));
            let mut call_args = Vec::with_capacity(args.len() + 1);
            if let Some(st) = self_type {
                let recv = match &receiver {
                    Some(r) => self.convert(r.value.clone(), r.ty, st)?,
                    None => self.implicit_self(st)?,
                };
                call_args.push(recv);
            }
            for (a, param) in args.iter().zip(&def.args) {
                call_args.push(self.convert(a.value.clone(), a.ty, param.ty)?);
            }

            let (v, vty) = self.resolved_call(node, call, *def_id, self_type, call_args)?;
            if !self.b.is_terminated() {
                match (&slot, ty) {
                    (Some(slot), Some(t)) => self.assign(slot.clone(), t, vty, v)?,
                    (None, Some(t)) if self.carries_value(ty) => {
                        let v = self.convert(v, vty, t)?;
                        let want = self.llvm(t);
                        let v = self.coerce(v, &want);
                        incoming.push((v, self.current_block()?));
                    }
                    _ => {}
                }
                self.b.br(exit);
            }
            self.position_at(next);
        }
        self.b.unreachable();
        self.finish_merge(exit, ty, slot, incoming)
    }

    fn operand(&mut self, value: Value, ty: TypeId) -> Operand {
        let type_id = match self.repr(ty) {
            Repr::Tagged { .. } | Repr::Boxed { .. } => Some(self.load_tag(value.clone())),
            Repr::NilableSlot { .. } => Some(value.clone()),
            Repr::Scalar => None,
        };
        Operand { value, ty, type_id }
    }

    /// Whether the operand's runtime type matches `want`.
    fn type_guard(&mut self, operand: &Operand, want: TypeId) -> Value {
        let Some(id) = operand.type_id.clone() else {
            return Value::i1(true);
        };
        match self.repr(operand.ty) {
            Repr::NilableSlot { .. } if self.types.is_nil(want) => self.is_null(id),
            Repr::NilableSlot { .. } => self.not_null(id),
            _ => self.match_any_type_id(want, id),
        }
    }

    fn candidate_guard(&mut self, def: &Def, receiver: Option<&Operand>, args: &[Operand]) -> Value {
        let mut guard = Value::i1(true);
        if let Some(r) = receiver {
            if !matches!(self.types.kind(def.owner), TypeKind::Program) {
                let g = self.type_guard(r, def.owner);
                guard = self.b.and(guard, g);
            }
        }
        for (a, param) in args.iter().zip(&def.args) {
            let g = self.type_guard(a, param.ty);
            guard = self.b.and(guard, g);
        }
        guard
    }

    fn candidate_allocated(&self, def: &Def) -> bool {
        let types = self.types;
        types.allocated(def.owner) && def.args.iter().all(|a| types.allocated(a.ty))
    }
}
