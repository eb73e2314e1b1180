//! file: core/src/codegen/control.rs
//! description: conditionals, loops, return and break.
//!
//! A branch that ends in `return`, `break` or an escaping block leaves its
//! block terminated; merges only collect values from branches that still
//! fall through, and a merge nobody reaches ends in `unreachable`.

use super::context::{BreakTarget, TargetId};
use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{BlockId, IntPredicate, Value};
use crate::program::{Node, TypeId, TypeKind};

impl<'p> CodeGen<'p> {
    pub(super) fn visit_expressions(&mut self, expressions: &'p [Node]) -> Result<Value> {
        let mut last = self.nil_value();
        for e in expressions {
            last = self.accept(e)?;
            if self.b.is_terminated() {
                break;
            }
        }
        Ok(last)
    }

    /// Truthiness of `value`, a value of static type `ty`, as an `i1`.
    ///
    /// Nil is false, a bool is itself, a union with nil or bool members is
    /// false exactly when it holds nil or `false`, pointers are false when
    /// null, and everything else is true.
    pub(super) fn codegen_cond(&mut self, value: Value, ty: TypeId) -> Result<Value> {
        let types = self.types;
        let cond = match types.kind(ty) {
            TypeKind::Nil => Value::i1(false),
            TypeKind::Bool => self.b.icmp(IntPredicate::Ne, value, Value::i1(false)),
            TypeKind::Union { members } => {
                if types.is_nilable(ty) {
                    return Ok(self.not_null(value));
                }
                let nil = members.iter().copied().find(|m| types.is_nil(*m));
                let bool_member = members.iter().copied().find(|m| types.is_bool(*m));
                match (nil, bool_member) {
                    (None, None) => Value::i1(true),
                    (Some(nil), None) => {
                        let tag = self.load_tag(value);
                        self.b.icmp(IntPredicate::Ne, tag, Value::i32(i64::from(nil.0)))
                    }
                    (nil, Some(bool_member)) => {
                        let tag = self.load_tag(value.clone());
                        let is_bool = self.b.icmp(IntPredicate::Eq, tag.clone(), Value::i32(i64::from(bool_member.0)));
                        let bit = self.convert(value, ty, bool_member)?;
                        let is_false = self.b.icmp(IntPredicate::Eq, bit, Value::i1(false));
                        let falsy = self.b.and(is_bool, is_false);
                        let falsy = match nil {
                            Some(nil) => {
                                let is_nil = self.b.icmp(IntPredicate::Eq, tag, Value::i32(i64::from(nil.0)));
                                self.b.or(is_nil, falsy)
                            }
                            None => falsy,
                        };
                        self.b.not(falsy)
                    }
                }
            }
            TypeKind::Pointer { .. } => self.not_null(value),
            _ => Value::i1(true),
        };
        Ok(cond)
    }

    /// The compile-time truth of a condition already evaluated to `value`,
    /// when its static type or a constant value decides it.
    fn check_const(&self, cond: &Node, value: &Value) -> Option<bool> {
        if cond.yields() {
            return None;
        }
        let types = self.types;
        let ty = self.ty_of(cond);
        let by_type = match types.kind(ty) {
            TypeKind::Nil => Some(false),
            TypeKind::Bool | TypeKind::Pointer { .. } => None,
            TypeKind::Union { .. } if types.is_nilable(ty) => None,
            TypeKind::Union { members } => {
                if members.iter().any(|m| types.is_nil(*m) || types.is_bool(*m)) {
                    None
                } else {
                    Some(true)
                }
            }
            _ => Some(true),
        };
        by_type.or_else(|| value.as_const_bool())
    }

    pub(super) fn visit_if(
        &mut self,
        node: &'p Node,
        cond: &'p Node,
        then: Option<&'p Node>,
        else_: Option<&'p Node>,
    ) -> Result<Value> {
        let ty = node.ty;
        let value = self.accept(cond)?;
        if self.b.is_terminated() {
            return Ok(self.dead_value(ty));
        }

        if let Some(taken) = self.check_const(cond, &value) {
            let (v, vty) = self.accept_opt(if taken { then } else { else_ })?;
            if self.b.is_terminated() {
                return Ok(self.dead_value(ty));
            }
            return match ty {
                Some(t) if self.carries_value(ty) => self.convert(v, vty, t),
                _ => Ok(self.nil_value()),
            };
        }

        let c = self.codegen_cond(value, self.ty_of(cond))?;
        let then_block = self.append_block("then");
        let else_block = self.append_block("else");
        let exit = self.append_block("exit");
        self.b.cond_br(c, then_block, else_block);

        let slot = match ty {
            Some(t) if self.types.is_address_held(t) => Some(self.alloca(self.llvm(t), None)),
            _ => None,
        };
        let mut incoming = Vec::new();
        for (block, branch) in [(then_block, then), (else_block, else_)] {
            self.position_at(block);
            let (v, vty) = self.accept_opt(branch)?;
            self.close_branch(v, vty, ty, slot.as_ref(), &mut incoming, exit)?;
        }
        self.finish_merge(exit, ty, slot, incoming)
    }

    /// Hand a branch result to the merge at `exit` and jump there, unless
    /// the branch already left.
    fn close_branch(
        &mut self,
        value: Value,
        value_ty: TypeId,
        ty: Option<TypeId>,
        slot: Option<&Value>,
        incoming: &mut Vec<(Value, BlockId)>,
        exit: BlockId,
    ) -> Result<()> {
        if self.b.is_terminated() {
            return Ok(());
        }
        match (slot, ty) {
            (Some(slot), Some(t)) => self.assign(slot.clone(), t, value_ty, value)?,
            (None, Some(t)) if self.carries_value(ty) => {
                let v = self.convert(value, value_ty, t)?;
                let want = self.llvm(t);
                let v = self.coerce(v, &want);
                incoming.push((v, self.current_block()?));
            }
            _ => {}
        }
        self.b.br(exit);
        Ok(())
    }

    /// Position at `exit` and produce the merged value.
    pub(super) fn finish_merge(
        &mut self,
        exit: BlockId,
        ty: Option<TypeId>,
        slot: Option<Value>,
        incoming: Vec<(Value, BlockId)>,
    ) -> Result<Value> {
        self.position_at(exit);
        if self.b.predecessors(exit).is_empty() {
            self.b.unreachable();
            return Ok(self.dead_value(ty));
        }
        if let Some(slot) = slot {
            return Ok(slot);
        }
        match ty {
            Some(t) if self.carries_value(ty) => {
                if incoming.len() == 1 {
                    Ok(incoming[0].0.clone())
                } else {
                    Ok(self.b.phi(self.llvm(t), incoming))
                }
            }
            _ => Ok(self.nil_value()),
        }
    }

    pub(super) fn visit_while(&mut self, cond: &'p Node, body: Option<&'p Node>, run_once: bool) -> Result<Value> {
        let head = self.append_block("while");
        let body_block = self.append_block("body");
        let exit = self.append_block("exit");
        self.b.br(if run_once { body_block } else { head });

        self.position_at(head);
        let value = self.accept(cond)?;
        let c = self.codegen_cond(value, self.ty_of(cond))?;
        self.b.cond_br(c, body_block, exit);

        self.position_at(body_block);
        let saved = self.act.break_target.replace(BreakTarget::Loop { exit });
        let result = body.map(|b| self.accept(b)).transpose();
        self.act.break_target = saved;
        result?;
        self.b.br(head);

        self.position_at(exit);
        if self.b.predecessors(exit).is_empty() {
            self.b.unreachable();
        }
        Ok(self.nil_value())
    }

    pub(super) fn visit_return(&mut self, value: Option<&'p Node>) -> Result<Value> {
        let (v, vty) = self.accept_opt(value)?;
        if self.b.is_terminated() {
            return Ok(self.nil_value());
        }
        match self.act.return_target {
            Some(target) => self.jump_to_target(target, vty, v)?,
            None => self.return_from_function(v, vty)?,
        }
        Ok(self.nil_value())
    }

    pub(super) fn return_from_function(&mut self, value: Value, value_ty: TypeId) -> Result<()> {
        match self.fun.return_ty {
            None => self.b.ret(None),
            Some(rt) if self.types.is_address_held(rt) => {
                let slot = self
                    .fun
                    .return_slot
                    .clone()
                    .ok_or_else(|| CodegenError::internal("union return without a return slot", None))?;
                self.assign(slot.clone(), rt, value_ty, value)?;
                let v = self.b.load(slot, None);
                self.b.ret(Some(v));
            }
            Some(rt) => {
                let v = self.convert(value, value_ty, rt)?;
                let want = self.llvm(rt);
                let v = self.coerce(v, &want);
                self.b.ret(Some(v));
            }
        }
        Ok(())
    }

    pub(super) fn visit_break(&mut self, value: Option<&'p Node>) -> Result<Value> {
        let (v, vty) = self.accept_opt(value)?;
        match self.act.break_target {
            Some(BreakTarget::Loop { exit }) => self.b.br(exit),
            Some(BreakTarget::Call(target)) => self.jump_to_target(target, vty, v)?,
            None => return Err(CodegenError::internal("break outside of a loop or block", None)),
        }
        Ok(self.nil_value())
    }

    /// Deliver `value` to a merge target and branch to it.
    pub(super) fn jump_to_target(&mut self, id: TargetId, value_ty: TypeId, value: Value) -> Result<()> {
        if self.b.is_terminated() {
            return Ok(());
        }
        let (block, ty, slot) = {
            let t = self.targets.get(id);
            (t.block, t.ty, t.slot.clone())
        };
        match (slot, ty) {
            (Some(slot), Some(t)) => self.assign(slot, t, value_ty, value)?,
            (None, Some(t)) if self.carries_value(ty) => {
                let v = self.convert(value, value_ty, t)?;
                let want = self.llvm(t);
                let v = self.coerce(v, &want);
                let from = self.current_block()?;
                self.targets.get_mut(id).incoming.push((v, from));
            }
            _ => {}
        }
        self.b.br(block);
        Ok(())
    }

    pub(super) fn visit_is_a(&mut self, obj: &'p Node, target: TypeId) -> Result<Value> {
        let value = self.accept(obj)?;
        Ok(self.is_a(value, self.ty_of(obj), target))
    }

    /// Non-short-circuit `or` of two truthiness tests.
    pub(super) fn visit_simple_or(&mut self, left: &'p Node, right: &'p Node) -> Result<Value> {
        let l = self.accept(left)?;
        let l = self.codegen_cond(l, self.ty_of(left))?;
        let r = self.accept(right)?;
        let r = self.codegen_cond(r, self.ty_of(right))?;
        Ok(self.b.or(l, r))
    }
}
