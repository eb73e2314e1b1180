//! file: core/src/ir/verify.rs
//! description: structural verification of a generated module.
//!
//! Walks every defined function and records each structural defect it
//! finds instead of stopping at the first one, so a rejected module comes
//! back with the full list.

use std::collections::HashSet;

use crate::error::{CodegenError, Result};
use crate::ir::module::{Function, Module};
use crate::ir::op::{InstKind, Terminator};
use crate::ir::types::IrType;
use crate::ir::value::{BlockId, Constant, FuncId, Value};

/// Verify `module`, turning any finding into an `InvalidModule` error.
pub fn verify_module(module: &Module) -> Result<()> {
    let findings = check_module(module);
    if findings.is_empty() {
        Ok(())
    } else {
        log::debug!("verifier rejected module with {} finding(s)", findings.len());
        Err(CodegenError::invalid_module(&findings))
    }
}

/// Every structural defect in `module`, in function and block order.
pub fn check_module(module: &Module) -> Vec<String> {
    let mut findings = Vec::new();
    for (i, func) in module.functions.iter().enumerate() {
        if !func.is_declaration() {
            check_function(module, FuncId(i as u32), func, &mut findings);
        }
    }
    for g in module.globals.iter() {
        if let Some(init) = &g.init {
            if init.ty() != g.ty {
                findings.push(format!("global @{}: initializer type {} does not match {}", g.name, init.ty(), g.ty));
            }
        }
    }
    findings
}

fn check_function(module: &Module, id: FuncId, func: &Function, findings: &mut Vec<String>) {
    let ty = |v: &Value| module.value_type(id, v);
    let mut report = |block: &str, msg: String| findings.push(format!("@{} %{}: {}", func.name, block, msg));

    let mut placed: HashSet<u32> = HashSet::new();
    for block in func.blocks.iter() {
        placed.extend(block.insts.iter().map(|i| i.0));
    }

    for bid in func.block_ids() {
        let block = func.block(bid);
        let name = block.name.as_str();
        let preds = func.predecessors(bid);

        let mut seen_non_phi = false;
        for inst_id in block.insts.iter() {
            let inst = func.inst(*inst_id);

            for op in inst.kind.operands() {
                match op {
                    Value::Inst(other) => {
                        if other.index() >= func.insts.len() || !placed.contains(&other.0) {
                            report(name, format!("operand %{} is not defined in this function", other.0));
                        } else if func.inst(*other).ty == IrType::Void {
                            report(name, format!("operand %{} has no value", other.0));
                        }
                    }
                    Value::Param(p) if *p as usize >= func.params.len() => {
                        report(name, format!("parameter {} out of range", p));
                    }
                    Value::Global(g) if g.index() >= module.globals.len() => {
                        report(name, format!("global {} out of range", g.0));
                    }
                    Value::Const(Constant::GlobalAddr { global, .. }) if global.index() >= module.globals.len() => {
                        report(name, format!("global {} out of range", global.0));
                    }
                    _ => {}
                }
            }

            match &inst.kind {
                InstKind::Phi { incoming } => {
                    if seen_non_phi {
                        report(name, format!("phi %{} does not lead its block", inst_id.0));
                    }
                    let from: Vec<BlockId> = incoming.iter().map(|(_, b)| *b).collect();
                    let unique: HashSet<BlockId> = from.iter().copied().collect();
                    let expected: HashSet<BlockId> = preds.iter().copied().collect();
                    if unique.len() != from.len() || unique != expected {
                        report(
                            name,
                            format!(
                                "phi %{} lists {} incoming block(s) but the block has {} predecessor(s)",
                                inst_id.0,
                                from.len(),
                                preds.len()
                            ),
                        );
                    }
                    for (v, _) in incoming.iter() {
                        if ty(v) != inst.ty {
                            report(name, format!("phi %{} incoming value of type {} is not {}", inst_id.0, ty(v), inst.ty));
                        }
                    }
                }
                other => {
                    seen_non_phi = true;
                    check_inst(module, id, other, &inst.ty, &mut |m| report(name, m));
                }
            }
        }

        match &block.term {
            None => report(name, "block has no terminator".to_string()),
            Some(term) => {
                for s in term.successors() {
                    if s.index() >= func.blocks.len() {
                        report(name, format!("branch to unknown block {}", s.0));
                    }
                }
                match term {
                    Terminator::CondBr { cond, .. } if ty(cond) != IrType::i1() => {
                        report(name, format!("branch condition has type {}", ty(cond)));
                    }
                    Terminator::Ret(Some(v)) if ty(v) != func.ret => {
                        report(name, format!("returns {} from a function returning {}", ty(v), func.ret));
                    }
                    Terminator::Ret(None) if func.ret != IrType::Void => {
                        report(name, format!("missing return value of type {}", func.ret));
                    }
                    _ => {}
                }
            }
        }
    }
}

fn check_inst(module: &Module, func: FuncId, kind: &InstKind, result: &IrType, report: &mut dyn FnMut(String)) {
    let ty = |v: &Value| module.value_type(func, v);
    match kind {
        InstKind::Load { ptr } => {
            if !ty(ptr).is_ptr() {
                report(format!("load from non-pointer {}", ty(ptr)));
            }
        }
        InstKind::Store { value, ptr } => match ty(ptr).pointee() {
            Some(p) if *p == ty(value) => {}
            Some(p) => report(format!("store of {} into {}*", ty(value), p)),
            None => report(format!("store through non-pointer {}", ty(ptr))),
        },
        InstKind::Gep { ptr, .. } => {
            if !ty(ptr).is_ptr() || *result == IrType::Void {
                report(format!("malformed getelementptr on {}", ty(ptr)));
            }
        }
        InstKind::ExtractValue { agg, index } => {
            if *result == IrType::Void {
                report(format!("extractvalue {} out of range for {}", index, ty(agg)));
            }
        }
        InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } | InstKind::FCmp { lhs, rhs, .. } => {
            if ty(lhs) != ty(rhs) {
                report(format!("operand types differ: {} and {}", ty(lhs), ty(rhs)));
            }
        }
        InstKind::Select { cond, then, else_ } => {
            if ty(cond) != IrType::i1() || ty(then) != ty(else_) {
                report("malformed select".to_string());
            }
        }
        InstKind::Call { callee, args } => {
            if callee.index() >= module.functions.len() {
                report(format!("call to unknown function {}", callee.0));
                return;
            }
            let target = module.function(*callee);
            let arity_ok = if target.varargs {
                args.len() >= target.params.len()
            } else {
                args.len() == target.params.len()
            };
            if !arity_ok {
                report(format!("call to @{} with {} argument(s), expected {}", target.name, args.len(), target.params.len()));
                return;
            }
            for (a, p) in args.iter().zip(target.params.iter()) {
                if ty(a) != p.ty {
                    report(format!("argument {} to @{} has type {}, expected {}", p.name, target.name, ty(a), p.ty));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodegenErrorKind;
    use crate::ir::builder::IrBuilder;
    use crate::ir::module::Linkage;

    #[test]
    fn missing_terminator_and_bad_store_are_reported() {
        let mut b = IrBuilder::new("bad");
        let f = b.declare_function("f", vec![], IrType::Void, Linkage::Internal, false);
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        let slot = b.alloca_at(f, entry, IrType::i32(), None);
        b.store(Value::i1(true), slot);
        let findings = check_module(&b.module);
        assert_eq!(findings.len(), 2, "{:?}", findings);
        let err = verify_module(&b.module).unwrap_err();
        assert_eq!(err.kind(), CodegenErrorKind::InvalidModule);
    }

    #[test]
    fn phi_must_match_predecessors() {
        let mut b = IrBuilder::new("phi");
        let f = b.declare_function("f", vec![], IrType::i32(), Linkage::Internal, false);
        let entry = b.append_block(f, "entry");
        let exit = b.append_block(f, "exit");
        b.position_at_end(f, entry);
        b.br(exit);
        b.position_at_end(f, exit);
        let v = b.phi(IrType::i32(), vec![(Value::i32(1), entry), (Value::i32(2), exit)]);
        b.ret(Some(v));
        let findings = check_module(&b.module);
        assert!(findings.iter().any(|f| f.contains("phi")), "{:?}", findings);
    }

    #[test]
    fn well_formed_function_passes() {
        let mut b = IrBuilder::new("ok");
        let f = b.declare_function("f", vec![], IrType::i32(), Linkage::Internal, false);
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        let slot = b.alloca_at(f, entry, IrType::i32(), None);
        b.store(Value::i32(7), slot.clone());
        let v = b.load(slot, None);
        b.ret(Some(v));
        assert!(verify_module(&b.module).is_ok());
    }
}
