//! file: core/src/codegen/context.rs
//! description: generation state that follows the source nesting.
//!
//! An `Activation` is what a `return`, `break` or variable reference sees
//! at the current point: the variables in scope, the type of `self`, and
//! where control leaves to. Inlining a call with a block swaps in a fresh
//! activation and parks the caller's one on the block stack; a `yield`
//! pops it back out to generate the block body in the caller's scope.

use std::collections::HashMap;

use crate::ir::{BlockId, FuncId, Value};
use crate::program::{Block, TypeId};

#[derive(Debug, Clone)]
pub struct Variable {
    /// Slot address; for a variable treated as pointer, the value itself.
    pub ptr: Value,
    pub ty: TypeId,
    pub treated_as_pointer: bool,
}

impl Variable {
    pub fn slot(ptr: Value, ty: TypeId) -> Self {
        Variable { ptr, ty, treated_as_pointer: false }
    }

    pub fn direct(value: Value, ty: TypeId) -> Self {
        Variable { ptr: value, ty, treated_as_pointer: true }
    }
}

pub type Vars = HashMap<String, Variable>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub usize);

/// A join point reached by several jumps that each carry a value: the
/// end of an inlined call, reached by falling off its body, by `return`
/// inside it, or by `break` inside its block.
#[derive(Debug, Clone)]
pub struct MergeTarget {
    pub block: BlockId,
    pub ty: Option<TypeId>,
    /// Union slot written by every jump; when absent, values meet in a phi.
    pub slot: Option<Value>,
    pub incoming: Vec<(Value, BlockId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakTarget {
    /// Leave the innermost `while`; loops yield nil.
    Loop { exit: BlockId },
    /// Leave the inlined call the current block was passed to.
    Call(TargetId),
}

#[derive(Debug, Clone, Default)]
pub struct Activation {
    pub vars: Vars,
    pub scope: Option<TypeId>,
    /// `None` returns from the generated function itself.
    pub return_target: Option<TargetId>,
    pub break_target: Option<BreakTarget>,
}

impl Activation {
    pub fn new(scope: Option<TypeId>) -> Self {
        Activation { scope, ..Activation::default() }
    }
}

/// A block literal waiting to be inlined, with the caller's activation.
#[derive(Debug)]
pub struct BlockFrame<'p> {
    pub block: &'p Block,
    pub caller: Activation,
}

/// Per generated function.
#[derive(Debug, Clone)]
pub struct FunctionState {
    pub func: FuncId,
    /// Holds every stack slot; branches to `entry` once the body is done.
    pub alloca_block: BlockId,
    pub entry_block: BlockId,
    pub return_ty: Option<TypeId>,
    /// Slot a union-returning function assembles its result in.
    pub return_slot: Option<Value>,
}

/// Arena of merge targets; ids stay valid for the whole pass so `return`
/// and `break` can share one target.
#[derive(Debug, Default)]
pub struct Targets {
    targets: Vec<MergeTarget>,
}

impl Targets {
    pub fn add(&mut self, block: BlockId, ty: Option<TypeId>, slot: Option<Value>) -> TargetId {
        self.targets.push(MergeTarget { block, ty, slot, incoming: Vec::new() });
        TargetId(self.targets.len() - 1)
    }

    pub fn get(&self, id: TargetId) -> &MergeTarget {
        &self.targets[id.0]
    }

    pub fn get_mut(&mut self, id: TargetId) -> &mut MergeTarget {
        &mut self.targets[id.0]
    }
}
