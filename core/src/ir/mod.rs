//! file: core/src/ir/mod.rs
//! description: the SSA-style target IR produced by code generation.

pub mod builder;
pub mod exec;
pub mod module;
pub mod op;
pub mod types;
pub mod value;
pub mod verify;

pub use self::builder::IrBuilder;
pub use self::exec::{run_main, run_main_with_output, ExecError, ExecState, RtValue, ENTRY_FUNCTION};
pub use self::module::{DebugInfo, Function, Global, Linkage, Module, Param, Subprogram};
pub use self::op::{BinOp, CastOp, FloatPredicate, InstKind, IntPredicate, Terminator};
pub use self::types::IrType;
pub use self::value::{BlockId, Constant, FuncId, GlobalId, InstId, Value};
pub use self::verify::{check_module, verify_module};
