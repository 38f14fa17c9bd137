//! Lowers a single [`crate::ir::CfgFunction`] to an LLVM function body.
//!
//! Submodules: [`liveness`] (backward dataflow for phi placement),
//! [`mode`] (the JIT/AOT call-resolution split), [`value`] (operand
//! materialization), [`ops`] (per-opcode dispatch), and [`driver`] (the
//! block/frame/anchor scaffolding and phi stitching that ties the rest
//! together).

mod driver;
mod liveness;
mod mode;
mod ops;
mod value;

pub use driver::lower_function;
pub use mode::{AotMode, CallTarget, JitMode, Mode, ResolvedFunction};
