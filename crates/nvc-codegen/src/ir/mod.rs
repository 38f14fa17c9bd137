//! The source IR: a per-function, register-based representation produced
//! upstream by the interpreter's analysis pass. The code generator only
//! ever reads these types; nothing here mutates a [`CfgFunction`] once
//! lowering has begun.

mod builder;
mod display;
mod function;
mod instruction;

pub use builder::FunctionBuilder;
pub use display::dump_instr_range;
pub use function::{Block, BlockId, CfgFunction};
pub use instruction::{Cc, Instr, Opcode, Operand, Reg, Width};
