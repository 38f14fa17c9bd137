//! Calling-convention constants shared by the IR producer and this backend:
//! the fixed-size argument array, the frame anchor field layout, and the
//! AOT constructor priority. These are load-bearing — the runtime unwinder
//! and the interpreter's own calling convention depend on them matching
//! exactly.

/// Number of i64 slots in the `args` array threaded through every call.
/// Bounds `RECV`/`SEND` indices.
pub const JIT_MAX_ARGS: usize = 64;

/// Anchor struct field indices, in declaration order (`{ptr caller, ptr
/// function, i32 ir_position}`). Field order is load-bearing.
pub const ANCHOR_FIELD_CALLER: u32 = 0;
pub const ANCHOR_FIELD_FUNCTION: u32 = 1;
pub const ANCHOR_FIELD_IR_POSITION: u32 = 2;

/// Constructor-entry struct priority used in `llvm.global_ctors`.
pub const CTOR_PRIORITY: u32 = 65535;

/// Frame allocations are aligned to this boundary.
pub const FRAME_ALIGN: u32 = 8;

/// Exported as `__nvc_abi_version` in every AOT object so the runtime
/// loader can refuse objects built against an incompatible layout of the
/// anchor/constructor-entry structs.
pub const ABI_VERSION: u32 = 1;

/// Name of the per-module synthesized constructor function, referenced
/// from `llvm.global_ctors`.
pub const MODULE_CTOR_NAME: &str = "nvc.module_ctor";
