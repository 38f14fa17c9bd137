//! End-to-end lowering scenarios, run by actually JIT-compiling and
//! invoking the generated code. Each fixture is self-contained (no
//! `CALL`/`MACRO_FFICALL`/constant pool) so a resolver that answers every
//! lookup with `None` is enough to drive it through [`JitSession`].

use inkwell::targets::{InitializationConfig, Target};

use nvc_codegen::abi::JIT_MAX_ARGS;
use nvc_codegen::ir::{BlockId, Cc, CfgFunction, FunctionBuilder, Instr, Opcode, Operand, Width};
use nvc_codegen::jit::{CompileOutcome, JitSession, PublishedEntry, SymbolResolver};
use nvc_codegen::lower::ResolvedFunction;

struct NoExternalResolver;

impl SymbolResolver for NoExternalResolver {
    fn resolve_runtime(&self, _symbol: &str) -> Option<u64> {
        None
    }
    fn resolve_function(&self, _name: &str) -> Option<ResolvedFunction> {
        None
    }
    fn resolve_foreign(&self, _symbol: &str) -> Option<u64> {
        None
    }
    fn resolve_cpool(&self, _func_name: &str) -> Option<u64> {
        None
    }
}

fn init_target() {
    Target::initialize_native(&InitializationConfig::default()).expect("native target init");
}

/// JIT-compiles `func` and invokes it with `args` pre-loaded into the
/// args array, returning the array after `RET`.
fn run(func: &CfgFunction, args: &[i64]) -> [i64; JIT_MAX_ARGS] {
    init_target();
    let session = JitSession::init();
    let target = PublishedEntry::new();
    let entry_addr = match session.compile(&NoExternalResolver, func, &target).expect("compile") {
        CompileOutcome::Compiled { entry_addr } => entry_addr,
        CompileOutcome::FilteredOut => panic!("fixture unexpectedly filtered out"),
    };

    let mut slots = [0i64; JIT_MAX_ARGS];
    slots[..args.len()].copy_from_slice(args);

    type EntryFn = unsafe extern "C" fn(*mut std::ffi::c_void, *mut std::ffi::c_void, *mut i64);
    let entry: EntryFn = unsafe { std::mem::transmute(entry_addr as usize) };
    unsafe {
        entry(std::ptr::null_mut(), std::ptr::null_mut(), slots.as_mut_ptr());
    }
    session.shutdown();
    slots
}

/// Scenario 1: `RECV 0 -> r0; SEND 0, r0; RET`. `args[0]` comes back
/// unchanged.
#[test]
fn identity_function_leaves_args_unchanged() {
    let mut b = FunctionBuilder::new("identity");
    let r0 = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(r0)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let out = run(&func, &[42]);
    assert_eq!(out[0], 42);
}

/// Scenario 2: 32-bit `ADD.O` of `0x7FFFFFFF` and `1` overflows and
/// sign-extends the wrapped result to `0xFFFFFFFF80000000`.
#[test]
fn signed_overflow_add_sets_flags_and_sign_extends() {
    let mut b = FunctionBuilder::new("signed_overflow");
    let r0 = b.alloc_reg();
    let r1 = b.alloc_reg();
    let result = b.alloc_reg();
    let flag = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Recv).with_result(r1).with_args(vec![Operand::ArgIndex(1)]));
    b.push(
        Instr::new(Opcode::Add)
            .with_result(result)
            .with_args(vec![Operand::Reg(r0), Operand::Reg(r1)])
            .with_cc(Cc::O)
            .with_width(Width::W32),
    );
    b.push(Instr::new(Opcode::Cset).with_result(flag));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(result)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(1), Operand::Reg(flag)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let out = run(&func, &[0x7FFF_FFFF, 1]);
    assert_eq!(out[0], 0xFFFF_FFFF_8000_0000u64 as i64);
    assert_eq!(out[1], 1);
}

/// Scenario 3: 8-bit `SUB.C` of `0` minus `1` carries and zero-extends
/// the wrapped result to `0x00000000000000FF`.
#[test]
fn unsigned_carry_sub_sets_flags_and_zero_extends() {
    let mut b = FunctionBuilder::new("unsigned_carry");
    let r0 = b.alloc_reg();
    let r1 = b.alloc_reg();
    let result = b.alloc_reg();
    let flag = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Recv).with_result(r1).with_args(vec![Operand::ArgIndex(1)]));
    b.push(
        Instr::new(Opcode::Sub)
            .with_result(result)
            .with_args(vec![Operand::Reg(r0), Operand::Reg(r1)])
            .with_cc(Cc::C)
            .with_width(Width::W8),
    );
    b.push(Instr::new(Opcode::Cset).with_result(flag));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(result)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(1), Operand::Reg(flag)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let out = run(&func, &[0, 1]);
    assert_eq!(out[0], 0x0000_0000_0000_00FF);
    assert_eq!(out[1], 1);
}

/// Scenario 5: `CMP.LT r0, r1; JUMP.T -> B2; (fallthrough -> B3)`. Builds
/// the entry block first (id0), then the fallthrough block (id1, the
/// implicit false target) and the taken block (id2, the explicit true
/// target), each writing a distinguishing value into `args[0]`.
fn conditional_branch_fixture() -> CfgFunction {
    let mut b = FunctionBuilder::new("conditional_branch");
    let r0 = b.alloc_reg();
    let r1 = b.alloc_reg();

    let entry = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Recv).with_result(r1).with_args(vec![Operand::ArgIndex(1)]));
    b.push(
        Instr::new(Opcode::Cmp)
            .with_args(vec![Operand::Reg(r0), Operand::Reg(r1)])
            .with_cc(Cc::Lt),
    );
    b.push(Instr::new(Opcode::Jump).with_cc(Cc::T));
    b.successors(entry, vec![BlockId(1), BlockId(2)]);

    let fallthrough = b.block();
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::ConstInt(0)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(fallthrough, true);

    let taken = b.block();
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::ConstInt(1)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(taken, true);

    b.finish()
}

#[test]
fn conditional_branch_takes_the_true_target_when_compare_holds() {
    let func = conditional_branch_fixture();
    let out = run(&func, &[0, 1]); // 0 < 1
    assert_eq!(out[0], 1);
}

#[test]
fn conditional_branch_takes_the_false_target_when_compare_fails() {
    let func = conditional_branch_fixture();
    let out = run(&func, &[1, 0]); // !(1 < 0)
    assert_eq!(out[0], 0);
}

/// Scenario 6: a preloaded byte count in the result register plus
/// `MACRO_COPY dst, src` emits a `memmove` and never touches the count
/// register afterward. Copies 8 bytes between two stack slots carved out
/// of the function's own frame via `LEA`/`Frame` so the test needs no
/// runtime allocator.
#[test]
fn memmove_macro_copies_bytes_and_preserves_count_register() {
    let mut b = FunctionBuilder::new("memmove_macro");
    b.set_frame_size(16);
    let src_addr = b.alloc_reg();
    let dst_addr = b.alloc_reg();
    let payload = b.alloc_reg();
    let count = b.alloc_reg();
    let blk = b.block();

    b.push(Instr::new(Opcode::Recv).with_result(payload).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Lea).with_result(src_addr).with_args(vec![Operand::Frame(0)]));
    b.push(Instr::new(Opcode::Lea).with_result(dst_addr).with_args(vec![Operand::Frame(8)]));
    b.push(
        Instr::new(Opcode::Store)
            .with_args(vec![Operand::Reg(src_addr), Operand::Reg(payload)])
            .with_width(Width::W64),
    );
    b.push(Instr::new(Opcode::Mov).with_result(count).with_args(vec![Operand::ConstInt(8)]));
    b.push(
        Instr::new(Opcode::MacroCopy)
            .with_result(count)
            .with_args(vec![Operand::Reg(dst_addr), Operand::Reg(src_addr)]),
    );
    b.push(
        Instr::new(Opcode::Load)
            .with_result(payload)
            .with_args(vec![Operand::Reg(dst_addr)])
            .with_width(Width::W64),
    );
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(payload)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(1), Operand::Reg(count)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let out = run(&func, &[0x1122_3344_5566_7788u64 as i64, 0]);
    assert_eq!(out[0], 0x1122_3344_5566_7788u64 as i64, "bytes moved from src to dst");
    assert_eq!(out[1], 8, "MACRO_COPY must not clobber its own count register");
}
