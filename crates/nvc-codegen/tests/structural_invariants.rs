//! Structural and boundary-behavior checks that don't need to execute
//! generated code: they lower a fixture directly against a fresh
//! [`ModuleContext`] and inspect the resulting LLVM IR text or the
//! lowering result.

use inkwell::context::Context;
use inkwell::targets::{InitializationConfig, Target};

use nvc_codegen::abi::JIT_MAX_ARGS;
use nvc_codegen::context::ModuleContext;
use nvc_codegen::ir::{Cc, FunctionBuilder, Instr, Opcode, Operand, Width};
use nvc_codegen::lower::{lower_function, AotMode, JitMode, ResolvedFunction};
use nvc_codegen::Error;

fn init_target() {
    Target::initialize_native(&InitializationConfig::default()).expect("native target init");
}

/// Block with `aborts` set and no terminator lowers to `unreachable`.
#[test]
fn aborting_block_without_terminator_emits_unreachable() {
    init_target();
    let mut b = FunctionBuilder::new("aborts");
    let blk = b.block();
    b.push(Instr::new(Opcode::Debug).with_args(vec![Operand::DebugLoc { file: None, line: 1 }]));
    b.set_aborts(blk, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_aborts").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");

    let text = ctx.module.print_to_string().to_string();
    assert!(text.contains("unreachable"), "aborting block must end in unreachable:\n{text}");
}

/// A block with no explicit terminator that falls through to the next
/// block lowers to an unconditional branch to it.
#[test]
fn falling_through_block_branches_to_the_next_block() {
    init_target();
    let mut b = FunctionBuilder::new("fallthrough");
    let r0 = b.alloc_reg();
    let first = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.successors(first, vec![nvc_codegen::ir::BlockId(1)]);
    let second = b.block();
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(r0)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(second, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_fallthrough").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");

    let text = ctx.module.print_to_string().to_string();
    assert!(text.contains("br label %bb1"), "block 0 must fall through into bb1:\n{text}");
}

/// `frame_size == 0` means no frame allocation is emitted at all.
#[test]
fn zero_frame_size_emits_no_frame_allocation() {
    init_target();
    let mut b = FunctionBuilder::new("no_frame");
    let blk = b.block();
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_no_frame").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");

    let text = ctx.module.print_to_string().to_string();
    assert!(!text.contains("\"frame\""), "frame_size 0 must not allocate a frame:\n{text}");
}

/// A non-zero frame size does allocate a stack frame.
#[test]
fn nonzero_frame_size_emits_a_frame_allocation() {
    init_target();
    let mut b = FunctionBuilder::new("with_frame");
    b.set_frame_size(32);
    let blk = b.block();
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_with_frame").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");

    let text = ctx.module.print_to_string().to_string();
    assert!(text.contains("alloca [32 x i8]"), "frame_size 32 must allocate a frame:\n{text}");
}

/// `RECV`/`SEND` at `JIT_MAX_ARGS - 1` succeeds; at `JIT_MAX_ARGS` fails.
#[test]
fn args_index_boundary_is_exclusive() {
    init_target();

    let ok_func = {
        let mut b = FunctionBuilder::new("args_ok");
        let r0 = b.alloc_reg();
        let blk = b.block();
        b.push(
            Instr::new(Opcode::Recv)
                .with_result(r0)
                .with_args(vec![Operand::ArgIndex((JIT_MAX_ARGS - 1) as u32)]),
        );
        b.push(Instr::new(Opcode::Ret));
        b.set_returns(blk, true);
        b.finish()
    };
    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_args_ok").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &ok_func).expect("index JIT_MAX_ARGS - 1 must succeed");

    let bad_func = {
        let mut b = FunctionBuilder::new("args_bad");
        let r0 = b.alloc_reg();
        let blk = b.block();
        b.push(
            Instr::new(Opcode::Recv)
                .with_result(r0)
                .with_args(vec![Operand::ArgIndex(JIT_MAX_ARGS as u32)]),
        );
        b.push(Instr::new(Opcode::Ret));
        b.set_returns(blk, true);
        b.finish()
    };
    let context2 = Context::create();
    let mut ctx2 = ModuleContext::create(&context2, "test_args_bad").expect("module context");
    let mut mode2 = JitMode::new();
    let err = lower_function(&mut ctx2, &mut mode2, &bad_func).expect_err("index JIT_MAX_ARGS must fail");
    assert!(matches!(err, Error::Lowering { .. }));
}

/// `MACRO_EXIT`'s `ir_position` write precedes the runtime call it guards,
/// in the same basic block.
#[test]
fn macro_exit_writes_ir_position_before_the_runtime_call() {
    init_target();
    let mut b = FunctionBuilder::new("macro_exit");
    let blk = b.block();
    b.push(Instr::new(Opcode::MacroExit).with_args(vec![Operand::ExitTag(7)]));
    b.set_aborts(blk, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_macro_exit").expect("module context");
    let mut mode = JitMode::new();
    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");

    let text = ctx.module.print_to_string().to_string();
    let store_pos = text.find("anchor.ir_position").expect("ir_position must be written");
    let call_pos = text.find("@__nvc_do_exit").expect("do_exit must be called");
    assert!(store_pos < call_pos, "ir_position must be stored before the do_exit call:\n{text}");
}

/// Scenario 4: a `CALL` to `foo` under AOT assembly materializes a private
/// `foo.func` global, resolves it in the shared constructor via
/// `__nvc_get_func`, and dispatches the call site through
/// `__nvc_trampoline` rather than calling `foo` directly.
#[test]
fn aot_call_resolves_through_a_func_global_and_the_trampoline() {
    init_target();
    let mut b = FunctionBuilder::new("caller");
    let args = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(args).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Call).with_args(vec![Operand::Func("foo".to_string()), Operand::Reg(args)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    let func = b.finish();

    let context = Context::create();
    let mut ctx = ModuleContext::create(&context, "test_aot_call").expect("module context");
    let ctor_fn = ctx
        .module
        .add_function("nvc.module_ctor", ctx.types.ctor_fn_ty, Some(inkwell::module::Linkage::Private));
    let ctor_bb = context.append_basic_block(ctor_fn, "entry");
    let ctor_builder = context.create_builder();
    ctor_builder.position_at_end(ctor_bb);
    let mut mode = AotMode::new(ctor_builder);

    lower_function(&mut ctx, &mut mode, &func).expect("lower_function");
    mode.ctor_builder().build_return(None).expect("ctor ret");

    let text = ctx.module.print_to_string().to_string();
    assert!(text.contains("@\"foo.func\""), "a private foo.func global must exist:\n{text}");
    assert!(text.contains("@__nvc_get_func"), "constructor must call __nvc_get_func:\n{text}");
    assert!(text.contains("@__nvc_trampoline"), "call site must dispatch via __nvc_trampoline:\n{text}");
    assert!(
        !text.contains("call void @foo("),
        "call site must never call foo directly in AOT mode:\n{text}"
    );
}

struct UnusedResolver;
impl nvc_codegen::jit::SymbolResolver for UnusedResolver {
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
