//! Per-opcode lowering: one routine per IR opcode, dispatched from a single
//! match in [`lower_instr`]. Handlers share the same narrow set of
//! borrows — the module context, the resolved call-target mode, the
//! function's copyable state, and the current block's mutable in/out
//! arrays.

use crate::abi::{ANCHOR_FIELD_IR_POSITION, JIT_MAX_ARGS};
use crate::context::ModuleContext;
use crate::error::{Error, Result};
use crate::ir::{dump_instr_range, Block, Cc, Instr, Opcode, Operand, Width};
use crate::intrinsics::RuntimeFn;

use super::driver::{BlockLowering, FuncCtx};
use super::mode::{CallTarget, Mode};
use super::value;

fn err(instrs: &[Instr], index: usize, reason: impl Into<String>) -> Error {
    Error::Lowering {
        index,
        reason: reason.into(),
        dump: dump_instr_range(instrs, index, 2),
    }
}

fn arg<'a>(instr: &'a Instr, n: usize, instrs: &[Instr], index: usize) -> Result<&'a Operand> {
    instr
        .args
        .get(n)
        .ok_or_else(|| err(instrs, index, format!("missing operand {n}")))
}

fn result_reg(instr: &Instr, instrs: &[Instr], index: usize) -> Result<usize> {
    instr
        .result
        .map(|r| r.0 as usize)
        .ok_or_else(|| err(instrs, index, "opcode requires a result register"))
}

fn arg_index(op: &Operand, instrs: &[Instr], index: usize) -> Result<u32> {
    match op {
        Operand::ArgIndex(n) => Ok(*n),
        other => Err(err(instrs, index, format!("expected an args[] index, got {other:?}"))),
    }
}

#[allow(clippy::too_many_arguments)]
fn get<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    fctx: FuncCtx<'ctx>,
    blocks: &[BlockLowering<'ctx>],
    block_idx: usize,
    instrs: &[Instr],
    index: usize,
    op: &Operand,
) -> Result<inkwell::values::IntValue<'ctx>> {
    value::get(ctx, fctx, &blocks[block_idx], instrs, index, op)
}

fn set_result<'ctx>(blocks: &mut [BlockLowering<'ctx>], block_idx: usize, reg: usize, v: inkwell::values::IntValue<'ctx>) {
    blocks[block_idx].out_regs[reg] = Some(v);
}

fn set_flags<'ctx>(blocks: &mut [BlockLowering<'ctx>], block_idx: usize, v: inkwell::values::IntValue<'ctx>) {
    blocks[block_idx].out_flags = Some(v);
}

fn current_flags<'ctx>(
    blocks: &[BlockLowering<'ctx>],
    block_idx: usize,
    instrs: &[Instr],
    index: usize,
) -> Result<inkwell::values::IntValue<'ctx>> {
    blocks[block_idx]
        .out_flags
        .ok_or_else(|| err(instrs, index, "flags read before any CMP/FCMP/arithmetic set them"))
}

fn store_ir_position<'ctx>(ctx: &ModuleContext<'ctx>, fctx: FuncCtx<'ctx>, index: usize) -> Result<()> {
    let gep = ctx
        .builder
        .build_struct_gep(ctx.types.anchor_ty, fctx.anchor, ANCHOR_FIELD_IR_POSITION, "anchor.ir_position")
        .map_err(|e| Error::Builder(e.to_string()))?;
    ctx.builder
        .build_store(gep, ctx.types.i32_ty.const_int(index as u64, false))
        .map_err(|e| Error::Builder(e.to_string()))?;
    Ok(())
}

fn args_slot_ptr<'ctx>(
    ctx: &ModuleContext<'ctx>,
    fctx: FuncCtx<'ctx>,
    n: u32,
    instrs: &[Instr],
    index: usize,
) -> Result<inkwell::values::PointerValue<'ctx>> {
    if n as usize >= JIT_MAX_ARGS {
        return Err(err(instrs, index, format!("args index {n} is out of bounds (max {JIT_MAX_ARGS})")));
    }
    let idx = ctx.types.i64_ty.const_int(u64::from(n), false);
    unsafe {
        ctx.builder
            .build_gep(ctx.types.i64_ty, fctx.args_ptr, &[idx], "arg_slot")
            .map_err(|e| Error::Builder(e.to_string()))
    }
}

/// Lowers a single instruction, mutating `blocks[block_idx]`'s in/out
/// arrays and emitting IR at the builder's current insertion point (which
/// the caller has already positioned at the end of `blocks[block_idx].bb`).
#[allow(clippy::too_many_arguments)]
pub fn lower_instr<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    mode: &mut dyn Mode<'ctx>,
    fctx: FuncCtx<'ctx>,
    blocks: &mut Vec<BlockLowering<'ctx>>,
    block_idx: usize,
    block: &Block,
    instrs: &[Instr],
    index: usize,
    instr: &Instr,
) -> Result<()> {
    match instr.op {
        Opcode::Recv => {
            let n = arg_index(arg(instr, 0, instrs, index)?, instrs, index)?;
            let slot = args_slot_ptr(ctx, fctx, n, instrs, index)?;
            let loaded = ctx
                .builder
                .build_load(ctx.types.i64_ty, slot, "recv")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_int_value();
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, loaded);
            Ok(())
        }

        Opcode::Send => {
            let n = arg_index(arg(instr, 0, instrs, index)?, instrs, index)?;
            let v = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let slot = args_slot_ptr(ctx, fctx, n, instrs, index)?;
            ctx.builder.build_store(slot, v).map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::Store => {
            let addr = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let value = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let ptr = value::i64_to_ptr(ctx, addr)?;
            let narrowed = value::truncate_to_width(ctx, value, instr.width)?;
            ctx.builder.build_store(ptr, narrowed).map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::Load | Opcode::ULoad => {
            let signed = instr.op == Opcode::Load;
            let addr = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let ptr = value::i64_to_ptr(ctx, addr)?;
            let narrow_ty = ctx.types.int_ty(instr.width);
            let loaded = ctx
                .builder
                .build_load(narrow_ty, ptr, "loaded")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_int_value();
            let widened = if signed {
                value::sext_result(ctx, loaded)?
            } else {
                value::zext_result(ctx, loaded)?
            };
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Add | Opcode::Sub | Opcode::Mul => lower_arith(ctx, fctx, blocks, block_idx, instrs, index, instr),

        Opcode::Div | Opcode::Rem => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let a_n = value::truncate_to_width(ctx, a, instr.width)?;
            let b_n = value::truncate_to_width(ctx, b, instr.width)?;
            let r = if instr.op == Opcode::Div {
                ctx.builder.build_int_signed_div(a_n, b_n, "sdiv")
            } else {
                ctx.builder.build_int_signed_rem(a_n, b_n, "srem")
            }
            .map_err(|e| Error::Builder(e.to_string()))?;
            let widened = value::sext_result(ctx, r)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let fa = value::bitcast_i64_to_double(ctx, a)?;
            let fb = value::bitcast_i64_to_double(ctx, b)?;
            let r = match instr.op {
                Opcode::Fadd => ctx.builder.build_float_add(fa, fb, "fadd"),
                Opcode::Fsub => ctx.builder.build_float_sub(fa, fb, "fsub"),
                Opcode::Fmul => ctx.builder.build_float_mul(fa, fb, "fmul"),
                Opcode::Fdiv => ctx.builder.build_float_div(fa, fb, "fdiv"),
                _ => unreachable!(),
            }
            .map_err(|e| Error::Builder(e.to_string()))?;
            let bits = value::bitcast_double_to_i64(ctx, r)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, bits);
            Ok(())
        }

        Opcode::Fneg => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let fa = value::bitcast_i64_to_double(ctx, a)?;
            let r = ctx.builder.build_float_neg(fa, "fneg").map_err(|e| Error::Builder(e.to_string()))?;
            let bits = value::bitcast_double_to_i64(ctx, r)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, bits);
            Ok(())
        }

        Opcode::Fcvtns => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let fa = value::bitcast_i64_to_double(ctx, a)?;
            let round = ctx.f64_intrinsic("round")?;
            let rounded = ctx
                .builder
                .build_call(round, &[fa.into()], "rounded")
                .map_err(|e| Error::Builder(e.to_string()))?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Error::Internal("llvm.round.f64 returned no value".to_string()))?
                .into_float_value();
            let as_int = ctx
                .builder
                .build_float_to_signed_int(rounded, ctx.types.i64_ty, "fcvtns")
                .map_err(|e| Error::Builder(e.to_string()))?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, as_int);
            Ok(())
        }

        Opcode::Scvtf => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let as_double = ctx
                .builder
                .build_signed_int_to_float(a, ctx.types.double_ty, "scvtf")
                .map_err(|e| Error::Builder(e.to_string()))?;
            let bits = value::bitcast_double_to_i64(ctx, as_double)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, bits);
            Ok(())
        }

        Opcode::Not => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let bit = value::to_bool(ctx, a)?;
            let negated = ctx.builder.build_not(bit, "lnot").map_err(|e| Error::Builder(e.to_string()))?;
            let widened = value::zext_result(ctx, negated)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::And | Opcode::Or | Opcode::Xor => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let ba = value::to_bool(ctx, a)?;
            let bb = value::to_bool(ctx, b)?;
            let r = match instr.op {
                Opcode::And => ctx.builder.build_and(ba, bb, "land"),
                Opcode::Or => ctx.builder.build_or(ba, bb, "lor"),
                Opcode::Xor => ctx.builder.build_xor(ba, bb, "lxor"),
                _ => unreachable!(),
            }
            .map_err(|e| Error::Builder(e.to_string()))?;
            let widened = value::zext_result(ctx, r)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Cmp => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let a_n = value::truncate_to_width(ctx, a, instr.width)?;
            let b_n = value::truncate_to_width(ctx, b, instr.width)?;
            let pred = value::signed_predicate(instr.cc);
            let flags = ctx
                .builder
                .build_int_compare(pred, a_n, b_n, "cmp")
                .map_err(|e| Error::Builder(e.to_string()))?;
            set_flags(blocks, block_idx, flags);
            Ok(())
        }

        Opcode::Fcmp => {
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let fa = value::bitcast_i64_to_double(ctx, a)?;
            let fb = value::bitcast_i64_to_double(ctx, b)?;
            let pred = value::unordered_predicate(instr.cc);
            let flags = ctx
                .builder
                .build_float_compare(pred, fa, fb, "fcmp")
                .map_err(|e| Error::Builder(e.to_string()))?;
            set_flags(blocks, block_idx, flags);
            Ok(())
        }

        Opcode::Cset => {
            let flags = current_flags(blocks, block_idx, instrs, index)?;
            let widened = value::zext_result(ctx, flags)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Csel => {
            let flags = current_flags(blocks, block_idx, instrs, index)?;
            let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let selected = ctx
                .builder
                .build_select(flags, a, b, "csel")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_int_value();
            let widened = value::sext_result(ctx, selected)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Jump => lower_jump(ctx, blocks, block_idx, block, instrs, index, instr),

        Opcode::Call => lower_call(ctx, mode, fctx, instrs, index, instr),

        Opcode::Lea => {
            let v = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let widened = value::zext_result(ctx, v)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Mov => {
            let v = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let widened = value::sext_result(ctx, v)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, widened);
            Ok(())
        }

        Opcode::Neg => {
            let v = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let r = ctx.builder.build_int_neg(v, "neg").map_err(|e| Error::Builder(e.to_string()))?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, r);
            Ok(())
        }

        Opcode::Ret => {
            ctx.builder.build_return(None).map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::Debug => Ok(()),

        Opcode::MacroExp | Opcode::MacroFexp => {
            let base = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let exponent = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let pow = ctx.f64_intrinsic("pow")?;
            let (fbase, fexp) = if instr.op == Opcode::MacroFexp {
                (value::bitcast_i64_to_double(ctx, base)?, value::bitcast_i64_to_double(ctx, exponent)?)
            } else {
                let fb = ctx
                    .builder
                    .build_unsigned_int_to_float(base, ctx.types.double_ty, "exp_base")
                    .map_err(|e| Error::Builder(e.to_string()))?;
                let fe = ctx
                    .builder
                    .build_unsigned_int_to_float(exponent, ctx.types.double_ty, "exp_exponent")
                    .map_err(|e| Error::Builder(e.to_string()))?;
                (fb, fe)
            };
            let result = ctx
                .builder
                .build_call(pow, &[fbase.into(), fexp.into()], "pow")
                .map_err(|e| Error::Builder(e.to_string()))?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Error::Internal("llvm.pow.f64 returned no value".to_string()))?
                .into_float_value();
            let final_value = if instr.op == Opcode::MacroFexp {
                value::bitcast_double_to_i64(ctx, result)?
            } else {
                ctx.builder
                    .build_float_to_unsigned_int(result, ctx.types.i64_ty, "exp_result")
                    .map_err(|e| Error::Builder(e.to_string()))?
            };
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, final_value);
            Ok(())
        }

        Opcode::MacroCopy => {
            let dst = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let src = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let count = blocks[block_idx].out_regs[result_reg(instr, instrs, index)?]
                .ok_or_else(|| err(instrs, index, "MACRO_COPY's byte count register was never defined"))?;
            let dst_ptr = value::i64_to_ptr(ctx, dst)?;
            let src_ptr = value::i64_to_ptr(ctx, src)?;
            let memmove = ctx.memmove_intrinsic()?;
            let is_volatile = ctx.types.i1_ty.const_int(0, false);
            ctx.builder
                .build_call(
                    memmove,
                    &[dst_ptr.into(), src_ptr.into(), count.into(), is_volatile.into()],
                    "memmove",
                )
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::MacroBzero => {
            let dst = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let count = blocks[block_idx].out_regs[result_reg(instr, instrs, index)?]
                .ok_or_else(|| err(instrs, index, "MACRO_BZERO's byte count register was never defined"))?;
            let dst_ptr = value::i64_to_ptr(ctx, dst)?;
            let memset = ctx.memset_intrinsic()?;
            let zero_byte = ctx.types.i8_ty.const_int(0, false);
            let is_volatile = ctx.types.i1_ty.const_int(0, false);
            ctx.builder
                .build_call(memset, &[dst_ptr.into(), zero_byte.into(), count.into(), is_volatile.into()], "memset")
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::MacroExit => {
            store_ir_position(ctx, fctx, index)?;
            let tag = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let tag32 = value::truncate_to_width(ctx, tag, Width::W32)?;
            let do_exit = ctx.runtime_fn(RuntimeFn::DoExit);
            ctx.builder
                .build_call(do_exit, &[tag32.into(), fctx.anchor.into(), fctx.args_ptr.into()], "do_exit")
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::MacroFficall => {
            store_ir_position(ctx, fctx, index)?;
            let (sym, spec) = match arg(instr, 0, instrs, index)? {
                Operand::Foreign(sym, spec) => (sym.clone(), *spec),
                other => return Err(err(instrs, index, format!("MACRO_FFICALL expects a Foreign operand, got {other:?}"))),
            };
            let ptr = mode.foreign_pointer(ctx, &sym, spec)?;
            let do_fficall = ctx.runtime_fn(RuntimeFn::DoFficall);
            ctx.builder
                .build_call(do_fficall, &[ptr.into(), fctx.anchor.into(), fctx.args_ptr.into()], "do_fficall")
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }

        Opcode::MacroGalloc => {
            store_ir_position(ctx, fctx, index)?;
            let size = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let size32 = value::truncate_to_width(ctx, size, Width::W32)?;
            let nelems = ctx.types.i32_ty.const_int(1, false);
            let galloc = ctx.runtime_fn(RuntimeFn::MspaceAlloc);
            let ptr = ctx
                .builder
                .build_call(galloc, &[size32.into(), nelems.into()], "galloc")
                .map_err(|e| Error::Builder(e.to_string()))?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Error::Internal("__nvc_mspace_alloc returned no value".to_string()))?
                .into_pointer_value();
            let as_int = value::ptr_to_i64(ctx, ptr)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, as_int);
            Ok(())
        }

        Opcode::MacroGetpriv => {
            let slot = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let slot32 = value::truncate_to_width(ctx, slot, Width::W32)?;
            let getpriv = ctx.runtime_fn(RuntimeFn::Getpriv);
            let ptr = ctx
                .builder
                .build_call(getpriv, &[slot32.into()], "getpriv")
                .map_err(|e| Error::Builder(e.to_string()))?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Error::Internal("__nvc_getpriv returned no value".to_string()))?
                .into_pointer_value();
            let as_int = value::ptr_to_i64(ctx, ptr)?;
            set_result(blocks, block_idx, result_reg(instr, instrs, index)?, as_int);
            Ok(())
        }

        Opcode::MacroPutpriv => {
            let slot = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
            let val = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
            let slot32 = value::truncate_to_width(ctx, slot, Width::W32)?;
            let ptr = value::i64_to_ptr(ctx, val)?;
            let putpriv = ctx.runtime_fn(RuntimeFn::Putpriv);
            ctx.builder
                .build_call(putpriv, &[slot32.into(), ptr.into()], "putpriv")
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }
    }
}

/// `ADD`/`SUB`/`MUL`: plain arithmetic under `CC_NONE`, or the matching
/// overflow-checked intrinsic under `CC_O` (signed)/`CC_C` (unsigned),
/// which also sets `flags` to the intrinsic's overflow bit.
#[allow(clippy::too_many_arguments)]
fn lower_arith<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    fctx: FuncCtx<'ctx>,
    blocks: &mut Vec<BlockLowering<'ctx>>,
    block_idx: usize,
    instrs: &[Instr],
    index: usize,
    instr: &Instr,
) -> Result<()> {
    let a = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 0, instrs, index)?)?;
    let b = get(ctx, fctx, blocks, block_idx, instrs, index, arg(instr, 1, instrs, index)?)?;
    let a_n = value::truncate_to_width(ctx, a, instr.width)?;
    let b_n = value::truncate_to_width(ctx, b, instr.width)?;
    let result_reg_idx = result_reg(instr, instrs, index)?;
    let name = match instr.op {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        _ => unreachable!(),
    };

    match instr.cc {
        Cc::None => {
            let r = match instr.op {
                Opcode::Add => ctx.builder.build_int_add(a_n, b_n, "add"),
                Opcode::Sub => ctx.builder.build_int_sub(a_n, b_n, "sub"),
                Opcode::Mul => ctx.builder.build_int_mul(a_n, b_n, "mul"),
                _ => unreachable!(),
            }
            .map_err(|e| Error::Builder(e.to_string()))?;
            let widened = value::sext_result(ctx, r)?;
            set_result(blocks, block_idx, result_reg_idx, widened);
            Ok(())
        }
        Cc::O | Cc::C => {
            let signed = instr.cc == Cc::O;
            let prefix = if signed { "s" } else { "u" };
            let intrinsic = ctx.overflow_intrinsic(&format!("{prefix}{name}"), instr.width)?;
            let call = ctx
                .builder
                .build_call(intrinsic, &[a_n.into(), b_n.into()], "checked")
                .map_err(|e| Error::Builder(e.to_string()))?;
            let pair = call
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Error::Internal("overflow intrinsic returned no value".to_string()))?
                .into_struct_value();
            let sum = ctx
                .builder
                .build_extract_value(pair, 0, "result")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_int_value();
            let overflow = ctx
                .builder
                .build_extract_value(pair, 1, "overflow")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_int_value();
            let widened = if signed {
                value::sext_result(ctx, sum)?
            } else {
                value::zext_result(ctx, sum)?
            };
            set_result(blocks, block_idx, result_reg_idx, widened);
            set_flags(blocks, block_idx, overflow);
            Ok(())
        }
        other => Err(err(instrs, index, format!("invalid condition code {other:?} for arithmetic"))),
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_jump<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    blocks: &mut Vec<BlockLowering<'ctx>>,
    block_idx: usize,
    block: &Block,
    instrs: &[Instr],
    index: usize,
    instr: &Instr,
) -> Result<()> {
    match instr.cc {
        Cc::None => {
            let target = block
                .successors
                .first()
                .ok_or_else(|| err(instrs, index, "unconditional JUMP has no successor"))?;
            let target_bb = blocks[target.0 as usize].bb;
            ctx.builder.build_unconditional_branch(target_bb).map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }
        Cc::T | Cc::F => {
            let true_target = block
                .successors
                .get(1)
                .ok_or_else(|| err(instrs, index, "conditional JUMP needs two successors"))?;
            let false_target_id = block.id.0 + 1;
            let true_bb = blocks[true_target.0 as usize].bb;
            let false_bb = blocks
                .get(false_target_id as usize)
                .ok_or_else(|| err(instrs, index, "conditional JUMP has no fallthrough block"))?
                .bb;
            let flags = current_flags(blocks, block_idx, instrs, index)?;
            let cond = if instr.cc == Cc::T {
                flags
            } else {
                ctx.builder.build_not(flags, "jump_f_cond").map_err(|e| Error::Builder(e.to_string()))?
            };
            ctx.builder
                .build_conditional_branch(cond, true_bb, false_bb)
                .map_err(|e| Error::Builder(e.to_string()))?;
            Ok(())
        }
        other => Err(err(instrs, index, format!("invalid condition code {other:?} for JUMP"))),
    }
}

fn lower_call<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    mode: &mut dyn Mode<'ctx>,
    fctx: FuncCtx<'ctx>,
    instrs: &[Instr],
    index: usize,
    instr: &Instr,
) -> Result<()> {
    let name = match arg(instr, 0, instrs, index)? {
        Operand::Func(name) => name.clone(),
        other => return Err(err(instrs, index, format!("CALL expects a Func operand, got {other:?}"))),
    };
    store_ir_position(ctx, fctx, index)?;

    match mode.call_target(ctx, &name)? {
        CallTarget::Direct { func_handle, entry } => {
            ctx.builder
                .build_indirect_call(
                    ctx.types.entry_fn_ty,
                    entry,
                    &[func_handle.into(), fctx.anchor.into(), fctx.args_ptr.into()],
                    "call",
                )
                .map_err(|e| Error::Builder(e.to_string()))?;
        }
        CallTarget::Trampoline { func_global, trampoline_fn } => {
            let func_handle = ctx
                .builder
                .build_load(ctx.types.ptr_ty, func_global, "func_handle")
                .map_err(|e| Error::Builder(e.to_string()))?
                .into_pointer_value();
            ctx.builder
                .build_call(
                    trampoline_fn,
                    &[func_handle.into(), fctx.anchor.into(), fctx.args_ptr.into()],
                    "call",
                )
                .map_err(|e| Error::Builder(e.to_string()))?;
        }
    }
    Ok(())
}
