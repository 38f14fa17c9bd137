//! Operand materialization and the coercions `lower::ops` needs between
//! i64 registers, narrower integers, doubles, and pointers.
//!
//! Every register holds an i64 in `out[r]`; this module is the only place
//! that ever widens, narrows, or reinterprets that value.

use inkwell::values::{FloatValue, IntValue, PointerValue};
use inkwell::FloatPredicate;

use crate::context::ModuleContext;
use crate::error::{Error, Result};
use crate::ir::{dump_instr_range, Instr, Operand, Width};

use super::driver::{BlockLowering, FuncCtx};

fn lowering_err(instrs: &[Instr], index: usize, reason: impl Into<String>) -> Error {
    Error::Lowering {
        index,
        reason: reason.into(),
        dump: dump_instr_range(instrs, index, 2),
    }
}

/// Materializes `operand` as an i64 value, per the value lowering contract.
pub fn get<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    func: FuncCtx<'ctx>,
    block: &BlockLowering<'ctx>,
    instrs: &[Instr],
    index: usize,
    operand: &Operand,
) -> Result<IntValue<'ctx>> {
    match operand {
        Operand::Reg(r) => block.out_regs[r.0 as usize]
            .ok_or_else(|| lowering_err(instrs, index, format!("register {r} read before definition"))),

        Operand::ConstInt(v) => Ok(ctx.types.i64_ty.const_int(*v as u64, true)),

        Operand::ConstDouble(v) => {
            let d = ctx.types.double_ty.const_float(*v);
            bitcast_double_to_i64(ctx, d)
        }

        Operand::Frame(off) => {
            let frame = func
                .frame
                .ok_or_else(|| lowering_err(instrs, index, "frame address used but frame_size is 0"))?;
            let addr = frame_address(ctx, frame, *off)?;
            ptr_to_i64(ctx, addr)
        }

        Operand::Cpool(off) => {
            let base = func
                .cpool_base
                .ok_or_else(|| lowering_err(instrs, index, "constant-pool address used but pool is empty"))?;
            let addr = byte_gep(ctx, base, *off)?;
            ptr_to_i64(ctx, addr)
        }

        Operand::RegOffset(r, off) => {
            let base = block.out_regs[r.0 as usize]
                .ok_or_else(|| lowering_err(instrs, index, format!("register {r} read before definition")))?;
            let disp = ctx.types.i64_ty.const_int(*off as u64, true);
            ctx.builder
                .build_int_add(base, disp, "regoff")
                .map_err(|e| Error::Builder(e.to_string()))
        }

        Operand::ExitTag(tag) => Ok(ctx.types.i32_ty.const_int(*tag as u64, true).const_cast(ctx.types.i64_ty, true)),

        Operand::ArgIndex(n) => Ok(ctx.types.i64_ty.const_int(u64::from(*n), false)),

        Operand::Abs(addr) => {
            if *addr != 0 {
                return Err(lowering_err(
                    instrs,
                    index,
                    "absolute address with non-zero offset must be indirected via Func/Foreign",
                ));
            }
            Ok(ctx.types.i64_ty.const_int(0, false))
        }

        Operand::Func(name) => Err(lowering_err(
            instrs,
            index,
            format!("function reference '{name}' must be resolved by the caller, not value::get"),
        )),

        Operand::Foreign(sym, _) => Err(lowering_err(
            instrs,
            index,
            format!("foreign reference '{sym}' must be resolved by the caller, not value::get"),
        )),

        Operand::Slot(slot) => Ok(ctx.types.i32_ty.const_int(*slot as u64, true).const_cast(ctx.types.i64_ty, true)),

        Operand::DebugLoc { .. } => Err(lowering_err(instrs, index, "DEBUG operand carries no runtime value")),
    }
}

fn frame_address<'ctx>(
    ctx: &ModuleContext<'ctx>,
    frame: PointerValue<'ctx>,
    offset: i32,
) -> Result<PointerValue<'ctx>> {
    byte_gep(ctx, frame, offset)
}

fn byte_gep<'ctx>(ctx: &ModuleContext<'ctx>, base: PointerValue<'ctx>, offset: i32) -> Result<PointerValue<'ctx>> {
    let idx = ctx.types.i32_ty.const_int(offset as u64, true);
    unsafe {
        ctx.builder
            .build_gep(ctx.types.i8_ty, base, &[idx], "byte_gep")
            .map_err(|e| Error::Builder(e.to_string()))
    }
}

pub fn ptr_to_i64<'ctx>(ctx: &ModuleContext<'ctx>, ptr: PointerValue<'ctx>) -> Result<IntValue<'ctx>> {
    ctx.builder
        .build_ptr_to_int(ptr, ctx.types.i64_ty, "ptr_as_i64")
        .map_err(|e| Error::Builder(e.to_string()))
}

pub fn i64_to_ptr<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>) -> Result<PointerValue<'ctx>> {
    ctx.builder
        .build_int_to_ptr(v, ctx.types.ptr_ty, "i64_as_ptr")
        .map_err(|e| Error::Builder(e.to_string()))
}

pub fn bitcast_double_to_i64<'ctx>(ctx: &ModuleContext<'ctx>, v: FloatValue<'ctx>) -> Result<IntValue<'ctx>> {
    ctx.builder
        .build_bit_cast(v, ctx.types.i64_ty, "double_bits")
        .map(|v| v.into_int_value())
        .map_err(|e| Error::Builder(e.to_string()))
}

pub fn bitcast_i64_to_double<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>) -> Result<FloatValue<'ctx>> {
    ctx.builder
        .build_bit_cast(v, ctx.types.double_ty, "int_bits")
        .map(|v| v.into_float_value())
        .map_err(|e| Error::Builder(e.to_string()))
}

/// Truncates an i64 register value down to `width` bits, for `STORE` and
/// for feeding sized arithmetic.
pub fn truncate_to_width<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>, width: Width) -> Result<IntValue<'ctx>> {
    let target = ctx.types.int_ty(width);
    if width == Width::W64 {
        return Ok(v);
    }
    ctx.builder
        .build_int_truncate(v, target, "narrow")
        .map_err(|e| Error::Builder(e.to_string()))
}

/// Widens a possibly-narrower integer result up to i64 via sign-extend;
/// a no-op if it's already 64 bits.
pub fn sext_result<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>) -> Result<IntValue<'ctx>> {
    if v.get_type().get_bit_width() == 64 {
        return Ok(v);
    }
    ctx.builder
        .build_int_s_extend(v, ctx.types.i64_ty, "sext")
        .map_err(|e| Error::Builder(e.to_string()))
}

/// Widens a possibly-narrower integer result up to i64 via zero-extend.
pub fn zext_result<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>) -> Result<IntValue<'ctx>> {
    if v.get_type().get_bit_width() == 64 {
        return Ok(v);
    }
    ctx.builder
        .build_int_z_extend(v, ctx.types.i64_ty, "zext")
        .map_err(|e| Error::Builder(e.to_string()))
}

/// `value != 0`, for feeding an i64/narrower integer into a branch or
/// logical op as i1.
pub fn to_bool<'ctx>(ctx: &ModuleContext<'ctx>, v: IntValue<'ctx>) -> Result<IntValue<'ctx>> {
    let zero = v.get_type().const_zero();
    ctx.builder
        .build_int_compare(inkwell::IntPredicate::NE, v, zero, "to_bool")
        .map_err(|e| Error::Builder(e.to_string()))
}

/// Unordered floating-point predicate matching the `Cc` compare code, per
/// the preserved-verbatim `FCMP` semantics.
#[must_use]
pub fn unordered_predicate(cc: crate::ir::Cc) -> FloatPredicate {
    use crate::ir::Cc;
    match cc {
        Cc::Eq => FloatPredicate::UEQ,
        Cc::Ne => FloatPredicate::UNE,
        Cc::Gt => FloatPredicate::UGT,
        Cc::Lt => FloatPredicate::ULT,
        Cc::Le => FloatPredicate::ULE,
        Cc::Ge => FloatPredicate::UGE,
        _ => FloatPredicate::UNE,
    }
}

#[must_use]
pub fn signed_predicate(cc: crate::ir::Cc) -> inkwell::IntPredicate {
    use crate::ir::Cc;
    use inkwell::IntPredicate;
    match cc {
        Cc::Eq => IntPredicate::EQ,
        Cc::Ne => IntPredicate::NE,
        Cc::Gt => IntPredicate::SGT,
        Cc::Lt => IntPredicate::SLT,
        Cc::Le => IntPredicate::SLE,
        Cc::Ge => IntPredicate::SGE,
        _ => IntPredicate::EQ,
    }
}
