//! The per-function lowering driver: block/frame/anchor setup, phi
//! placement, instruction dispatch, and the final phi-stitching pass.

use inkwell::basic_block::BasicBlock;
use inkwell::module::Linkage;
use inkwell::values::{FunctionValue, IntValue, PhiValue, PointerValue};

use crate::abi::{ANCHOR_FIELD_CALLER, ANCHOR_FIELD_FUNCTION, ANCHOR_FIELD_IR_POSITION, FRAME_ALIGN};
use crate::context::ModuleContext;
use crate::debuginfo;
use crate::error::{Error, Result};
use crate::ir::{BlockId, CfgFunction};

use super::liveness;
use super::mode::Mode;
use super::ops;

/// Per-block lowering record: the backend block plus the in/out value
/// arrays for the flag register and every live virtual register.
pub struct BlockLowering<'ctx> {
    pub bb: BasicBlock<'ctx>,
    pub in_flags: PhiValue<'ctx>,
    pub out_flags: Option<IntValue<'ctx>>,
    pub in_regs: Vec<Option<PhiValue<'ctx>>>,
    pub out_regs: Vec<Option<IntValue<'ctx>>>,
}

/// The Copy-able subset of per-function state every opcode handler reads:
/// passed by value so block lowering (which needs its own mutable
/// borrows) never fights the borrow checker over the rest of the
/// function's state.
#[derive(Clone, Copy)]
pub struct FuncCtx<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub anchor: PointerValue<'ctx>,
    pub args_ptr: PointerValue<'ctx>,
    pub frame: Option<PointerValue<'ctx>>,
    pub cpool_base: Option<PointerValue<'ctx>>,
}

/// Builds the backend function implementing `func`'s semantics. The
/// caller is responsible for module-level verification and optimization
/// once every function destined for the module has been lowered.
#[tracing::instrument(skip(ctx, mode, func), fields(function = %func.name))]
pub fn lower_function<'ctx>(
    ctx: &mut ModuleContext<'ctx>,
    mode: &mut dyn Mode<'ctx>,
    func: &CfgFunction,
) -> Result<FunctionValue<'ctx>> {
    let function = ctx
        .module
        .add_function(&func.name, ctx.types.entry_fn_ty, Some(Linkage::External));
    let param_func = function.get_nth_param(0).unwrap().into_pointer_value();
    let param_caller = function.get_nth_param(1).unwrap().into_pointer_value();
    let param_args = function.get_nth_param(2).unwrap().into_pointer_value();
    param_func.set_name("func");
    param_caller.set_name("caller_anchor");
    param_args.set_name("args");

    let entry_bb = ctx.context.append_basic_block(function, "entry");
    ctx.builder.position_at_end(entry_bb);

    let debug_bytes = debuginfo::encode(func);
    let debug_bytes_ptr = ctx.intern_string(&debug_bytes);
    mode.register_function(ctx, &func.name, function, debug_bytes_ptr, func.instrs.len() as u32)?;
    let cpool_base = mode.cpool_base(ctx, &func.name, &func.cpool)?;

    let anchor = ctx
        .builder
        .build_alloca(ctx.types.anchor_ty, "anchor")
        .map_err(|e| Error::Builder(e.to_string()))?;
    store_anchor_field(ctx, anchor, ANCHOR_FIELD_CALLER, param_caller.into())?;
    store_anchor_field(ctx, anchor, ANCHOR_FIELD_FUNCTION, param_func.into())?;
    store_anchor_field(ctx, anchor, ANCHOR_FIELD_IR_POSITION, ctx.types.i32_ty.const_int(0, false).into())?;

    let frame = if func.frame_size > 0 {
        let frame_ty = ctx.types.i8_ty.array_type(func.frame_size);
        let alloca = ctx
            .builder
            .build_alloca(frame_ty, "frame")
            .map_err(|e| Error::Builder(e.to_string()))?;
        if let Some(instr) = alloca.as_instruction_value() {
            instr.set_alignment(FRAME_ALIGN).map_err(|e| Error::Builder(e.to_string()))?;
        }
        Some(alloca)
    } else {
        None
    };

    let block_bbs: Vec<BasicBlock<'ctx>> = func
        .blocks
        .iter()
        .map(|b| ctx.context.append_basic_block(function, &format!("bb{}", b.id.0)))
        .collect();

    ctx.builder.position_at_end(entry_bb);
    ctx.builder
        .build_unconditional_branch(block_bbs[0])
        .map_err(|e| Error::Builder(e.to_string()))?;

    let live_in_sets = liveness::live_in(func);

    let mut blocks = Vec::with_capacity(func.blocks.len());
    for (i, _block) in func.blocks.iter().enumerate() {
        let bb = block_bbs[i];
        ctx.builder.position_at_end(bb);
        let in_flags = ctx
            .builder
            .build_phi(ctx.types.i1_ty, "flags")
            .map_err(|e| Error::Builder(e.to_string()))?;

        let mut in_regs = vec![None; func.nregs];
        let mut out_regs = vec![None; func.nregs];
        for &r in &live_in_sets[i] {
            let phi = ctx
                .builder
                .build_phi(ctx.types.i64_ty, &format!("r{r}"))
                .map_err(|e| Error::Builder(e.to_string()))?;
            in_regs[r as usize] = Some(phi);
            out_regs[r as usize] = Some(phi.as_basic_value().into_int_value());
        }

        blocks.push(BlockLowering {
            bb,
            out_flags: Some(in_flags.as_basic_value().into_int_value()),
            in_flags,
            in_regs,
            out_regs,
        });
    }

    let func_ctx = FuncCtx {
        function,
        anchor,
        args_ptr: param_args,
        frame,
        cpool_base,
    };

    for (i, block) in func.blocks.iter().enumerate() {
        ctx.builder.position_at_end(blocks[i].bb);
        for (offset, instr) in func.instrs_in(block.id).iter().enumerate() {
            let index = block.start + offset;
            ops::lower_instr(ctx, mode, func_ctx, &mut blocks, i, block, &func.instrs, index, instr)?;
        }

        if blocks[i].bb.get_terminator().is_none() {
            ctx.builder.position_at_end(blocks[i].bb);
            if block.aborts {
                ctx.builder.build_unreachable().map_err(|e| Error::Builder(e.to_string()))?;
            } else {
                let next = block.id.0 + 1;
                let next_bb = block_bbs.get(next as usize).copied().ok_or_else(|| Error::Lowering {
                    index: block.start + block.len,
                    reason: format!("block {} falls through past the last block", block.id),
                    dump: String::new(),
                })?;
                ctx.builder
                    .build_unconditional_branch(next_bb)
                    .map_err(|e| Error::Builder(e.to_string()))?;
            }
        }
    }

    stitch_phis(func, &blocks, entry_bb)?;

    Ok(function)
}

fn store_anchor_field<'ctx>(
    ctx: &ModuleContext<'ctx>,
    anchor: PointerValue<'ctx>,
    field: u32,
    value: inkwell::values::BasicValueEnum<'ctx>,
) -> Result<()> {
    let gep = ctx
        .builder
        .build_struct_gep(ctx.types.anchor_ty, anchor, field, "anchor_field")
        .map_err(|e| Error::Builder(e.to_string()))?;
    ctx.builder.build_store(gep, value).map_err(|e| Error::Builder(e.to_string()))?;
    Ok(())
}

fn stitch_phis<'ctx>(func: &CfgFunction, blocks: &[BlockLowering<'ctx>], entry_bb: BasicBlock<'ctx>) -> Result<()> {
    for block in &func.blocks {
        let i = block.id.0 as usize;
        let lb = &blocks[i];

        if block.id.0 == 0 {
            lb.in_flags
                .add_incoming(&[(&lb_false(lb), entry_bb)]);
            for maybe_phi in &lb.in_regs {
                if let Some(phi) = maybe_phi {
                    phi.add_incoming(&[(&phi_zero(phi), entry_bb)]);
                }
            }
        }

        for pred in func.predecessors(block.id) {
            let p_idx = pred.0 as usize;
            let p_lb = &blocks[p_idx];
            let out_flags = p_lb
                .out_flags
                .ok_or_else(|| Error::Internal(format!("block {} never produced a flags value", pred)))?;
            lb.in_flags.add_incoming(&[(&out_flags, p_lb.bb)]);

            for (r, maybe_phi) in lb.in_regs.iter().enumerate() {
                if let Some(phi) = maybe_phi {
                    let value = p_lb.out_regs[r].ok_or_else(|| Error::Internal(format!(
                        "register r{r} live-in at {} but undefined on edge from {}",
                        block.id, pred
                    )))?;
                    phi.add_incoming(&[(&value, p_lb.bb)]);
                }
            }
        }
    }
    Ok(())
}

fn lb_false<'ctx>(lb: &BlockLowering<'ctx>) -> IntValue<'ctx> {
    lb.in_flags.as_basic_value().get_type().into_int_type().const_int(0, false)
}

fn phi_zero<'ctx>(phi: &PhiValue<'ctx>) -> IntValue<'ctx> {
    phi.as_basic_value().get_type().into_int_type().const_int(0, false)
}
