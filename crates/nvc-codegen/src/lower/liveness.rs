//! Backward liveness dataflow over a [`CfgFunction`], used to decide which
//! virtual registers need an in-block phi at each block's entry.

use std::collections::BTreeSet;

use crate::ir::{BlockId, CfgFunction, Opcode, Operand};

/// Registers an instruction reads, in argument order. `MACRO_COPY`/
/// `MACRO_BZERO` read their own result register for the byte count (see
/// `lower::ops`), so it counts as a use here too, not just a definition.
fn uses(instr: &crate::ir::Instr) -> impl Iterator<Item = u32> + '_ {
    let count_reg = match instr.op {
        Opcode::MacroCopy | Opcode::MacroBzero => instr.result.map(|r| r.0),
        _ => None,
    };
    instr
        .args
        .iter()
        .filter_map(|arg| match arg {
            Operand::Reg(r) | Operand::RegOffset(r, _) => Some(r.0),
            _ => None,
        })
        .chain(count_reg)
}

/// Whether `instr` defines `instr.result` for liveness/killing purposes.
/// `MACRO_COPY`/`MACRO_BZERO` name their result register as a read-only
/// byte count, never a new definition.
fn defines_result(instr: &crate::ir::Instr) -> bool {
    !matches!(instr.op, Opcode::MacroCopy | Opcode::MacroBzero)
}

/// Computes, for each block (indexed by `BlockId.0`), the set of registers
/// live at the block's entry: used before being (re)defined in that block,
/// or live-out and never killed.
#[must_use]
pub fn live_in(func: &CfgFunction) -> Vec<BTreeSet<u32>> {
    let n = func.blocks.len();
    let mut live_in = vec![BTreeSet::new(); n];
    let mut live_out = vec![BTreeSet::new(); n];

    let mut upward_exposed = vec![BTreeSet::new(); n];
    let mut killed = vec![BTreeSet::new(); n];
    for block in &func.blocks {
        let idx = block.id.0 as usize;
        let mut defined_so_far = BTreeSet::new();
        for instr in func.instrs_in(block.id) {
            for r in uses(instr) {
                if !defined_so_far.contains(&r) {
                    upward_exposed[idx].insert(r);
                }
            }
            if defines_result(instr) {
                if let Some(result) = instr.result {
                    defined_so_far.insert(result.0);
                }
            }
        }
        killed[idx] = defined_so_far;
    }

    let mut changed = true;
    while changed {
        changed = false;
        for block in &func.blocks {
            let idx = block.id.0 as usize;
            let mut out = BTreeSet::new();
            for &succ in &block.successors {
                out.extend(live_in[succ.0 as usize].iter().copied());
            }
            if out != live_out[idx] {
                live_out[idx] = out;
                changed = true;
            }

            let mut new_in = upward_exposed[idx].clone();
            for r in &live_out[idx] {
                if !killed[idx].contains(r) {
                    new_in.insert(*r);
                }
            }
            if new_in != live_in[idx] {
                live_in[idx] = new_in;
                changed = true;
            }
        }
    }

    live_in
}

#[must_use]
pub fn live_in_for(sets: &[BTreeSet<u32>], id: BlockId) -> &BTreeSet<u32> {
    &sets[id.0 as usize]
}
