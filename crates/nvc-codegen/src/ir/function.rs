//! CFG-level IR types: blocks and the per-function aggregate the lowering
//! driver consumes.

use std::ops::Range;

use super::instruction::Instr;

/// Identifies a block by its position in `CfgFunction::blocks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: a contiguous instruction range plus CFG edges.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub start: usize,
    pub len: usize,
    /// Set when the interpreter's analysis determined control never falls
    /// off the end of this block through normal means (a trap is the only
    /// way out).
    pub aborts: bool,
    /// Set when this block ends in a `RET`.
    pub returns: bool,
    pub successors: Vec<BlockId>,
}

impl Block {
    #[must_use]
    pub fn instr_range(&self) -> Range<usize> {
        self.start..(self.start + self.len)
    }
}

/// A fully-built source function: the IR buffer, its CFG, and the
/// resources (register count, frame size, constant pool) the lowering
/// driver needs to allocate backend state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CfgFunction {
    pub name: String,
    pub nregs: usize,
    pub frame_size: u32,
    pub cpool: Vec<u8>,
    pub instrs: Vec<Instr>,
    pub blocks: Vec<Block>,
}

impl CfgFunction {
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    #[must_use]
    pub fn instrs_in(&self, id: BlockId) -> &[Instr] {
        &self.instrs[self.block(id).instr_range()]
    }

    /// All blocks that list `id` as a successor, in block-index order.
    #[must_use]
    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.successors.contains(&id))
            .map(|b| b.id)
            .collect()
    }

    /// Blocks that are the target of some non-fallthrough edge: any
    /// successor reached from a block whose index isn't immediately
    /// preceding. Used to mark `TARGET` bytes in the debug stream.
    #[must_use]
    pub fn branch_targets(&self) -> std::collections::BTreeSet<BlockId> {
        let mut targets = std::collections::BTreeSet::new();
        for block in &self.blocks {
            for &succ in &block.successors {
                if succ.0 != block.id.0 + 1 {
                    targets.insert(succ);
                }
            }
        }
        targets
    }
}
