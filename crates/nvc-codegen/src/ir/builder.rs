//! Programmatic construction of [`CfgFunction`] values, for tests and
//! fixtures. Mirrors the incremental `alloc_reg`/`add_block` style of a
//! JIT IR builder: registers and blocks are allocated up front, then
//! instructions are pushed into whichever block is currently selected.

use super::function::{Block, BlockId, CfgFunction};
use super::instruction::{Instr, Reg};

pub struct FunctionBuilder {
    name: String,
    nregs: u32,
    frame_size: u32,
    cpool: Vec<u8>,
    instrs: Vec<Instr>,
    blocks: Vec<Block>,
    current: Option<usize>,
}

impl FunctionBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            nregs: 0,
            frame_size: 0,
            cpool: Vec::new(),
            instrs: Vec::new(),
            blocks: Vec::new(),
            current: None,
        }
    }

    #[must_use]
    pub fn alloc_reg(&mut self) -> Reg {
        let r = Reg(self.nregs);
        self.nregs += 1;
        r
    }

    pub fn set_frame_size(&mut self, size: u32) -> &mut Self {
        self.frame_size = size;
        self
    }

    pub fn set_cpool(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.cpool = bytes;
        self
    }

    /// Start a new block and make it current; returns its id.
    pub fn block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            start: self.instrs.len(),
            len: 0,
            aborts: false,
            returns: false,
            successors: Vec::new(),
        });
        self.current = Some(id.0 as usize);
        id
    }

    pub fn push(&mut self, instr: Instr) -> &mut Self {
        let idx = self.current.expect("push called before any block() call");
        self.instrs.push(instr);
        self.blocks[idx].len += 1;
        self
    }

    pub fn successors(&mut self, id: BlockId, succs: Vec<BlockId>) -> &mut Self {
        self.blocks[id.0 as usize].successors = succs;
        self
    }

    pub fn set_aborts(&mut self, id: BlockId, aborts: bool) -> &mut Self {
        self.blocks[id.0 as usize].aborts = aborts;
        self
    }

    pub fn set_returns(&mut self, id: BlockId, returns: bool) -> &mut Self {
        self.blocks[id.0 as usize].returns = returns;
        self
    }

    #[must_use]
    pub fn finish(self) -> CfgFunction {
        CfgFunction {
            name: self.name,
            nregs: self.nregs as usize,
            frame_size: self.frame_size,
            cpool: self.cpool,
            instrs: self.instrs,
            blocks: self.blocks,
        }
    }
}
