//! Textual rendering of IR instructions and operands, used to build the
//! diagnostic dumps fatal lowering errors cite.

use std::fmt;

use super::instruction::{Cc, Instr, Opcode, Operand};

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::ConstInt(v) => write!(f, "#{v}"),
            Operand::ConstDouble(v) => write!(f, "#{v}"),
            Operand::Frame(off) => write!(f, "frame[{off}]"),
            Operand::Cpool(off) => write!(f, "cpool[{off}]"),
            Operand::RegOffset(r, off) => write!(f, "{r}+{off}"),
            Operand::ExitTag(tag) => write!(f, "exit#{tag}"),
            Operand::ArgIndex(n) => write!(f, "args[{n}]"),
            Operand::Abs(addr) => write!(f, "abs({addr:#x})"),
            Operand::Func(name) => write!(f, "func({name})"),
            Operand::Foreign(sym, spec) => write!(f, "foreign({sym}, {spec:#x})"),
            Operand::Slot(slot) => write!(f, "slot[{slot}]"),
            Operand::DebugLoc { file, line } => match file {
                Some(file) => write!(f, "debug({file}:{line})"),
                None => write!(f, "debug(:{line})"),
            },
        }
    }
}

impl fmt::Display for Cc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cc::None => "none",
            Cc::O => "o",
            Cc::C => "c",
            Cc::T => "t",
            Cc::F => "f",
            Cc::Eq => "eq",
            Cc::Ne => "ne",
            Cc::Gt => "gt",
            Cc::Lt => "lt",
            Cc::Le => "le",
            Cc::Ge => "ge",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{result} = ")?;
        }
        write!(f, "{}.{}", self.op, self.cc)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Render `instrs[index]` with surrounding context, for fatal diagnostics.
#[must_use]
pub fn dump_instr_range(instrs: &[Instr], index: usize, context: usize) -> String {
    let lo = index.saturating_sub(context);
    let hi = (index + context + 1).min(instrs.len());
    let mut out = String::new();
    for (i, instr) in instrs.iter().enumerate().take(hi).skip(lo) {
        let marker = if i == index { ">> " } else { "   " };
        out.push_str(&format!("{marker}[{i}] {instr}\n"));
    }
    out
}
