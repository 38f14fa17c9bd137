//! IR instruction set: register operands, opcodes, and the condition-code
//! encoding shared by arithmetic and branch instructions.
//!
//! This decouples the code generator from the interpreter's own in-memory
//! instruction encoding and gives the lowering driver a single, inspectable
//! representation to dispatch on.

/// A virtual register. The interpreter numbers these per function; the
/// backend never renumbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Reg(pub u32);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Operand width for sized memory and arithmetic ops, encoded in the
/// source IR as 0..3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
        }
    }

    #[must_use]
    pub fn from_size_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Width::W8),
            1 => Some(Width::W16),
            2 => Some(Width::W32),
            3 => Some(Width::W64),
            _ => None,
        }
    }
}

/// Condition code attached to arithmetic ops (overflow/carry flavor) and to
/// compares/branches (predicate flavor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Cc {
    /// Plain arithmetic, no flag produced.
    None,
    /// Signed-overflow checked arithmetic.
    O,
    /// Unsigned-carry checked arithmetic.
    C,
    /// Branch-if-true.
    T,
    /// Branch-if-false.
    F,
    Eq,
    Ne,
    Gt,
    Lt,
    Le,
    Ge,
}

/// Operand kinds accepted by instructions, per the value/address lowering
/// contract.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Operand {
    Reg(Reg),
    ConstInt(i64),
    ConstDouble(f64),
    /// Byte offset into the function's stack frame.
    Frame(i32),
    /// Byte offset into the function's constant pool.
    Cpool(i32),
    /// Register-based address plus a displacement.
    RegOffset(Reg, i32),
    /// Exit/handle tag, materialized as an i32 constant.
    ExitTag(i32),
    /// `args[n]` slot index for RECV/SEND.
    ArgIndex(u32),
    /// Absolute pointer constant. Only offset 0 is legal in AOT mode
    /// (everything else must be indirected via `Func`/`Foreign`).
    Abs(u64),
    /// Call target, resolved by canonical function name.
    Func(String),
    /// FFI target: canonical symbol name plus the interpreter's foreign
    /// call spec word.
    Foreign(String, i64),
    /// A runtime slot index, e.g. for `GETPRIV`/`PUTPRIV`.
    Slot(i32),
    /// `DEBUG` instruction payload: source file (if changed) and line.
    DebugLoc { file: Option<String>, line: u32 },
}

/// The opcodes this backend knows how to lower. Anything else is a
/// programmer error caught at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Opcode {
    Recv,
    Send,
    Store,
    Load,
    ULoad,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fneg,
    Fcvtns,
    Scvtf,
    Not,
    And,
    Or,
    Xor,
    Cmp,
    Fcmp,
    Cset,
    Csel,
    Jump,
    Call,
    Lea,
    Mov,
    Neg,
    Ret,
    Debug,
    MacroExp,
    MacroFexp,
    MacroCopy,
    MacroBzero,
    MacroExit,
    MacroFficall,
    MacroGalloc,
    MacroGetpriv,
    MacroPutpriv,
}

/// A single IR instruction. Not every field is meaningful for every
/// opcode — see the lowering dispatch for the per-opcode contract.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub result: Option<Reg>,
    pub args: Vec<Operand>,
    pub cc: Cc,
    pub width: Width,
}

impl Instr {
    #[must_use]
    pub fn new(op: Opcode) -> Self {
        Instr {
            op,
            result: None,
            args: Vec::new(),
            cc: Cc::None,
            width: Width::W64,
        }
    }

    #[must_use]
    pub fn with_result(mut self, r: Reg) -> Self {
        self.result = Some(r);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Operand>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_cc(mut self, cc: Cc) -> Self {
        self.cc = cc;
        self
    }

    #[must_use]
    pub fn with_width(mut self, width: Width) -> Self {
        self.width = width;
        self
    }
}
