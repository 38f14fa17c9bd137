/// Error taxonomy for the code generator. None of these are recoverable in
/// the sense of "retry the same lowering" — they indicate an invariant the
/// interpreter's IR was supposed to uphold has been violated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lowering invariant violated at instruction {index}: {reason}\n{dump}")]
    Lowering {
        index: usize,
        reason: String,
        dump: String,
    },

    #[error("unsupported opcode {opcode:?} at instruction {index}\n{dump}")]
    UnsupportedOpcode {
        opcode: crate::ir::Opcode,
        index: usize,
        dump: String,
    },

    #[error("module verification failed for '{module}': {message}")]
    Verification { module: String, message: String },

    #[error("target/codegen failure: {0}")]
    Target(String),

    #[error("symbol resolution failed for '{0}'")]
    SymbolNotFound(String),

    #[error("LLVM builder error: {0}")]
    Builder(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
