//! Runtime and LLVM-intrinsic function prototypes the lowering driver calls
//! into: overflow-checked arithmetic (`llvm.sadd.with.overflow.*` etc.),
//! `memmove`/`memset` via their LLVM intrinsic forms, and the runtime
//! helper symbols the simulator's runtime library provides.

use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicTypeEnum, FunctionType};
use inkwell::values::FunctionValue;

use crate::error::{Error, Result};

/// Runtime entry points provided by the simulator's runtime library,
/// declared `extern` in every module and resolved by the JIT's symbol
/// table or the AOT linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    DoExit,
    DoFficall,
    Getpriv,
    Putpriv,
    MspaceAlloc,
    Trampoline,
    Register,
    GetFunc,
    GetForeign,
}

impl RuntimeFn {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeFn::DoExit => "__nvc_do_exit",
            RuntimeFn::DoFficall => "__nvc_do_fficall",
            RuntimeFn::Getpriv => "__nvc_getpriv",
            RuntimeFn::Putpriv => "__nvc_putpriv",
            RuntimeFn::MspaceAlloc => "__nvc_mspace_alloc",
            RuntimeFn::Trampoline => "__nvc_trampoline",
            RuntimeFn::Register => "__nvc_register",
            RuntimeFn::GetFunc => "__nvc_get_func",
            RuntimeFn::GetForeign => "__nvc_get_foreign",
        }
    }
}

/// Declares (or fetches the existing declaration of) a runtime function in
/// `module`, using `sig` to build it the first time it's needed.
pub fn declare_runtime_fn<'ctx>(
    module: &Module<'ctx>,
    which: RuntimeFn,
    sig: FunctionType<'ctx>,
) -> FunctionValue<'ctx> {
    module
        .get_function(which.symbol())
        .unwrap_or_else(|| module.add_function(which.symbol(), sig, Some(Linkage::External)))
}

/// Looks up the overflow-checked arithmetic intrinsic (`sadd`, `uadd`,
/// `ssub`, `usub`, `smul`, `umul`) for the given integer type.
pub fn overflow_intrinsic<'ctx>(
    module: &Module<'ctx>,
    name: &str,
    int_ty: BasicTypeEnum<'ctx>,
) -> Result<FunctionValue<'ctx>> {
    let full = format!("llvm.{name}.with.overflow");
    let intrinsic =
        Intrinsic::find(&full).ok_or_else(|| Error::Internal(format!("unknown LLVM intrinsic {full}")))?;
    intrinsic
        .get_declaration(module, &[int_ty])
        .ok_or_else(|| Error::Internal(format!("intrinsic {full} has no declaration for {int_ty:?}")))
}

/// Looks up `llvm.<name>.f64` (`pow`, `round`) for floating-point helper
/// lowering.
pub fn f64_intrinsic<'ctx>(
    module: &Module<'ctx>,
    name: &str,
    double_ty: BasicTypeEnum<'ctx>,
) -> Result<FunctionValue<'ctx>> {
    let full = format!("llvm.{name}.f64");
    let intrinsic =
        Intrinsic::find(&full).ok_or_else(|| Error::Internal(format!("unknown LLVM intrinsic {full}")))?;
    intrinsic
        .get_declaration(module, &[double_ty])
        .ok_or_else(|| Error::Internal(format!("intrinsic {full} has no declaration for f64")))
}

/// `llvm.memmove.p0.p0.i64`, used for `MACRO_COPY`.
pub fn memmove_intrinsic<'ctx>(
    module: &Module<'ctx>,
    ptr_ty: BasicTypeEnum<'ctx>,
    i64_ty: BasicTypeEnum<'ctx>,
) -> Result<FunctionValue<'ctx>> {
    let intrinsic = Intrinsic::find("llvm.memmove")
        .ok_or_else(|| Error::Internal("unknown LLVM intrinsic llvm.memmove".to_string()))?;
    intrinsic
        .get_declaration(module, &[ptr_ty, ptr_ty, i64_ty])
        .ok_or_else(|| Error::Internal("intrinsic llvm.memmove has no matching declaration".to_string()))
}

/// `llvm.memset.p0.i64`, used for `MACRO_BZERO`.
pub fn memset_intrinsic<'ctx>(
    module: &Module<'ctx>,
    ptr_ty: BasicTypeEnum<'ctx>,
    i64_ty: BasicTypeEnum<'ctx>,
) -> Result<FunctionValue<'ctx>> {
    let intrinsic = Intrinsic::find("llvm.memset")
        .ok_or_else(|| Error::Internal("unknown LLVM intrinsic llvm.memset".to_string()))?;
    intrinsic
        .get_declaration(module, &[ptr_ty, i64_ty])
        .ok_or_else(|| Error::Internal("intrinsic llvm.memset has no matching declaration".to_string()))
}

