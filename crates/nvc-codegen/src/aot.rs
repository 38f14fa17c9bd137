//! AOT module assembly (§4.H): the synthesized module-wide constructor,
//! the `llvm.global_ctors` entry that registers it, the `__nvc_abi_version`
//! export, and final object-file emission.
//!
//! One [`compile_module`] call lowers every function in a compilation unit
//! into a single [`crate::context::ModuleContext`], sharing one constructor
//! function and one `AotMode` across all of them so a callee referenced by
//! several functions only gets one `__nvc_get_func` lookup (see
//! [`crate::lower::AotMode`]).

use std::path::Path;

use inkwell::context::Context;
use inkwell::module::Linkage;
use inkwell::targets::FileType;

use crate::abi::{ABI_VERSION, CTOR_PRIORITY, MODULE_CTOR_NAME};
use crate::context::ModuleContext;
use crate::error::{Error, Result};
use crate::ir::CfgFunction;
use crate::lower::{lower_function, AotMode};

/// Lowers every function in `functions` into one module, registers each
/// with the runtime from a shared constructor, and writes the result as a
/// relocatable object file at `output_path`.
///
/// `module_name` becomes the LLVM module identifier; it has no bearing on
/// linking (every externally visible symbol is named after its IR
/// function, plus the fixed `__nvc_abi_version` and constructor symbols).
#[tracing::instrument(skip(context, functions), fields(module = %module_name, nfuncs = functions.len()))]
pub fn compile_module(
    context: &Context,
    module_name: &str,
    functions: &[CfgFunction],
    output_path: &Path,
) -> Result<()> {
    let mut ctx = ModuleContext::create(context, module_name)?;

    let ctor_fn = ctx
        .module
        .add_function(MODULE_CTOR_NAME, ctx.types.ctor_fn_ty, Some(Linkage::Private));
    let ctor_entry_bb = context.append_basic_block(ctor_fn, "entry");
    let ctor_builder = context.create_builder();
    ctor_builder.position_at_end(ctor_entry_bb);

    let mut mode = AotMode::new(ctor_builder);

    for func in functions {
        lower_function(&mut ctx, &mut mode, func)?;
    }

    finalize_constructor(&ctx, &mode, ctor_fn)?;
    emit_global_ctors(&ctx, ctor_fn)?;
    emit_abi_version(&ctx)?;

    ctx.verify()?;
    ctx.run_default_passes()?;

    ctx.target_machine
        .write_to_file(&ctx.module, FileType::Object, output_path)
        .map_err(|e| Error::Target(format!("failed to write object file {}: {e}", output_path.display())))?;

    Ok(())
}

/// Appends the `ret void` every function-body call in the constructor has
/// been building up to. `mode` is only borrowed here to keep its ctor
/// builder alive through the last `lower_function` call; the builder
/// itself already sits at the constructor's one and only block.
fn finalize_constructor<'ctx>(
    ctx: &ModuleContext<'ctx>,
    mode: &AotMode<'ctx>,
    ctor_fn: inkwell::values::FunctionValue<'ctx>,
) -> Result<()> {
    let _ = ctx;
    mode.ctor_builder()
        .build_return(None)
        .map_err(|e| Error::Builder(e.to_string()))?;
    debug_assert!(ctor_fn.verify(false), "constructor function must verify");
    Ok(())
}

/// Builds the one-element `llvm.global_ctors` appending array LLVM's
/// `-init-array` lowering scans for static initializers.
fn emit_global_ctors<'ctx>(ctx: &ModuleContext<'ctx>, ctor_fn: inkwell::values::FunctionValue<'ctx>) -> Result<()> {
    let ctor_ptr = ctor_fn.as_global_value().as_pointer_value();
    let entry = ctx.types.ctor_entry_ty.const_named_struct(&[
        ctx.types.i32_ty.const_int(u64::from(CTOR_PRIORITY), false).into(),
        ctor_ptr.into(),
        ctx.types.ptr_ty.const_null().into(),
    ]);
    let array = ctx.types.ctor_entry_ty.const_array(&[entry]);

    let global = ctx.module.add_global(array.get_type(), None, "llvm.global_ctors");
    global.set_linkage(Linkage::Appending);
    global.set_initializer(&array);
    Ok(())
}

/// `__nvc_abi_version`: an exported `i32` constant the runtime loader reads
/// before trusting an object's layout of the anchor/constructor-entry
/// structs.
fn emit_abi_version(ctx: &ModuleContext) -> Result<()> {
    let global = ctx.module.add_global(ctx.types.i32_ty, None, "__nvc_abi_version");
    global.set_linkage(Linkage::External);
    global.set_constant(true);
    global.set_initializer(&ctx.types.i32_ty.const_int(u64::from(ABI_VERSION), false));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Instr, Opcode, Operand};
    use inkwell::targets::{InitializationConfig, Target};
    use tempfile::tempdir;

    fn identity_function(name: &str) -> CfgFunction {
        let mut b = FunctionBuilder::new(name);
        let r0 = b.alloc_reg();
        let blk = b.block();
        b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
        b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(r0)]));
        b.push(Instr::new(Opcode::Ret));
        b.set_returns(blk, true);
        b.finish()
    }

    #[test]
    fn compiles_a_module_with_one_function_to_an_object_file() {
        Target::initialize_native(&InitializationConfig::default()).expect("native target init");
        let context = Context::create();
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.o");

        let functions = vec![identity_function("identity")];
        compile_module(&context, "test_module", &functions, &output).expect("compile_module");

        let bytes = std::fs::read(&output).expect("object file written");
        assert!(!bytes.is_empty());
    }
}
