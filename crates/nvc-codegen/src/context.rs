//! The per-compilation-unit context: one LLVM [`Context`]/[`Module`] pair,
//! the cached type table, the target machine used for both optimization
//! passes and object emission, and the lazily-populated runtime-function
//! and string-pool caches the lowering driver shares across functions.

use std::collections::HashMap;

use inkwell::OptimizationLevel;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, RelocMode, Target, TargetMachine, TargetTriple};
use inkwell::values::FunctionValue;

use crate::error::{Error, Result};
use crate::intrinsics::{self, RuntimeFn};
use crate::strpool::StringPool;
use crate::types::TypeTable;

/// Owns everything a single module's worth of lowering needs: the LLVM
/// context and module, the shared type table, and per-module caches.
pub struct ModuleContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub types: TypeTable<'ctx>,
    pub target_machine: TargetMachine,
    strings: StringPool<'ctx>,
    runtime_fns: HashMap<RuntimeFn, FunctionValue<'ctx>>,
}

impl<'ctx> ModuleContext<'ctx> {
    /// Creates a module context targeting the host machine, matching the
    /// process this backend is compiled for. JIT and AOT both start from
    /// an identical target configuration; they diverge only in what they
    /// do with the resulting module (publish a dylib vs. write an object
    /// file).
    pub fn create(context: &'ctx Context, module_name: &str) -> Result<Self> {
        Target::initialize_native(&inkwell::targets::InitializationConfig::default())
            .map_err(Error::Target)?;

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple)
            .map_err(|e| Error::Target(format!("failed to resolve target triple: {e}")))?;
        let cpu = TargetMachine::get_host_cpu_name();
        let features = TargetMachine::get_host_cpu_features();

        let target_machine = target
            .create_target_machine(
                &triple,
                cpu.to_str().unwrap_or("generic"),
                features.to_str().unwrap_or(""),
                OptimizationLevel::Default,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or_else(|| Error::Target("failed to create target machine".to_string()))?;

        let module = context.create_module(module_name);
        module.set_triple(&triple);
        module.set_data_layout(&target_machine.get_target_data().get_data_layout());

        let types = TypeTable::new(context);
        let builder = context.create_builder();

        Ok(ModuleContext {
            context,
            module,
            builder,
            types,
            target_machine,
            strings: StringPool::new(context),
            runtime_fns: HashMap::new(),
        })
    }

    /// Declares or fetches the cached declaration for a runtime library
    /// function such as `__nvc_do_exit`.
    pub fn runtime_fn(&mut self, which: RuntimeFn) -> FunctionValue<'ctx> {
        if let Some(&f) = self.runtime_fns.get(&which) {
            return f;
        }
        let t = &self.types;
        let sig = match which {
            RuntimeFn::DoExit => t
                .void_ty
                .fn_type(&[t.i32_ty.into(), t.ptr_ty.into(), t.ptr_ty.into()], false),
            RuntimeFn::DoFficall => t
                .void_ty
                .fn_type(&[t.ptr_ty.into(), t.ptr_ty.into(), t.ptr_ty.into()], false),
            RuntimeFn::Getpriv => t.ptr_ty.fn_type(&[t.i32_ty.into()], false),
            RuntimeFn::Putpriv => t
                .void_ty
                .fn_type(&[t.i32_ty.into(), t.ptr_ty.into()], false),
            RuntimeFn::MspaceAlloc => t
                .ptr_ty
                .fn_type(&[t.i32_ty.into(), t.i32_ty.into()], false),
            RuntimeFn::Trampoline => t.entry_fn_ty,
            RuntimeFn::Register => t.void_ty.fn_type(
                &[
                    t.ptr_ty.into(),
                    t.ptr_ty.into(),
                    t.ptr_ty.into(),
                    t.i32_ty.into(),
                ],
                false,
            ),
            RuntimeFn::GetFunc => t.ptr_ty.fn_type(&[t.ptr_ty.into()], false),
            RuntimeFn::GetForeign => t
                .ptr_ty
                .fn_type(&[t.ptr_ty.into(), t.i64_ty.into()], false),
        };
        let f = intrinsics::declare_runtime_fn(&self.module, which, sig);
        self.runtime_fns.insert(which, f);
        f
    }

    /// Interns a byte string into the module's constant-pool string pool.
    pub fn intern_string(&mut self, bytes: &[u8]) -> inkwell::values::PointerValue<'ctx> {
        self.strings.intern(&self.module, bytes)
    }

    pub fn overflow_intrinsic(&self, name: &str, width: crate::ir::Width) -> Result<FunctionValue<'ctx>> {
        intrinsics::overflow_intrinsic(&self.module, name, self.types.int_ty(width).into())
    }

    pub fn f64_intrinsic(&self, name: &str) -> Result<FunctionValue<'ctx>> {
        intrinsics::f64_intrinsic(&self.module, name, self.types.double_ty.into())
    }

    pub fn memmove_intrinsic(&self) -> Result<FunctionValue<'ctx>> {
        intrinsics::memmove_intrinsic(&self.module, self.types.ptr_ty.into(), self.types.i64_ty.into())
    }

    pub fn memset_intrinsic(&self) -> Result<FunctionValue<'ctx>> {
        intrinsics::memset_intrinsic(&self.module, self.types.ptr_ty.into(), self.types.i64_ty.into())
    }

    /// Runs the function-level optimization pipeline spec.md §4.E step 8
    /// calls for (SROA, instcombine, reassociate, GVN, CFG-simplify) over
    /// the module in place. Both JIT and AOT run this before handing the
    /// module to their respective backends (MCJIT, object emission).
    pub fn run_default_passes(&self) -> Result<()> {
        tracing::debug!(module = %self.module.print_to_string().to_string(), "module IR before optimization");
        let options = PassBuilderOptions::create();
        self.module
            .run_passes("sroa,instcombine,reassociate,gvn,simplifycfg", &self.target_machine, options)
            .map_err(|e| Error::Target(e.to_string()))?;
        tracing::debug!(module = %self.module.print_to_string().to_string(), "module IR after optimization");
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        self.module.verify().map_err(|e| Error::Verification {
            module: self
                .module
                .get_name()
                .to_str()
                .unwrap_or("<unnamed>")
                .to_string(),
            message: e.to_string(),
        })
    }

    #[must_use]
    pub fn target_triple(&self) -> TargetTriple {
        self.target_machine.get_triple()
    }
}
