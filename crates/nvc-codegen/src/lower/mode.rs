//! The JIT/AOT capability split. Both modes share the entire lowering
//! driver; they differ only in how a call/foreign-call target is resolved
//! to a backend value and in whether a function gets registered with the
//! runtime eagerly (AOT) or published later by the session (JIT).

use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::module::Linkage;
use inkwell::values::{FunctionValue, PointerValue};

use crate::context::ModuleContext;
use crate::error::{Error, Result};
use crate::intrinsics::RuntimeFn;

/// How a `CALL`/`MACRO_FFICALL` target resolves to backend values.
pub enum CallTarget<'ctx> {
    /// The callee's entry and function-handle pointers are already known
    /// (JIT mode): call the entry function directly.
    Direct {
        func_handle: PointerValue<'ctx>,
        entry: PointerValue<'ctx>,
    },
    /// The callee isn't known until the constructor runs (AOT mode): load
    /// the late-bound handle and dispatch through the runtime trampoline.
    Trampoline {
        func_global: PointerValue<'ctx>,
        trampoline_fn: FunctionValue<'ctx>,
    },
}

pub trait Mode<'ctx> {
    fn call_target(&mut self, ctx: &mut ModuleContext<'ctx>, name: &str) -> Result<CallTarget<'ctx>>;

    fn foreign_pointer(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        sym: &str,
        spec: i64,
    ) -> Result<PointerValue<'ctx>>;

    /// Base pointer for this function's constant pool, or `None` if it has
    /// none.
    fn cpool_base(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        func_name: &str,
        cpool: &[u8],
    ) -> Result<Option<PointerValue<'ctx>>>;

    /// Registers the just-lowered function with the runtime, if this mode
    /// does that eagerly (AOT); a no-op in JIT mode, where publication
    /// happens through the session after compilation.
    fn register_function(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        name: &str,
        entry: FunctionValue<'ctx>,
        debug_bytes: PointerValue<'ctx>,
        nirs: u32,
    ) -> Result<()>;
}

/// Addresses known to the JIT session before this function is lowered:
/// already-compiled callees, resolved foreign symbols, and this function's
/// own constant-pool location in the interpreter's memory.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedFunction {
    pub entry_addr: u64,
    pub handle_addr: u64,
}

#[derive(Default)]
pub struct JitMode {
    functions: HashMap<String, ResolvedFunction>,
    foreign: HashMap<String, u64>,
    cpool_addrs: HashMap<String, u64>,
}

impl JitMode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_function(&mut self, name: impl Into<String>, resolved: ResolvedFunction) {
        self.functions.insert(name.into(), resolved);
    }

    pub fn bind_foreign(&mut self, sym: impl Into<String>, addr: u64) {
        self.foreign.insert(sym.into(), addr);
    }

    pub fn bind_cpool(&mut self, func_name: impl Into<String>, addr: u64) {
        self.cpool_addrs.insert(func_name.into(), addr);
    }
}

impl<'ctx> Mode<'ctx> for JitMode {
    fn call_target(&mut self, ctx: &mut ModuleContext<'ctx>, name: &str) -> Result<CallTarget<'ctx>> {
        let resolved = self
            .functions
            .get(name)
            .ok_or_else(|| Error::SymbolNotFound(name.to_string()))?;
        let ptr_ty = ctx.types.ptr_ty;
        let i64_ty = ctx.types.i64_ty;
        let entry = ctx
            .builder
            .build_int_to_ptr(i64_ty.const_int(resolved.entry_addr, false), ptr_ty, "entry_addr")
            .map_err(|e| Error::Builder(e.to_string()))?;
        let func_handle = ctx
            .builder
            .build_int_to_ptr(i64_ty.const_int(resolved.handle_addr, false), ptr_ty, "func_handle")
            .map_err(|e| Error::Builder(e.to_string()))?;
        Ok(CallTarget::Direct { func_handle, entry })
    }

    fn foreign_pointer(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        sym: &str,
        _spec: i64,
    ) -> Result<PointerValue<'ctx>> {
        let addr = self
            .foreign
            .get(sym)
            .ok_or_else(|| Error::SymbolNotFound(sym.to_string()))?;
        ctx.builder
            .build_int_to_ptr(ctx.types.i64_ty.const_int(*addr, false), ctx.types.ptr_ty, "foreign_ptr")
            .map_err(|e| Error::Builder(e.to_string()))
    }

    fn cpool_base(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        func_name: &str,
        cpool: &[u8],
    ) -> Result<Option<PointerValue<'ctx>>> {
        if cpool.is_empty() {
            return Ok(None);
        }
        let addr = self
            .cpool_addrs
            .get(func_name)
            .ok_or_else(|| Error::SymbolNotFound(format!("{func_name}.cpool")))?;
        let ptr = ctx
            .builder
            .build_int_to_ptr(ctx.types.i64_ty.const_int(*addr, false), ctx.types.ptr_ty, "cpool_abs")
            .map_err(|e| Error::Builder(e.to_string()))?;
        Ok(Some(ptr))
    }

    fn register_function(
        &mut self,
        _ctx: &mut ModuleContext<'ctx>,
        _name: &str,
        _entry: FunctionValue<'ctx>,
        _debug_bytes: PointerValue<'ctx>,
        _nirs: u32,
    ) -> Result<()> {
        Ok(())
    }
}

/// Shared state for AOT assembly: a builder positioned inside the module
/// constructor, and the per-name globals already materialized there so a
/// function called from multiple sites only gets one `get_func`/
/// `get_foreign` lookup.
pub struct AotMode<'ctx> {
    ctor_builder: Builder<'ctx>,
    func_globals: HashMap<String, PointerValue<'ctx>>,
    ffi_globals: HashMap<String, PointerValue<'ctx>>,
    cpool_globals: HashMap<String, PointerValue<'ctx>>,
}

impl<'ctx> AotMode<'ctx> {
    #[must_use]
    pub fn new(ctor_builder: Builder<'ctx>) -> Self {
        AotMode {
            ctor_builder,
            func_globals: HashMap::new(),
            ffi_globals: HashMap::new(),
            cpool_globals: HashMap::new(),
        }
    }

    /// The builder positioned inside the shared module constructor, for
    /// [`crate::aot::compile_module`] to append the final `ret void` once
    /// every function has been lowered.
    #[must_use]
    pub fn ctor_builder(&self) -> &Builder<'ctx> {
        &self.ctor_builder
    }
}

impl<'ctx> Mode<'ctx> for AotMode<'ctx> {
    fn call_target(&mut self, ctx: &mut ModuleContext<'ctx>, name: &str) -> Result<CallTarget<'ctx>> {
        let trampoline_fn = ctx.runtime_fn(RuntimeFn::Trampoline);

        if let Some(&func_global) = self.func_globals.get(name) {
            return Ok(CallTarget::Trampoline {
                func_global,
                trampoline_fn,
            });
        }

        let global_name = format!("{name}.func");
        let global = ctx.module.add_global(ctx.types.ptr_ty, None, &global_name);
        global.set_linkage(Linkage::Private);
        global.set_initializer(&ctx.types.ptr_ty.const_null());
        let func_global = global.as_pointer_value();

        let get_func = ctx.runtime_fn(RuntimeFn::GetFunc);
        let name_ptr = ctx.intern_string(nul_terminated(name).as_slice());
        let resolved = self
            .ctor_builder
            .build_call(get_func, &[name_ptr.into()], "resolved_func")
            .map_err(|e| Error::Builder(e.to_string()))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Error::Internal(format!("__nvc_get_func returned no value for {name}")))?;
        self.ctor_builder
            .build_store(func_global, resolved)
            .map_err(|e| Error::Builder(e.to_string()))?;

        self.func_globals.insert(name.to_string(), func_global);
        Ok(CallTarget::Trampoline {
            func_global,
            trampoline_fn,
        })
    }

    fn foreign_pointer(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        sym: &str,
        spec: i64,
    ) -> Result<PointerValue<'ctx>> {
        if let Some(&ffi_global) = self.ffi_globals.get(sym) {
            return Ok(ffi_global);
        }

        let global_name = format!("{sym}.ffi");
        let global = ctx.module.add_global(ctx.types.ptr_ty, None, &global_name);
        global.set_linkage(Linkage::Private);
        global.set_initializer(&ctx.types.ptr_ty.const_null());
        let ffi_global = global.as_pointer_value();

        let get_foreign = ctx.runtime_fn(RuntimeFn::GetForeign);
        let name_ptr = ctx.intern_string(nul_terminated(sym).as_slice());
        let spec_const = ctx.types.i64_ty.const_int(spec as u64, true);
        let resolved = self
            .ctor_builder
            .build_call(get_foreign, &[name_ptr.into(), spec_const.into()], "resolved_foreign")
            .map_err(|e| Error::Builder(e.to_string()))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Error::Internal(format!("__nvc_get_foreign returned no value for {sym}")))?;
        self.ctor_builder
            .build_store(ffi_global, resolved)
            .map_err(|e| Error::Builder(e.to_string()))?;

        self.ffi_globals.insert(sym.to_string(), ffi_global);
        Ok(ffi_global)
    }

    fn cpool_base(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        func_name: &str,
        cpool: &[u8],
    ) -> Result<Option<PointerValue<'ctx>>> {
        if cpool.is_empty() {
            return Ok(None);
        }
        if let Some(&global) = self.cpool_globals.get(func_name) {
            return Ok(Some(global));
        }
        let global_name = format!("{func_name}.cpool");
        let const_bytes = ctx.context.const_string(cpool, false);
        let global = ctx.module.add_global(const_bytes.get_type(), None, &global_name);
        global.set_linkage(Linkage::Private);
        global.set_constant(true);
        global.set_initializer(&const_bytes);
        let ptr = global.as_pointer_value();
        self.cpool_globals.insert(func_name.to_string(), ptr);
        Ok(Some(ptr))
    }

    fn register_function(
        &mut self,
        ctx: &mut ModuleContext<'ctx>,
        name: &str,
        entry: FunctionValue<'ctx>,
        debug_bytes: PointerValue<'ctx>,
        nirs: u32,
    ) -> Result<()> {
        let register = ctx.runtime_fn(RuntimeFn::Register);
        let name_ptr = ctx.intern_string(nul_terminated(name).as_slice());
        let entry_ptr = entry.as_global_value().as_pointer_value();
        let nirs_const = ctx.types.i32_ty.const_int(u64::from(nirs), false);
        self.ctor_builder
            .build_call(
                register,
                &[
                    name_ptr.into(),
                    entry_ptr.into(),
                    debug_bytes.into(),
                    nirs_const.into(),
                ],
                "register_call",
            )
            .map_err(|e| Error::Builder(e.to_string()))?;
        Ok(())
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}
