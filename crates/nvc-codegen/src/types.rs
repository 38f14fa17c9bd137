//! The fixed set of primitive/aggregate LLVM types this backend ever needs,
//! materialized once per [`crate::context::ModuleContext`] and cached by
//! width where a family of types exists (the overflow-pair structs).
//!
//! Opaque pointers only — no element-typed pointer variants.

use std::collections::HashMap;

use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::types::{FloatType, FunctionType, IntType, PointerType, StructType, VoidType};

use crate::error::{Error, Result};
use crate::ir::Width;

pub struct TypeTable<'ctx> {
    pub void_ty: VoidType<'ctx>,
    pub i1_ty: IntType<'ctx>,
    pub i8_ty: IntType<'ctx>,
    pub i16_ty: IntType<'ctx>,
    pub i32_ty: IntType<'ctx>,
    pub i64_ty: IntType<'ctx>,
    pub double_ty: FloatType<'ctx>,
    pub ptr_ty: PointerType<'ctx>,

    /// The frame anchor: `{ptr caller, ptr function, i32 ir_position}`.
    /// Field order is load-bearing.
    pub anchor_ty: StructType<'ctx>,

    /// `void(ptr func, ptr caller_anchor, ptr args)` — every compiled
    /// function has this signature.
    pub entry_fn_ty: FunctionType<'ctx>,

    /// `void()` — the AOT module constructor.
    pub ctor_fn_ty: FunctionType<'ctx>,

    /// `{i32 priority, ptr ctor_fn, ptr data}`, priority fixed at
    /// [`crate::abi::CTOR_PRIORITY`].
    pub ctor_entry_ty: StructType<'ctx>,

    overflow_pairs: HashMap<u32, StructType<'ctx>>,
}

impl<'ctx> TypeTable<'ctx> {
    #[must_use]
    pub fn new(context: &'ctx Context) -> Self {
        let void_ty = context.void_type();
        let i1_ty = context.bool_type();
        let i8_ty = context.i8_type();
        let i16_ty = context.i16_type();
        let i32_ty = context.i32_type();
        let i64_ty = context.i64_type();
        let double_ty = context.f64_type();
        let ptr_ty = context.ptr_type(AddressSpace::default());

        let anchor_ty = context.opaque_struct_type("nvc.anchor");
        anchor_ty.set_body(&[ptr_ty.into(), ptr_ty.into(), i32_ty.into()], false);

        let entry_fn_ty = void_ty.fn_type(&[ptr_ty.into(), ptr_ty.into(), ptr_ty.into()], false);
        let ctor_fn_ty = void_ty.fn_type(&[], false);

        let ctor_entry_ty = context.opaque_struct_type("nvc.ctor_entry");
        ctor_entry_ty.set_body(&[i32_ty.into(), ptr_ty.into(), ptr_ty.into()], false);

        let mut overflow_pairs = HashMap::new();
        for (width, ty) in [(8, i8_ty), (16, i16_ty), (32, i32_ty), (64, i64_ty)] {
            let pair = context.struct_type(&[ty.into(), i1_ty.into()], false);
            overflow_pairs.insert(width, pair);
        }

        TypeTable {
            void_ty,
            i1_ty,
            i8_ty,
            i16_ty,
            i32_ty,
            i64_ty,
            double_ty,
            ptr_ty,
            anchor_ty,
            entry_fn_ty,
            ctor_fn_ty,
            ctor_entry_ty,
            overflow_pairs,
        }
    }

    #[must_use]
    pub fn int_ty(&self, width: Width) -> IntType<'ctx> {
        match width {
            Width::W8 => self.i8_ty,
            Width::W16 => self.i16_ty,
            Width::W32 => self.i32_ty,
            Width::W64 => self.i64_ty,
        }
    }

    /// The `{iN, i1}` overflow-pair struct for `width` bits. Fails if
    /// `width` is outside the set materialized at construction.
    pub fn overflow_pair(&self, width: u32) -> Result<StructType<'ctx>> {
        self.overflow_pairs.get(&width).copied().ok_or_else(|| {
            Error::Internal(format!(
                "type table slot requested before initialization: overflow pair for i{width}"
            ))
        })
    }
}
