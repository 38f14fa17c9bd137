//! Deduplicated string interning for per-function constant pools and
//! debug-info file names. Each distinct byte string is materialized as one
//! private, unnamed-addr global; repeated interning of the same bytes
//! returns the existing pointer.

use std::collections::HashMap;

use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::values::PointerValue;

pub struct StringPool<'ctx> {
    context: &'ctx Context,
    interned: HashMap<Vec<u8>, PointerValue<'ctx>>,
    next_id: u32,
}

impl<'ctx> StringPool<'ctx> {
    #[must_use]
    pub fn new(context: &'ctx Context) -> Self {
        StringPool {
            context,
            interned: HashMap::new(),
            next_id: 0,
        }
    }

    /// Interns `bytes` (not necessarily NUL-terminated, not necessarily
    /// UTF-8) as a private global constant and returns a pointer to it.
    pub fn intern(&mut self, module: &Module<'ctx>, bytes: &[u8]) -> PointerValue<'ctx> {
        if let Some(&ptr) = self.interned.get(bytes) {
            return ptr;
        }

        let name = format!("nvc.str.{}", self.next_id);
        self.next_id += 1;

        let const_bytes = self.context.const_string(bytes, false);
        let global = module.add_global(const_bytes.get_type(), Some(AddressSpace::default()), &name);
        global.set_initializer(&const_bytes);
        global.set_linkage(Linkage::Private);
        global.set_constant(true);
        global.set_unnamed_addr(true);

        let ptr = global.as_pointer_value();
        self.interned.insert(bytes.to_vec(), ptr);
        ptr
    }
}
