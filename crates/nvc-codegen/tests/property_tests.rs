//! Property-based tests for the lowering backend's arithmetic and
//! floating-point semantics (spec.md §8 "Testable Properties" / "Round-trip
//! / semantic equivalence").
//!
//! Uses `proptest` to generate random operands and compare the JIT-compiled
//! output against an infinite-precision reference computed directly in
//! Rust, the same structure the teacher's `property_tests.rs` uses for its
//! PVM instruction-encoding invariants, applied here to overflow-checked
//! arithmetic and bit-cast floating point instead.

use proptest::prelude::*;

use inkwell::targets::{InitializationConfig, Target};

use nvc_codegen::abi::JIT_MAX_ARGS;
use nvc_codegen::ir::{Cc, CfgFunction, FunctionBuilder, Instr, Opcode, Operand, Width};
use nvc_codegen::jit::{CompileOutcome, JitSession, PublishedEntry, SymbolResolver};
use nvc_codegen::lower::ResolvedFunction;

struct NoExternalResolver;

impl SymbolResolver for NoExternalResolver {
    fn resolve_runtime(&self, _symbol: &str) -> Option<u64> {
        None
    }
    fn resolve_function(&self, _name: &str) -> Option<ResolvedFunction> {
        None
    }
    fn resolve_foreign(&self, _symbol: &str) -> Option<u64> {
        None
    }
    fn resolve_cpool(&self, _func_name: &str) -> Option<u64> {
        None
    }
}

fn init_target() {
    let _ = Target::initialize_native(&InitializationConfig::default());
}

fn run(func: &CfgFunction, args: &[i64]) -> [i64; JIT_MAX_ARGS] {
    init_target();
    let session = JitSession::init();
    let target = PublishedEntry::new();
    let entry_addr = match session.compile(&NoExternalResolver, func, &target).expect("compile") {
        CompileOutcome::Compiled { entry_addr } => entry_addr,
        CompileOutcome::FilteredOut => panic!("fixture unexpectedly filtered out"),
    };

    let mut slots = [0i64; JIT_MAX_ARGS];
    slots[..args.len()].copy_from_slice(args);

    type EntryFn = unsafe extern "C" fn(*mut std::ffi::c_void, *mut std::ffi::c_void, *mut i64);
    // SAFETY: `entry_addr` was just published by `JitSession::compile` for a
    // function with the fixed entry signature.
    let entry: EntryFn = unsafe { std::mem::transmute(entry_addr as usize) };
    unsafe {
        entry(std::ptr::null_mut(), std::ptr::null_mut(), slots.as_mut_ptr());
    }
    session.shutdown();
    slots
}

/// `RECV 0 -> r0; RECV 1 -> r1; <op>.<cc> r0, r1 -> result; CSET -> flag;
/// SEND 0, result; SEND 1, flag; RET`.
fn checked_arith_fixture(op: Opcode, cc: Cc, width: Width) -> CfgFunction {
    let mut b = FunctionBuilder::new("checked_arith");
    let r0 = b.alloc_reg();
    let r1 = b.alloc_reg();
    let result = b.alloc_reg();
    let flag = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Recv).with_result(r1).with_args(vec![Operand::ArgIndex(1)]));
    b.push(
        Instr::new(op)
            .with_result(result)
            .with_args(vec![Operand::Reg(r0), Operand::Reg(r1)])
            .with_cc(cc)
            .with_width(width),
    );
    b.push(Instr::new(Opcode::Cset).with_result(flag));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(result)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(1), Operand::Reg(flag)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    b.finish()
}

/// Infinite-precision reference for signed-overflow-checked (`Cc::O`)
/// arithmetic: computes in `i128`, checks whether the true result fits in
/// `width` signed bits, and sign-extends the wrapped low bits to `i64`.
fn expected_signed(op: Opcode, width: Width, a: i64, b: i64) -> (i64, bool) {
    let bits = width.bits();
    let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
    let sign_bit = 1i128 << (bits - 1);
    let a_n = (a as u64 & mask) as i128;
    let a_n = if a_n >= sign_bit { a_n - (1i128 << bits) } else { a_n };
    let b_n = (b as u64 & mask) as i128;
    let b_n = if b_n >= sign_bit { b_n - (1i128 << bits) } else { b_n };

    let full = match op {
        Opcode::Add => a_n + b_n,
        Opcode::Sub => a_n - b_n,
        Opcode::Mul => a_n * b_n,
        _ => unreachable!(),
    };
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    let overflow = full < min || full > max;

    let wrapped = (full as u64) & mask;
    let wrapped_signed = if wrapped & sign_bit as u64 != 0 {
        (wrapped as i64) - (1i64 << bits)
    } else {
        wrapped as i64
    };
    (wrapped_signed, overflow)
}

/// Infinite-precision reference for unsigned-carry-checked (`Cc::C`)
/// arithmetic: same shape as [`expected_signed`] but unsigned, with the
/// wrapped result zero-extended.
fn expected_unsigned(op: Opcode, width: Width, a: i64, b: i64) -> (i64, bool) {
    let bits = width.bits();
    let mask: u128 = if bits == 64 { u64::MAX as u128 } else { (1u128 << bits) - 1 };
    let a_u = (a as u64 as u128) & mask;
    let b_u = (b as u64 as u128) & mask;

    let full: i128 = match op {
        Opcode::Add => a_u as i128 + b_u as i128,
        Opcode::Sub => a_u as i128 - b_u as i128,
        Opcode::Mul => a_u as i128 * b_u as i128,
        _ => unreachable!(),
    };
    let overflow = full < 0 || (full as u128) > mask;
    let wrapped = (full.rem_euclid(1i128 << bits)) as u64 & (mask as u64);
    (wrapped as i64, overflow)
}

const WIDTHS: [Width; 4] = [Width::W8, Width::W16, Width::W32, Width::W64];
const OPS: [Opcode; 3] = [Opcode::Add, Opcode::Sub, Opcode::Mul];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Signed-overflow-checked `ADD`/`SUB`/`MUL` at every width: `flags`
    /// always equals the overflow bit an infinite-precision computation
    /// would predict, and the sign-extended result always matches the
    /// wrapped arithmetic.
    #[test]
    fn overflow_checked_arith_matches_infinite_precision(a in any::<i64>(), b in any::<i64>(), op_idx in 0usize..3, width_idx in 0usize..4) {
        let op = OPS[op_idx];
        let width = WIDTHS[width_idx];
        let func = checked_arith_fixture(op, Cc::O, width);
        let out = run(&func, &[a, b]);
        let (expected_result, expected_flag) = expected_signed(op, width, a, b);

        prop_assert_eq!(out[0], expected_result, "result mismatch for {:?}.{:?} {a} {b}", op, width);
        prop_assert_eq!(out[1] != 0, expected_flag, "overflow flag mismatch for {:?}.{:?} {a} {b}", op, width);
    }

    /// Unsigned-carry-checked `ADD`/`SUB`/`MUL` at every width: `flags`
    /// matches the carry bit an infinite-precision unsigned computation
    /// would predict, result zero-extended.
    #[test]
    fn carry_checked_arith_matches_infinite_precision(a in any::<i64>(), b in any::<i64>(), op_idx in 0usize..3, width_idx in 0usize..4) {
        let op = OPS[op_idx];
        let width = WIDTHS[width_idx];
        let func = checked_arith_fixture(op, Cc::C, width);
        let out = run(&func, &[a, b]);
        let (expected_result, expected_flag) = expected_unsigned(op, width, a, b);

        prop_assert_eq!(out[0], expected_result, "result mismatch for {:?}.{:?} {a} {b}", op, width);
        prop_assert_eq!(out[1] != 0, expected_flag, "carry flag mismatch for {:?}.{:?} {a} {b}", op, width);
    }
}

/// `MOV r0 -> r1; FNEG r1 -> r2; FNEG r2 -> r3; SEND 0, r3; RET`. Two
/// negations are a bit-exact involution on any double (including NaN and
/// subnormals: negation only flips the sign bit), so this exercises the
/// "bit-cast only, never conversion" contract of `FNEG`/the double<->i64
/// coercions without needing a real floating-point comparison.
fn double_bitcast_roundtrip_fixture() -> CfgFunction {
    let mut b = FunctionBuilder::new("fneg_roundtrip");
    let r0 = b.alloc_reg();
    let r1 = b.alloc_reg();
    let r2 = b.alloc_reg();
    let blk = b.block();
    b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
    b.push(Instr::new(Opcode::Fneg).with_result(r1).with_args(vec![Operand::Reg(r0)]));
    b.push(Instr::new(Opcode::Fneg).with_result(r2).with_args(vec![Operand::Reg(r1)]));
    b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(r2)]));
    b.push(Instr::new(Opcode::Ret));
    b.set_returns(blk, true);
    b.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every `f64` bit pattern, including NaN payloads and subnormals,
    /// survives `f64 -> i64 (bitcast) -> f64 (bitcast)` identically.
    #[test]
    fn double_bitcast_round_trip_is_identity_for_any_bit_pattern(bits in any::<u64>()) {
        let func = double_bitcast_roundtrip_fixture();
        let out = run(&func, &[bits as i64]);
        prop_assert_eq!(out[0] as u64, bits, "bit pattern {bits:#018x} did not round-trip");
    }
}
