//! CLI driver for exercising [`nvc_codegen`] against serialized IR
//! fixtures: `compile-aot` lowers every function in a fixture file into a
//! single relocatable object, `jit-run` lowers one function, JIT-compiles
//! it, invokes it with caller-supplied argument words, and prints the
//! resulting `args` array.
//!
//! This binary is not itself a collaborator the spec fixes an interface
//! for (§1): it exists only so the backend can be driven end to end
//! without the VHDL front end or the real runtime library.
//!
//! `jit-run` transmutes a freshly published entry address into a callable
//! function pointer and invokes it, the one place in the workspace that
//! calls into JIT-compiled code directly rather than through the runtime.
#![allow(unsafe_code)]

use std::ffi::c_void;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inkwell::context::Context as LlvmContext;
use inkwell::targets::{InitializationConfig, Target};

use nvc_codegen::abi::JIT_MAX_ARGS;
use nvc_codegen::ir::CfgFunction;
use nvc_codegen::jit::{CompileOutcome, JitSession, PublishedEntry, SymbolResolver};
use nvc_codegen::lower::ResolvedFunction;
use nvc_codegen::{aot, Config};

#[derive(Parser)]
#[command(name = "nvc-codegen")]
#[command(about = "Driver for the nvc VHDL simulator's LLVM JIT/AOT code-generation backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lowers every function in an IR fixture file into one relocatable
    /// object file.
    CompileAot {
        #[arg(help = "Path to a JSON array of IR functions")]
        input: PathBuf,

        #[arg(short, long, help = "Output object file path")]
        output: PathBuf,

        #[arg(short, long, default_value = "nvc_module", help = "LLVM module identifier")]
        module_name: String,
    },

    /// JIT-compiles the first function in an IR fixture file and invokes
    /// it with the given argument words.
    JitRun {
        #[arg(help = "Path to a JSON array of IR functions")]
        input: PathBuf,

        #[arg(long, value_delimiter = ',', help = "Initial args[] words, comma-separated")]
        args: Vec<i64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::CompileAot {
            input,
            output,
            module_name,
        } => compile_aot(&input, &output, &module_name),
        Commands::JitRun { input, args } => jit_run(&input, &args),
    }
}

fn init_native_target() -> Result<()> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize native target: {e}"))
}

fn load_functions(path: &PathBuf) -> Result<Vec<CfgFunction>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse IR fixture {}", path.display()))
}

fn compile_aot(input: &PathBuf, output: &PathBuf, module_name: &str) -> Result<()> {
    init_native_target()?;
    let functions = load_functions(input)?;
    let context = LlvmContext::create();
    aot::compile_module(&context, module_name, &functions, output).context("AOT compilation failed")?;
    println!(
        "compiled {} function(s) from {} -> {}",
        functions.len(),
        input.display(),
        output.display()
    );
    Ok(())
}

/// `jit-run` fixtures are expected to be self-contained: no `CALL`,
/// `MACRO_FFICALL`, or constant pool, since this driver has no runtime
/// library or interpreter standing by to resolve those symbols against.
struct EmptyResolver;

impl SymbolResolver for EmptyResolver {
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

fn jit_run(input: &PathBuf, args: &[i64]) -> Result<()> {
    init_native_target()?;
    let functions = load_functions(input)?;
    let func = functions
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("fixture {} contains no functions", input.display()))?;

    let session = JitSession::with_config(Config::from_env());
    let target = PublishedEntry::new();
    let entry_addr = match session
        .compile(&EmptyResolver, &func, &target)
        .context("JIT compilation failed")?
    {
        CompileOutcome::Compiled { entry_addr } => entry_addr,
        CompileOutcome::FilteredOut => anyhow::bail!("NVC_JIT_ONLY excluded '{}'", func.name),
    };

    let mut arg_slots = [0i64; JIT_MAX_ARGS];
    for (slot, value) in arg_slots.iter_mut().zip(args.iter()) {
        *slot = *value;
    }

    // SAFETY: `entry_addr` is the address `JitSession::compile` just
    // published, pointing at a function with the fixed entry signature
    // `void(ptr func, ptr caller_anchor, ptr args)`. This driver has no
    // real caller anchor, so it passes null for both pointer parameters.
    type EntryFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut i64);
    let entry: EntryFn = unsafe { std::mem::transmute(entry_addr as usize) };
    unsafe {
        entry(std::ptr::null_mut(), std::ptr::null_mut(), arg_slots.as_mut_ptr());
    }

    let shown = args.len().max(1);
    println!("{} args after RET: {:?}", func.name, &arg_slots[..shown]);
    session.shutdown();
    Ok(())
}
