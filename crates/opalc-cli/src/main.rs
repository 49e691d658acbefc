//! opalc compiler CLI.
//!
//! Provides the `opalc` binary. `build` reads a JSON-serialized program
//! AST, lowers it to IR, runs the selected pass pipeline, and prints the
//! textual IR. `run` does the same and then interprets `main`, printing
//! everything the program outputs and its exit value.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use opalc_ir::Module;
use opalc_lower::{lower_program, Program};
use opalc_opt::interp::Value;
use opalc_opt::{
    ConstPropagation, DeadCode, FunctionInline, Interp, InterpConfig, LoopInvariantCodeMotion,
    PassManager,
};

const DEFAULT_PASSES: &str = "const-prop,inline,licm,dce";

/// opalc middle-end driver.
#[derive(Parser)]
#[command(name = "opalc", about = "Middle-end driver: lower, optimize, print or interpret")]
struct Cli {
    /// Enable debug logging (pass progress, erased-instruction counts).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Lower a program and print the optimized IR.
    Build {
        /// Path to the program AST (JSON).
        #[arg(short, long)]
        input: PathBuf,

        /// Comma-separated pass list: const-prop, inline, licm, dce.
        #[arg(short, long, default_value = DEFAULT_PASSES)]
        passes: String,

        /// Skip all passes.
        #[arg(long)]
        no_opt: bool,
    },
    /// Lower, optimize, and interpret the program's `main`.
    Run {
        /// Path to the program AST (JSON).
        #[arg(short, long)]
        input: PathBuf,

        /// Comma-separated pass list: const-prop, inline, licm, dce.
        #[arg(short, long, default_value = DEFAULT_PASSES)]
        passes: String,

        /// Skip all passes.
        #[arg(long)]
        no_opt: bool,

        /// Comma-separated integers consumed by getint/getch.
        #[arg(long, value_delimiter = ',')]
        stdin: Vec<i32>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let exit_code = match cli.command {
        Commands::Build {
            input,
            passes,
            no_opt,
        } => run_build(&input, &passes, no_opt),
        Commands::Run {
            input,
            passes,
            no_opt,
            stdin,
        } => run_run(&input, &passes, no_opt, stdin),
    };
    process::exit(exit_code);
}

/// Execute the build subcommand.
///
/// Returns exit code: 0 = success, 1 = bad pass list, 2 = lowering error,
/// 3 = I/O or parse error.
fn run_build(input: &PathBuf, passes: &str, no_opt: bool) -> i32 {
    let module = match compile(input, passes, no_opt) {
        Ok(m) => m,
        Err(code) => return code,
    };
    print!("{}", module);
    0
}

/// Execute the run subcommand. Exit codes as for `build`, plus 4 when the
/// interpreted program traps.
fn run_run(input: &PathBuf, passes: &str, no_opt: bool, stdin: Vec<i32>) -> i32 {
    let module = match compile(input, passes, no_opt) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let config = InterpConfig {
        inputs: stdin.into_iter().map(Value::Int).collect::<VecDeque<_>>(),
        ..Default::default()
    };
    let mut interp = Interp::new(&module, config);
    let result = interp.run("main", vec![]);
    for v in &interp.output {
        match v {
            Value::Int(x) => println!("{}", x),
            Value::Float(x) => println!("{:?}", x),
            other => println!("{:?}", other),
        }
    }
    match result {
        Ok(Value::Int(x)) => {
            eprintln!("main returned {}", x);
            0
        }
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: runtime trap: {}", e);
            4
        }
    }
}

fn compile(input: &PathBuf, passes: &str, no_opt: bool) -> Result<Module, i32> {
    let text = match std::fs::read_to_string(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", input.display(), e);
            return Err(3);
        }
    };
    let program: Program = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: failed to parse '{}': {}", input.display(), e);
            return Err(3);
        }
    };
    let mut module = match lower_program(&program) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(2);
        }
    };
    if !no_opt {
        let mut pm = match parse_passes(passes) {
            Ok(pm) => pm,
            Err(unknown) => {
                eprintln!(
                    "Error: unknown pass '{}' (expected const-prop, inline, licm, dce)",
                    unknown
                );
                return Err(1);
            }
        };
        pm.run(&mut module);
    }
    Ok(module)
}

fn parse_passes(list: &str) -> Result<PassManager, String> {
    let mut pm = PassManager::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name {
            "const-prop" => pm.register(ConstPropagation),
            "inline" => pm.register(FunctionInline::default()),
            "licm" => pm.register(LoopInvariantCodeMotion),
            "dce" => pm.register(DeadCode),
            other => return Err(other.to_string()),
        }
    }
    Ok(pm)
}
