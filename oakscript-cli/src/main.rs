//! OakScript CLI — compile, run, and inspect scripts.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input or compile error
//! - 2: Container error (bad magic, version, sizes)
//! - 3: Runtime error

mod commands;

use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => commands::run(&args[2..]),
        "compile" => commands::compile(&args[2..]),
        "runbytecode" => commands::runbytecode(&args[2..]),
        "disasm" => commands::disasm(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: oakscript <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <script.oak>                    Compile in memory and execute");
    eprintln!("  compile <script.oak> [-o out.oakc]  Compile to a bytecode container");
    eprintln!("  runbytecode <prog.oakc>             Load a container and execute");
    eprintln!("  disasm <prog.oakc>                  List container instructions");
    eprintln!();
    eprintln!("Set OAKSCRIPT_TRACE_LOG=<path> to write an instruction trace.");
}
