//! CLI command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use oakscript_common::Program;
use oakscript_vm::Vm;

/// Environment variable naming the instruction-trace log file.
const TRACE_ENV: &str = "OAKSCRIPT_TRACE_LOG";

/// Compile a source file in memory and execute it.
pub fn run(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: oakscript run <script.oak>");
        return Err(1);
    }

    let input = &args[0];
    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{input}': {e}");
        1
    })?;

    let program = oakscript_compiler::compile_with_origin(&source, Path::new(input))
        .map_err(|e| {
            eprintln!("error: {e}");
            1
        })?;

    execute(&program)
}

/// Compile a source file to a container on disk.
pub fn compile(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: compile requires an input file");
        eprintln!("Usage: oakscript compile <script.oak> [-o output.oakc]");
        return Err(1);
    }

    let input = &args[0];

    let output = if args.len() >= 3 && args[1] == "-o" {
        PathBuf::from(&args[2])
    } else {
        Path::new(input).with_extension("oakc")
    };

    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{input}': {e}");
        1
    })?;

    let program = oakscript_compiler::compile_with_origin(&source, Path::new(input))
        .map_err(|e| {
            eprintln!("error: {e}");
            1
        })?;

    let bytes = program.encode();
    fs::write(&output, &bytes).map_err(|e| {
        eprintln!("error: cannot write '{}': {e}", output.display());
        1
    })?;

    eprintln!(
        "compiled {} bytes of code, {} strings -> {}",
        program.code.len(),
        program.strings.len(),
        output.display()
    );
    Ok(())
}

/// Load a container file and execute it.
pub fn runbytecode(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: runbytecode requires an input file");
        eprintln!("Usage: oakscript runbytecode <prog.oakc>");
        return Err(1);
    }

    let program = read_container(&args[0])?;
    execute(&program)
}

/// Disassemble a container file to stdout.
pub fn disasm(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: disasm requires an input file");
        eprintln!("Usage: oakscript disasm <prog.oakc>");
        return Err(1);
    }

    let program = read_container(&args[0])?;
    print!("{}", oakscript_compiler::disassemble(&program));
    Ok(())
}

// ---- Helpers ----

/// Read and validate a .oakc container file.
fn read_container(path: &str) -> Result<Program, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })?;

    Program::decode(&bytes).map_err(|e| {
        eprintln!("error: invalid container: {e}");
        2
    })
}

/// Run a program with the optional trace log attached.
fn execute(program: &Program) -> Result<(), i32> {
    let mut vm = Vm::new(program);

    let trace_file = match std::env::var(TRACE_ENV) {
        Ok(path) => Some(fs::File::create(&path).map_err(|e| {
            eprintln!("error: cannot open trace log '{path}': {e}");
            1
        })?),
        Err(_) => None,
    };
    if let Some(file) = trace_file {
        vm.set_trace(Box::new(file));
    }

    vm.run().map_err(|e| {
        eprintln!("runtime error: {e}");
        3
    })
}
