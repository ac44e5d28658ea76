//! OakScript virtual machine — executes compiled bytecode.
//!
//! The VM is a stack machine with:
//! - an operand stack (bounded, default 1024 slots)
//! - a flat globals table plus per-call local frames
//! - a call stack for user procedures (bounded, default 256 frames)
//! - an exception-handler stack driving `try`/`catch`/`finally`
//! - a built-in registry shared with the compiler by id
//!
//! One `Vm` runs one program to completion; it is single-threaded and not
//! reentrant. The host can cancel cooperatively through
//! [`Vm::abort_handle`].
//!
//! # Usage
//!
//! ```
//! use oakscript_compiler::compile;
//! use oakscript_vm::Vm;
//!
//! let program = compile("x = 6 * 7").unwrap();
//! let mut vm = Vm::new(&program);
//! vm.run().unwrap();
//! ```

pub mod builtins;
pub mod error;
pub mod execute;
pub mod machine;

pub use error::{RuntimeError, RuntimeErrorKind};
pub use machine::Vm;

use oakscript_common::Program;

/// Execute a program, printing to stdout.
///
/// # Errors
///
/// Returns [`RuntimeError`] when execution fails with no handler in place
/// (type errors, division by zero, stack overflow, ...).
pub fn run(program: &Program) -> Result<(), RuntimeError> {
    Vm::new(program).run()
}
