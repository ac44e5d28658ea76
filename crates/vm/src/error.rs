//! Runtime errors raised by the OakScript VM.

use std::fmt;

use oakscript_common::Value;
use thiserror::Error;

/// Classifies a runtime failure. Catchable kinds can be intercepted by a
/// script's `try`/`catch`; fatal kinds tear the VM down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Operand or argument types don't fit the operation.
    TypeError,
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// Unknown variable or built-in id.
    NameError,
    /// String index out of range.
    IndexError,
    /// A file built-in failed at the OS level.
    IoError,
    /// Operand stack exceeded its depth limit. Fatal.
    StackOverflow,
    /// Call stack exceeded its depth limit. Fatal.
    CallStackOverflow,
    /// Malformed code section: bad opcode, truncated immediates, bad
    /// indices. Fatal.
    InvalidProgram,
    /// A script `throw`; carries the thrown value.
    UserThrown,
    /// The host set the abort flag. Fatal, but `finally` blocks run.
    Abort,
}

impl RuntimeErrorKind {
    /// Whether a script-level `try`/`catch` may intercept this error.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            RuntimeErrorKind::StackOverflow
                | RuntimeErrorKind::CallStackOverflow
                | RuntimeErrorKind::InvalidProgram
                | RuntimeErrorKind::Abort
        )
    }
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeErrorKind::TypeError => "type error",
            RuntimeErrorKind::DivisionByZero => "division by zero",
            RuntimeErrorKind::NameError => "name error",
            RuntimeErrorKind::IndexError => "index error",
            RuntimeErrorKind::IoError => "io error",
            RuntimeErrorKind::StackOverflow => "stack overflow",
            RuntimeErrorKind::CallStackOverflow => "call stack overflow",
            RuntimeErrorKind::InvalidProgram => "invalid program",
            RuntimeErrorKind::UserThrown => "uncaught throw",
            RuntimeErrorKind::Abort => "aborted",
        };
        f.write_str(name)
    }
}

/// A runtime failure: kind, human-readable message, and the source line
/// the VM was executing (0 before any `LINE` marker).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message} (line {line})")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub line: u32,
    /// The value a `catch` receives. `Some` for `throw`, derived from the
    /// message otherwise.
    pub value: Option<Value>,
}

impl RuntimeError {
    /// Build an error with no line attached; the dispatch loop fills the
    /// current line in before surfacing it.
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: 0,
            value: None,
        }
    }

    /// The error a `throw` statement raises.
    pub fn thrown(value: Value) -> Self {
        Self {
            kind: RuntimeErrorKind::UserThrown,
            message: value.to_string(),
            line: 0,
            value: Some(value),
        }
    }

    /// The value pushed for a `catch` block to observe.
    pub fn catch_value(&self) -> Value {
        match &self.value {
            Some(v) => v.clone(),
            None => Value::Str(format!("{}: {}", self.kind, self.message)),
        }
    }
}
