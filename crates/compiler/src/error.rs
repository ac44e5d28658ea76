//! Compile-stage errors: lexing, parsing, emission.

use thiserror::Error;

/// Errors from the tokenizer. Each carries the source line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },

    #[error("line {line}: invalid escape sequence '\\{escape}'")]
    InvalidEscape { line: u32, escape: char },

    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: u32 },

    #[error("line {line}: unknown character '{ch}'")]
    UnknownChar { line: u32, ch: char },

    #[error("line {line}: invalid number '{text}'")]
    InvalidNumber { line: u32, text: String },

    #[error("line {line}: malformed #include directive")]
    MalformedInclude { line: u32 },

    #[error("line {line}: cannot read include '{path}': {reason}")]
    IncludeNotFound {
        line: u32,
        path: String,
        reason: String,
    },

    #[error("line {line}: include cycle through '{path}'")]
    IncludeCycle { line: u32, path: String },
}

/// Errors from the parser: the token stream did not match the grammar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: unexpected {found}, expected {expected}")]
    UnexpectedToken {
        line: u32,
        found: String,
        expected: &'static str,
    },
}

/// Errors from the emitter: the program is grammatical but not emittable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("line {line}: break outside of a loop")]
    BreakOutsideLoop { line: u32 },

    #[error("line {line}: continue outside of a loop")]
    ContinueOutsideLoop { line: u32 },

    #[error("line {line}: return outside of a function")]
    ReturnOutsideFunction { line: u32 },

    #[error("line {line}: constant '{name}' is already defined")]
    ConstRedefined { line: u32, name: String },

    #[error("line {line}: cannot assign to constant '{name}'")]
    ConstReassigned { line: u32, name: String },

    #[error("line {line}: call to undefined function '{name}'")]
    UndefinedFunction { line: u32, name: String },

    #[error("line {line}: function '{name}' is already defined")]
    DuplicateFunction { line: u32, name: String },

    #[error("line {line}: '{name}' takes {expected} arguments, {found} given")]
    ArityMismatch {
        line: u32,
        name: String,
        expected: u8,
        found: usize,
    },

    #[error("line {line}: function definitions cannot be nested")]
    NestedFunction { line: u32 },

    /// Internal invariant: every label must be bound by the end of
    /// emission.
    #[error("label {label} was never bound")]
    UnboundLabel { label: usize },
}

/// Any failure while turning source text into a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}
