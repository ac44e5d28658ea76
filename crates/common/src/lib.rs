//! OakScript common types: values, opcodes, and the bytecode container.
//!
//! This crate provides the data model shared by the compiler and the VM:
//!
//! - [`Value`] — the dynamically typed runtime value
//! - [`Opcode`] — the instruction set, one byte plus fixed-width immediates
//! - [`Program`] — code section + string pool, with container encode/decode
//! - [`builtins`] — the built-in descriptor table (ids, names, arities)
//! - [`ContainerError`] — loader validation errors
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod builtins;
pub mod error;
pub mod opcode;
pub mod program;
pub mod value;

// Re-export commonly used types at the crate root.
pub use error::ContainerError;
pub use opcode::Opcode;
pub use program::Program;
pub use value::Value;
