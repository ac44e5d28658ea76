//! Built-in function implementations.
//!
//! `REGISTRY` is indexed by the ids in
//! [`oakscript_common::builtins::BUILTINS`]; the two tables are kept in the
//! same order so the compiler's emitted ids resolve here directly. Arity is
//! checked by the caller against the shared descriptors; implementations
//! validate argument types.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use oakscript_common::Value;

use crate::error::{RuntimeError, RuntimeErrorKind};

/// A built-in: plain function over the popped argument slice.
pub(crate) type BuiltinImpl = fn(&[Value]) -> Result<Value, RuntimeError>;

/// Implementations, index-aligned with the descriptor table.
pub(crate) const REGISTRY: [BuiltinImpl; 22] = [
    bi_abs,
    bi_min,
    bi_max,
    bi_len,
    bi_upper,
    bi_lower,
    bi_trim,
    bi_startswith,
    bi_endswith,
    bi_contains,
    bi_parseint,
    bi_parsefloat,
    bi_str,
    bi_substr,
    bi_floor,
    bi_ceil,
    bi_sqrt,
    bi_exists,
    bi_readfile,
    bi_writefile,
    bi_appendfile,
    bi_time,
];

// ---- argument helpers ----

fn type_error(message: String) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::TypeError, message)
}

fn str_arg<'v>(args: &'v [Value], i: usize, name: &str) -> Result<&'v str, RuntimeError> {
    match &args[i] {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{name}: argument {} must be a string, got {}",
            i + 1,
            other.type_name()
        ))),
    }
}

fn int_arg(args: &[Value], i: usize, name: &str) -> Result<i64, RuntimeError> {
    match &args[i] {
        Value::Int(n) => Ok(*n),
        other => Err(type_error(format!(
            "{name}: argument {} must be an int, got {}",
            i + 1,
            other.type_name()
        ))),
    }
}

fn num_arg(args: &[Value], i: usize, name: &str) -> Result<f64, RuntimeError> {
    match &args[i] {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(type_error(format!(
            "{name}: argument {} must be a number, got {}",
            i + 1,
            other.type_name()
        ))),
    }
}

fn io_error(name: &str, path: &str, err: std::io::Error) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::IoError,
        format!("{name} '{path}': {err}"),
    )
}

// ---- numeric ----

fn bi_abs(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(type_error(format!("abs: got {}", other.type_name()))),
    }
}

fn bi_min(args: &[Value]) -> Result<Value, RuntimeError> {
    let a = num_arg(args, 0, "min")?;
    let b = num_arg(args, 1, "min")?;
    Ok(if b < a { args[1].clone() } else { args[0].clone() })
}

fn bi_max(args: &[Value]) -> Result<Value, RuntimeError> {
    let a = num_arg(args, 0, "max")?;
    let b = num_arg(args, 1, "max")?;
    Ok(if b > a { args[1].clone() } else { args[0].clone() })
}

fn bi_floor(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(f.floor() as i64)),
        other => Err(type_error(format!("floor: got {}", other.type_name()))),
    }
}

fn bi_ceil(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(f.ceil() as i64)),
        other => Err(type_error(format!("ceil: got {}", other.type_name()))),
    }
}

fn bi_sqrt(args: &[Value]) -> Result<Value, RuntimeError> {
    let n = num_arg(args, 0, "sqrt")?;
    Ok(Value::Float(n.sqrt()))
}

// ---- strings ----

fn bi_len(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "len")?;
    Ok(Value::Int(s.chars().count() as i64))
}

fn bi_upper(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(str_arg(args, 0, "upper")?.to_uppercase()))
}

fn bi_lower(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(str_arg(args, 0, "lower")?.to_lowercase()))
}

fn bi_trim(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(str_arg(args, 0, "trim")?.trim().to_string()))
}

fn bi_startswith(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "startswith")?;
    let prefix = str_arg(args, 1, "startswith")?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn bi_endswith(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "endswith")?;
    let suffix = str_arg(args, 1, "endswith")?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

fn bi_contains(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "contains")?;
    let needle = str_arg(args, 1, "contains")?;
    Ok(Value::Bool(s.contains(needle)))
}

fn bi_parseint(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "parseint")?;
    s.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| type_error(format!("parseint: cannot parse '{s}'")))
}

fn bi_parsefloat(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "parsefloat")?;
    s.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| type_error(format!("parsefloat: cannot parse '{s}'")))
}

fn bi_str(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(args[0].to_string()))
}

fn bi_substr(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = str_arg(args, 0, "substr")?;
    let start = int_arg(args, 1, "substr")?;
    let len = int_arg(args, 2, "substr")?;

    let total = s.chars().count() as i64;
    if start < 0 || start > total {
        return Err(RuntimeError::new(
            RuntimeErrorKind::IndexError,
            format!("substr: start {start} out of range for length {total}"),
        ));
    }
    if len < 0 {
        return Err(RuntimeError::new(
            RuntimeErrorKind::IndexError,
            format!("substr: negative length {len}"),
        ));
    }
    let out: String = s
        .chars()
        .skip(start as usize)
        .take(len as usize)
        .collect();
    Ok(Value::Str(out))
}

// ---- files and environment ----

fn bi_exists(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0, "exists")?;
    Ok(Value::Bool(Path::new(path).exists()))
}

fn bi_readfile(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0, "readfile")?;
    fs::read_to_string(path)
        .map(Value::Str)
        .map_err(|e| io_error("readfile", path, e))
}

fn bi_writefile(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0, "writefile")?;
    let content = args[1].to_string();
    fs::write(path, content).map_err(|e| io_error("writefile", path, e))?;
    Ok(Value::Nil)
}

fn bi_appendfile(args: &[Value]) -> Result<Value, RuntimeError> {
    let path = str_arg(args, 0, "appendfile")?;
    let content = args[1].to_string();
    let mut file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| io_error("appendfile", path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_error("appendfile", path, e))?;
    Ok(Value::Nil)
}

fn bi_time(_args: &[Value]) -> Result<Value, RuntimeError> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Int(secs))
}
