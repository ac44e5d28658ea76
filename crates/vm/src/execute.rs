//! Main execution loop and opcode dispatch for the OakScript VM.

use std::io::Write;
use std::sync::atomic::Ordering;

use oakscript_common::{builtins, Opcode, Value};

use crate::builtins::REGISTRY;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::machine::{CallFrame, HandlerFrame, HandlerKind, Vm};

/// What the dispatch loop should do after one instruction.
enum Flow {
    Continue,
    Halt,
}

impl<'a> Vm<'a> {
    /// Execute the program until HALT, end of code, or an unhandled error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            // Cooperative cancellation, checked between instructions.
            if self.abort.load(Ordering::Relaxed) && !self.aborting {
                self.aborting = true;
                self.unwind_abort()?;
                continue;
            }
            if self.pc >= self.program.code.len() {
                return Ok(());
            }
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => return Ok(()),
                Err(mut err) => {
                    if err.line == 0 {
                        err.line = self.line;
                    }
                    self.handle_error(err)?;
                }
            }
        }
    }

    /// Route a raised error: enter the nearest handler frame, or surface
    /// the error when none applies.
    fn handle_error(&mut self, err: RuntimeError) -> Result<(), RuntimeError> {
        // While aborting, anything raised inside a finally block folds
        // into the abort unwind.
        if self.aborting || err.kind == RuntimeErrorKind::Abort {
            self.aborting = true;
            return self.unwind_abort();
        }
        if !err.kind.is_catchable() {
            return Err(err);
        }
        match self.handlers.pop() {
            Some(handler) => {
                self.enter_handler(handler, err.catch_value())?;
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Abort skips catch frames and runs each finally frame once; with no
    /// finally frames left, the VM halts.
    fn unwind_abort(&mut self) -> Result<(), RuntimeError> {
        while let Some(handler) = self.handlers.pop() {
            if handler.kind == HandlerKind::Finally {
                // The nil stands in for the value the epilogue THROW pops.
                return self.enter_handler(handler, Value::Nil);
            }
        }
        let mut err = RuntimeError::new(RuntimeErrorKind::Abort, "execution aborted by host");
        err.line = self.line;
        Err(err)
    }

    /// Restore the depths recorded at `try` entry, push the error value,
    /// and resume at the handler's address.
    fn enter_handler(
        &mut self,
        handler: HandlerFrame,
        value: Value,
    ) -> Result<(), RuntimeError> {
        self.stack.truncate(handler.stack_depth);
        self.frames.truncate(handler.call_depth);
        self.push(value)?;
        self.pc = handler.catch_pc;
        Ok(())
    }

    /// Fetch, decode, and execute one instruction.
    fn step(&mut self) -> Result<Flow, RuntimeError> {
        let at = self.pc;
        let byte = self.program.code[at];
        let op = Opcode::from_byte(byte).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidProgram,
                format!("invalid opcode 0x{byte:02x} at offset {at}"),
            )
        })?;

        if let Some(trace) = &mut self.trace {
            let top = match self.stack.last() {
                Some(v) => v.to_string(),
                None => "-".to_string(),
            };
            let _ = writeln!(trace, "{at:04} {:<14} {top}", op.mnemonic());
        }

        self.pc = at + 1;
        match op {
            // Constants
            Opcode::PushInt => {
                let v = self.imm_i64()?;
                self.push(Value::Int(v))?;
            }
            Opcode::PushFloat => {
                let v = self.imm_f64()?;
                self.push(Value::Float(v))?;
            }
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,
            Opcode::PushNil => self.push(Value::Nil)?,
            Opcode::LoadConstStr => {
                let idx = self.imm_u32()?;
                let s = self.string_at(idx)?;
                self.push(Value::Str(s.to_string()))?;
            }

            // Variables
            Opcode::Load => {
                let name = self.name_imm()?;
                let value = self.load_var(name)?;
                self.push(value)?;
            }
            Opcode::Store => {
                let name = self.name_imm()?;
                let value = self.pop()?;
                self.store_var(name, value)?;
            }
            Opcode::StoreLocal => {
                let name = self.name_imm()?;
                let value = self.pop()?;
                self.store_scoped(name, value, false);
            }
            Opcode::StoreConst => {
                let name = self.name_imm()?;
                let value = self.pop()?;
                self.store_scoped(name, value, true);
            }
            Opcode::Delete => {
                let name = self.name_imm()?;
                self.delete_var(name)?;
            }

            // Arithmetic and comparison
            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                let v = add_values(a, b)?;
                self.push(v)?;
            }
            Opcode::Sub => self.exec_numeric(i64::wrapping_sub, |a, b| a - b, "subtract")?,
            Opcode::Mul => self.exec_numeric(i64::wrapping_mul, |a, b| a * b, "multiply")?,
            Opcode::Div => self.exec_div()?,
            Opcode::Mod => self.exec_mod()?,
            Opcode::Neg => {
                let v = self.pop()?;
                let negated = match v {
                    Value::Int(n) => Value::Int(n.wrapping_neg()),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::TypeError,
                            format!("cannot negate {}", other.type_name()),
                        ))
                    }
                };
                self.push(negated)?;
            }
            Opcode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a == b))?;
            }
            Opcode::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a != b))?;
            }
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let b = self.pop()?;
                let a = self.pop()?;
                let v = compare_values(op, a, b)?;
                self.push(Value::Bool(v))?;
            }

            // Logic
            Opcode::And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.is_truthy() && b.is_truthy()))?;
            }
            Opcode::Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.is_truthy() || b.is_truthy()))?;
            }
            Opcode::Not => {
                let v = self.pop()?;
                self.push(Value::Bool(!v.is_truthy()))?;
            }

            // Control flow
            Opcode::Jump => {
                self.pc = self.imm_u32()? as usize;
            }
            Opcode::JumpIfFalse => {
                let target = self.imm_u32()? as usize;
                if !self.pop()?.is_truthy() {
                    self.pc = target;
                }
            }
            Opcode::JumpIfTrue => {
                let target = self.imm_u32()? as usize;
                if self.pop()?.is_truthy() {
                    self.pc = target;
                }
            }

            // Calls
            Opcode::CallBuiltin => {
                let id = self.imm_u16()?;
                let argc = self.imm_u8()? as usize;
                self.exec_call_builtin(id, argc)?;
            }
            Opcode::CallUser => {
                let addr = self.imm_u32()? as usize;
                let argc = self.imm_u8()? as usize;
                self.exec_call_user(addr, argc)?;
            }
            Opcode::Return => {
                let has_value = self.imm_u8()? != 0;
                self.exec_return(has_value)?;
            }

            // Exceptions
            Opcode::PushHandler => {
                let kind = match self.imm_u8()? {
                    0 => HandlerKind::Catch,
                    1 => HandlerKind::Finally,
                    other => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::InvalidProgram,
                            format!("invalid handler kind {other}"),
                        ))
                    }
                };
                let catch_pc = self.imm_u32()? as usize;
                self.handlers.push(HandlerFrame {
                    catch_pc,
                    kind,
                    stack_depth: self.stack.len(),
                    call_depth: self.frames.len(),
                });
            }
            Opcode::PopHandler => {
                if self.handlers.pop().is_none() {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::InvalidProgram,
                        "POP_HANDLER with no handler",
                    ));
                }
            }
            Opcode::Throw => {
                let value = self.pop()?;
                if self.aborting {
                    // Finally epilogue rethrow during abort: keep aborting.
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Abort,
                        "execution aborted by host",
                    ));
                }
                return Err(RuntimeError::thrown(value));
            }

            // Utility
            Opcode::Print => {
                let value = self.pop()?;
                writeln!(self.out, "{value}").map_err(|e| {
                    RuntimeError::new(RuntimeErrorKind::IoError, format!("print: {e}"))
                })?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let top = match self.stack.last() {
                    Some(v) => v.clone(),
                    None => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::InvalidProgram,
                            "DUP on empty stack",
                        ))
                    }
                };
                self.push(top)?;
            }
            Opcode::Index => {
                let index = self.pop()?;
                let target = self.pop()?;
                let v = index_value(target, index)?;
                self.push(v)?;
            }
            Opcode::Line => {
                self.line = self.imm_u32()?;
            }

            Opcode::Halt => return Ok(Flow::Halt),
        }
        Ok(Flow::Continue)
    }

    // ---- immediates ----

    fn imm_bytes<const N: usize>(&mut self) -> Result<[u8; N], RuntimeError> {
        let end = self.pc + N;
        if end > self.program.code.len() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidProgram,
                "truncated instruction",
            ));
        }
        let bytes: [u8; N] = self.program.code[self.pc..end].try_into().unwrap();
        self.pc = end;
        Ok(bytes)
    }

    fn imm_u8(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.imm_bytes::<1>()?[0])
    }

    fn imm_u16(&mut self) -> Result<u16, RuntimeError> {
        Ok(u16::from_le_bytes(self.imm_bytes::<2>()?))
    }

    fn imm_u32(&mut self) -> Result<u32, RuntimeError> {
        Ok(u32::from_le_bytes(self.imm_bytes::<4>()?))
    }

    fn imm_i64(&mut self) -> Result<i64, RuntimeError> {
        Ok(i64::from_le_bytes(self.imm_bytes::<8>()?))
    }

    fn imm_f64(&mut self) -> Result<f64, RuntimeError> {
        Ok(f64::from_le_bytes(self.imm_bytes::<8>()?))
    }

    /// A u32 immediate naming a data-section string.
    fn name_imm(&mut self) -> Result<&'a str, RuntimeError> {
        let idx = self.imm_u32()?;
        self.string_at(idx)
    }

    // ---- compound operations ----

    fn exec_numeric(
        &mut self,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
        verb: &str,
    ) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let v = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(x, y)),
            (Value::Int(x), Value::Float(y)) => Value::Float(float_op(x as f64, y)),
            (Value::Float(x), Value::Int(y)) => Value::Float(float_op(x, y as f64)),
            (Value::Float(x), Value::Float(y)) => Value::Float(float_op(x, y)),
            (a, b) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::TypeError,
                    format!("cannot {verb} {} and {}", a.type_name(), b.type_name()),
                ))
            }
        };
        self.push(v)
    }

    fn exec_div(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let v = match (a, b) {
            // Integer division truncates toward zero and traps on zero.
            (Value::Int(_), Value::Int(0)) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::DivisionByZero,
                    "integer division by zero",
                ))
            }
            (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_div(y)),
            // Float division follows IEEE-754, infinities included.
            (Value::Int(x), Value::Float(y)) => Value::Float(x as f64 / y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x / y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x / y),
            (a, b) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::TypeError,
                    format!("cannot divide {} and {}", a.type_name(), b.type_name()),
                ))
            }
        };
        self.push(v)
    }

    fn exec_mod(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let v = match (a, b) {
            (Value::Int(_), Value::Int(0)) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::DivisionByZero,
                    "integer modulo by zero",
                ))
            }
            // wrapping_rem keeps the dividend's sign.
            (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_rem(y)),
            (Value::Int(x), Value::Float(y)) => Value::Float(x as f64 % y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x % y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x % y),
            (a, b) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::TypeError,
                    format!("cannot take {} modulo {}", a.type_name(), b.type_name()),
                ))
            }
        };
        self.push(v)
    }

    fn exec_call_builtin(&mut self, id: u16, argc: usize) -> Result<(), RuntimeError> {
        let spec = builtins::spec_for(id).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::NameError,
                format!("unknown builtin id {id}"),
            )
        })?;
        if argc < spec.min_arity as usize || argc > spec.max_arity as usize {
            return Err(RuntimeError::new(
                RuntimeErrorKind::TypeError,
                format!(
                    "{} takes {} to {} arguments, {argc} given",
                    spec.name, spec.min_arity, spec.max_arity
                ),
            ));
        }
        if self.stack.len() < argc {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidProgram,
                "call with missing arguments",
            ));
        }
        let args = self.stack.split_off(self.stack.len() - argc);
        let result = REGISTRY[id as usize](&args)?;
        self.push(result)
    }

    fn exec_call_user(&mut self, addr: usize, argc: usize) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.call_limit {
            return Err(RuntimeError::new(
                RuntimeErrorKind::CallStackOverflow,
                format!("call depth exceeded {} frames", self.call_limit),
            ));
        }
        if self.stack.len() < argc {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidProgram,
                "call with missing arguments",
            ));
        }
        self.frames.push(CallFrame {
            return_pc: self.pc,
            locals: Default::default(),
            saved_stack_depth: self.stack.len() - argc,
        });
        self.pc = addr;
        Ok(())
    }

    fn exec_return(&mut self, has_value: bool) -> Result<(), RuntimeError> {
        let frame = self.frames.pop().ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::InvalidProgram, "RETURN outside a call")
        })?;
        let value = if has_value { self.pop()? } else { Value::Nil };
        self.stack.truncate(frame.saved_stack_depth);
        self.push(value)?;
        self.pc = frame.return_pc;
        // Handlers registered inside the finished call are dead.
        while self
            .handlers
            .last()
            .is_some_and(|h| h.call_depth > self.frames.len())
        {
            self.handlers.pop();
        }
        Ok(())
    }
}

/// `+` adds numbers or concatenates when either side is a string, coercing
/// the other side to its print form.
fn add_values(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f64 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + y as f64)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        (Value::Str(x), b) => Ok(Value::Str(format!("{x}{b}"))),
        (a, Value::Str(y)) => Ok(Value::Str(format!("{a}{y}"))),
        (a, b) => Err(RuntimeError::new(
            RuntimeErrorKind::TypeError,
            format!("cannot add {} and {}", a.type_name(), b.type_name()),
        )),
    }
}

/// Ordering for `< <= > >=`: numeric with Int-to-Float promotion, or
/// byte-lexicographic for strings.
fn compare_values(op: Opcode, a: Value, b: Value) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering;

    let ord = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        _ => {
            return Err(RuntimeError::new(
                RuntimeErrorKind::TypeError,
                format!("cannot compare {} and {}", a.type_name(), b.type_name()),
            ))
        }
    };

    // NaN comparisons are false across the board, per IEEE-754.
    Ok(match op {
        Opcode::Lt => ord == Some(Ordering::Less),
        Opcode::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        Opcode::Gt => ord == Some(Ordering::Greater),
        Opcode::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        _ => unreachable!("caller dispatches only ordering opcodes"),
    })
}

/// `s[i]`: one-character string at a character position.
fn index_value(target: Value, index: Value) -> Result<Value, RuntimeError> {
    match (&target, &index) {
        (Value::Str(s), Value::Int(i)) => {
            if *i < 0 {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::IndexError,
                    format!("index {i} out of range"),
                ));
            }
            match s.chars().nth(*i as usize) {
                Some(c) => Ok(Value::Str(c.to_string())),
                None => Err(RuntimeError::new(
                    RuntimeErrorKind::IndexError,
                    format!("index {i} out of range for length {}", s.chars().count()),
                )),
            }
        }
        _ => Err(RuntimeError::new(
            RuntimeErrorKind::TypeError,
            format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ),
        )),
    }
}
