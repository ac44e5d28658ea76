//! Recursive-descent parser driving the emitter.
//!
//! One token of lookahead, no syntax tree: every grammar production emits
//! its bytecode as it is recognized. The token buffer makes one exception
//! possible — a `finally` block's token range is replayed so the block can
//! be emitted on both the normal and the unwinding exit path.
//!
//! Invariants the productions maintain:
//! - an expression leaves exactly one value on the operand stack;
//! - a statement leaves the stack at the depth it found it.

use oakscript_common::{builtins, Opcode, Program};

use crate::emitter::{Emitter, FunctionSym, Label, HANDLER_CATCH, HANDLER_FINALLY};
use crate::error::{CompileError, EmitError, ParseError};
use crate::token::{Token, TokenKind};

/// Labels an enclosing loop for `break`/`continue`.
struct LoopCtx {
    continue_label: Label,
    break_label: Label,
    /// Handler count at loop entry; a `break` pops anything above it.
    handler_base: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    emit: Emitter,
    loops: Vec<LoopCtx>,
    in_function: bool,
    /// Handler frames opened by enclosing `try` statements. `break`,
    /// `continue`, and `return` must pop the ones they jump out of.
    open_handlers: usize,
    /// `open_handlers` at the current function's body start.
    fn_handler_base: usize,
    /// Counter for compiler-generated hidden variables (`$for0.limit`...).
    hidden: u32,
}

/// Parse a token stream into a compiled program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        emit: Emitter::new(),
        loops: Vec::new(),
        in_function: false,
        open_handlers: 0,
        fn_handler_base: 0,
        hidden: 0,
    };
    parser.program()?;
    Ok(parser.emit.finish()?)
}

impl Parser {
    // ---- token cursor ----

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let at = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[at].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), ParseError> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(String, u32), ParseError> {
        let line = self.line();
        match self.peek() {
            TokenKind::Ident(_) => {
                let TokenKind::Ident(name) = self.advance() else {
                    unreachable!();
                };
                Ok((name, line))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::UnexpectedToken {
            line: self.line(),
            found: self.peek().to_string(),
            expected,
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    /// Consume a statement terminator: one or more newlines, or a block
    /// boundary the caller will handle.
    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            TokenKind::Newline => {
                self.skip_newlines();
                Ok(())
            }
            TokenKind::Eof
            | TokenKind::End
            | TokenKind::Else
            | TokenKind::Case
            | TokenKind::Default
            | TokenKind::Catch
            | TokenKind::Finally => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    // ---- program and blocks ----

    fn program(&mut self) -> Result<(), CompileError> {
        loop {
            self.skip_newlines();
            if matches!(self.peek(), TokenKind::Eof) {
                return Ok(());
            }
            self.statement()?;
            self.end_of_statement()?;
        }
    }

    /// Parse statements until one of `stops` (or end of input, which the
    /// caller turns into a missing-terminator error).
    fn block(&mut self, stops: &[TokenKind]) -> Result<(), CompileError> {
        loop {
            self.skip_newlines();
            if stops.contains(self.peek()) || matches!(self.peek(), TokenKind::Eof) {
                return Ok(());
            }
            self.statement()?;
            self.end_of_statement()?;
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<(), CompileError> {
        self.emit.line(self.line());
        match self.peek() {
            TokenKind::Print => self.print_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::Function => self.function_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Break => self.break_stmt(),
            TokenKind::Continue => self.continue_stmt(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Throw => self.throw_stmt(),
            TokenKind::Const => self.const_stmt(),
            TokenKind::Ident(_)
                if matches!(
                    self.peek_at(1),
                    TokenKind::Assign
                        | TokenKind::PlusAssign
                        | TokenKind::MinusAssign
                        | TokenKind::StarAssign
                        | TokenKind::SlashAssign
                        | TokenKind::PlusPlus
                        | TokenKind::MinusMinus
                ) =>
            {
                self.assign_stmt()
            }
            _ => {
                // Bare expression, usually a call; the value is discarded.
                self.expression()?;
                self.emit.op(Opcode::Pop);
                Ok(())
            }
        }
    }

    fn assign_stmt(&mut self) -> Result<(), CompileError> {
        let (name, line) = self.expect_ident("a variable name")?;
        if self.emit.is_const(&name) {
            return Err(EmitError::ConstReassigned { line, name }.into());
        }
        let op = self.advance();
        match op {
            TokenKind::Assign => {
                self.expression()?;
            }
            TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign => {
                self.emit.name_op(Opcode::Load, &name);
                self.expression()?;
                self.emit.op(match op {
                    TokenKind::PlusAssign => Opcode::Add,
                    TokenKind::MinusAssign => Opcode::Sub,
                    TokenKind::StarAssign => Opcode::Mul,
                    _ => Opcode::Div,
                });
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                self.emit.name_op(Opcode::Load, &name);
                self.emit.push_int(1);
                self.emit.op(if op == TokenKind::PlusPlus {
                    Opcode::Add
                } else {
                    Opcode::Sub
                });
            }
            _ => unreachable!("statement() checked the lookahead"),
        }
        self.emit.name_op(Opcode::Store, &name);
        Ok(())
    }

    fn const_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        let (name, line) = self.expect_ident("a constant name")?;
        self.expect(TokenKind::Assign, "'='")?;
        self.expression()?;
        self.emit.define_const(&name, line)?;
        self.emit.name_op(Opcode::StoreConst, &name);
        Ok(())
    }

    fn print_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expression()?;
        self.emit.op(Opcode::Print);
        Ok(())
    }

    fn if_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expression()?;
        self.expect(TokenKind::Then, "'then'")?;

        let else_label = self.emit.new_label();
        self.emit.jump(Opcode::JumpIfFalse, else_label);
        self.block(&[TokenKind::Else, TokenKind::End])?;

        if self.eat(&TokenKind::Else) {
            let end_label = self.emit.new_label();
            self.emit.jump(Opcode::Jump, end_label);
            self.emit.bind(else_label);
            self.block(&[TokenKind::End])?;
            self.emit.bind(end_label);
        } else {
            self.emit.bind(else_label);
        }
        self.expect(TokenKind::End, "'end'")?;
        Ok(())
    }

    fn while_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        let top = self.emit.new_label();
        let end = self.emit.new_label();

        self.emit.bind(top);
        self.expression()?;
        self.eat(&TokenKind::Do);
        self.emit.jump(Opcode::JumpIfFalse, end);

        self.loops.push(LoopCtx {
            continue_label: top,
            break_label: end,
            handler_base: self.open_handlers,
        });
        let body = self.block(&[TokenKind::End]);
        self.loops.pop();
        body?;

        self.emit.jump(Opcode::Jump, top);
        self.emit.bind(end);
        self.expect(TokenKind::End, "'end'")?;
        Ok(())
    }

    fn for_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        let (name, _) = self.expect_ident("a loop variable")?;

        let n = self.hidden;
        self.hidden += 1;
        let limit = format!("$for{n}.limit");
        let step = format!("$for{n}.step");

        // Initial value, bound, and step each evaluate exactly once, the
        // latter two into hidden locals.
        match self.peek().clone() {
            TokenKind::Assign => {
                self.advance();
                self.expression()?;
                self.emit.name_op(Opcode::StoreLocal, &name);
                self.expect(TokenKind::To, "'to'")?;
                self.expression()?;
                self.emit.name_op(Opcode::StoreLocal, &limit);
                if self.eat(&TokenKind::Step) {
                    self.expression()?;
                } else {
                    self.emit.push_int(1);
                }
                self.emit.name_op(Opcode::StoreLocal, &step);
            }
            TokenKind::In => {
                self.advance();
                self.expression()?;
                self.emit.name_op(Opcode::StoreLocal, &name);
                self.expect(TokenKind::DotDot, "'..'")?;
                self.expression()?;
                self.emit.name_op(Opcode::StoreLocal, &limit);
                self.emit.push_int(1);
                self.emit.name_op(Opcode::StoreLocal, &step);
            }
            _ => return Err(self.unexpected("'=' or 'in'").into()),
        }
        self.eat(&TokenKind::Do);

        let top = self.emit.new_label();
        let cont = self.emit.new_label();
        let end = self.emit.new_label();

        // (step >= 0 and i <= limit) or (step < 0 and i >= limit)
        self.emit.bind(top);
        self.emit.name_op(Opcode::Load, &step);
        self.emit.push_int(0);
        self.emit.op(Opcode::Ge);
        self.emit.name_op(Opcode::Load, &name);
        self.emit.name_op(Opcode::Load, &limit);
        self.emit.op(Opcode::Le);
        self.emit.op(Opcode::And);
        self.emit.name_op(Opcode::Load, &step);
        self.emit.push_int(0);
        self.emit.op(Opcode::Lt);
        self.emit.name_op(Opcode::Load, &name);
        self.emit.name_op(Opcode::Load, &limit);
        self.emit.op(Opcode::Ge);
        self.emit.op(Opcode::And);
        self.emit.op(Opcode::Or);
        self.emit.jump(Opcode::JumpIfFalse, end);

        self.loops.push(LoopCtx {
            continue_label: cont,
            break_label: end,
            handler_base: self.open_handlers,
        });
        let body = self.block(&[TokenKind::End]);
        self.loops.pop();
        body?;

        self.emit.bind(cont);
        self.emit.name_op(Opcode::Load, &name);
        self.emit.name_op(Opcode::Load, &step);
        self.emit.op(Opcode::Add);
        self.emit.name_op(Opcode::Store, &name);
        self.emit.jump(Opcode::Jump, top);
        self.emit.bind(end);
        self.expect(TokenKind::End, "'end'")?;
        Ok(())
    }

    fn switch_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expression()?;
        let n = self.hidden;
        self.hidden += 1;
        let scrutinee = format!("$switch{n}");
        self.emit.name_op(Opcode::StoreLocal, &scrutinee);

        let end = self.emit.new_label();
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Case => {
                    self.advance();
                    self.emit.name_op(Opcode::Load, &scrutinee);
                    self.expression()?;
                    self.emit.op(Opcode::Eq);
                    let next = self.emit.new_label();
                    self.emit.jump(Opcode::JumpIfFalse, next);
                    self.block(&[TokenKind::Case, TokenKind::Default, TokenKind::End])?;
                    self.emit.jump(Opcode::Jump, end);
                    self.emit.bind(next);
                }
                TokenKind::Default => {
                    self.advance();
                    self.block(&[TokenKind::End])?;
                }
                TokenKind::End => break,
                _ => return Err(self.unexpected("'case', 'default', or 'end'").into()),
            }
        }
        self.emit.bind(end);
        self.expect(TokenKind::End, "'end'")?;
        Ok(())
    }

    fn function_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        if self.in_function {
            return Err(EmitError::NestedFunction { line }.into());
        }
        self.advance();
        let (name, name_line) = self.expect_ident("a function name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !matches!(self.peek(), TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident("a parameter name")?;
                if params.len() == u8::MAX as usize {
                    return Err(self.unexpected("at most 255 parameters").into());
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let skip = self.emit.new_label();
        self.emit.jump(Opcode::Jump, skip);

        let sym = FunctionSym {
            addr: self.emit.here(),
            arity: params.len() as u8,
        };
        self.emit.define_function(&name, sym, name_line)?;

        // Arguments sit on the stack in call order; bind them in reverse.
        for param in params.iter().rev() {
            self.emit.name_op(Opcode::StoreLocal, param);
        }

        self.in_function = true;
        let saved_base = self.fn_handler_base;
        self.fn_handler_base = self.open_handlers;
        let body = self.block(&[TokenKind::End]);
        self.in_function = false;
        self.fn_handler_base = saved_base;
        body?;
        self.expect(TokenKind::End, "'end'")?;

        self.emit.ret(false);
        self.emit.bind(skip);
        Ok(())
    }

    fn return_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        if !self.in_function {
            return Err(EmitError::ReturnOutsideFunction { line }.into());
        }
        self.advance();
        if matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::End
                | TokenKind::Else
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Catch
                | TokenKind::Finally
        ) {
            self.close_handlers(self.fn_handler_base);
            self.emit.ret(false);
        } else {
            self.expression()?;
            self.close_handlers(self.fn_handler_base);
            self.emit.ret(true);
        }
        Ok(())
    }

    fn break_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        self.advance();
        let Some(ctx) = self.loops.last() else {
            return Err(EmitError::BreakOutsideLoop { line }.into());
        };
        let label = ctx.break_label;
        let base = ctx.handler_base;
        self.close_handlers(base);
        self.emit.jump(Opcode::Jump, label);
        Ok(())
    }

    fn continue_stmt(&mut self) -> Result<(), CompileError> {
        let line = self.line();
        self.advance();
        let Some(ctx) = self.loops.last() else {
            return Err(EmitError::ContinueOutsideLoop { line }.into());
        };
        let label = ctx.continue_label;
        let base = ctx.handler_base;
        self.close_handlers(base);
        self.emit.jump(Opcode::Jump, label);
        Ok(())
    }

    /// Pop the handler frames a jump would otherwise abandon: everything
    /// opened between `base` and here.
    fn close_handlers(&mut self, base: usize) {
        for _ in base..self.open_handlers {
            self.emit.op(Opcode::PopHandler);
        }
    }

    fn throw_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.expression()?;
        self.emit.op(Opcode::Throw);
        Ok(())
    }

    fn try_stmt(&mut self) -> Result<(), CompileError> {
        self.advance();
        let (has_catch, has_finally) = self.scan_try_clauses();
        if !has_catch && !has_finally {
            return Err(self.unexpected("a try block with catch or finally").into());
        }

        // Layered handlers: the finally handler sits below the catch
        // handler, so it still fires when the catch body itself throws.
        let finally_label = has_finally.then(|| self.emit.new_label());
        let catch_label = has_catch.then(|| self.emit.new_label());
        if let Some(label) = finally_label {
            self.emit.push_handler(HANDLER_FINALLY, label);
            self.open_handlers += 1;
        }
        if let Some(label) = catch_label {
            self.emit.push_handler(HANDLER_CATCH, label);
            self.open_handlers += 1;
        }

        self.block(&[TokenKind::Catch, TokenKind::Finally, TokenKind::End])?;

        if let Some(label) = catch_label {
            self.emit.op(Opcode::PopHandler);
            self.open_handlers -= 1;
            let after_catch = self.emit.new_label();
            self.emit.jump(Opcode::Jump, after_catch);

            self.expect(TokenKind::Catch, "'catch'")?;
            self.emit.bind(label);
            // The raised value is on the stack: bind it or drop it.
            if matches!(self.peek(), TokenKind::Ident(_)) {
                let (name, _) = self.expect_ident("a catch variable")?;
                self.emit.name_op(Opcode::StoreLocal, &name);
            } else {
                self.emit.op(Opcode::Pop);
            }
            self.block(&[TokenKind::Finally, TokenKind::End])?;
            self.emit.bind(after_catch);
        }

        if let Some(label) = finally_label {
            self.expect(TokenKind::Finally, "'finally'")?;
            self.emit.op(Opcode::PopHandler);
            self.open_handlers -= 1;

            // Clone the block into both exit paths by replaying its tokens:
            // once for normal completion, once for the unwind path, which
            // rethrows the in-flight value when the block is done.
            let start = self.pos;
            self.block(&[TokenKind::End])?;
            let done = self.emit.new_label();
            self.emit.jump(Opcode::Jump, done);

            self.emit.bind(label);
            self.pos = start;
            self.block(&[TokenKind::End])?;
            self.emit.op(Opcode::Throw);
            self.emit.bind(done);
        }

        self.expect(TokenKind::End, "'end'")?;
        Ok(())
    }

    /// Look ahead (without consuming) to find which clauses this `try`
    /// carries; the handler frames must be pushed before the body.
    fn scan_try_clauses(&self) -> (bool, bool) {
        let mut depth = 0usize;
        let mut has_catch = false;
        let mut has_finally = false;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Switch
                | TokenKind::Function
                | TokenKind::Try => depth += 1,
                TokenKind::End => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Catch if depth == 0 => has_catch = true,
                TokenKind::Finally if depth == 0 => has_finally = true,
                TokenKind::Eof => break,
                _ => {}
            }
        }
        (has_catch, has_finally)
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<(), CompileError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<(), CompileError> {
        self.or_expr()?;
        if self.eat(&TokenKind::Question) {
            let else_label = self.emit.new_label();
            let end_label = self.emit.new_label();
            self.emit.jump(Opcode::JumpIfFalse, else_label);
            self.ternary()?;
            self.expect(TokenKind::Colon, "':'")?;
            self.emit.jump(Opcode::Jump, end_label);
            self.emit.bind(else_label);
            self.ternary()?;
            self.emit.bind(end_label);
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<(), CompileError> {
        self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            // Short-circuit: skip the right operand once the left decides.
            let truthy = self.emit.new_label();
            let end = self.emit.new_label();
            self.emit.jump(Opcode::JumpIfTrue, truthy);
            self.and_expr()?;
            self.emit.jump(Opcode::JumpIfTrue, truthy);
            self.emit.push_bool(false);
            self.emit.jump(Opcode::Jump, end);
            self.emit.bind(truthy);
            self.emit.push_bool(true);
            self.emit.bind(end);
        }
        Ok(())
    }

    fn and_expr(&mut self) -> Result<(), CompileError> {
        self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let falsy = self.emit.new_label();
            let end = self.emit.new_label();
            self.emit.jump(Opcode::JumpIfFalse, falsy);
            self.not_expr()?;
            self.emit.jump(Opcode::JumpIfFalse, falsy);
            self.emit.push_bool(true);
            self.emit.jump(Opcode::Jump, end);
            self.emit.bind(falsy);
            self.emit.push_bool(false);
            self.emit.bind(end);
        }
        Ok(())
    }

    fn not_expr(&mut self) -> Result<(), CompileError> {
        if self.eat(&TokenKind::Not) {
            self.not_expr()?;
            self.emit.op(Opcode::Not);
            Ok(())
        } else {
            self.equality()
        }
    }

    fn equality(&mut self) -> Result<(), CompileError> {
        self.relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => Opcode::Eq,
                TokenKind::NotEq => Opcode::Ne,
                _ => return Ok(()),
            };
            self.advance();
            self.relational()?;
            self.emit.op(op);
        }
    }

    fn relational(&mut self) -> Result<(), CompileError> {
        self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => Opcode::Lt,
                TokenKind::Le => Opcode::Le,
                TokenKind::Gt => Opcode::Gt,
                TokenKind::Ge => Opcode::Ge,
                _ => return Ok(()),
            };
            self.advance();
            self.additive()?;
            self.emit.op(op);
        }
    }

    fn additive(&mut self) -> Result<(), CompileError> {
        self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => Opcode::Add,
                TokenKind::Minus => Opcode::Sub,
                _ => return Ok(()),
            };
            self.advance();
            self.multiplicative()?;
            self.emit.op(op);
        }
    }

    fn multiplicative(&mut self) -> Result<(), CompileError> {
        self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => Opcode::Mul,
                TokenKind::Slash => Opcode::Div,
                TokenKind::Percent => Opcode::Mod,
                _ => return Ok(()),
            };
            self.advance();
            self.unary()?;
            self.emit.op(op);
        }
    }

    fn unary(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                self.unary()?;
                self.emit.op(Opcode::Neg);
                Ok(())
            }
            TokenKind::Plus => {
                self.advance();
                self.unary()
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let decrement = matches!(self.peek(), TokenKind::MinusMinus);
                self.advance();
                let (name, line) = self.expect_ident("a variable name")?;
                if self.emit.is_const(&name) {
                    return Err(EmitError::ConstReassigned { line, name }.into());
                }
                self.emit.name_op(Opcode::Load, &name);
                self.emit.push_int(1);
                self.emit
                    .op(if decrement { Opcode::Sub } else { Opcode::Add });
                self.emit.op(Opcode::Dup);
                self.emit.name_op(Opcode::Store, &name);
                Ok(())
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<(), CompileError> {
        self.primary()?;
        while self.eat(&TokenKind::LBracket) {
            self.expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            self.emit.op(Opcode::Index);
        }
        Ok(())
    }

    fn primary(&mut self) -> Result<(), CompileError> {
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                self.emit.push_int(v);
                Ok(())
            }
            TokenKind::Float(v) => {
                self.advance();
                self.emit.push_float(v);
                Ok(())
            }
            TokenKind::Str(s) => {
                self.advance();
                self.emit.push_str(&s);
                Ok(())
            }
            TokenKind::True => {
                self.advance();
                self.emit.push_bool(true);
                Ok(())
            }
            TokenKind::False => {
                self.advance();
                self.emit.push_bool(false);
                Ok(())
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek_at(1), TokenKind::LParen) {
                    self.call(name)
                } else {
                    self.advance();
                    self.emit.name_op(Opcode::Load, &name);
                    Ok(())
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(())
            }
            _ => Err(self.unexpected("an expression").into()),
        }
    }

    fn call(&mut self, name: String) -> Result<(), CompileError> {
        let line = self.line();
        self.advance(); // name
        self.advance(); // '('

        let mut argc = 0usize;
        if !matches!(self.peek(), TokenKind::RParen) {
            loop {
                self.expression()?;
                argc += 1;
                if argc > u8::MAX as usize {
                    return Err(self.unexpected("at most 255 arguments").into());
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        if let Some(sym) = self.emit.function(&name) {
            if sym.arity as usize != argc {
                return Err(EmitError::ArityMismatch {
                    line,
                    name,
                    expected: sym.arity,
                    found: argc,
                }
                .into());
            }
            self.emit.call_user(sym.addr, argc as u8);
        } else if let Some(id) = builtins::lookup(&name) {
            // Built-in arity is the VM's call-time check.
            self.emit.call_builtin(id, argc as u8);
        } else {
            return Err(EmitError::UndefinedFunction { line, name }.into());
        }
        Ok(())
    }
}
