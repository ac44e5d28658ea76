//! Tokenizer for OakScript source text.
//!
//! Newlines are significant (statement terminators), so the lexer emits a
//! `Newline` token for each line break and for each `;`. `#include "name"`
//! directives are expanded here: the named file is lexed and its tokens
//! inlined before scanning continues. An include-path set detects cycles.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LexError;
use crate::token::{keyword, Token, TokenKind};

/// Scans one source buffer; `#include` spawns a nested `Lexer` over the
/// included file, sharing the active-include set.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    /// The file being lexed, if it came from disk (anchors includes).
    origin: Option<PathBuf>,
}

impl Lexer {
    /// Lex an in-memory source string. `#include` paths resolve against
    /// the current directory.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            origin: None,
        }
    }

    /// Lex a source string read from `origin`; `#include` paths resolve
    /// against the file's directory.
    pub fn with_origin(source: &str, origin: &Path) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            origin: Some(origin.to_path_buf()),
        }
    }

    /// Produce the full token stream, ending in `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut active = HashSet::new();
        if let Some(origin) = &self.origin {
            if let Ok(canon) = fs::canonicalize(origin) {
                active.insert(canon);
            }
        }
        let mut tokens = Vec::new();
        self.run(&mut active, &mut tokens)?;
        tokens.push(Token::new(TokenKind::Eof, self.line));
        Ok(tokens)
    }

    fn run(
        &mut self,
        active: &mut HashSet<PathBuf>,
        out: &mut Vec<Token>,
    ) -> Result<(), LexError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    out.push(Token::new(TokenKind::Newline, self.line));
                    self.line += 1;
                    self.bump();
                }
                ';' => {
                    out.push(Token::new(TokenKind::Newline, self.line));
                    self.bump();
                }
                '/' => match self.peek_at(1) {
                    Some('/') => self.skip_line_comment(),
                    Some('*') => self.skip_block_comment()?,
                    Some('=') => {
                        self.bump_n(2);
                        out.push(Token::new(TokenKind::SlashAssign, self.line));
                    }
                    _ => {
                        self.bump();
                        out.push(Token::new(TokenKind::Slash, self.line));
                    }
                },
                '"' => {
                    let token = self.string()?;
                    out.push(token);
                }
                '#' => self.include(active, out)?,
                c if c.is_ascii_digit() => {
                    let token = self.number()?;
                    out.push(token);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let token = self.ident();
                    out.push(token);
                }
                _ => {
                    let token = self.punctuator()?;
                    out.push(token);
                }
            }
        }
        Ok(())
    }

    // ---- character cursor ----

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn bump_n(&mut self, n: usize) {
        self.pos += n;
    }

    // ---- scanners ----

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        self.bump_n(2);
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => return Err(LexError::UnterminatedComment { line: start_line }),
            }
        }
    }

    fn number(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        let start = self.pos;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump_n(2);
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let value = i64::from_str_radix(&digits, 16).map_err(|_| LexError::InvalidNumber {
                line,
                text: self.chars[start..self.pos].iter().collect(),
            })?;
            return Ok(Token::new(TokenKind::Int(value), line));
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }

        // A single '.' continues a float; '..' belongs to a range literal.
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| LexError::InvalidNumber {
                line,
                text: text.clone(),
            })?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| LexError::InvalidNumber {
                line,
                text: text.clone(),
            })?)
        };
        Ok(Token::new(kind, line))
    }

    fn string(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Token::new(TokenKind::Str(s), line)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(other) => return Err(LexError::InvalidEscape { line, escape: other }),
                    None => return Err(LexError::UnterminatedString { line }),
                },
                Some('\n') | None => return Err(LexError::UnterminatedString { line }),
                Some(c) => s.push(c),
            }
        }
    }

    fn ident(&mut self) -> Token {
        let line = self.line;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword(&text).unwrap_or(TokenKind::Ident(text));
        Token::new(kind, line)
    }

    fn punctuator(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        let c = self.bump().expect("caller checked peek");
        let followed_by_eq = self.peek() == Some('=');
        let kind = match c {
            '+' if followed_by_eq => self.two(TokenKind::PlusAssign),
            '+' if self.peek() == Some('+') => self.two(TokenKind::PlusPlus),
            '+' => TokenKind::Plus,
            '-' if followed_by_eq => self.two(TokenKind::MinusAssign),
            '-' if self.peek() == Some('-') => self.two(TokenKind::MinusMinus),
            '-' => TokenKind::Minus,
            '*' if followed_by_eq => self.two(TokenKind::StarAssign),
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '=' if followed_by_eq => self.two(TokenKind::EqEq),
            '=' => TokenKind::Assign,
            '!' if followed_by_eq => self.two(TokenKind::NotEq),
            '<' if followed_by_eq => self.two(TokenKind::Le),
            '<' => TokenKind::Lt,
            '>' if followed_by_eq => self.two(TokenKind::Ge),
            '>' => TokenKind::Gt,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '.' if self.peek() == Some('.') => self.two(TokenKind::DotDot),
            other => return Err(LexError::UnknownChar { line, ch: other }),
        };
        Ok(Token::new(kind, line))
    }

    /// Consume the second character of a two-character punctuator.
    fn two(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    // ---- include expansion ----

    fn include(
        &mut self,
        active: &mut HashSet<PathBuf>,
        out: &mut Vec<Token>,
    ) -> Result<(), LexError> {
        let line = self.line;
        self.bump(); // '#'

        let word_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.bump();
        }
        let word: String = self.chars[word_start..self.pos].iter().collect();
        if word != "include" {
            return Err(LexError::MalformedInclude { line });
        }

        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        if self.peek() != Some('"') {
            return Err(LexError::MalformedInclude { line });
        }
        self.bump();
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\n') | None => return Err(LexError::MalformedInclude { line }),
                Some(c) => name.push(c),
            }
        }

        let dir = self
            .origin
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);
        let path = match dir {
            Some(dir) => dir.join(&name),
            None => PathBuf::from(&name),
        };
        let canon = fs::canonicalize(&path).map_err(|e| LexError::IncludeNotFound {
            line,
            path: name.clone(),
            reason: e.to_string(),
        })?;
        if !active.insert(canon.clone()) {
            return Err(LexError::IncludeCycle { line, path: name });
        }
        let source = fs::read_to_string(&canon).map_err(|e| LexError::IncludeNotFound {
            line,
            path: name.clone(),
            reason: e.to_string(),
        })?;

        let mut nested = Lexer::with_origin(&source, &canon);
        nested.run(active, out)?;
        active.remove(&canon);

        // Terminate whatever the included file left open, so a missing
        // final newline cannot glue two statements together.
        out.push(Token::new(TokenKind::Newline, self.line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(
            kinds("1 23 4.5 0.25"),
            vec![
                TokenKind::Int(1),
                TokenKind::Int(23),
                TokenKind::Float(4.5),
                TokenKind::Float(0.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_integers() {
        assert_eq!(
            kinds("0x10 0xFF"),
            vec![TokenKind::Int(16), TokenKind::Int(255), TokenKind::Eof]
        );
    }

    #[test]
    fn range_does_not_eat_the_dot() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDot,
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\n\"q\"\\""#),
            vec![TokenKind::Str("a\tb\n\"q\"\\".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = Lexer::new("x = 1\ny = \"oops").tokenize().unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 2 });
    }

    #[test]
    fn invalid_escape() {
        let err = Lexer::new(r#""\q""#).tokenize().unwrap_err();
        assert_eq!(err, LexError::InvalidEscape { line: 1, escape: 'q' });
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // trailing\n2 /* block\nstill */ 3"),
            vec![
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Int(2),
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let err = Lexer::new("x /* never closed").tokenize().unwrap_err();
        assert_eq!(err, LexError::UnterminatedComment { line: 1 });
    }

    #[test]
    fn semicolon_terminates_like_newline() {
        assert_eq!(
            kinds("x = 1; y = 2"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("y".to_string()),
                TokenKind::Assign,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("while whilex _x x9"),
            vec![
                TokenKind::While,
                TokenKind::Ident("whilex".to_string()),
                TokenKind::Ident("_x".to_string()),
                TokenKind::Ident("x9".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_punctuators() {
        assert_eq!(
            kinds("+= -= *= /= ++ -- == != <= >="),
            vec![
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_character_reports_line() {
        let err = Lexer::new("x = 1\n@").tokenize().unwrap_err();
        assert_eq!(err, LexError::UnknownChar { line: 2, ch: '@' });
    }

    #[test]
    fn token_lines_advance() {
        let tokens = Lexer::new("a\nb\nc").tokenize().unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn missing_include_file_errors() {
        let err = Lexer::new("#include \"no_such_file.oak\"")
            .tokenize()
            .unwrap_err();
        assert!(matches!(err, LexError::IncludeNotFound { line: 1, .. }));
    }

    #[test]
    fn malformed_include_errors() {
        let err = Lexer::new("#define x").tokenize().unwrap_err();
        assert_eq!(err, LexError::MalformedInclude { line: 1 });
    }
}
