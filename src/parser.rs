// src/parser.rs
use crate::errors::PathError;

/// Character cursor shared by the path and predicate grammars.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn pos(&self) -> usize {
        self.i
    }

    /// Rewind to an earlier position (for one-token lookahead).
    pub fn reset(&mut self, pos: usize) {
        self.i = pos.min(self.s.len());
    }

    pub fn source(&self) -> &'a str {
        self.s
    }

    /// Build a parse error pointing at the current position.
    pub fn error(&self, msg: impl Into<String>) -> PathError {
        self.error_at(self.i, msg)
    }

    pub fn error_at(&self, at: usize, msg: impl Into<String>) -> PathError {
        let at = at.min(self.s.len());
        let (line, column) = line_col(self.s, at);
        let end = (at + self.peek_char_at(at).map(char::len_utf8).unwrap_or(0)).min(self.s.len());
        PathError::Parse {
            message: msg.into(),
            line,
            column,
            span: at..end,
        }
    }

    /// XML name characters; `:` is handled by the caller for prefixes.
    pub fn parse_identifier(&mut self) -> Result<&'a str, PathError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            let ok = if self.i == start {
                c == '_' || c.is_alphabetic()
            } else {
                c == '_' || c == '-' || c == '.' || c.is_alphanumeric()
            };
            if ok {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(&self.s[start..self.i])
    }

    /// Non-negative integer.
    pub fn parse_int(&mut self) -> Result<i64, PathError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("expected integer"));
        }
        self.s[start..self.i]
            .parse::<i64>()
            .map_err(|_| self.error_at(start, "bad integer"))
    }

    /// Raw text of a number literal: `-?digits(.digits)?[fF]?`.
    pub fn capture_number(&mut self) -> Result<&'a str, PathError> {
        let start = self.i;
        if self.peek_char() == Some('-') {
            self.i += 1;
        }
        let digits_start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            self.i += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.i += 1;
                } else {
                    break;
                }
            }
        }
        if self.i == digits_start || &self.s[digits_start..self.i] == "." {
            return Err(self.error_at(start, "number expected"));
        }
        if matches!(self.peek_char(), Some('f') | Some('F')) {
            self.i += 1;
        }
        Ok(&self.s[start..self.i])
    }

    /// `'...'` or `"..."`; the quote character cannot appear inside.
    pub fn parse_quoted_string(&mut self) -> Result<&'a str, PathError> {
        let start = self.i;
        let quote = self
            .peek_char()
            .ok_or_else(|| self.error("expected quoted string"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let body = self.i;
        while let Some(c) = self.peek_char() {
            if c == quote {
                let out = &self.s[body..self.i];
                self.i += 1;
                return Ok(out);
            }
            self.i += c.len_utf8();
        }
        Err(self.error_at(start, "unterminated string"))
    }

    pub fn capture_until(&mut self, end: char) -> Result<&'a str, PathError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == end {
                break;
            }
            self.i += c.len_utf8();
        }
        if self.peek_char() != Some(end) {
            return Err(self.error(format!("expected '{end}'")));
        }
        Ok(&self.s[start..self.i])
    }

    pub fn expect(&mut self, c: char) -> Result<(), PathError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            match self.peek_char() {
                Some(found) => Err(self.error(format!("expected '{c}', found '{found}'"))),
                None => Err(self.error(format!("expected '{c}', found end of input"))),
            }
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume a keyword such as `and` only when it is not the start of a
    /// longer name.
    pub fn consume_keyword(&mut self, kw: &str) -> bool {
        if !self.peek_str(kw) {
            return false;
        }
        let next = self.s[self.i + kw.len()..].chars().next();
        if matches!(next, Some(c) if c.is_alphanumeric() || c == '_' || c == '-' || c == ':') {
            return false;
        }
        self.i += kw.len();
        true
    }

    pub fn peek_char(&self) -> Option<char> {
        self.peek_char_at(self.i)
    }

    fn peek_char_at(&self, at: usize) -> Option<char> {
        self.s.get(at..).and_then(|rest| rest.chars().next())
    }

    pub fn peek_second(&self) -> Option<char> {
        let mut it = self.s[self.i..].chars();
        it.next();
        it.next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(s: &str, at: usize) -> (usize, usize) {
    let before = &s[..at.min(s.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}
