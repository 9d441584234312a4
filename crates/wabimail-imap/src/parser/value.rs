//! Tokenizer for the generic parts of IMAP responses.

use crate::Error;
use crate::Result;

/// A generic response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Atom or number, including bracketed section atoms like `BODY[]`.
    Atom(String),
    /// Quoted string or literal.
    Str(Vec<u8>),
    /// Parenthesized list.
    List(Vec<Value>),
    /// `NIL`
    Nil,
}

impl Value {
    /// Atom or string contents as text.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Atom(a) => Some(a.clone()),
            Self::Str(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Self::List(_) | Self::Nil => None,
        }
    }

    /// Numeric atom.
    #[must_use]
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Atom(a) => a.parse().ok(),
            _ => None,
        }
    }

    /// Raw bytes of a string or atom.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Str(bytes) => Some(bytes),
            Self::Atom(a) => Some(a.into_bytes()),
            Self::List(_) | Self::Nil => None,
        }
    }
}

/// Maximum nesting of parenthesized lists.
const MAX_DEPTH: usize = 32;

pub(super) struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(super) const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    pub(super) fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes `byte` if it is next.
    pub(super) fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", char::from(byte))))
        }
    }

    /// Everything left on the line, without the trailing CRLF.
    pub(super) fn rest_text(&mut self) -> String {
        let rest = &self.input[self.pos..];
        self.pos = self.input.len();
        String::from_utf8_lossy(rest)
            .trim_end_matches(['\r', '\n'])
            .trim_start_matches(' ')
            .to_string()
    }

    /// Text up to `end`, consuming the terminator.
    pub(super) fn take_until(&mut self, end: u8) -> Result<String> {
        let rest = &self.input[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == end)
            .ok_or_else(|| self.error(&format!("missing '{}'", char::from(end))))?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }

    /// An atom; `[...]` sections are kept whole even if they hold spaces.
    pub(super) fn atom(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' if depth > 0 => depth -= 1,
                b' ' | b'(' | b')' if depth > 0 => {}
                b' ' | b'(' | b')' | b'{' | b'"' | b'\r' | b'\n' => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected atom"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    pub(super) fn value(&mut self) -> Result<Value> {
        self.value_at(0)
    }

    fn value_at(&mut self, depth: usize) -> Result<Value> {
        match self.peek() {
            Some(b'(') => self.list(depth),
            Some(b'"') => self.quoted(),
            Some(b'{') => self.literal(),
            Some(_) => {
                let atom = self.atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(Value::Nil)
                } else {
                    Ok(Value::Atom(atom))
                }
            }
            None => Err(self.error("unexpected end of response")),
        }
    }

    fn list(&mut self, depth: usize) -> Result<Value> {
        if depth >= MAX_DEPTH {
            return Err(self.error("lists nested too deeply"));
        }
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            if self.eat(b')') {
                return Ok(Value::List(items));
            }
            items.push(self.value_at(depth + 1)?);
            self.eat(b' ');
        }
    }

    fn quoted(&mut self) -> Result<Value> {
        self.expect(b'"')?;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Value::Str(bytes));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    bytes.push(escaped);
                    self.pos += 1;
                }
                Some(b'\r' | b'\n') | None => return Err(self.error("unterminated string")),
                Some(b) => {
                    bytes.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn literal(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let digits = self.take_until(b'}')?;
        let len: usize = digits
            .trim_end_matches('+')
            .parse()
            .map_err(|_| self.error("invalid literal length"))?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("literal exceeds response"))?;
        let bytes = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(Value::Str(bytes))
    }
}
