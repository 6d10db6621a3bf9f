//! G-Code Lexer
//!
//! Byte-stream tokenizer following Grbl's own line rules. Every byte of the
//! input ends up in exactly one token value, so concatenating the values of
//! all tokens reproduces the input.

use grblkit_core::{GcodeError, Result};
use std::io::BufRead;

/// Token types in G-code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// End of input; value is empty
    Eof,
    /// Run of spaces or tabs
    Space,
    /// `(...)` or `;...` comment
    Comment,
    /// `$...` system command text, up to the end of the line
    System,
    /// Single letter of a word, e.g. the `G` of `G1`
    WordLetter,
    /// Number of a word, e.g. the `-1.5` of `X-1.5`
    WordNumber,
    /// `\n` or `\r\n`
    NewLine,
}

/// A token with its original text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Streaming lexer over any buffered reader
///
/// Call [`Lexer::next_token`] until it yields [`TokenKind::Eof`]. An error
/// is terminal.
pub struct Lexer<R> {
    reader: R,
    line: u32,
}

impl<R: BufRead> Lexer<R> {
    /// Create a lexer reading from `reader`
    pub fn new(reader: R) -> Self {
        Self { reader, line: 1 }
    }

    /// Current 1-based line number
    pub fn line_number(&self) -> u32 {
        self.line
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
    }

    fn syntax_error(&self, reason: impl Into<String>) -> grblkit_core::Error {
        GcodeError::InvalidSyntax {
            line_number: self.line,
            reason: reason.into(),
        }
        .into()
    }

    /// Consume bytes while `keep` holds, returning them
    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        while let Some(b) = self.peek()? {
            if !keep(b) {
                break;
            }
            bytes.push(b);
            self.bump();
        }
        Ok(bytes)
    }

    fn text(&self, bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes).map_err(|_| self.syntax_error("invalid UTF-8 text"))
    }

    /// Produce the next token
    pub fn next_token(&mut self) -> Result<Token> {
        let Some(b) = self.peek()? else {
            return Ok(Token::new(TokenKind::Eof, ""));
        };

        match b {
            b' ' | b'\t' => {
                let bytes = self.take_while(|b| b == b' ' || b == b'\t')?;
                Ok(Token::new(TokenKind::Space, self.text(bytes)?))
            }
            b'(' => self.paren_comment(),
            b';' => {
                let bytes = self.take_while(|b| b != b'\n' && b != b'\r')?;
                Ok(Token::new(TokenKind::Comment, self.text(bytes)?))
            }
            b'$' => {
                let bytes = self.take_while(|b| b != b'\n' && b != b'\r')?;
                Ok(Token::new(TokenKind::System, self.text(bytes)?))
            }
            b if b.is_ascii_alphabetic() => {
                self.bump();
                Ok(Token::new(TokenKind::WordLetter, (b as char).to_string()))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.number(),
            b'\n' => {
                self.bump();
                self.line += 1;
                Ok(Token::new(TokenKind::NewLine, "\n"))
            }
            b'\r' => {
                self.bump();
                match self.peek()? {
                    Some(b'\n') => {
                        self.bump();
                        self.line += 1;
                        Ok(Token::new(TokenKind::NewLine, "\r\n"))
                    }
                    Some(_) => Err(self.syntax_error("carriage return not followed by line feed")),
                    None => Err(self.syntax_error("carriage return at end of file")),
                }
            }
            other => Err(self.syntax_error(format!(
                "unexpected character {:?}",
                if other.is_ascii() {
                    (other as char).to_string()
                } else {
                    format!("0x{:02X}", other)
                }
            ))),
        }
    }

    fn paren_comment(&mut self) -> Result<Token> {
        let mut bytes = Vec::new();
        loop {
            match self.peek()? {
                None => return Err(self.syntax_error("unterminated comment")),
                Some(b'\n') | Some(b'\r') => {
                    return Err(self.syntax_error("line ended inside comment"));
                }
                Some(b) => {
                    bytes.push(b);
                    self.bump();
                    if b == b')' {
                        break;
                    }
                }
            }
        }
        Ok(Token::new(TokenKind::Comment, self.text(bytes)?))
    }

    fn number(&mut self) -> Result<Token> {
        let mut value = String::new();
        if let Some(sign @ (b'+' | b'-')) = self.peek()? {
            value.push(sign as char);
            self.bump();
        }

        let mut digits = 0;
        let mut seen_point = false;
        while let Some(b) = self.peek()? {
            match b {
                b'0'..=b'9' => digits += 1,
                b'.' if !seen_point => seen_point = true,
                b'.' => return Err(self.syntax_error("Invalid number: repeated decimal point")),
                _ => break,
            }
            value.push(b as char);
            self.bump();
        }

        if digits == 0 {
            return Err(self.syntax_error(format!("Invalid number {:?}", value)));
        }
        Ok(Token::new(TokenKind::WordNumber, value))
    }
}
