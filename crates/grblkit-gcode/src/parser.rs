//! G-Code Parser
//!
//! Groups lexer tokens into [`Block`]s, one per non-blank line, and keeps
//! the modal state needed to interpret X/Y values.

use crate::block::Block;
use crate::lexer::{Lexer, TokenKind};
use crate::modal::ModalState;
use crate::word::Word;
use grblkit_core::{GcodeError, Result};
use std::io::{BufRead, Write};

/// Streaming block parser
///
/// [`Parser::next_block`] returns `Ok(None)` at the clean end of input.
/// After an error the parser is finished and yields nothing more.
pub struct Parser<R> {
    lexer: Lexer<R>,
    modal: ModalState,
    context: ModalState,
    block_line: u32,
    done: bool,
}

impl<R: BufRead> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lexer: Lexer::new(reader),
            modal: ModalState::new(),
            context: ModalState::new(),
            block_line: 0,
            done: false,
        }
    }

    /// Modal state after the last returned block
    pub fn modal_state(&self) -> &ModalState {
        &self.modal
    }

    /// Modal state the last returned block is read under
    ///
    /// Units and distance mode include the block's own G20/G21/G90/G91
    /// words; the position is the one from before the block moved.
    pub fn block_context(&self) -> &ModalState {
        &self.context
    }

    /// 1-based line number of the last returned block
    pub fn block_line_number(&self) -> u32 {
        self.block_line
    }

    fn syntax_error(line_number: u32, reason: impl Into<String>) -> grblkit_core::Error {
        GcodeError::InvalidSyntax {
            line_number,
            reason: reason.into(),
        }
        .into()
    }

    /// Parse the next non-blank line
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_block();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_block(&mut self) -> Result<Option<Block>> {
        let mut system: Option<String> = None;
        let mut words: Vec<Word> = Vec::new();
        let mut letter: Option<char> = None;
        let mut skip_line_number = false;

        loop {
            let line = self.lexer.line_number();
            let token = self.lexer.next_token()?;

            match token.kind {
                TokenKind::Space | TokenKind::Comment => continue,
                TokenKind::System => {
                    if letter.is_some() || !words.is_empty() || skip_line_number {
                        return Err(Self::syntax_error(
                            line,
                            "system command must be alone on its line",
                        ));
                    }
                    system = Some(token.value);
                }
                TokenKind::WordLetter => {
                    if let Some(pending) = letter {
                        return Err(Self::syntax_error(
                            line,
                            format!("expected number after word letter '{}'", pending),
                        ));
                    }
                    if system.is_some() {
                        return Err(Self::syntax_error(
                            line,
                            "system command must be alone on its line",
                        ));
                    }
                    let c = token.value.chars().next().unwrap_or_default();
                    if c.eq_ignore_ascii_case(&'N') {
                        skip_line_number = true;
                    }
                    letter = Some(c);
                }
                TokenKind::WordNumber => {
                    let Some(c) = letter.take() else {
                        return Err(Self::syntax_error(
                            line,
                            format!("unexpected number {:?} without word letter", token.value),
                        ));
                    };
                    if skip_line_number {
                        skip_line_number = false;
                        continue;
                    }
                    let word = Word::new(c, token.value)
                        .map_err(|e| Self::syntax_error(line, e.to_string()))?;
                    words.push(word);
                }
                TokenKind::NewLine | TokenKind::Eof => {
                    let at_eof = token.kind == TokenKind::Eof;
                    if letter.is_some() {
                        return Err(Self::syntax_error(
                            line,
                            if at_eof {
                                "unexpected word letter at end of file"
                            } else {
                                "unexpected word letter at end of line"
                            },
                        ));
                    }

                    let block = match system.take() {
                        Some(text) => Block::system(text),
                        None => Block::from_words(std::mem::take(&mut words)),
                    };
                    if !block.is_empty() {
                        self.finish_block(&block, line);
                        return Ok(Some(block));
                    }
                    if at_eof {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn finish_block(&mut self, block: &Block, line: u32) {
        let position = (self.modal.x, self.modal.y);
        self.modal.apply(block);
        self.context = ModalState {
            x: position.0,
            y: position.1,
            ..self.modal
        };
        self.block_line = line;
        tracing::trace!("line {}: {}", line, block);
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

/// Re-emit a program in compact form, one block per line
///
/// Spaces, comments, blank lines and line numbers are dropped. Returns the
/// number of blocks written.
pub fn compact<R: BufRead, W: Write>(reader: R, mut writer: W) -> Result<usize> {
    let mut count = 0;
    for block in Parser::new(reader) {
        writeln!(writer, "{}", block?)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<String>> {
        Parser::new(input.as_bytes())
            .map(|b| b.map(|b| b.to_string()))
            .collect()
    }

    #[test]
    fn test_compact_lines() {
        assert_eq!(parse("G1 X10\nG0X20 ; foo").unwrap(), vec!["G1X10", "G0X20"]);
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let lines = parse("\n  \n(header)\n; note\nG0 X1\r\n\n").unwrap();
        assert_eq!(lines, vec!["G0X1"]);
    }

    #[test]
    fn test_space_between_letter_and_number() {
        assert_eq!(parse("G 1 X (gap) 2").unwrap(), vec!["G1X2"]);
    }

    #[test]
    fn test_line_numbers_dropped() {
        assert_eq!(parse("N10 G0 X1\nn20 G1 Y2").unwrap(), vec!["G0X1", "G1Y2"]);
    }

    #[test]
    fn test_lowercase_letters() {
        assert_eq!(parse("g1 x1.5").unwrap(), vec!["G1X1.5"]);
    }

    #[test]
    fn test_system_lines() {
        let lines = parse("$H\n$J=G91 X1 F100\n").unwrap();
        assert_eq!(lines, vec!["$H", "$J=G91 X1 F100"]);
    }

    #[test]
    fn test_dangling_letter() {
        let err = parse("G1 X").unwrap_err();
        assert!(err.to_string().contains("end of file"));
        let err = parse("G1 X\nG0").unwrap_err();
        assert!(err.to_string().contains("end of line"));
    }

    #[test]
    fn test_number_without_letter() {
        let err = parse("G1 10").unwrap_err();
        assert!(err.to_string().contains("without word letter"));
    }

    #[test]
    fn test_letter_followed_by_letter() {
        assert!(parse("GX1").is_err());
    }

    #[test]
    fn test_system_mixed_with_words() {
        assert!(parse("G0 $H").is_err());
    }

    #[test]
    fn test_error_is_terminal() {
        let mut parser = Parser::new("G1 10\nG0 X1\n".as_bytes());
        assert!(parser.next_block().is_err());
        assert!(parser.next_block().unwrap().is_none());
    }

    #[test]
    fn test_block_line_number() {
        let mut parser = Parser::new("\n\nG0 X1\n".as_bytes());
        parser.next_block().unwrap();
        assert_eq!(parser.block_line_number(), 3);
    }

    #[test]
    fn test_error_line_number() {
        let err = parse("G0\nG1\nX").unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn test_compact_writer() {
        let mut out = Vec::new();
        let count = compact("G0 X1 (a)\n\nM3 S1000\n".as_bytes(), &mut out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "G0X1\nM3S1000\n");
    }
}
