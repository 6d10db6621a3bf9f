//! Blocks: one line of G-code.

use crate::word::Word;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One line of G-code
///
/// Either a `$` system command or a command word followed by its argument
/// words. Blocks returned by the parser are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    system: Option<String>,
    command: Option<Word>,
    arguments: Vec<Word>,
}

impl Block {
    /// Block holding a `$` system command, text kept verbatim
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            system: Some(text.into()),
            command: None,
            arguments: Vec::new(),
        }
    }

    /// Block from a command word and its arguments
    pub fn new(command: Word, arguments: Vec<Word>) -> Self {
        Self {
            system: None,
            command: Some(command),
            arguments,
        }
    }

    /// Build a block from its words in line order
    ///
    /// The first word becomes the command. Returns an empty block when
    /// `words` is empty.
    pub fn from_words(words: Vec<Word>) -> Self {
        let mut words = words.into_iter();
        Self {
            system: None,
            command: words.next(),
            arguments: words.collect(),
        }
    }

    /// True when neither a system command nor a command word is present
    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.command.is_none()
    }

    pub fn is_system(&self) -> bool {
        self.system.is_some()
    }

    pub fn system_command(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn command(&self) -> Option<&Word> {
        self.command.as_ref()
    }

    pub fn arguments(&self) -> &[Word] {
        &self.arguments
    }

    /// All words in line order: command first, then arguments
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.command.iter().chain(self.arguments.iter())
    }

    pub(crate) fn into_words(self) -> Vec<Word> {
        self.command.into_iter().chain(self.arguments).collect()
    }

    /// Value of the first word with `letter`, if any
    pub fn axis(&self, letter: char) -> Option<f64> {
        self.words()
            .find(|w| w.letter() == letter.to_ascii_uppercase())
            .map(Word::value)
    }

    /// Whether the block writes to the controller's EEPROM
    ///
    /// Covers `$x=val`, `$Nx=line`, `$I=line`, `$RST=...`, `G10 L2`,
    /// `G10 L20`, `G28.1` and `G30.1`. `$J=` jog lines are motion, not
    /// EEPROM writes.
    pub fn is_eeprom_write(&self) -> bool {
        if let Some(system) = &self.system {
            let upper = system.trim().to_ascii_uppercase();
            if upper.starts_with("$J=") {
                return false;
            }
            return upper.contains('=');
        }

        let has = |letter: char, value: f64| self.words().any(|w| w.is(letter, value));
        (has('G', 10.0) && (has('L', 2.0) || has('L', 20.0))) || has('G', 28.1) || has('G', 30.1)
    }
}

impl fmt::Display for Block {
    /// Compact form: system text verbatim, otherwise words with no
    /// separators
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system) = &self.system {
            f.write_str(system)?;
        }
        for word in self.words() {
            write!(f, "{}", word)?;
        }
        Ok(())
    }
}
