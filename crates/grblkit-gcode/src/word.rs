//! G-code words: a letter followed by a number.

use grblkit_core::GcodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single G-code word such as `G1`, `X-10.5` or `M3`
///
/// The number is kept as written so that re-serialization is byte-exact;
/// [`Word::value`] gives the numeric reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word {
    letter: char,
    number: String,
}

impl Word {
    /// Build a word from a letter and its number text
    ///
    /// The letter is case-insensitive and stored uppercase. `N` is refused:
    /// line numbers are not words.
    pub fn new(letter: char, number: impl Into<String>) -> Result<Self, GcodeError> {
        let number = number.into();
        let invalid = |reason: &str| GcodeError::InvalidWord {
            word: format!("{}{}", letter, number),
            reason: reason.to_string(),
        };

        if !letter.is_ascii_alphabetic() {
            return Err(invalid("letter must be A-Z"));
        }
        let letter = letter.to_ascii_uppercase();
        if letter == 'N' {
            return Err(invalid("line numbers are not words"));
        }
        if !is_valid_number(&number) {
            return Err(invalid("number must be an optionally signed decimal"));
        }
        Ok(Self { letter, number })
    }

    /// Build a word from a numeric value, formatted to 4 decimal places
    /// with trailing zeros removed
    pub fn from_value(letter: char, value: f64) -> Result<Self, GcodeError> {
        if !value.is_finite() {
            return Err(GcodeError::InvalidWord {
                word: format!("{}{}", letter, value),
                reason: "value must be finite".to_string(),
            });
        }
        Self::new(letter, format_number(value))
    }

    /// Uppercase letter
    pub fn letter(&self) -> char {
        self.letter
    }

    /// Number exactly as written
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Numeric value of the word
    pub fn value(&self) -> f64 {
        // The number grammar is a subset of what f64 accepts.
        self.number.parse().unwrap_or(0.0)
    }

    /// Whether this word is `letter` with numeric value `value`
    ///
    /// `G0`, `G00` and `g0.0` all match `('G', 0.0)`.
    pub fn is(&self, letter: char, value: f64) -> bool {
        self.letter == letter.to_ascii_uppercase() && self.value() == value
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

impl FromStr for Word {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match chars.next() {
            Some(letter) => Word::new(letter, chars.as_str()),
            None => Err(GcodeError::InvalidWord {
                word: String::new(),
                reason: "empty word".to_string(),
            }),
        }
    }
}

fn is_valid_number(number: &str) -> bool {
    let digits = number.strip_prefix(['+', '-']).unwrap_or(number);
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    seen_digit
}

/// Format a coordinate the way rotated blocks are written back
pub(crate) fn format_number(value: f64) -> String {
    let mut s = format!("{:.4}", value);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}
