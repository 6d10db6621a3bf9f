//! # GrblKit G-Code
//!
//! Tokenizes and parses G-code the way Grbl does, so host and controller
//! agree byte-for-byte on what a line contains.
//!
//! - [`Lexer`] turns a byte stream into tokens whose values concatenate back
//!   to the exact input.
//! - [`Parser`] groups tokens into [`Block`]s (one per non-blank line) and
//!   tracks the modal state needed by [`XyRotation`].
//! - [`Block`]'s `Display` is the canonical compact form sent on the wire.

pub mod block;
pub mod lexer;
pub mod modal;
pub mod parser;
pub mod rotation;
pub mod word;

pub use block::Block;
pub use lexer::{Lexer, Token, TokenKind};
pub use modal::{DistanceMode, ModalState, Units};
pub use parser::{compact, Parser};
pub use rotation::XyRotation;
pub use word::Word;
