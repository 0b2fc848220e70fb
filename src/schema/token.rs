//! Pattern tokens and their source positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a token starts in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    /// Byte offset from the start of the source.
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ln {}, Col {}", self.line, self.column)
    }
}

/// Token categories produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Text,
    Whitespace,
    /// `\n`, `\3,d`, `\u00e9`; the value holds everything after the backslash.
    Escape,
    /// `"..."`; the value holds the unescaped contents.
    Constant,
    /// `//pattern//flags`; the value holds `pattern` and `flags` joined by `//`.
    Regex,
    LeftCurly,
    RightCurly,
    LeftSquare,
    RightSquare,
    LeftParen,
    RightParen,
    LeftAngle,
    RightAngle,
    Pipe,
    Semicolon,
    Colon,
    DoubleColon,
    At,
    Question,
    Exclamation,
    Hyphen,
    Equal,
    Ampersand,
    Dollar,
    Plus,
}

impl TokenKind {
    /// The closing counterpart of an opening bracket.
    pub fn closer(self) -> Option<TokenKind> {
        match self {
            TokenKind::LeftCurly => Some(TokenKind::RightCurly),
            TokenKind::LeftSquare => Some(TokenKind::RightSquare),
            TokenKind::LeftParen => Some(TokenKind::RightParen),
            TokenKind::LeftAngle => Some(TokenKind::RightAngle),
            _ => None,
        }
    }

    pub fn is_closer(self) -> bool {
        matches!(
            self,
            TokenKind::RightCurly
                | TokenKind::RightSquare
                | TokenKind::RightParen
                | TokenKind::RightAngle
        )
    }

    /// Tokens that print their value unchanged when executed.
    pub fn is_verbatim(self) -> bool {
        !matches!(self, TokenKind::Escape | TokenKind::Regex)
            && self.closer().is_none()
            && !self.is_closer()
    }
}

/// Names of tags, flags, subroutines, and macros: ASCII letters, digits,
/// `_` and `-`, not starting with a digit.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            value: value.into(),
            pos,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closers_pair_up() {
        assert_eq!(TokenKind::LeftCurly.closer(), Some(TokenKind::RightCurly));
        assert_eq!(TokenKind::LeftAngle.closer(), Some(TokenKind::RightAngle));
        assert_eq!(TokenKind::Pipe.closer(), None);
        assert!(TokenKind::RightParen.is_closer());
        assert!(!TokenKind::LeftParen.is_closer());
    }

    #[test]
    fn verbatim_kinds() {
        assert!(TokenKind::Text.is_verbatim());
        assert!(TokenKind::Colon.is_verbatim());
        assert!(!TokenKind::Escape.is_verbatim());
        assert!(!TokenKind::LeftSquare.is_verbatim());
        assert!(!TokenKind::RightAngle.is_verbatim());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("noun_2"));
        assert!(is_valid_name("_hidden"));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn position_display() {
        assert_eq!(Position::new(3, 7, 40).to_string(), "Ln 3, Col 7");
    }
}
