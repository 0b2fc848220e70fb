//! Pattern lexer. Turns source text into the flat token stream the
//! interpreter walks.
//!
//! Line breaks and the whitespace around them are layout only and never
//! reach the output; `\n` prints a newline. A `#` that starts a line (after
//! optional indentation) comments out the rest of that line.

use thiserror::Error;

use crate::schema::token::{Position, Token, TokenKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LexError {
    pub pos: Position,
    pub message: String,
}

impl LexError {
    fn new(pos: Position, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

const REGEX_FLAGS: &[char] = &['i', 'm', 's', 'x'];

fn punctuation(c: char) -> Option<TokenKind> {
    Some(match c {
        '{' => TokenKind::LeftCurly,
        '}' => TokenKind::RightCurly,
        '[' => TokenKind::LeftSquare,
        ']' => TokenKind::RightSquare,
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        '<' => TokenKind::LeftAngle,
        '>' => TokenKind::RightAngle,
        '|' => TokenKind::Pipe,
        ';' => TokenKind::Semicolon,
        ':' => TokenKind::Colon,
        '@' => TokenKind::At,
        '?' => TokenKind::Question,
        '!' => TokenKind::Exclamation,
        '-' => TokenKind::Hyphen,
        '=' => TokenKind::Equal,
        '&' => TokenKind::Ampersand,
        '$' => TokenKind::Dollar,
        '+' => TokenKind::Plus,
        _ => return None,
    })
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

struct Scanner {
    chars: Vec<(usize, char)>,
    len_bytes: usize,
    i: usize,
    line: usize,
    column: usize,
    line_blank: bool,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.char_indices().collect(),
            len_bytes: source.len(),
            i: 0,
            line: 1,
            column: 1,
            line_blank: true,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).map(|&(_, c)| c)
    }

    fn pos(&self) -> Position {
        let offset = self.chars.get(self.i).map_or(self.len_bytes, |&(o, _)| o);
        Position::new(self.line, self.column, offset)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = *self.chars.get(self.i)?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_blank = true;
        } else {
            self.column += 1;
            if !is_space(c) {
                self.line_blank = false;
            }
        }
        Some(c)
    }
}

/// Lex a pattern source into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut sc = Scanner::new(source);
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut text_pos = sc.pos();

    while let Some(c) = sc.peek(0) {
        let is_text = !is_space(c)
            && punctuation(c).is_none()
            && c != '\\'
            && c != '"'
            && !(c == '/' && sc.peek(1) == Some('/'))
            && !(c == '#' && sc.line_blank);

        if is_text {
            if text.is_empty() {
                text_pos = sc.pos();
            }
            text.push(c);
            sc.bump();
            continue;
        }

        // Flush any accumulated text
        if !text.is_empty() {
            tokens.push(Token::new(TokenKind::Text, std::mem::take(&mut text), text_pos));
        }

        let pos = sc.pos();

        if c == '#' {
            while let Some(c) = sc.peek(0) {
                if c == '\n' {
                    break;
                }
                sc.bump();
            }
            continue;
        }

        if is_space(c) {
            let mut run = String::new();
            while let Some(c) = sc.peek(0).filter(|&c| is_space(c)) {
                run.push(c);
                sc.bump();
            }
            if !run.contains('\n') {
                tokens.push(Token::new(TokenKind::Whitespace, run, pos));
            }
            continue;
        }

        match c {
            '\\' => {
                sc.bump();
                tokens.push(Token::new(TokenKind::Escape, lex_escape(&mut sc, pos)?, pos));
            }
            '"' => {
                sc.bump();
                tokens.push(Token::new(TokenKind::Constant, lex_constant(&mut sc, pos)?, pos));
            }
            '/' => {
                sc.bump();
                sc.bump();
                tokens.push(Token::new(TokenKind::Regex, lex_regex(&mut sc, pos)?, pos));
            }
            ':' if sc.peek(1) == Some(':') => {
                sc.bump();
                sc.bump();
                tokens.push(Token::new(TokenKind::DoubleColon, "::", pos));
            }
            _ => {
                // punctuation() is Some here; everything else was text
                if let Some(kind) = punctuation(c) {
                    sc.bump();
                    tokens.push(Token::new(kind, c.to_string(), pos));
                }
            }
        }
    }

    if !text.is_empty() {
        tokens.push(Token::new(TokenKind::Text, text, text_pos));
    }

    Ok(tokens)
}

/// Read the body of an escape sequence: `[count,]code` or `uXXXX`.
fn lex_escape(sc: &mut Scanner, start: Position) -> Result<String, LexError> {
    let mut value = String::new();

    // Optional repeat count
    let mut digits = 0;
    while sc.peek(digits).map_or(false, |c| c.is_ascii_digit()) {
        digits += 1;
    }
    if digits > 0 && sc.peek(digits) == Some(',') {
        for _ in 0..=digits {
            if let Some(c) = sc.bump() {
                value.push(c);
            }
        }
    }

    let code = sc
        .bump()
        .ok_or_else(|| LexError::new(start, "unexpected end of pattern in escape sequence"))?;
    value.push(code);

    if code == 'u' {
        for _ in 0..4 {
            match sc.peek(0) {
                Some(h) if h.is_ascii_hexdigit() => {
                    value.push(h);
                    sc.bump();
                }
                _ => {
                    return Err(LexError::new(
                        start,
                        "unicode escape requires four hexadecimal digits",
                    ))
                }
            }
        }
    }

    Ok(value)
}

fn lex_constant(sc: &mut Scanner, start: Position) -> Result<String, LexError> {
    let mut value = String::new();
    loop {
        match sc.bump() {
            Some('"') => {
                if sc.peek(0) == Some('"') {
                    value.push('"');
                    sc.bump();
                } else {
                    return Ok(value);
                }
            }
            Some(c) => value.push(c),
            None => return Err(LexError::new(start, "unterminated constant literal")),
        }
    }
}

fn lex_regex(sc: &mut Scanner, start: Position) -> Result<String, LexError> {
    let mut pattern = String::new();
    loop {
        match sc.peek(0) {
            Some('/') if sc.peek(1) == Some('/') => {
                sc.bump();
                sc.bump();
                break;
            }
            Some('\\') => {
                sc.bump();
                pattern.push('\\');
                if let Some(c) = sc.bump() {
                    pattern.push(c);
                }
            }
            Some(_) => {
                if let Some(c) = sc.bump() {
                    pattern.push(c);
                }
            }
            None => return Err(LexError::new(start, "unterminated regex literal")),
        }
    }

    let mut flags = String::new();
    while let Some(c) = sc.peek(0).filter(|c| REGEX_FLAGS.contains(c)) {
        flags.push(c);
        sc.bump();
    }

    Ok(format!("{}//{}", pattern, flags))
}

/// Split a regex token value back into pattern and flags.
pub fn split_regex(value: &str) -> (&str, &str) {
    value.rsplit_once("//").unwrap_or((value, ""))
}
