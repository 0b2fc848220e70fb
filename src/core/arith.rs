//! Inline arithmetic: a small precedence-climbing expression language over
//! run-scoped numeric variables.
//!
//! ```text
//! x = 4 | y = x ^ 2 + 1 | y % 5
//! ```
//!
//! `|` sequences expressions and yields the last value. Assignment operators
//! (`=`, `+=`, `-=`, `*=`, `/=`, `%=`, `^=`) and `++`/`--` require a variable
//! on their left (or right, for prefix increments).

use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArithError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unexpected '{0}' in expression")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("left side of '{0}' is not a variable")]
    NotAssignable(String),
    #[error("division by zero")]
    DivisionByZero,
}

pub type Variables = FxHashMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Name(String),
    Op(&'static str),
    LeftParen,
    RightParen,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Num(n) => n.to_string(),
            Tok::Name(name) => name.clone(),
            Tok::Op(op) => op.to_string(),
            Tok::LeftParen => "(".to_string(),
            Tok::RightParen => ")".to_string(),
        }
    }
}

// Longest first so `+=` wins over `+`.
const OPERATORS: &[&str] = &[
    "++", "--", "+=", "-=", "*=", "/=", "%=", "^=", "+", "-", "*", "/", "%", "^", "=", "|",
];

fn lex(src: &str) -> Result<Vec<Tok>, ArithError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| ArithError::InvalidNumber(text.clone()))?;
            tokens.push(Tok::Num(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            tokens.push(Tok::Name(chars[start..i].iter().map(|&(_, c)| c).collect()));
        } else if c == '(' {
            tokens.push(Tok::LeftParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Tok::RightParen);
            i += 1;
        } else {
            let rest = &src[offset..];
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or(ArithError::UnexpectedChar { ch: c, offset })?;
            tokens.push(Tok::Op(*op));
            i += op.chars().count();
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Assign(&'static str, String, Box<Expr>),
    /// `(name, delta, prefix)`
    Step(String, f64, bool),
    Seq(Box<Expr>, Box<Expr>),
}

fn infix_precedence(op: &str) -> Option<(u8, bool)> {
    // (precedence, right-associative)
    Some(match op {
        "|" => (1, false),
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "^=" => (2, true),
        "+" | "-" => (3, false),
        "*" | "/" | "%" => (4, false),
        "^" => (6, true),
        "++" | "--" => (7, false),
        _ => return None,
    })
}

const PREFIX_PRECEDENCE: u8 = 5;

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn take(&mut self) -> Result<Tok, ArithError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ArithError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn parse(&mut self, min: u8) -> Result<Expr, ArithError> {
        let mut left = self.prefix()?;

        while let Some(Tok::Op(op)) = self.peek() {
            let op: &'static str = *op;
            let Some((prec, right_assoc)) = infix_precedence(op) else {
                break;
            };
            if prec <= min {
                break;
            }
            self.pos += 1;

            left = match op {
                "++" | "--" => match left {
                    Expr::Var(name) => Expr::Step(name, if op == "++" { 1.0 } else { -1.0 }, false),
                    _ => return Err(ArithError::NotAssignable(op.to_string())),
                },
                "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "^=" => {
                    let right = self.parse(prec - 1)?;
                    match left {
                        Expr::Var(name) => Expr::Assign(op, name, Box::new(right)),
                        _ => return Err(ArithError::NotAssignable(op.to_string())),
                    }
                }
                "|" => Expr::Seq(Box::new(left), Box::new(self.parse(prec)?)),
                _ => {
                    let next_min = if right_assoc { prec - 1 } else { prec };
                    Expr::Binary(op, Box::new(left), Box::new(self.parse(next_min)?))
                }
            };
        }
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Expr, ArithError> {
        match self.take()? {
            Tok::Num(n) => Ok(Expr::Num(n)),
            Tok::Name(name) => Ok(Expr::Var(name)),
            Tok::LeftParen => {
                let inner = self.parse(0)?;
                match self.take()? {
                    Tok::RightParen => Ok(inner),
                    other => Err(ArithError::UnexpectedToken(other.describe())),
                }
            }
            Tok::Op("-") => Ok(Expr::Neg(Box::new(self.parse(PREFIX_PRECEDENCE)?))),
            Tok::Op("+") => self.parse(PREFIX_PRECEDENCE),
            Tok::Op(op @ ("++" | "--")) => match self.take()? {
                Tok::Name(name) => Ok(Expr::Step(name, if op == "++" { 1.0 } else { -1.0 }, true)),
                other => Err(ArithError::NotAssignable(other.describe())),
            },
            other => Err(ArithError::UnexpectedToken(other.describe())),
        }
    }
}

fn apply(op: &str, a: f64, b: f64) -> Result<f64, ArithError> {
    Ok(match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" if b == 0.0 => return Err(ArithError::DivisionByZero),
        "/" => a / b,
        "%" if b == 0.0 => return Err(ArithError::DivisionByZero),
        "%" => a % b,
        "^" => a.powf(b),
        other => return Err(ArithError::UnexpectedToken(other.to_string())),
    })
}

fn eval(expr: &Expr, vars: &mut Variables) -> Result<f64, ArithError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Var(name) => vars
            .get(name)
            .copied()
            .ok_or_else(|| ArithError::UndefinedVariable(name.clone())),
        Expr::Neg(inner) => Ok(-eval(inner, vars)?),
        Expr::Binary(op, a, b) => {
            let a = eval(a, vars)?;
            let b = eval(b, vars)?;
            apply(op, a, b)
        }
        Expr::Assign(op, name, value) => {
            let value = eval(value, vars)?;
            let result = match *op {
                "=" => value,
                compound => {
                    let current = vars
                        .get(name)
                        .copied()
                        .ok_or_else(|| ArithError::UndefinedVariable(name.clone()))?;
                    apply(&compound[..1], current, value)?
                }
            };
            vars.insert(name.clone(), result);
            Ok(result)
        }
        Expr::Step(name, delta, prefix) => {
            let current = vars
                .get(name)
                .copied()
                .ok_or_else(|| ArithError::UndefinedVariable(name.clone()))?;
            vars.insert(name.clone(), current + delta);
            Ok(if *prefix { current + delta } else { current })
        }
        Expr::Seq(first, second) => {
            eval(first, vars)?;
            eval(second, vars)
        }
    }
}

/// Parse and evaluate `src`, reading and assigning `vars`.
pub fn evaluate(src: &str, vars: &mut Variables) -> Result<f64, ArithError> {
    let mut parser = Parser {
        tokens: lex(src)?,
        pos: 0,
    };
    let expr = parser.parse(0)?;
    if let Some(extra) = parser.peek() {
        return Err(ArithError::UnexpectedToken(extra.describe()));
    }
    eval(&expr, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(src: &str) -> Result<f64, ArithError> {
        evaluate(src, &mut Variables::default())
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(calc("1 + 2 * 3"), Ok(7.0));
        assert_eq!(calc("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(calc("2 ^ 3 ^ 2"), Ok(512.0));
        assert_eq!(calc("10 - 4 - 3"), Ok(3.0));
        assert_eq!(calc("-2 ^ 2"), Ok(-4.0));
        assert_eq!(calc("7 % 4"), Ok(3.0));
    }

    #[test]
    fn variables_persist_across_calls() {
        let mut vars = Variables::default();
        assert_eq!(evaluate("x = 3", &mut vars), Ok(3.0));
        assert_eq!(evaluate("x *= 4", &mut vars), Ok(12.0));
        assert_eq!(evaluate("x++", &mut vars), Ok(12.0));
        assert_eq!(evaluate("++x", &mut vars), Ok(14.0));
        assert_eq!(evaluate("a = b = 2 | a + b", &mut vars), Ok(4.0));
    }

    #[test]
    fn errors() {
        assert_eq!(calc("1 / 0"), Err(ArithError::DivisionByZero));
        assert_eq!(calc("y + 1"), Err(ArithError::UndefinedVariable("y".into())));
        assert_eq!(calc("3 = 4"), Err(ArithError::NotAssignable("=".into())));
        assert_eq!(calc("1 +"), Err(ArithError::UnexpectedEnd));
        assert_eq!(calc("1 2"), Err(ArithError::UnexpectedToken("2".into())));
        assert!(matches!(calc("1 # 2"), Err(ArithError::UnexpectedChar { ch: '#', .. })));
    }
}
