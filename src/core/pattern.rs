//! Compiled patterns and the token ranges that reference them.
//!
//! A [`Pattern`] owns its token stream and is never mutated after
//! compilation, apart from the block cache, which memoizes parsed block item
//! boundaries and tolerates concurrent read-through population.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::error::EngineError;
use crate::core::lexer;
use crate::schema::token::{Position, Token, TokenKind};

/// A half-open range of token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Item boundaries of a `{...}` block, plus the index just past its `}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockItems {
    pub items: Vec<Span>,
    pub end: usize,
}

pub struct Pattern {
    name: String,
    source: String,
    tokens: Vec<Token>,
    blocks: RwLock<FxHashMap<usize, Arc<BlockItems>>>,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl Pattern {
    /// Lex `source` into a shareable pattern.
    pub fn compile(name: impl Into<String>, source: impl Into<String>) -> Result<Arc<Pattern>, EngineError> {
        let name = name.into();
        let source = source.into();
        let tokens = lexer::tokenize(&source)
            .map_err(|e| EngineError::syntax(&name, e.pos, e.message))?;
        Ok(Arc::new(Pattern {
            name,
            source,
            tokens,
            blocks: RwLock::new(FxHashMap::default()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Position of the token at `index`, or of the end of the source.
    pub fn position(&self, index: usize) -> Position {
        match self.tokens.get(index).or_else(|| self.tokens.last()) {
            Some(token) => token.pos,
            None => Position::default(),
        }
    }

    /// Find the token that closes the bracket at `open`.
    ///
    /// Every bracket pair nests; a closer that does not match the innermost
    /// open bracket is a syntax error.
    pub fn scope_close(&self, open: usize) -> Result<usize, EngineError> {
        let opener = &self.tokens[open];
        let closer = opener.kind.closer().ok_or_else(|| {
            EngineError::syntax(&self.name, opener.pos, format!("'{}' does not open a scope", opener.value))
        })?;

        let mut expected = vec![closer];
        for (i, token) in self.tokens.iter().enumerate().skip(open + 1) {
            if let Some(inner) = token.kind.closer() {
                expected.push(inner);
            } else if token.kind.is_closer() {
                if expected.last() != Some(&token.kind) {
                    return Err(EngineError::syntax(
                        &self.name,
                        token.pos,
                        format!("unexpected '{}' inside scope opened at {}", token.value, opener.pos),
                    ));
                }
                expected.pop();
                if expected.is_empty() {
                    return Ok(i);
                }
            }
        }

        Err(EngineError::syntax(
            &self.name,
            opener.pos,
            format!("unterminated '{}'", opener.value),
        ))
    }

    /// Split `span` on `sep` tokens at bracket depth zero.
    pub fn split(&self, span: Span, sep: TokenKind, trim: bool) -> Vec<Span> {
        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut start = span.start;

        for i in span.start..span.end {
            let kind = self.tokens[i].kind;
            if kind.closer().is_some() {
                depth += 1;
            } else if kind.is_closer() {
                depth = depth.saturating_sub(1);
            } else if kind == sep && depth == 0 {
                items.push(Span::new(start, i));
                start = i + 1;
            }
        }
        items.push(Span::new(start, span.end));

        if trim {
            items.iter_mut().for_each(|item| *item = self.trim(*item));
        }
        items
    }

    /// Drop whitespace tokens from both ends of a span.
    pub fn trim(&self, mut span: Span) -> Span {
        while span.start < span.end && self.tokens[span.start].is(TokenKind::Whitespace) {
            span.start += 1;
        }
        while span.end > span.start && self.tokens[span.end - 1].is(TokenKind::Whitespace) {
            span.end -= 1;
        }
        span
    }

    /// Concatenated raw text of a span.
    pub fn text(&self, span: Span) -> String {
        self.tokens[span.start..span.end]
            .iter()
            .map(|t| t.value.as_str())
            .collect()
    }

    /// Parse (or fetch from cache) the items of the block opened at `open`.
    pub fn block(&self, open: usize) -> Result<Arc<BlockItems>, EngineError> {
        let cached = self
            .blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&open)
            .cloned();
        if let Some(block) = cached {
            return Ok(block);
        }

        let close = self.scope_close(open)?;
        let body = Span::new(open + 1, close);
        let items = if self.trim(body).is_empty() {
            Vec::new()
        } else {
            self.split(body, TokenKind::Pipe, false)
        };
        let block = Arc::new(BlockItems {
            items,
            end: close + 1,
        });

        // Last writer wins; the value is deterministic.
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(open, Arc::clone(&block));
        Ok(block)
    }
}

/// A token range inside a shared pattern, used for deferred code arguments,
/// block items, and subroutine bodies.
#[derive(Clone)]
pub struct Code {
    pub pattern: Arc<Pattern>,
    pub span: Span,
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({}:{}..{})", self.pattern.name(), self.span.start, self.span.end)
    }
}

impl Code {
    pub fn new(pattern: &Arc<Pattern>, span: Span) -> Self {
        Self {
            pattern: Arc::clone(pattern),
            span,
        }
    }

    pub fn whole(pattern: &Arc<Pattern>) -> Self {
        Self::new(pattern, Span::new(0, pattern.len()))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.pattern.tokens()[self.span.start..self.span.end]
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn text(&self) -> String {
        self.pattern.text(self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_close_nests() {
        let p = Pattern::compile("t", "{a[b:{c}]d}e").unwrap();
        assert_eq!(p.scope_close(0).unwrap(), 10);
        assert_eq!(p.tokens()[11].value, "e");
    }

    #[test]
    fn scope_close_reports_mismatch() {
        let p = Pattern::compile("t", "{a]").unwrap();
        assert!(p.scope_close(0).is_err());
        let p = Pattern::compile("t", "{a").unwrap();
        assert!(p.scope_close(0).is_err());
    }

    #[test]
    fn split_respects_depth_and_trims() {
        let p = Pattern::compile("t", "[x: a ; {b;c} ;d]").unwrap();
        let close = p.scope_close(0).unwrap();
        let items = p.split(Span::new(3, close), TokenKind::Semicolon, true);
        let texts: Vec<String> = items.iter().map(|s| p.text(*s)).collect();
        assert_eq!(texts, vec!["a", "{b;c}", "d"]);
    }

    #[test]
    fn block_is_cached() {
        let p = Pattern::compile("t", "{a|b|c}").unwrap();
        let first = p.block(0).unwrap();
        let second = p.block(0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.end, 7);
    }

    #[test]
    fn empty_block_has_no_items() {
        let p = Pattern::compile("t", "{}").unwrap();
        assert!(p.block(0).unwrap().items.is_empty());
    }

    #[test]
    fn concurrent_block_population() {
        let p = Pattern::compile("t", "x{a|{b|c}|d}y").unwrap();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let block = p.block(1).unwrap();
                    assert_eq!(block.items.len(), 3);
                });
            }
        });
    }
}
