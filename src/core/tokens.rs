//! Handlers for each token category the driver reads.

use rand::Rng;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::core::error::EngineError;
use crate::core::lexer::split_regex;
use crate::core::pattern::{Code, Pattern, Span};
use crate::core::repeater::Repeater;
use crate::core::state::{
    BaseFrame, Blueprint, Deferred, Flow, Pending, Replacer, SinkMode, SubCall, SubParam,
    Subroutine, TagCall,
};
use crate::core::tags;
use crate::core::interpreter::Interpreter;
use crate::schema::query::Query;
use crate::schema::token::{is_valid_name, Position, TokenKind};
use crate::vocab::carrier::{self, QueryError};
use crate::vocab::query_parser::{parse_query, QueryForm};

impl<'e> Interpreter<'e> {
    /// Execute the token at `index` of the current state's pattern. The
    /// cursor has already moved past it; construct handlers move it past
    /// their closing bracket.
    pub(crate) fn dispatch(&mut self, pattern: &Arc<Pattern>, index: usize) -> Result<Flow, EngineError> {
        let token = &pattern.tokens()[index];
        trace!(kind = ?token.kind, pos = %token.pos, "dispatch");

        match token.kind {
            TokenKind::LeftCurly => self.do_block(pattern, index),
            TokenKind::LeftSquare => self.do_tag(pattern, index),
            TokenKind::LeftParen => self.do_math(pattern, index),
            TokenKind::LeftAngle => self.do_query(pattern, index),
            TokenKind::Escape => {
                let text = self.unescape(&token.value, token.pos)?;
                self.print(&text);
                Ok(Flow::Continue)
            }
            TokenKind::Regex => {
                let (body, flags) = split_regex(&token.value);
                let text = format!("//{}//{}", body, flags);
                self.print(&text);
                Ok(Flow::Continue)
            }
            kind if kind.is_closer() => Err(self.syntax(
                token.pos,
                format!("unexpected '{}' without a matching opener", token.value),
            )),
            _ => {
                self.print(&token.value);
                Ok(Flow::Continue)
            }
        }
    }

    fn do_block(&mut self, pattern: &Arc<Pattern>, index: usize) -> Result<Flow, EngineError> {
        let block = pattern.block(index)?;
        self.set_cursor(block.end);
        let attribs = self.next_attribs.take();

        if block.items.is_empty() {
            return Ok(Flow::Continue);
        }
        if let Some(chance) = attribs.chance {
            if self.rng.gen_range(0..100) >= chance {
                return Ok(Flow::Continue);
            }
        }

        let rep = Repeater::new(pattern, block, attribs);
        if rep.count() == 0 {
            return Ok(Flow::Continue);
        }
        self.frames.push(BaseFrame {
            depth: self.states.len().saturating_sub(1),
            marks: self.marks(),
        });
        self.repeaters.push(rep);
        self.add_pre(Blueprint::Repeater);
        Ok(Flow::Restart)
    }

    fn do_tag(&mut self, pattern: &Arc<Pattern>, index: usize) -> Result<Flow, EngineError> {
        let close = pattern.scope_close(index)?;
        self.set_cursor(close + 1);
        let tokens = pattern.tokens();
        let open_pos = tokens[index].pos;

        let start = skip_space(pattern, index + 1, close);
        if start == close {
            return Err(self.syntax(open_pos, "empty tag"));
        }
        let first = &tokens[start];

        match first.kind {
            TokenKind::Question => {
                let body = pattern.trim(Span::new(start + 1, close));
                self.add_pre(Blueprint::Metapattern { pos: open_pos });
                self.push_state(Code::new(pattern, body), SinkMode::Own, None)?;
                Ok(Flow::Restart)
            }
            TokenKind::Regex => self.do_replacer(pattern, start, close, open_pos),
            TokenKind::Dollar => self.do_subroutine(pattern, start + 1, close, open_pos),
            TokenKind::Text => {
                let name = first.value.as_str();
                if !is_valid_name(name) {
                    return Err(self.semantic(first.pos, format!("invalid tag name '{}'", name)));
                }
                let args = self.tag_args(pattern, start + 1, close, name)?;
                let sig = tags::resolve(name, args.len())
                    .map_err(|message| self.semantic(first.pos, message))?;
                let raw = args.into_iter().map(|span| Code::new(pattern, span)).collect();
                self.add_pre(Blueprint::TagCall(TagCall {
                    op: sig.op,
                    name: name.to_string(),
                    pos: open_pos,
                    args: Pending::for_params(raw, sig.params),
                }));
                Ok(Flow::Restart)
            }
            _ => Err(self.syntax(
                first.pos,
                format!("expected a tag name, found '{}'", first.value),
            )),
        }
    }

    /// Argument spans after a tag or call name: nothing, or `:`/`;` followed
    /// by `;`-separated arguments.
    fn tag_args(
        &self,
        pattern: &Arc<Pattern>,
        after_name: usize,
        close: usize,
        name: &str,
    ) -> Result<Vec<Span>, EngineError> {
        let at = skip_space(pattern, after_name, close);
        if at == close {
            return Ok(Vec::new());
        }
        let token = &pattern.tokens()[at];
        match token.kind {
            TokenKind::Colon | TokenKind::Semicolon => {
                Ok(pattern.split(Span::new(at + 1, close), TokenKind::Semicolon, true))
            }
            _ => Err(self.syntax(
                token.pos,
                format!("expected ':' or ']' after '{}', found '{}'", name, token.value),
            )),
        }
    }

    fn do_replacer(
        &mut self,
        pattern: &Arc<Pattern>,
        at: usize,
        close: usize,
        pos: Position,
    ) -> Result<Flow, EngineError> {
        let tokens = pattern.tokens();
        let regex = self.compile_replacer_regex(&tokens[at].value, tokens[at].pos)?;
        let args = self.tag_args(pattern, at + 1, close, "replacer")?;
        if args.len() != 2 {
            return Err(self.syntax(
                pos,
                format!("a replacer takes an input and a replacement, found {} argument(s)", args.len()),
            ));
        }
        let input = Code::new(pattern, args[0]);
        let replacement = Code::new(pattern, args[1]);

        self.add_pre(Blueprint::Replacer(Box::new(Replacer::new(regex, replacement, pos))));
        self.push_state(input, SinkMode::Own, None)?;
        Ok(Flow::Restart)
    }

    /// `[$name:args]` calls; `[$[name:params]:body]` and `[$?[...]:body]`
    /// define.
    fn do_subroutine(
        &mut self,
        pattern: &Arc<Pattern>,
        at: usize,
        close: usize,
        pos: Position,
    ) -> Result<Flow, EngineError> {
        let tokens = pattern.tokens();
        let Some(next) = tokens.get(at).filter(|_| at < close) else {
            return Err(self.syntax(pos, "expected a subroutine name after '$'"));
        };

        if next.kind == TokenKind::Text {
            let name = next.value.as_str();
            let args = self.tag_args(pattern, at + 1, close, name)?;
            let sub = self
                .subs
                .get(&(name.to_string(), args.len()))
                .cloned()
                .ok_or_else(|| {
                    self.semantic(
                        next.pos,
                        format!("no subroutine '{}' taking {} argument(s)", name, args.len()),
                    )
                })?;
            let raw = args.into_iter().map(|span| Code::new(pattern, span)).collect();
            let deferred = sub.params.iter().map(|p| p.code).collect();
            self.add_pre(Blueprint::SubCall(SubCall {
                sub,
                pos,
                args: Pending::new(raw, deferred),
            }));
            return Ok(Flow::Restart);
        }

        let meta = next.kind == TokenKind::Question;
        let sig_open = if meta { at + 1 } else { at };
        if tokens.get(sig_open).map(|t| t.kind) != Some(TokenKind::LeftSquare) || sig_open >= close {
            return Err(self.syntax(next.pos, "expected a subroutine name or '[' after '$'"));
        }
        let sig_close = pattern.scope_close(sig_open)?;
        let (name, params) = self.sub_signature(pattern, sig_open + 1, sig_close)?;

        let colon = skip_space(pattern, sig_close + 1, close);
        if colon == close || tokens[colon].kind != TokenKind::Colon {
            return Err(self.syntax(
                pattern.position(colon),
                format!("expected ':' before the body of subroutine '{}'", name),
            ));
        }
        let body = Code::new(pattern, pattern.trim(Span::new(colon + 1, close)));

        if meta {
            self.add_pre(Blueprint::Deferred(Deferred::DefineMetaSub { name, params, pos }));
            self.push_state(body, SinkMode::Own, None)?;
            return Ok(Flow::Restart);
        }
        self.define_sub(Subroutine { name, params, body });
        Ok(Flow::Continue)
    }

    fn sub_signature(
        &self,
        pattern: &Arc<Pattern>,
        start: usize,
        end: usize,
    ) -> Result<(String, Vec<SubParam>), EngineError> {
        let tokens = pattern.tokens();
        let at = skip_space(pattern, start, end);
        let name = match tokens.get(at) {
            Some(t) if at < end && t.kind == TokenKind::Text && is_valid_name(&t.value) => t.value.clone(),
            _ => {
                return Err(self.semantic(pattern.position(at), "invalid subroutine name"));
            }
        };

        let mut params = Vec::new();
        for span in self.tag_args(pattern, at + 1, end, &name)? {
            let span = pattern.trim(span);
            let slice = &tokens[span.start..span.end];
            let (code, rest) = match slice.split_first() {
                Some((first, rest)) if first.kind == TokenKind::At => (true, rest),
                _ => (false, slice),
            };
            match rest {
                [param] if param.kind == TokenKind::Text && is_valid_name(&param.value) => {
                    params.push(SubParam {
                        name: param.value.clone(),
                        code,
                    });
                }
                _ => {
                    return Err(self.semantic(
                        pattern.position(span.start),
                        format!("invalid parameter '{}' for subroutine '{}'", pattern.text(span), name),
                    ));
                }
            }
        }
        Ok((name, params))
    }

    fn do_math(&mut self, pattern: &Arc<Pattern>, index: usize) -> Result<Flow, EngineError> {
        let close = pattern.scope_close(index)?;
        self.set_cursor(close + 1);
        let pos = pattern.tokens()[index].pos;

        let mut start = skip_space(pattern, index + 1, close);
        let statement = start < close && pattern.tokens()[start].kind == TokenKind::At;
        if statement {
            start += 1;
        }

        self.add_pre(Blueprint::Deferred(Deferred::MathResult { statement, pos }));
        self.push_state(Code::new(pattern, Span::new(start, close)), SinkMode::Own, None)?;
        Ok(Flow::Restart)
    }

    fn do_query(&mut self, pattern: &Arc<Pattern>, index: usize) -> Result<Flow, EngineError> {
        let close = pattern.scope_close(index)?;
        self.set_cursor(close + 1);
        let tokens = pattern.tokens();
        let pos = tokens[index].pos;

        let parsed = parse_query(&tokens[index + 1..close], tokens[close].pos);
        if let Some((first, rest)) = parsed.diagnostics.split_first() {
            for extra in rest {
                warn!(pos = %extra.pos, message = %extra.message, "further query error");
            }
            return Err(self.syntax(first.pos, first.message.clone()));
        }

        match parsed.form {
            QueryForm::Lookup(query) => {
                let word = self.resolve_query(&query, pos)?;
                self.print(&word);
            }
            QueryForm::Define {
                name,
                global,
                query,
            } => {
                if global {
                    self.global_macros.insert(name, query);
                } else {
                    self.local_macros
                        .insert((pattern.name().to_string(), name), query);
                }
            }
            QueryForm::Call(name) => {
                let query = self
                    .local_macros
                    .get(&(pattern.name().to_string(), name.clone()))
                    .or_else(|| self.global_macros.get(&name))
                    .cloned()
                    .ok_or_else(|| self.semantic(pos, format!("undefined query macro '{}'", name)))?;
                let word = self.resolve_query(&query, pos)?;
                self.print(&word);
            }
        }
        Ok(Flow::Continue)
    }

    fn resolve_query(&mut self, query: &Query, pos: Position) -> Result<String, EngineError> {
        let engine = self.engine;
        let Some(vocabulary) = engine.vocabulary.as_deref() else {
            return Err(self.semantic(pos, "no vocabulary is loaded"));
        };
        carrier::resolve(vocabulary, engine.rules.as_ref(), &mut self.carriers, query, &mut self.rng)
            .map_err(|e| {
                let name = self.pattern_name();
                match e {
                    QueryError::Lookup(source) => {
                        EngineError::external(&name, pos, format!("lookup <{}>", query.table), source)
                    }
                    other => EngineError::exhausted(&name, pos, other.to_string()),
                }
            })
    }

    /// Expand an escape body (`n`, `3,d`, `u00e9`, ...).
    fn unescape(&mut self, value: &str, pos: Position) -> Result<String, EngineError> {
        let (count, code) = match value.split_once(',') {
            Some((digits, code))
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && !code.is_empty() =>
            {
                let count = digits
                    .parse::<usize>()
                    .map_err(|_| self.syntax(pos, format!("invalid escape count '{}'", digits)))?;
                (count, code)
            }
            _ => (1, value),
        };
        if count > self.engine.config().max_repetitions {
            return Err(self.semantic(pos, format!("escape count {} is too large", count)));
        }

        let mut out = String::new();
        for _ in 0..count {
            out.push(self.escape_char(code, pos)?);
        }
        Ok(out)
    }

    fn escape_char(&mut self, code: &str, pos: Position) -> Result<char, EngineError> {
        const HEX_LOWER: &[u8] = b"0123456789abcdef";
        const HEX_UPPER: &[u8] = b"0123456789ABCDEF";

        let mut chars = code.chars();
        let Some(c) = chars.next() else {
            return Err(self.syntax(pos, "empty escape sequence"));
        };
        let rng = &mut self.rng;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            's' => ' ',
            'd' => char::from(b'0' + rng.gen_range(0..10u8)),
            'D' => char::from(b'1' + rng.gen_range(0..9u8)),
            'c' => char::from(b'a' + rng.gen_range(0..26u8)),
            'C' => char::from(b'A' + rng.gen_range(0..26u8)),
            'x' => char::from(HEX_LOWER[rng.gen_range(0..16)]),
            'X' => char::from(HEX_UPPER[rng.gen_range(0..16)]),
            'u' => {
                let hex: String = chars.collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.syntax(pos, format!("invalid unicode escape '\\u{}'", hex)))?
            }
            other => other,
        })
    }
}

/// First index in `from..end` that is not whitespace.
fn skip_space(pattern: &Pattern, from: usize, end: usize) -> usize {
    let tokens = pattern.tokens();
    let mut i = from;
    while i < end && tokens[i].kind == TokenKind::Whitespace {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use crate::core::engine::Engine;
    use crate::core::error::ErrorKind;

    fn run(src: &str) -> String {
        Engine::builder()
            .build()
            .unwrap()
            .run_str(src, 11)
            .unwrap()
            .main()
            .to_string()
    }

    fn fail(src: &str) -> ErrorKind {
        Engine::builder()
            .build()
            .unwrap()
            .run_str(src, 11)
            .unwrap_err()
            .error
            .kind()
    }

    #[test]
    fn escapes() {
        assert_eq!(run(r"a\nb\tc\sé\\"), "a\nb\tc é\\");
        let digits = run(r"\8,d");
        assert_eq!(digits.len(), 8);
        assert!(digits.bytes().all(|b| b.is_ascii_digit()));
        assert!(run(r"\X").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn punctuation_and_literals_print() {
        assert_eq!(run(r#"Hi: "[not a tag]"; ok!"#), "Hi: [not a tag]; ok!");
        assert_eq!(run("//a+//i"), "//a+//i");
    }

    #[test]
    fn stray_closers_are_syntax_errors() {
        assert_eq!(fail("oops]"), ErrorKind::Syntax);
        assert_eq!(fail("a}"), ErrorKind::Syntax);
        assert_eq!(fail("[rep:2"), ErrorKind::Syntax);
    }

    #[test]
    fn tag_shapes() {
        assert_eq!(fail("[ ]"), ErrorKind::Syntax);
        assert_eq!(fail("[rep 2]"), ErrorKind::Syntax);
        assert_eq!(fail("[nosuchtag]"), ErrorKind::Semantic);
        assert_eq!(fail("[rep:1;2;3]"), ErrorKind::Semantic);
        assert_eq!(run("[ rep : 2 ]{x}"), "xx");
    }

    #[test]
    fn subroutines_define_and_call() {
        let out = run("[$[greet:who]:Hello, [arg:who]!][$greet:Ada] [$greet:[r:2]{o}]");
        assert_eq!(out, "Hello, Ada! Hello, oo!");
    }

    #[test]
    fn code_parameters_run_at_each_use() {
        let out = run("[$[twice:@body]:[arg:body][arg:body]][$twice:[r:each]{a|b}]");
        assert_eq!(out, "abab");
    }

    #[test]
    fn subroutines_are_keyed_by_arity() {
        let out = run("[$[f]:zero][$[f:x]:one [arg:x]][$f][$f:1]");
        assert_eq!(out, "zeroone 1");
        assert_eq!(fail("[$[f]:zero][$f:1;2]"), ErrorKind::Semantic);
    }

    #[test]
    fn meta_definitions_compile_generated_bodies() {
        let out = run(r#"[$?[shout:w]:"[arg:w]"!][$shout:hey]"#);
        assert_eq!(out, "hey!");
    }

    #[test]
    fn queries_without_vocabulary_fail() {
        assert_eq!(fail("<noun>"), ErrorKind::Semantic);
        assert_eq!(fail("<noun (x)>"), ErrorKind::Syntax);
    }
}
