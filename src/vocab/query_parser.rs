//! Parser for the contents of a `<...>` vocabulary query.
//!
//! ```text
//! <noun.plural $ -animal|plant -!large ?//^b// !//s$// (1-2) ::=a !b>
//! <@pet: noun -animal>      local macro
//! <@pet = noun -animal>     run-global macro
//! <@pet>                    macro call
//! ```
//!
//! Problems are collected rather than returned at the first one: the parser
//! skips the offending token and keeps going, so one pass reports every
//! error in the query.

use regex::RegexBuilder;

use crate::core::lexer::split_regex;
use crate::schema::query::{Carrier, CarrierKind, ClassRule, Query, RegexFilter, SyllableRange};
use crate::schema::token::{is_valid_name, Position, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub pos: Position,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum QueryForm {
    Lookup(Query),
    Define {
        name: String,
        global: bool,
        query: Query,
    },
    Call(String),
}

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub form: QueryForm,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedQuery {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    end_pos: Position,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Cursor<'a> {
    fn skip_space(&mut self) {
        while self.peek_kind() == Some(TokenKind::Whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn take(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn here(&self) -> Position {
        self.peek().map_or(self.end_pos, |t| t.pos)
    }

    fn error(&mut self, pos: Position, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            pos,
            message: message.into(),
        });
    }

    /// Read a text token, reporting `what` if something else is there.
    fn text(&mut self, what: &str) -> Option<&'a Token> {
        self.skip_space();
        match self.peek() {
            Some(token) if token.is(TokenKind::Text) => {
                self.pos += 1;
                Some(token)
            }
            Some(token) => {
                let (pos, value) = (token.pos, token.value.clone());
                self.error(pos, format!("expected {}, found '{}'", what, value));
                None
            }
            None => {
                let pos = self.end_pos;
                self.error(pos, format!("expected {}, found end of query", what));
                None
            }
        }
    }
}

/// Parse the tokens between `<` and `>`. `end_pos` locates the closing `>`
/// for errors at the end of the query.
pub fn parse_query(tokens: &[Token], end_pos: Position) -> ParsedQuery {
    let mut cur = Cursor {
        tokens,
        pos: 0,
        end_pos,
        diagnostics: Vec::new(),
    };

    cur.skip_space();
    let mut macro_def = None;
    if cur.take(TokenKind::At) {
        let name = match cur.text("macro name") {
            Some(token) => {
                let name = token.value.trim().to_string();
                if !is_valid_name(&name) {
                    cur.error(token.pos, format!("invalid macro name '{}'", name));
                }
                name
            }
            None => String::new(),
        };
        cur.skip_space();
        if cur.take(TokenKind::Colon) {
            macro_def = Some((name, false));
        } else if cur.take(TokenKind::Equal) {
            macro_def = Some((name, true));
        } else {
            if let Some(extra) = cur.peek() {
                let (pos, value) = (extra.pos, extra.value.clone());
                cur.error(pos, format!("unexpected '{}' after macro name", value));
            }
            return ParsedQuery {
                form: QueryForm::Call(name),
                diagnostics: cur.diagnostics,
            };
        }
    }

    let query = parse_body(&mut cur);
    let form = match macro_def {
        Some((name, global)) => QueryForm::Define { name, global, query },
        None => QueryForm::Lookup(query),
    };
    ParsedQuery {
        form,
        diagnostics: cur.diagnostics,
    }
}

fn parse_body(cur: &mut Cursor<'_>) -> Query {
    let mut query = Query::default();

    if let Some(token) = cur.text("table name") {
        let name = token.value.trim();
        match name.split_once('.') {
            Some((table, subtype)) => {
                query.table = table.to_string();
                query.subtype = Some(subtype.to_string());
            }
            None => query.table = name.to_string(),
        }
    }

    cur.skip_space();
    query.exclusive = cur.take(TokenKind::Dollar);

    loop {
        cur.skip_space();
        let Some(token) = cur.next() else {
            break;
        };
        match token.kind {
            TokenKind::Hyphen => {
                let group = parse_class_group(cur, query.exclusive);
                query.class_filter.add_group(group);
            }
            TokenKind::Question | TokenKind::Exclamation => {
                let include = token.is(TokenKind::Question);
                cur.skip_space();
                match cur.peek() {
                    Some(re) if re.is(TokenKind::Regex) => {
                        cur.pos += 1;
                        match compile_regex(&re.value) {
                            Ok(regex) => query.regex_filters.push(RegexFilter { regex, include }),
                            Err(message) => cur.error(re.pos, message),
                        }
                    }
                    _ => {
                        let pos = cur.here();
                        cur.error(pos, format!("expected a regex after '{}'", token.value));
                    }
                }
            }
            TokenKind::LeftParen => {
                if let Some(range) = parse_syllables(cur, token.pos) {
                    query.syllables = Some(range);
                }
            }
            TokenKind::DoubleColon => {
                query.carrier = parse_carrier(cur);
                break;
            }
            _ => cur.error(token.pos, format!("unexpected '{}' in query", token.value)),
        }
    }

    query
}

fn parse_class_group(cur: &mut Cursor<'_>, exclusive: bool) -> Vec<ClassRule> {
    let mut group = Vec::new();
    loop {
        cur.skip_space();
        let negated = cur.take(TokenKind::Exclamation);
        if negated && exclusive {
            let pos = cur.here();
            cur.error(pos, "cannot negate classes in an exclusive query");
        }
        if let Some(token) = cur.text("class name") {
            group.push(ClassRule::new(token.value.trim(), !negated));
        }
        cur.skip_space();
        if !cur.take(TokenKind::Pipe) {
            return group;
        }
    }
}

fn parse_syllables(cur: &mut Cursor<'_>, open: Position) -> Option<SyllableRange> {
    let mut text = String::new();
    let mut closed = false;
    while let Some(token) = cur.next() {
        if token.is(TokenKind::RightParen) {
            closed = true;
            break;
        }
        text.push_str(&token.value);
    }
    if !closed {
        cur.error(open, "unterminated syllable range");
        return None;
    }

    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bound = |s: &str| -> Result<Option<u32>, ()> {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse::<u32>().map(Some).map_err(|_| ())
        }
    };

    let range = match text.split_once('-') {
        None => bound(&text).ok().flatten().map(SyllableRange::exactly),
        Some((min, max)) => match (bound(min), bound(max)) {
            (Ok(None), Ok(None)) => None,
            (Ok(min), Ok(max)) => Some(SyllableRange { min, max }),
            _ => None,
        },
    };

    match range {
        Some(r) if r.min.zip(r.max).map_or(true, |(a, b)| a <= b) => Some(r),
        _ => {
            cur.error(open, format!("invalid syllable range '({})'", text));
            None
        }
    }
}

fn parse_carrier(cur: &mut Cursor<'_>) -> Carrier {
    let mut carrier = Carrier::none();
    loop {
        cur.skip_space();
        let Some(token) = cur.next() else {
            break;
        };
        let kind = match token.kind {
            TokenKind::Equal => CarrierKind::Match,
            TokenKind::Exclamation => {
                if cur.take(TokenKind::Equal) {
                    CarrierKind::MatchUnique
                } else {
                    CarrierKind::Unique
                }
            }
            TokenKind::Ampersand => CarrierKind::Rhyme,
            TokenKind::At => {
                let base = if cur.take(TokenKind::Exclamation) {
                    CarrierKind::Dissociative
                } else if cur.take(TokenKind::Plus) {
                    CarrierKind::Divergent
                } else if cur.take(TokenKind::Question) {
                    CarrierKind::Relational
                } else {
                    CarrierKind::Associative
                };
                if cur.take(TokenKind::Equal) {
                    base.with_match().unwrap_or(base)
                } else {
                    base
                }
            }
            _ => {
                cur.error(token.pos, format!("unexpected '{}' in carrier", token.value));
                continue;
            }
        };

        if let Some(id) = cur.text("carrier id") {
            carrier.add(kind, id.value.trim());
        }
    }

    if carrier.is_none() {
        let pos = cur.end_pos;
        cur.error(pos, "empty carrier");
    }
    carrier
}

/// Build a regex from a lexed `pattern//flags` value.
pub fn compile_regex(value: &str) -> Result<regex::Regex, String> {
    let (pattern, flags) = split_regex(value);
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|e| format!("invalid regex: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;

    fn parse(src: &str) -> ParsedQuery {
        let tokens = tokenize(src).unwrap();
        parse_query(&tokens, Position::default())
    }

    fn lookup(src: &str) -> Query {
        let parsed = parse(src);
        assert!(parsed.is_ok(), "{:?}", parsed.diagnostics);
        match parsed.form {
            QueryForm::Lookup(q) => q,
            other => panic!("expected lookup, got {:?}", other),
        }
    }

    #[test]
    fn table_subtype_and_filters() {
        let q = lookup("noun.plural -animal|plant -!large ?//^b//i !//s$//");
        assert_eq!(q.table, "noun");
        assert_eq!(q.subtype.as_deref(), Some("plural"));
        assert_eq!(q.class_filter.groups.len(), 2);
        assert_eq!(q.class_filter.groups[0].len(), 2);
        assert!(!q.class_filter.groups[1][0].include);
        assert_eq!(q.regex_filters.len(), 2);
        assert!(q.regex_filters[0].accepts("Bat"));
        assert!(!q.regex_filters[1].accepts("bats"));
    }

    #[test]
    fn syllable_forms() {
        assert_eq!(lookup("n (2)").syllables, Some(SyllableRange::exactly(2)));
        assert_eq!(
            lookup("n (2-)").syllables,
            Some(SyllableRange { min: Some(2), max: None })
        );
        assert_eq!(
            lookup("n (-3)").syllables,
            Some(SyllableRange { min: None, max: Some(3) })
        );
        assert_eq!(
            lookup("n (1-4)").syllables,
            Some(SyllableRange { min: Some(1), max: Some(4) })
        );
    }

    #[test]
    fn bad_syllables_are_reported_and_parsing_continues() {
        let parsed = parse("n () (x) -animal");
        assert_eq!(parsed.diagnostics.len(), 2);
        match parsed.form {
            QueryForm::Lookup(q) => assert_eq!(q.class_filter.groups.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn carrier_components() {
        let q = lookup("noun ::=a !b !=c &d @e @!f @+g @?h @=i @!=j @+=k @?=l");
        let kinds: Vec<CarrierKind> = q.carrier.components.iter().map(|c| c.kind).collect();
        use CarrierKind::*;
        assert_eq!(
            kinds,
            vec![
                Match,
                Unique,
                MatchUnique,
                Rhyme,
                Associative,
                Dissociative,
                Divergent,
                Relational,
                MatchAssociative,
                MatchDissociative,
                MatchDivergent,
                MatchRelational
            ]
        );
        assert_eq!(q.carrier.components[0].id, "a");
    }

    #[test]
    fn carrier_must_be_last() {
        let parsed = parse("noun ::=a -animal");
        assert!(!parsed.is_ok());
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let parsed = parse("noun ; -animal & ::=x");
        assert_eq!(parsed.diagnostics.len(), 2);
        match parsed.form {
            QueryForm::Lookup(q) => {
                assert_eq!(q.class_filter.groups.len(), 1);
                assert_eq!(q.carrier.components.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn macros() {
        match parse("@pet: noun -animal").form {
            QueryForm::Define { name, global, query } => {
                assert_eq!(name, "pet");
                assert!(!global);
                assert_eq!(query.table, "noun");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse("@pet = noun").form,
            QueryForm::Define { global: true, .. }
        ));
        assert!(matches!(parse("@pet").form, QueryForm::Call(name) if name == "pet"));
    }

    #[test]
    fn exclusive_forbids_negation() {
        let parsed = parse("noun $ -!animal");
        assert_eq!(parsed.diagnostics.len(), 1);
    }
}
