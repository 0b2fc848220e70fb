//! Execution states and the deferred continuations attached to them.
//!
//! A [`State`] walks one [`Code`] range. Constructs that need a child to run
//! first push a new state and leave a [`Blueprint`] behind on the parent:
//! pre-blueprints run before the parent reads its next token, post-blueprints
//! run once when a state is popped.

use regex::Regex;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::pattern::{Code, Pattern};
use crate::core::tags::{Op, Param};
use crate::schema::token::Position;

/// What the driver does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading from the same state.
    Continue,
    /// A state or blueprint was pushed; restart from the top of the stack.
    Restart,
}

/// Whether a pushed state writes into its parent's sink or a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Inherit,
    Own,
}

pub struct State {
    pub code: Code,
    /// Absolute token index into `code.pattern`.
    pub cursor: usize,
    pub pre: VecDeque<Blueprint>,
    pub post: Vec<Blueprint>,
    /// Index into the run's sink stack.
    pub sink: usize,
    pub owns_sink: bool,
    pub else_armed: bool,
}

impl State {
    pub fn new(code: Code, sink: usize, owns_sink: bool) -> Self {
        let cursor = code.span.start;
        Self {
            code,
            cursor,
            pre: VecDeque::new(),
            post: Vec::new(),
            sink,
            owns_sink,
            else_armed: false,
        }
    }

    pub fn pattern(&self) -> &Arc<Pattern> {
        &self.code.pattern
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.code.span.end
    }
}

/// A bound tag or subroutine argument.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(String),
    Code(Code),
}

impl Arg {
    /// Text of a value argument; code arguments read as empty.
    pub fn text(&self) -> &str {
        match self {
            Arg::Value(text) => text,
            Arg::Code(_) => "",
        }
    }

    pub fn code(&self) -> Option<&Code> {
        match self {
            Arg::Code(code) => Some(code),
            Arg::Value(_) => None,
        }
    }
}

/// Arguments of a call, evaluated one value argument at a time.
#[derive(Debug)]
pub struct Pending {
    pub raw: Vec<Code>,
    /// `true` where the parameter takes code rather than a value.
    pub deferred: Vec<bool>,
    pub done: Vec<Arg>,
    /// A child state is producing the next value.
    pub awaiting: bool,
}

impl Pending {
    pub fn new(raw: Vec<Code>, deferred: Vec<bool>) -> Self {
        let done = Vec::with_capacity(raw.len());
        Self {
            raw,
            deferred,
            done,
            awaiting: false,
        }
    }

    /// Argument plan for a tag signature. Variadic tails take values.
    pub fn for_params(raw: Vec<Code>, params: &[Param]) -> Self {
        let deferred = (0..raw.len())
            .map(|i| params.get(i) == Some(&Param::Code))
            .collect();
        Self::new(raw, deferred)
    }

    pub fn is_complete(&self) -> bool {
        self.done.len() >= self.raw.len()
    }
}

#[derive(Debug)]
pub struct TagCall {
    pub op: Op,
    pub name: String,
    pub pos: Position,
    pub args: Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubParam {
    pub name: String,
    pub code: bool,
}

/// A user-defined subroutine. Identified by name and parameter count.
#[derive(Debug, Clone)]
pub struct Subroutine {
    pub name: String,
    pub params: Vec<SubParam>,
    pub body: Code,
}

impl Subroutine {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Subroutines keyed by `(name, arity)`.
pub type SubTable = FxHashMap<(String, usize), Arc<Subroutine>>;

#[derive(Debug)]
pub struct SubCall {
    pub sub: Arc<Subroutine>,
    pub pos: Position,
    pub args: Pending,
}

/// One regex match exposed to `[match]` and `[group]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub groups: Vec<Option<String>>,
    pub named: FxHashMap<String, String>,
}

impl MatchData {
    pub fn from_captures(regex: &Regex, caps: &regex::Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let groups = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(Self {
            value: whole.as_str().to_string(),
            start: whole.start(),
            end: whole.end(),
            groups,
            named,
        })
    }
}

/// Progress of a `[//re//:input;replacement]` tag.
#[derive(Debug)]
pub struct Replacer {
    pub regex: Regex,
    pub replacement: Code,
    pub pos: Position,
    /// `None` until the input argument has been evaluated.
    pub input: Option<String>,
    pub matches: Vec<MatchData>,
    pub next: usize,
    pub last_end: usize,
    pub buffer: String,
    pub awaiting: bool,
}

impl Replacer {
    pub fn new(regex: Regex, replacement: Code, pos: Position) -> Self {
        Self {
            regex,
            replacement,
            pos,
            input: None,
            matches: Vec::new(),
            next: 0,
            last_end: 0,
            buffer: String::new(),
            awaiting: false,
        }
    }
}

/// Result of `[cmp]`, tested by `[is]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub ordering: Ordering,
    pub numeric: bool,
}

impl Comparison {
    /// Compare numerically when both sides parse as numbers, else as text.
    pub fn new(a: &str, b: &str) -> Self {
        match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            (Ok(x), Ok(y)) => Self {
                ordering: x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                numeric: true,
            },
            _ => Self {
                ordering: a.cmp(b),
                numeric: false,
            },
        }
    }

    /// Test one named flag. `None` for unknown names.
    pub fn has(&self, flag: &str) -> Option<bool> {
        let normalized: String = flag
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Some(match normalized.as_str() {
            "equal" | "eq" => self.ordering == Ordering::Equal,
            "notequal" | "ne" => self.ordering != Ordering::Equal,
            "less" | "lt" => self.ordering == Ordering::Less,
            "greater" | "gt" => self.ordering == Ordering::Greater,
            "lessequal" | "le" => self.ordering != Ordering::Greater,
            "greaterequal" | "ge" => self.ordering != Ordering::Less,
            "numeric" => self.numeric,
            "textual" => !self.numeric,
            _ => return None,
        })
    }
}

/// Cleanup and completion steps that only need interpreter data.
#[derive(Debug)]
pub enum Deferred {
    PopComparison,
    PopSubArgs,
    /// Evaluate the popped result as arithmetic; print unless a statement.
    MathResult { statement: bool, pos: Position },
    /// Compile the popped result as the body of a new subroutine.
    DefineMetaSub {
        name: String,
        params: Vec<SubParam>,
        pos: Position,
    },
}

#[derive(Debug)]
pub enum Blueprint {
    /// Drive the innermost repeater; re-arms itself until it finishes.
    Repeater,
    TagCall(TagCall),
    SubCall(SubCall),
    /// Settle an `alt`/`any` trial that ran into its own sink.
    Alt { fallback: Code, any: bool },
    Replacer(Box<Replacer>),
    /// Run the popped result as a pattern.
    Metapattern { pos: Position },
    Deferred(Deferred),
}

/// Heights of the per-run stacks when a block was entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Marks {
    pub comparisons: usize,
    pub sub_args: usize,
    pub matches: usize,
    pub results: usize,
}

/// The state a repeater was entered from; `break` unwinds back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseFrame {
    pub depth: usize,
    pub marks: Marks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_prefers_numbers() {
        let cmp = Comparison::new("10", "9");
        assert!(cmp.numeric);
        assert_eq!(cmp.has("greater"), Some(true));
        assert_eq!(cmp.has("greater-equal"), Some(true));
        assert_eq!(cmp.has("less"), Some(false));

        let cmp = Comparison::new("10", "9x");
        assert!(!cmp.numeric);
        assert_eq!(cmp.has("less"), Some(true));
        assert_eq!(cmp.has("textual"), Some(true));
    }

    #[test]
    fn comparison_flag_names() {
        let cmp = Comparison::new("a", "a");
        assert_eq!(cmp.has("Equal"), Some(true));
        assert_eq!(cmp.has("not_equal"), Some(false));
        assert_eq!(cmp.has("sideways"), None);
    }

    #[test]
    fn pending_marks_code_params() {
        let pattern = Pattern::compile("t", "a;b;c").unwrap();
        let raw = vec![
            Code::new(&pattern, crate::core::pattern::Span::new(0, 1)),
            Code::new(&pattern, crate::core::pattern::Span::new(2, 3)),
            Code::new(&pattern, crate::core::pattern::Span::new(4, 5)),
        ];
        let pending = Pending::for_params(raw, &[Param::Value, Param::Code]);
        assert_eq!(pending.deferred, vec![false, true, false]);
        assert!(!pending.is_complete());
    }

    #[test]
    fn match_data_collects_groups() {
        let regex = Regex::new(r"(?P<first>\w)(\d)?").unwrap();
        let caps = regex.captures("x-a").unwrap();
        let data = MatchData::from_captures(&regex, &caps).unwrap();
        assert_eq!(data.value, "x");
        assert_eq!(data.groups, vec![Some("x".into()), Some("x".into()), None]);
        assert_eq!(data.named.get("first").map(String::as_str), Some("x"));
        assert_eq!((data.start, data.end), (0, 1));
    }
}
