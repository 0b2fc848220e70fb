//! The tag operation table.
//!
//! Every `[name:args]` tag resolves through [`signatures`], a static table
//! from name to the parameter lists the operation accepts. Value parameters
//! are evaluated to text before the operation runs; code parameters are
//! passed as token ranges and run only if the operation decides to.

use rand::Rng;
use tracing::{debug, warn};

use crate::core::error::EngineError;
use crate::core::format::{Capitalization, NumberFormat};
use crate::core::interpreter::Interpreter;
use crate::core::output::Visibility;
use crate::core::pattern::Code;
use crate::core::repeater::{Repeater, Reps};
use crate::core::state::{Arg, Blueprint, Comparison, Deferred, Flow, SinkMode};
use crate::core::sync::SyncKind;
use crate::schema::token::{is_valid_name, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Value,
    Code,
    /// Zero or more trailing values.
    Variadic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Rep,
    Sep,
    Before,
    After,
    Chance,
    Num,
    Sync,
    Desync,
    Pin,
    Unpin,
    Step,
    Reset,
    Reseed,
    First,
    Last,
    Middle,
    NotFirst,
    NotLast,
    NotMiddle,
    Odd,
    Even,
    Nth,
    RepNum,
    RepIndex,
    RepCount,
    Alt,
    Any,
    Match,
    Group,
    Arg,
    NumFmt,
    Caps,
    CapsInfer,
    Out,
    Close,
    Get,
    Send,
    OSend,
    ClearTarget,
    Mark,
    Dist,
    Len,
    Char,
    Define,
    Undef,
    IfDef,
    IfNDef,
    Else,
    Cmp,
    Is,
    Break,
    Extern,
    Src,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub op: Op,
    pub params: &'static [Param],
}

impl Signature {
    pub fn is_variadic(&self) -> bool {
        self.params.last() == Some(&Param::Variadic)
    }

    /// Fewest arguments this signature accepts.
    pub fn min_args(&self) -> usize {
        if self.is_variadic() {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }
}

use Param::{Code as C, Value as V, Variadic as M};

macro_rules! sigs {
    ($($op:ident [$($p:ident),*]),+ $(,)?) => {
        &[$(Signature { op: Op::$op, params: &[$($p),*] }),+]
    };
}

/// Every signature registered under `name`.
pub fn signatures(name: &str) -> Option<&'static [Signature]> {
    let table: &'static [Signature] = match name {
        "rep" | "r" => sigs![Rep[V]],
        "sep" | "s" => sigs![Sep[C]],
        "before" => sigs![Before[C]],
        "after" => sigs![After[C]],
        "chance" => sigs![Chance[V]],
        "num" | "n" => sigs![Num[V, V]],
        "sync" => sigs![Sync[V, V]],
        "desync" => sigs![Desync[]],
        "pin" => sigs![Pin[V]],
        "unpin" => sigs![Unpin[V]],
        "step" => sigs![Step[V]],
        "reset" => sigs![Reset[V]],
        "reseed" => sigs![Reseed[V, V]],
        "first" => sigs![First[C]],
        "last" => sigs![Last[C]],
        "middle" => sigs![Middle[C]],
        "notfirst" => sigs![NotFirst[C]],
        "notlast" => sigs![NotLast[C]],
        "notmiddle" => sigs![NotMiddle[C]],
        "odd" => sigs![Odd[C]],
        "even" => sigs![Even[C]],
        "nth" => sigs![Nth[V, V, C], Nth[V, C]],
        "repnum" | "rn" => sigs![RepNum[]],
        "repindex" | "ri" => sigs![RepIndex[]],
        "repcount" | "rc" => sigs![RepCount[]],
        "alt" => sigs![Alt[C, C]],
        "any" => sigs![Any[C, C]],
        "match" => sigs![Match[]],
        "group" => sigs![Group[V]],
        "arg" => sigs![Arg[V]],
        "numfmt" => sigs![NumFmt[V]],
        "caps" => sigs![Caps[V]],
        "capsinfer" => sigs![CapsInfer[V]],
        "out" => sigs![Out[V, V]],
        "close" => sigs![Close[V]],
        "get" => sigs![Get[V]],
        "send" => sigs![Send[V, V]],
        "osend" => sigs![OSend[V, V]],
        "clrt" => sigs![ClearTarget[V]],
        "mark" => sigs![Mark[V]],
        "dist" => sigs![Dist[V, V]],
        "len" => sigs![Len[V]],
        "char" => sigs![Char[V], Char[V, V]],
        "define" => sigs![Define[M]],
        "undef" => sigs![Undef[M]],
        "ifdef" => sigs![IfDef[V, C]],
        "ifndef" => sigs![IfNDef[V, C]],
        "else" => sigs![Else[C]],
        "cmp" => sigs![Cmp[V, V, C]],
        "is" => sigs![Is[V, C]],
        "break" => sigs![Break[]],
        "extern" | "ext" => sigs![Extern[V, M]],
        "src" => sigs![Src[]],
        _ => return None,
    };
    Some(table)
}

/// Pick the signature for a call with `argc` arguments: an exact arity
/// first, then the variadic signature with the largest minimum that fits.
pub fn resolve(name: &str, argc: usize) -> Result<Signature, String> {
    let table = signatures(name).ok_or_else(|| format!("unknown tag '{}'", name))?;

    if let Some(sig) = table
        .iter()
        .find(|s| !s.is_variadic() && s.params.len() == argc)
    {
        return Ok(*sig);
    }
    table
        .iter()
        .filter(|s| s.is_variadic() && s.min_args() <= argc)
        .max_by_key(|s| s.min_args())
        .copied()
        .ok_or_else(|| format!("tag '{}' does not take {} argument(s)", name, argc))
}

/// Parse `a-z0-9_` style ranges into the characters they cover.
pub fn char_ranges(spec: &str) -> Vec<char> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            let (a, b) = if chars[i] <= chars[i + 2] {
                (chars[i], chars[i + 2])
            } else {
                (chars[i + 2], chars[i])
            };
            out.extend(a..=b);
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

impl<'e> Interpreter<'e> {
    fn code_arg(&self, args: &[Arg], i: usize, pos: Position) -> Result<Code, EngineError> {
        args.get(i)
            .and_then(Arg::code)
            .cloned()
            .ok_or_else(|| self.semantic(pos, "expected a code argument"))
    }

    fn active_repeater(&self, pos: Position, tag: &str) -> Result<&Repeater, EngineError> {
        self.repeaters
            .last()
            .ok_or_else(|| self.semantic(pos, format!("[{}] outside of a block: no active repeater", tag)))
    }

    fn valid_name<'a>(&self, name: &'a str, pos: Position, what: &str) -> Result<&'a str, EngineError> {
        let name = name.trim();
        if is_valid_name(name) {
            Ok(name)
        } else {
            Err(self.semantic(pos, format!("invalid {} name '{}'", what, name)))
        }
    }

    fn parse_count(&self, text: &str, pos: Position, what: &str) -> Result<usize, EngineError> {
        let n = text
            .trim()
            .parse::<usize>()
            .map_err(|_| self.semantic(pos, format!("invalid {} '{}'", what, text.trim())))?;
        if n > self.engine.config().max_repetitions {
            return Err(self.semantic(
                pos,
                format!("{} {} exceeds the limit of {}", what, n, self.engine.config().max_repetitions),
            ));
        }
        Ok(n)
    }

    /// Run `body` in place when `cond` holds.
    fn run_if(&mut self, cond: bool, body: Code) -> Result<Flow, EngineError> {
        if !cond {
            return Ok(Flow::Continue);
        }
        self.push_state(body, SinkMode::Inherit, None)?;
        Ok(Flow::Restart)
    }

    pub(crate) fn exec_op(&mut self, op: Op, pos: Position, args: Vec<Arg>) -> Result<Flow, EngineError> {
        let text = |i: usize| args.get(i).map_or("", Arg::text);

        match op {
            // ----- block attributes -----
            Op::Rep => {
                let value = text(0).trim();
                self.next_attribs.reps = if value.eq_ignore_ascii_case("each") {
                    Reps::Each
                } else {
                    Reps::Times(self.parse_count(value, pos, "repetition count")?)
                };
            }
            Op::Sep => self.next_attribs.separator = Some(self.code_arg(&args, 0, pos)?),
            Op::Before => self.next_attribs.before = Some(self.code_arg(&args, 0, pos)?),
            Op::After => self.next_attribs.after = Some(self.code_arg(&args, 0, pos)?),
            Op::Chance => {
                let chance = text(0)
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|c| *c <= 100)
                    .ok_or_else(|| self.semantic(pos, format!("chance must be 0-100, got '{}'", text(0))))?;
                self.next_attribs.chance = Some(chance);
            }
            Op::Num => {
                let parse = |s: &str| {
                    s.trim()
                        .parse::<i64>()
                        .map_err(|_| self.semantic(pos, format!("invalid integer '{}'", s.trim())))
                };
                let (a, b) = (parse(text(0))?, parse(text(1))?);
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let n = self.rng.gen_range(lo..=hi);
                self.print_int(n);
            }

            // ----- synchronizers -----
            Op::Sync => {
                let name = self.valid_name(text(0), pos, "synchronizer")?;
                let kind = SyncKind::parse(text(1))
                    .ok_or_else(|| self.semantic(pos, format!("unknown synchronizer type '{}'", text(1).trim())))?;
                if self.syncs.sync(name, kind) {
                    debug!(name, ?kind, "synchronizer created");
                }
            }
            Op::Desync => self.syncs.desync(),
            Op::Pin | Op::Unpin | Op::Step | Op::Reset => {
                let name = text(0).trim();
                let undefined = self.semantic(pos, format!("undefined synchronizer '{}'", name));
                let sync = self.syncs.get_mut(name).ok_or(undefined)?;
                match op {
                    Op::Pin => sync.pin(),
                    Op::Unpin => sync.unpin(),
                    Op::Step => sync.step(),
                    _ => sync.reset(),
                }
            }
            Op::Reseed => {
                let name = text(0).trim();
                if !self.syncs.reseed(name, text(1)) {
                    return Err(self.semantic(pos, format!("undefined synchronizer '{}'", name)));
                }
            }

            // ----- repeater predicates -----
            Op::First | Op::Last | Op::Middle | Op::NotFirst | Op::NotLast | Op::NotMiddle | Op::Odd | Op::Even => {
                let rep = self.active_repeater(pos, op_name(op))?;
                let (first, last) = (rep.is_first(), rep.is_last());
                let cond = match op {
                    Op::First => first,
                    Op::Last => last,
                    Op::Middle => !first && !last,
                    Op::NotFirst => !first,
                    Op::NotLast => !last,
                    Op::NotMiddle => first || last,
                    Op::Odd => rep.is_odd(),
                    _ => rep.is_even(),
                };
                let body = self.code_arg(&args, 0, pos)?;
                return self.run_if(cond, body);
            }
            Op::Nth => {
                let interval = self.parse_count(text(0), pos, "interval")?;
                if interval == 0 {
                    return Err(self.semantic(pos, "[nth] interval must be greater than zero"));
                }
                let offset = if args.len() == 3 {
                    self.parse_count(text(1), pos, "offset")?
                } else {
                    0
                };
                let cond = self.active_repeater(pos, "nth")?.nth(offset, interval);
                let body = self.code_arg(&args, args.len() - 1, pos)?;
                return self.run_if(cond, body);
            }
            Op::RepNum | Op::RepIndex | Op::RepCount => {
                let rep = self.active_repeater(pos, op_name(op))?;
                let n = match op {
                    Op::RepNum => rep.index() + 1,
                    Op::RepIndex => rep.index(),
                    _ => rep.count(),
                };
                self.print_int(n as i64);
            }

            // ----- alternation -----
            Op::Alt | Op::Any => {
                let trial = self.code_arg(&args, 0, pos)?;
                let fallback = self.code_arg(&args, 1, pos)?;
                let settle = Blueprint::Alt {
                    fallback,
                    any: op == Op::Any,
                };
                self.push_state(trial, SinkMode::Own, Some(settle))?;
                return Ok(Flow::Restart);
            }

            // ----- replacer and subroutine data -----
            Op::Match => {
                let value = self
                    .matches
                    .last()
                    .map(|m| m.value.clone())
                    .ok_or_else(|| self.semantic(pos, "[match] outside of a replacer"))?;
                self.print(&value);
            }
            Op::Group => {
                let key = text(0).trim();
                let m = self
                    .matches
                    .last()
                    .ok_or_else(|| self.semantic(pos, "[group] outside of a replacer"))?;
                let value = match key.parse::<usize>() {
                    Ok(i) => m.groups.get(i).map(|g| g.clone().unwrap_or_default()),
                    Err(_) => m.named.get(key).cloned(),
                }
                .ok_or_else(|| self.semantic(pos, format!("no capture group '{}'", key)))?;
                self.print(&value);
            }
            Op::Arg => {
                let name = text(0).trim();
                let arg = self
                    .sub_args
                    .last()
                    .ok_or_else(|| self.semantic(pos, "[arg] outside of a subroutine"))?
                    .get(name)
                    .cloned()
                    .ok_or_else(|| self.semantic(pos, format!("no argument named '{}'", name)))?;
                match arg {
                    Arg::Value(value) => self.print(&value),
                    Arg::Code(code) => return self.run_if(true, code),
                }
            }

            // ----- formatting and channels -----
            Op::NumFmt => {
                self.number_format = NumberFormat::parse(text(0))
                    .ok_or_else(|| self.semantic(pos, format!("unknown number format '{}'", text(0).trim())))?;
            }
            Op::Caps => {
                let mode = Capitalization::parse(text(0))
                    .ok_or_else(|| self.semantic(pos, format!("unknown capitalization '{}'", text(0).trim())))?;
                if let Some(sink) = self.sink_mut() {
                    sink.set_caps(mode);
                }
            }
            Op::CapsInfer => {
                if let Some(mode) = Capitalization::infer(text(0)) {
                    if let Some(sink) = self.sink_mut() {
                        sink.set_caps(mode);
                    }
                }
            }
            Op::Out => {
                let name = self.valid_name(text(0), pos, "channel")?;
                let visibility = Visibility::parse(text(1))
                    .ok_or_else(|| self.semantic(pos, format!("unknown visibility '{}'", text(1).trim())))?;
                if let Some(sink) = self.sink_mut() {
                    sink.push_channel(name, visibility);
                }
            }
            Op::Close => {
                let name = text(0).trim();
                let closed = self.sink_mut().map_or(false, |sink| sink.pop_channel(name));
                if !closed {
                    warn!(channel = name, pos = %pos, "closing a channel that is not open");
                }
            }
            Op::Get => {
                let name = self.valid_name(text(0), pos, "target")?;
                self.targets.entry(name.to_string()).or_default();
                if let Some(sink) = self.sink_mut() {
                    sink.place_target(name);
                }
            }
            Op::Send => {
                let name = self.valid_name(text(0), pos, "target")?;
                self.targets
                    .entry(name.to_string())
                    .or_default()
                    .push_str(text(1));
            }
            Op::OSend => {
                let name = self.valid_name(text(0), pos, "target")?;
                self.targets.insert(name.to_string(), text(1).to_string());
            }
            Op::ClearTarget => {
                let name = self.valid_name(text(0), pos, "target")?;
                self.targets.insert(name.to_string(), String::new());
            }
            Op::Mark => {
                let name = self.valid_name(text(0), pos, "marker")?;
                let at = self.sink_mut().map_or(0, |sink| sink.position());
                self.markers.insert(name.to_string(), at);
            }
            Op::Dist => {
                let marker = |name: &str| {
                    self.markers
                        .get(name.trim())
                        .copied()
                        .ok_or_else(|| self.semantic(pos, format!("undefined marker '{}'", name.trim())))
                };
                let (a, b) = (marker(text(0))?, marker(text(1))?);
                self.print_int(b as i64 - a as i64);
            }
            Op::Len => self.print_int(text(0).chars().count() as i64),
            Op::Char => {
                let pool = char_ranges(text(0).trim());
                if pool.is_empty() {
                    return Err(self.semantic(pos, "[char] needs at least one character"));
                }
                let count = if args.len() == 2 {
                    self.parse_count(text(1), pos, "character count")?
                } else {
                    1
                };
                let out: String = (0..count)
                    .map(|_| pool[self.rng.gen_range(0..pool.len())])
                    .collect();
                self.print(&out);
            }

            // ----- flags -----
            Op::Define | Op::Undef => {
                for arg in &args {
                    let value = arg.text().trim();
                    if value.is_empty() {
                        continue;
                    }
                    let name = self.valid_name(value, pos, "flag")?.to_string();
                    if op == Op::Define {
                        self.flags.insert(name);
                    } else {
                        self.flags.remove(&name);
                    }
                }
            }
            Op::IfDef | Op::IfNDef => {
                let name = self.valid_name(text(0), pos, "flag")?;
                let hit = self.flags.contains(name) == (op == Op::IfDef);
                let body = self.code_arg(&args, 1, pos)?;
                if let Some(state) = self.top_mut() {
                    state.else_armed = !hit;
                }
                return self.run_if(hit, body);
            }
            Op::Else => {
                let armed = self.top_mut().map_or(false, |state| {
                    std::mem::replace(&mut state.else_armed, false)
                });
                let body = self.code_arg(&args, 0, pos)?;
                return self.run_if(armed, body);
            }

            // ----- comparison -----
            Op::Cmp => {
                self.comparisons.push(Comparison::new(text(0), text(1)));
                let body = self.code_arg(&args, 2, pos)?;
                self.push_state(
                    body,
                    SinkMode::Inherit,
                    Some(Blueprint::Deferred(Deferred::PopComparison)),
                )?;
                return Ok(Flow::Restart);
            }
            Op::Is => {
                let cmp = *self
                    .comparisons
                    .last()
                    .ok_or_else(|| self.semantic(pos, "[is] outside of [cmp]"))?;
                let mut cond = false;
                for flag in text(0).split(|c: char| c.is_whitespace() || c == ',').filter(|f| !f.is_empty()) {
                    cond |= cmp
                        .has(flag)
                        .ok_or_else(|| self.semantic(pos, format!("unknown comparison flag '{}'", flag)))?;
                }
                let body = self.code_arg(&args, 1, pos)?;
                return self.run_if(cond, body);
            }

            // ----- control and host -----
            Op::Break => return self.break_repeater(pos),
            Op::Extern => {
                let name = text(0).trim();
                let rest: Vec<String> = args.iter().skip(1).map(|a| a.text().to_string()).collect();
                let result = self
                    .engine
                    .hooks
                    .call(name, &rest)
                    .ok_or_else(|| self.semantic(pos, format!("no hook named '{}'", name)))?;
                let text = result.map_err(|e| {
                    EngineError::external(&self.pattern_name(), pos, format!("hook '{}'", name), e)
                })?;
                self.print(&text);
            }
            Op::Src => {
                let source = self.current_pattern().source().to_string();
                self.print(&source);
            }
        }
        Ok(Flow::Continue)
    }
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::First => "first",
        Op::Last => "last",
        Op::Middle => "middle",
        Op::NotFirst => "notfirst",
        Op::NotLast => "notlast",
        Op::NotMiddle => "notmiddle",
        Op::Odd => "odd",
        Op::Even => "even",
        Op::RepNum => "repnum",
        Op::RepIndex => "repindex",
        Op::RepCount => "repcount",
        _ => "tag",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Engine;
    use crate::core::error::ErrorKind;

    fn run(src: &str) -> String {
        Engine::builder()
            .build()
            .unwrap()
            .run_str(src, 5)
            .unwrap()
            .main()
            .to_string()
    }

    fn fail(src: &str) -> ErrorKind {
        Engine::builder()
            .build()
            .unwrap()
            .run_str(src, 5)
            .unwrap_err()
            .error
            .kind()
    }

    #[test]
    fn resolution_prefers_exact_arity() {
        assert_eq!(resolve("nth", 3).unwrap().params.len(), 3);
        assert_eq!(resolve("nth", 2).unwrap().params.len(), 2);
        assert!(resolve("nth", 1).is_err());
        assert_eq!(resolve("define", 0).unwrap().op, Op::Define);
        assert_eq!(resolve("define", 4).unwrap().op, Op::Define);
        assert!(resolve("extern", 0).is_err());
        assert_eq!(resolve("ext", 3).unwrap().op, Op::Extern);
        assert!(resolve("bogus", 0).is_err());
    }

    #[test]
    fn char_ranges_expand() {
        assert_eq!(char_ranges("a-c"), vec!['a', 'b', 'c']);
        assert_eq!(char_ranges("x0-2"), vec!['x', '0', '1', '2']);
        assert_eq!(char_ranges("c-a"), vec!['a', 'b', 'c']);
        assert_eq!(char_ranges("-"), vec!['-']);
    }

    #[test]
    fn predicates_need_a_repeater() {
        assert_eq!(fail("[first:x]"), ErrorKind::Semantic);
        assert_eq!(fail("[repnum]"), ErrorKind::Semantic);
        assert_eq!(fail("[break]"), ErrorKind::Semantic);
    }

    #[test]
    fn positional_predicates() {
        assert_eq!(run("[r:each]{a|b|c|d}"), "abcd");
        assert_eq!(run("[r:4]{[first:F][middle:M][last:L]}"), "FMML");
        assert_eq!(run("[r:4]{[notfirst:,][repnum]}"), "1,2,3,4");
        assert_eq!(run("[r:3]{[notmiddle:x][notlast:-]}"), "x--x");
        assert_eq!(run("[r:5]{[odd:o][even:e]}"), "eoeoe");
        assert_eq!(run("[r:7]{[nth:3;1;x][nth:3;.]}"), ".x.x.");
        assert_eq!(run("[r:3]{[repindex]/[repcount]}"), "0/31/32/3");
    }

    #[test]
    fn nth_rejects_zero_interval() {
        assert_eq!(fail("[r:2]{[nth:0;x]}"), ErrorKind::Semantic);
    }

    #[test]
    fn repetition_limits() {
        assert_eq!(run("[r:0]{x}y"), "y");
        assert_eq!(fail("[r:-1]{x}"), ErrorKind::Semantic);
        assert_eq!(fail("[r:99999999]{x}"), ErrorKind::Semantic);
    }

    #[test]
    fn chance_bounds() {
        assert_eq!(run("[chance:0]{x}y"), "y");
        assert_eq!(run("[chance:100]{x}"), "x");
        assert_eq!(fail("[chance:101]{x}"), ErrorKind::Semantic);
    }

    #[test]
    fn skipped_blocks_consume_their_attributes() {
        assert_eq!(run("[r:3][chance:0]{x}{y}"), "y");
    }

    #[test]
    fn alternation() {
        assert_eq!(run("[alt:;B]"), "B");
        assert_eq!(run("[alt:A;B]"), "A");
        assert_eq!(run("[alt:\\s;B]"), " ");
        assert_eq!(run("[any:\\s;B]"), "B");
    }

    #[test]
    fn flags_and_else() {
        assert_eq!(run("[define:f][ifdef:f;X][undef:f][ifdef:f;X][else;Y]"), "XY");
        assert_eq!(run("[ifndef:g;N][else:E]"), "N");
        assert_eq!(run("[ifdef:g;X][else:E][else:E]"), "E");
        assert_eq!(fail("[define:2bad]"), ErrorKind::Semantic);
    }

    #[test]
    fn comparisons() {
        assert_eq!(run("[cmp:10;9;[is:greater;gt][is:less;lt]]"), "gt");
        assert_eq!(run("[cmp:abc;abc;[is:equal numeric;same]]"), "same");
        assert_eq!(fail("[cmp:1;2;[is:bigger;x]]"), ErrorKind::Semantic);
        assert_eq!(fail("[is:equal;x]"), ErrorKind::Semantic);
    }

    #[test]
    fn channels_and_targets() {
        let engine = Engine::builder().build().unwrap();
        let out = engine
            .run_str("a[out:notes;private]hidden[close:notes]b", 0)
            .unwrap();
        assert_eq!(out.main(), "ab");
        assert_eq!(out.get("notes"), Some("hidden"));

        assert_eq!(run(r#"Dear [get:who],[send:who;Ada][send:who;" Lovelace"]"#), "Dear Ada Lovelace,");
        assert_eq!(run("[get:x][send:x;a][osend:x;b]"), "b");
        assert_eq!(run("[get:x][send:x;a][clrt:x]."), ".");
    }

    #[test]
    fn markers_and_lengths() {
        assert_eq!(run("[mark:a]hello[mark:b] [dist:a;b]"), "hello 5");
        assert_eq!(run("[len:héllo]"), "5");
        assert_eq!(fail("[dist:a;b]"), ErrorKind::Semantic);
    }

    #[test]
    fn formatting() {
        assert_eq!(run("[numfmt:roman][len:abcd]"), "IV");
        assert_eq!(run("[caps:upper]shout"), "SHOUT");
        assert_eq!(run("[capsinfer:Title Case]two words"), "Two Words");
        assert_eq!(fail("[caps:loud]"), ErrorKind::Semantic);
    }

    #[test]
    fn numbers_and_characters() {
        assert_eq!(run("[num:7;7]"), "7");
        assert_eq!(run("[char:q;3]"), "qqq");
        let n: i64 = run("[num:10;1]").parse().unwrap();
        assert!((1..=10).contains(&n));
    }

    #[test]
    fn num_prints_large_bounds_exactly() {
        assert_eq!(run("[num:9007199254740993;9007199254740993]"), "9007199254740993");
        assert_eq!(
            run("[numfmt:group][num:-9223372036854775808;-9223372036854775808]"),
            "-9,223,372,036,854,775,808"
        );
    }

    #[test]
    fn hooks() {
        let engine = Engine::builder()
            .hook("join", |args| Ok(args.join("+")))
            .hook("boom", |_| Err("kaboom".into()))
            .build()
            .unwrap();
        assert_eq!(engine.run_str("[extern:join;a;b]", 0).unwrap().main(), "a+b");
        let err = engine.run_str("[extern:boom]", 0).unwrap_err().error;
        assert_eq!(err.kind(), ErrorKind::External);
        let err = engine.run_str("[ext:missing]", 0).unwrap_err().error;
        assert_eq!(err.kind(), ErrorKind::Semantic);
    }

    #[test]
    fn source_prints_itself() {
        assert_eq!(run("x[src]"), "xx[src]");
    }
}
