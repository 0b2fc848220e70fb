//! The driver loop and everything one run owns.
//!
//! Execution never recurses on the native stack. Handlers push child
//! [`State`]s and leave [`Blueprint`]s on the parent; the loop in
//! [`Interpreter::execute`] keeps working on whatever is on top until the
//! stack is empty.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::arith::{self, Variables};
use crate::core::engine::{Engine, Failure};
use crate::core::error::EngineError;
use crate::core::format::NumberFormat;
use crate::core::output::{Output, OutputSink, Targets};
use crate::core::pattern::{Code, Pattern};
use crate::core::repeater::{BlockAttribs, Repeater};
use crate::core::state::{
    Arg, BaseFrame, Blueprint, Comparison, Deferred, Flow, Marks, MatchData, Pending, Replacer,
    SinkMode, State, SubCall, SubTable, Subroutine, TagCall,
};
use crate::core::sync::Synchronizers;
use crate::schema::query::Query;
use crate::schema::token::Position;
use crate::vocab::carrier::CarrierSyncState;

pub struct Interpreter<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) root: Arc<Pattern>,
    pub(crate) seed: u64,
    pub(crate) rng: StdRng,

    pub(crate) states: Vec<State>,
    pub(crate) sinks: Vec<OutputSink>,
    /// Sinks of finished owning states, waiting for a blueprint to claim them.
    pub(crate) results: Vec<OutputSink>,
    pub(crate) targets: Targets,
    pub(crate) markers: FxHashMap<String, usize>,

    pub(crate) flags: FxHashSet<String>,
    pub(crate) syncs: Synchronizers,
    pub(crate) carriers: CarrierSyncState,
    pub(crate) subs: SubTable,
    /// Query macros keyed by `(pattern name, macro name)`.
    pub(crate) local_macros: FxHashMap<(String, String), Query>,
    pub(crate) global_macros: FxHashMap<String, Query>,
    pub(crate) vars: Variables,

    pub(crate) comparisons: Vec<Comparison>,
    pub(crate) sub_args: Vec<FxHashMap<String, Arg>>,
    pub(crate) matches: Vec<MatchData>,
    pub(crate) repeaters: Vec<Repeater>,
    pub(crate) frames: Vec<BaseFrame>,
    pub(crate) next_attribs: BlockAttribs,
    pub(crate) number_format: NumberFormat,
}

impl<'e> Interpreter<'e> {
    pub fn new(engine: &'e Engine, pattern: &Arc<Pattern>, seed: u64) -> Self {
        let config = engine.config();
        let flags = config.flags.iter().cloned().collect();
        Self {
            engine,
            root: Arc::clone(pattern),
            seed,
            rng: StdRng::seed_from_u64(seed),
            states: vec![State::new(Code::whole(pattern), 0, false)],
            sinks: vec![OutputSink::new()],
            results: Vec::new(),
            targets: Targets::default(),
            markers: FxHashMap::default(),
            flags,
            syncs: Synchronizers::new(seed),
            carriers: CarrierSyncState::new(),
            subs: engine.subroutines.clone(),
            local_macros: FxHashMap::default(),
            global_macros: FxHashMap::default(),
            vars: Variables::default(),
            comparisons: Vec::new(),
            sub_args: Vec::new(),
            matches: Vec::new(),
            repeaters: Vec::new(),
            frames: Vec::new(),
            next_attribs: BlockAttribs::default(),
            number_format: config.number_format,
        }
    }

    /// Run to completion. On failure the output written so far is returned
    /// alongside the error.
    pub fn run(mut self) -> Result<Output, Failure> {
        debug!(
            pattern = self.root.name(),
            seed = self.seed,
            tokens = self.root.len(),
            "run started"
        );
        let result = self.execute();
        let output = self
            .sinks
            .first()
            .map(|sink| sink.finish(&self.targets))
            .unwrap_or_default();

        match result {
            Ok(()) => {
                debug!(
                    pattern = self.root.name(),
                    chars = output.main().chars().count(),
                    "run finished"
                );
                Ok(output)
            }
            Err(error) => {
                debug!(pattern = self.root.name(), %error, "run failed");
                Err(Failure {
                    error,
                    partial: output,
                })
            }
        }
    }

    /// Run for side effects only and hand back the subroutine table.
    pub(crate) fn into_subroutines(mut self) -> Result<SubTable, EngineError> {
        self.execute()?;
        Ok(self.subs)
    }

    pub(crate) fn execute(&mut self) -> Result<(), EngineError> {
        while !self.states.is_empty() {
            self.run_top()?;
        }
        Ok(())
    }

    /// Drive the top state until a handler returns [`Flow::Restart`]. While
    /// handlers return [`Flow::Continue`] the top state stays the same, so its
    /// pattern is fetched once.
    fn run_top(&mut self) -> Result<(), EngineError> {
        let pattern = self.current_pattern();
        loop {
            let Some(top) = self.states.last_mut() else {
                return Ok(());
            };
            let flow = if let Some(blueprint) = top.pre.pop_front() {
                self.run_blueprint(blueprint)?
            } else if top.at_end() {
                self.finish_state()?;
                Flow::Restart
            } else {
                let index = top.cursor;
                top.cursor += 1;
                self.dispatch(&pattern, index)?
            };
            if flow == Flow::Restart {
                return Ok(());
            }
        }
    }

    fn finish_state(&mut self) -> Result<(), EngineError> {
        let Some(state) = self.states.pop() else {
            return Ok(());
        };
        if state.owns_sink {
            if let Some(sink) = self.sinks.pop() {
                self.results.push(sink);
            }
        }
        for blueprint in state.post {
            self.run_blueprint(blueprint)?;
        }
        Ok(())
    }

    fn run_blueprint(&mut self, blueprint: Blueprint) -> Result<Flow, EngineError> {
        match blueprint {
            Blueprint::Repeater => self.step_repeater(),
            Blueprint::TagCall(call) => self.continue_tag(call),
            Blueprint::SubCall(call) => self.continue_sub(call),
            Blueprint::Alt { fallback, any } => self.settle_alt(fallback, any),
            Blueprint::Replacer(replacer) => self.continue_replacer(replacer),
            Blueprint::Metapattern { pos } => {
                let source = self.pop_result_text();
                let name = format!("{}?", self.pattern_name());
                let pattern = Pattern::compile(name, source)?;
                trace!(pos = %pos, "running metapattern");
                self.push_state(Code::whole(&pattern), SinkMode::Inherit, None)?;
                Ok(Flow::Restart)
            }
            Blueprint::Deferred(deferred) => self.run_deferred(deferred),
        }
    }

    // ----- state stack -----

    pub(crate) fn top(&self) -> Option<&State> {
        self.states.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut State> {
        self.states.last_mut()
    }

    pub(crate) fn current_pattern(&self) -> Arc<Pattern> {
        match self.top() {
            Some(state) => Arc::clone(state.pattern()),
            None => Arc::clone(&self.root),
        }
    }

    pub(crate) fn pattern_name(&self) -> String {
        match self.top() {
            Some(state) => state.pattern().name().to_string(),
            None => self.root.name().to_string(),
        }
    }

    pub(crate) fn set_cursor(&mut self, cursor: usize) {
        if let Some(state) = self.top_mut() {
            state.cursor = cursor;
        }
    }

    /// Queue a blueprint to run before the current state reads on.
    pub(crate) fn add_pre(&mut self, blueprint: Blueprint) {
        if let Some(state) = self.top_mut() {
            state.pre.push_back(blueprint);
        }
    }

    /// Put a partially finished blueprint back at the front of the queue.
    pub(crate) fn rearm(&mut self, blueprint: Blueprint) {
        if let Some(state) = self.top_mut() {
            state.pre.push_front(blueprint);
        }
    }

    pub(crate) fn push_state(
        &mut self,
        code: Code,
        mode: SinkMode,
        post: Option<Blueprint>,
    ) -> Result<(), EngineError> {
        if self.states.len() >= self.engine.config().max_stack_depth {
            return Err(self.semantic(self.here(), "stack overflow"));
        }
        let (sink, owns) = match mode {
            SinkMode::Inherit => (self.current_sink(), false),
            SinkMode::Own => {
                self.sinks.push(OutputSink::new());
                (self.sinks.len() - 1, true)
            }
        };
        let mut state = State::new(code, sink, owns);
        state.post.extend(post);
        self.states.push(state);
        Ok(())
    }

    pub(crate) fn marks(&self) -> Marks {
        Marks {
            comparisons: self.comparisons.len(),
            sub_args: self.sub_args.len(),
            matches: self.matches.len(),
            results: self.results.len(),
        }
    }

    // ----- output -----

    pub(crate) fn current_sink(&self) -> usize {
        self.top().map_or(0, |state| state.sink)
    }

    pub(crate) fn sink_mut(&mut self) -> Option<&mut OutputSink> {
        let index = self.current_sink();
        self.sinks.get_mut(index)
    }

    pub(crate) fn print(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(sink) = self.sink_mut() {
            sink.write(text);
        }
    }

    pub(crate) fn print_number(&mut self, n: f64) {
        let text = self.number_format.format(n);
        self.print(&text);
    }

    pub(crate) fn print_int(&mut self, n: i64) {
        let text = self.number_format.format_int(n);
        self.print(&text);
    }

    pub(crate) fn pop_result_text(&mut self) -> String {
        self.results
            .pop()
            .map(|sink| sink.main_text(&self.targets))
            .unwrap_or_default()
    }

    // ----- errors -----

    /// Position of the token most recently read by the current state.
    pub(crate) fn here(&self) -> Position {
        match self.top() {
            Some(state) => state.pattern().position(state.cursor.saturating_sub(1)),
            None => Position::default(),
        }
    }

    pub(crate) fn syntax(&self, pos: Position, message: impl Into<String>) -> EngineError {
        EngineError::syntax(&self.pattern_name(), pos, message)
    }

    pub(crate) fn semantic(&self, pos: Position, message: impl Into<String>) -> EngineError {
        EngineError::semantic(&self.pattern_name(), pos, message)
    }

    // ----- blueprints -----

    fn step_repeater(&mut self) -> Result<Flow, EngineError> {
        let Some(rep) = self.repeaters.last_mut() else {
            return Ok(Flow::Continue);
        };
        if !rep.advance() {
            self.repeaters.pop();
            self.frames.pop();
            return Ok(Flow::Continue);
        }

        let index = rep.index();
        let len = rep.item_count();
        // `each` visits every item once, in order, whatever synchronizer is active.
        let choice = if rep.is_each() {
            index % len.max(1)
        } else if let Some(sync) = self.syncs.active_mut() {
            sync.next(len)
        } else {
            self.rng.gen_range(0..len.max(1))
        };

        let item = rep.item(choice);
        let separator = if index > 0 {
            rep.separator().cloned()
        } else {
            None
        };
        let before = rep.before().cloned();
        let after = rep.after().cloned();

        self.rearm(Blueprint::Repeater);
        // Pushed in reverse: the separator runs first.
        for code in [after, item, before, separator].into_iter().flatten() {
            self.push_state(code, SinkMode::Inherit, None)?;
        }
        Ok(Flow::Restart)
    }

    /// Resolve value arguments that need no evaluation and return the next
    /// one that does.
    fn next_value_arg(&mut self, pending: &mut Pending) -> Option<Code> {
        if pending.awaiting {
            let text = self.pop_result_text();
            pending.done.push(Arg::Value(text));
            pending.awaiting = false;
        }
        while !pending.is_complete() {
            let i = pending.done.len();
            let code = pending.raw[i].clone();
            if pending.deferred[i] {
                pending.done.push(Arg::Code(code));
            } else if code.tokens().iter().all(|t| t.kind.is_verbatim()) {
                pending.done.push(Arg::Value(code.text()));
            } else {
                return Some(code);
            }
        }
        None
    }

    fn continue_tag(&mut self, mut call: TagCall) -> Result<Flow, EngineError> {
        if let Some(code) = self.next_value_arg(&mut call.args) {
            call.args.awaiting = true;
            self.rearm(Blueprint::TagCall(call));
            self.push_state(code, SinkMode::Own, None)?;
            return Ok(Flow::Restart);
        }
        let TagCall { op, name, pos, args } = call;
        trace!(tag = %name, "calling tag");
        self.exec_op(op, pos, args.done)
    }

    fn continue_sub(&mut self, mut call: SubCall) -> Result<Flow, EngineError> {
        if let Some(code) = self.next_value_arg(&mut call.args) {
            call.args.awaiting = true;
            self.rearm(Blueprint::SubCall(call));
            self.push_state(code, SinkMode::Own, None)?;
            return Ok(Flow::Restart);
        }
        let bindings = call
            .sub
            .params
            .iter()
            .map(|p| p.name.clone())
            .zip(call.args.done)
            .collect();
        self.sub_args.push(bindings);
        self.push_state(
            call.sub.body.clone(),
            SinkMode::Inherit,
            Some(Blueprint::Deferred(Deferred::PopSubArgs)),
        )?;
        Ok(Flow::Restart)
    }

    fn settle_alt(&mut self, fallback: Code, any: bool) -> Result<Flow, EngineError> {
        let trial = self.results.pop().unwrap_or_default();
        let text = trial.main_text(&self.targets);
        let empty = if any {
            text.trim().is_empty()
        } else {
            text.is_empty()
        };

        if empty {
            self.push_state(fallback, SinkMode::Inherit, None)?;
            return Ok(Flow::Restart);
        }
        if let Some(parent) = self.sink_mut() {
            trial.merge_into(parent);
        }
        Ok(Flow::Continue)
    }

    fn continue_replacer(&mut self, mut rep: Box<Replacer>) -> Result<Flow, EngineError> {
        if rep.input.is_none() {
            let input = self.pop_result_text();
            rep.matches = rep
                .regex
                .captures_iter(&input)
                .filter_map(|caps| MatchData::from_captures(&rep.regex, &caps))
                .collect();
            rep.input = Some(input);
        } else if rep.awaiting {
            let text = self.pop_result_text();
            rep.buffer.push_str(&text);
            self.matches.pop();
            rep.awaiting = false;
        }

        let input = rep.input.clone().unwrap_or_default();
        if let Some(m) = rep.matches.get(rep.next).cloned() {
            rep.next += 1;
            rep.buffer.push_str(&input[rep.last_end..m.start]);
            rep.last_end = m.end;
            self.matches.push(m);

            let replacement = rep.replacement.clone();
            rep.awaiting = true;
            self.rearm(Blueprint::Replacer(rep));
            self.push_state(replacement, SinkMode::Own, None)?;
            return Ok(Flow::Restart);
        }

        rep.buffer.push_str(&input[rep.last_end..]);
        self.print(&rep.buffer);
        Ok(Flow::Continue)
    }

    fn run_deferred(&mut self, deferred: Deferred) -> Result<Flow, EngineError> {
        match deferred {
            Deferred::PopComparison => {
                self.comparisons.pop();
            }
            Deferred::PopSubArgs => {
                self.sub_args.pop();
            }
            Deferred::MathResult { statement, pos } => {
                let expr = self.pop_result_text();
                let value = arith::evaluate(&expr, &mut self.vars).map_err(|e| {
                    EngineError::external(&self.pattern_name(), pos, format!("arithmetic '{}'", expr.trim()), e)
                })?;
                if !statement {
                    self.print_number(value);
                }
            }
            Deferred::DefineMetaSub { name, params, pos } => {
                let source = self.pop_result_text();
                let pattern = Pattern::compile(format!("{}:{}", self.pattern_name(), name), source)?;
                trace!(pos = %pos, "meta-definition compiled");
                self.define_sub(Subroutine {
                    name,
                    params,
                    body: Code::whole(&pattern),
                });
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn define_sub(&mut self, sub: Subroutine) {
        debug!(name = %sub.name, arity = sub.arity(), "subroutine defined");
        self.subs
            .insert((sub.name.clone(), sub.arity()), Arc::new(sub));
    }

    /// Finish the innermost repeater and unwind to the state it was entered
    /// from, discarding everything its iterations left on the stacks.
    pub(crate) fn break_repeater(&mut self, pos: Position) -> Result<Flow, EngineError> {
        let Some(rep) = self.repeaters.last_mut() else {
            return Err(self.semantic(pos, "[break] outside of a block: no active repeater"));
        };
        rep.finish();

        let Some(frame) = self.frames.last().copied() else {
            return Ok(Flow::Restart);
        };
        while self.states.len() > frame.depth + 1 {
            if let Some(state) = self.states.pop() {
                if state.owns_sink {
                    self.sinks.pop();
                }
            }
        }
        self.comparisons.truncate(frame.marks.comparisons);
        self.sub_args.truncate(frame.marks.sub_args);
        self.matches.truncate(frame.marks.matches);
        self.results.truncate(frame.marks.results);
        Ok(Flow::Restart)
    }

    pub(crate) fn compile_replacer_regex(&self, value: &str, pos: Position) -> Result<Regex, EngineError> {
        crate::vocab::query_parser::compile_regex(value).map_err(|e| self.syntax(pos, e))
    }
}
