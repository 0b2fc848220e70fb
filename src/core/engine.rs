//! The shared, read-only engine and its builder.
//!
//! An [`Engine`] holds everything runs share: configuration, the vocabulary,
//! carrier rules, host hooks, and predefined subroutines. Each call to
//! [`Engine::run`] creates its own interpreter, so one engine can serve
//! concurrent runs from several threads.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::core::error::{BoxError, EngineError, LoadError};
use crate::core::format::NumberFormat;
use crate::core::interpreter::Interpreter;
use crate::core::output::Output;
use crate::core::pattern::Pattern;
use crate::core::state::SubTable;
use crate::vocab::carrier::{CarrierRules, DefaultRules};
use crate::vocab::dictionary::{Dictionary, Vocabulary};

type HookFn = dyn Fn(&[String]) -> Result<String, BoxError> + Send + Sync;

/// Host functions reachable from patterns through `[extern:name;args]`.
#[derive(Clone, Default)]
pub struct Hooks {
    table: FxHashMap<String, Arc<HookFn>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[String]) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// `None` when no hook is registered under `name`.
    pub fn call(&self, name: &str, args: &[String]) -> Option<Result<String, BoxError>> {
        self.table.get(name).map(|hook| hook(args))
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Hooks").field("names", &names).finish()
    }
}

/// Engine settings, loadable from RON.
///
/// ```ron
/// (
///     max_stack_depth: 2048,
///     number_format: group_commas,
///     flags: ["verbose"],
///     dictionary: Some("words.ron"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest the state stack may grow before a run fails.
    pub max_stack_depth: usize,
    /// Upper bound for repetition and character counts.
    pub max_repetitions: usize,
    /// Number format each run starts with.
    pub number_format: NumberFormat,
    /// Flags defined at the start of every run.
    pub flags: Vec<String>,
    /// Dictionary loaded when no vocabulary is supplied directly. Relative
    /// paths resolve against the config file's directory.
    pub dictionary: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 4096,
            max_repetitions: 10_000,
            number_format: NumberFormat::Normal,
            flags: Vec::new(),
            dictionary: None,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_ron(&contents)?;
        if let (Some(dict), Some(dir)) = (&config.dictionary, path.parent()) {
            if dict.is_relative() {
                config.dictionary = Some(dir.join(dict));
            }
        }
        Ok(config)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, LoadError> {
        Ok(ron::from_str(input)?)
    }
}

/// A run that stopped on an error. `partial` holds what was written before
/// the fault; it may be incomplete.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Failure {
    #[source]
    pub error: EngineError,
    pub partial: Output,
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) vocabulary: Option<Arc<dyn Vocabulary>>,
    pub(crate) rules: Arc<dyn CarrierRules>,
    pub(crate) hooks: Hooks,
    pub(crate) subroutines: SubTable,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("vocabulary", &self.vocabulary.is_some())
            .field("hooks", &self.hooks)
            .field("subroutines", &self.subroutines.len())
            .finish()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_vocabulary(&self) -> bool {
        self.vocabulary.is_some()
    }

    /// Number of predefined subroutines every run starts with.
    pub fn subroutine_count(&self) -> usize {
        self.subroutines.len()
    }

    /// Compile a pattern for repeated runs.
    pub fn compile(&self, name: &str, source: &str) -> Result<Arc<Pattern>, EngineError> {
        Pattern::compile(name, source)
    }

    /// Run a compiled pattern with the given seed.
    pub fn run(&self, pattern: &Arc<Pattern>, seed: u64) -> Result<Output, Failure> {
        Interpreter::new(self, pattern, seed).run()
    }

    /// Compile and run in one step.
    pub fn run_str(&self, source: &str, seed: u64) -> Result<Output, Failure> {
        let pattern = self.compile("main", source).map_err(|error| Failure {
            error,
            partial: Output::default(),
        })?;
        self.run(&pattern, seed)
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    config_path: Option<PathBuf>,
    dictionary_paths: Vec<PathBuf>,
    vocabulary: Option<Arc<dyn Vocabulary>>,
    rules: Option<Arc<dyn CarrierRules>>,
    hooks: Hooks,
    prelude: Vec<(String, String)>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a RON file. Takes precedence over `config`.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a dictionary file. Several files are merged in order.
    pub fn dictionary_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dictionary_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Provide a vocabulary directly (for testing without files).
    pub fn with_vocabulary(mut self, vocabulary: impl Vocabulary + 'static) -> Self {
        self.vocabulary = Some(Arc::new(vocabulary));
        self
    }

    pub fn with_rules(mut self, rules: impl CarrierRules + 'static) -> Self {
        self.rules = Some(Arc::new(rules));
        self
    }

    pub fn hook<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.hooks.register(name, f);
        self
    }

    /// Pattern source run once at build time; the subroutines it defines
    /// are available to every run.
    pub fn subroutine_source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.prelude.push((name.into(), source.into()));
        self
    }

    pub fn build(self) -> Result<Engine, LoadError> {
        let config = match (&self.config_path, self.config) {
            (Some(path), _) => EngineConfig::load_from_ron(path)?,
            (None, Some(config)) => config,
            (None, None) => EngineConfig::default(),
        };

        let vocabulary = match self.vocabulary {
            Some(vocabulary) => Some(vocabulary),
            None => {
                let mut paths = self.dictionary_paths;
                if paths.is_empty() {
                    paths.extend(config.dictionary.clone());
                }
                load_dictionaries(&paths)?
            }
        };

        let mut engine = Engine {
            config,
            vocabulary,
            rules: self
                .rules
                .unwrap_or_else(|| Arc::new(DefaultRules) as Arc<dyn CarrierRules>),
            hooks: self.hooks,
            subroutines: SubTable::default(),
        };

        for (name, source) in &self.prelude {
            let pattern = Pattern::compile(name.as_str(), source.as_str())?;
            let subroutines = Interpreter::new(&engine, &pattern, 0).into_subroutines()?;
            engine.subroutines = subroutines;
        }
        if !self.prelude.is_empty() {
            debug!(count = engine.subroutines.len(), "predefined subroutines loaded");
        }

        Ok(engine)
    }
}

fn load_dictionaries(paths: &[PathBuf]) -> Result<Option<Arc<dyn Vocabulary>>, LoadError> {
    if paths.is_empty() {
        return Ok(None);
    }
    let mut dictionary = Dictionary::default();
    for path in paths {
        dictionary.merge(Dictionary::load_from_ron(path)?);
    }
    debug!(tables = dictionary.tables.len(), "dictionary loaded");
    Ok(Some(Arc::new(dictionary)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn engine_is_shareable() {
        assert_send_sync::<Engine>();
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config = EngineConfig::parse_ron("(max_repetitions: 12, number_format: roman)").unwrap();
        assert_eq!(config.max_repetitions, 12);
        assert_eq!(config.max_stack_depth, 4096);
        assert_eq!(config.number_format, NumberFormat::Roman);
        assert!(EngineConfig::parse_ron("(max_repetitions: -1)").is_err());
    }

    #[test]
    fn config_flags_are_predefined() {
        let engine = Engine::builder()
            .config(EngineConfig {
                flags: vec!["dark".into()],
                ..Default::default()
            })
            .build()
            .unwrap();
        let out = engine.run_str("[ifdef:dark;night][else:day]", 0).unwrap();
        assert_eq!(out.main(), "night");
    }

    #[test]
    fn prelude_subroutines_are_shared() {
        let engine = Engine::builder()
            .subroutine_source("lib", "[$[twice:x]:[arg:x][arg:x]]")
            .subroutine_source("more", "[$[thrice:x]:[$twice:[arg:x]][arg:x]]")
            .build()
            .unwrap();
        assert_eq!(engine.subroutine_count(), 2);
        assert_eq!(engine.run_str("[$thrice:ha]", 0).unwrap().main(), "hahaha");
    }

    #[test]
    fn broken_prelude_fails_the_build() {
        let err = Engine::builder()
            .subroutine_source("lib", "[$[bad]")
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadError::Prelude(_)));
    }

    #[test]
    fn missing_config_file_is_io() {
        let err = Engine::builder()
            .config_path("/definitely/not/here.ron")
            .build()
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn runs_are_isolated() {
        let engine = Engine::builder().build().unwrap();
        let first = engine.run_str("[define:seen](@n = 1)", 0).unwrap();
        assert_eq!(first.main(), "");
        let second = engine.run_str("[ifdef:seen;leaked][else:clean]", 0).unwrap();
        assert_eq!(second.main(), "clean");
    }
}
