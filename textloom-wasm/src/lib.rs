//! WASM bindings for textloom, for running patterns in the browser.

use wasm_bindgen::prelude::*;

use textloom::{ChannelOutput, Dictionary, Engine, EngineConfig};

#[derive(serde::Serialize)]
struct RunResult {
    channels: Vec<ChannelOutput>,
    /// Set when the run stopped early; `channels` then hold the partial output.
    error: Option<ErrorInfo>,
}

#[derive(serde::Serialize)]
struct ErrorInfo {
    kind: String,
    line: usize,
    column: usize,
    message: String,
}

fn to_json(result: &RunResult) -> Result<String, JsError> {
    serde_json::to_string(result).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// An engine kept alive across runs so the dictionary is parsed once.
#[wasm_bindgen]
pub struct Loom {
    engine: Engine,
}

#[wasm_bindgen]
impl Loom {
    /// Build from a RON dictionary (may be empty) and an optional RON config.
    #[wasm_bindgen(constructor)]
    pub fn new(dictionary_ron: &str, config_ron: Option<String>) -> Result<Loom, JsError> {
        let mut builder = Engine::builder();
        if let Some(config) = config_ron.filter(|c| !c.trim().is_empty()) {
            let config = EngineConfig::parse_ron(&config)
                .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;
            builder = builder.config(config);
        }
        if !dictionary_ron.trim().is_empty() {
            let dictionary = Dictionary::parse_ron(dictionary_ron)
                .map_err(|e| JsError::new(&format!("Dictionary parse error: {e}")))?;
            builder = builder.with_vocabulary(dictionary);
        }
        let engine = builder
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;
        Ok(Loom { engine })
    }

    /// Run a pattern. Returns JSON: `{ "channels": [...], "error": null | {...} }`.
    ///
    /// Pattern errors are reported inside the JSON, not thrown.
    pub fn run(&self, source: &str, seed: u64) -> Result<String, JsError> {
        let result = match self.engine.run_str(source, seed) {
            Ok(output) => RunResult {
                channels: output.channels,
                error: None,
            },
            Err(failure) => {
                let pos = failure.error.position();
                RunResult {
                    channels: failure.partial.channels,
                    error: Some(ErrorInfo {
                        kind: format!("{:?}", failure.error.kind()),
                        line: pos.line,
                        column: pos.column,
                        message: failure.error.message(),
                    }),
                }
            }
        };
        to_json(&result)
    }

    /// Run the same pattern with `count` consecutive seeds. Returns a JSON
    /// array of main-channel strings; failed runs contribute their partial text.
    pub fn variants(&self, source: &str, seed: u64, count: usize) -> Result<String, JsError> {
        let pattern = self
            .engine
            .compile("main", source)
            .map_err(|e| JsError::new(&e.to_string()))?;
        let texts: Vec<String> = (0..count as u64)
            .map(|i| match self.engine.run(&pattern, seed.wrapping_add(i)) {
                Ok(out) => out.main().to_string(),
                Err(failure) => failure.partial.main().to_string(),
            })
            .collect();
        serde_json::to_string(&texts).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    pub fn has_vocabulary(&self) -> bool {
        self.engine.has_vocabulary()
    }
}

/// One-shot helper: build an engine from `dictionary_ron` and run `source`.
#[wasm_bindgen]
pub fn run_pattern(source: &str, dictionary_ron: &str, seed: u64) -> Result<String, JsError> {
    Loom::new(dictionary_ron, None)?.run(source, seed)
}
