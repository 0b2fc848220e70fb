//! Textloom: seeded procedural text generation from small patterns.
//!
//! A pattern mixes literal text with randomized blocks, tags, subroutines,
//! inline arithmetic, and vocabulary queries whose picks can be tied together
//! across the run (matching, unique, rhyming, grouped). The same pattern and
//! seed always produce the same output.
//!
//! ```
//! use textloom::{Dictionary, Engine};
//!
//! let dictionary = Dictionary::parse_ron(r#"{
//!     "noun": (entries: [(terms: ["lantern"]), (terms: ["compass"])]),
//! }"#).unwrap();
//! let engine = Engine::builder().with_vocabulary(dictionary).build().unwrap();
//!
//! let out = engine.run_str("[r:3][s:\", \"]{a|the} <noun::=x> and <noun::=x>", 7).unwrap();
//! let again = engine.run_str("[r:3][s:\", \"]{a|the} <noun::=x> and <noun::=x>", 7).unwrap();
//! assert_eq!(out, again);
//! ```

pub mod core;
pub mod schema;
pub mod vocab;

pub use crate::core::engine::{Engine, EngineBuilder, EngineConfig, Failure, Hooks};
pub use crate::core::error::{BoxError, EngineError, ErrorKind, LoadError};
pub use crate::core::format::{Capitalization, NumberFormat};
pub use crate::core::output::{ChannelOutput, Output, Visibility};
pub use crate::core::pattern::Pattern;
pub use crate::vocab::carrier::{CarrierRules, DefaultRules};
pub use crate::vocab::dictionary::{Candidate, Dictionary, Vocabulary};
