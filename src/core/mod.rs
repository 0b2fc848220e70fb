pub mod arith;
pub mod engine;
pub mod error;
pub mod format;
pub mod interpreter;
pub mod lexer;
pub mod output;
pub mod pattern;
pub mod repeater;
pub mod state;
pub mod sync;
pub mod tags;
pub mod tokens;
