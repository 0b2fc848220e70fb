//! Error types for pattern execution and resource loading.

use thiserror::Error;

use crate::schema::token::Position;

/// Error type returned by host hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse error taxonomy, for callers that branch on the class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed tag, query, or carrier grammar.
    Syntax,
    /// Invalid name, undefined flag/subroutine/hook/synchronizer, bad arity, no active repeater.
    Semantic,
    /// A vocabulary pool ran dry under the query's constraints.
    Exhausted,
    /// A collaborator (dictionary, arithmetic, hook) failed.
    External,
}

/// A fatal error raised while running a pattern.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{pattern} ({pos}): syntax error: {message}")]
    Syntax {
        pattern: String,
        pos: Position,
        message: String,
    },
    #[error("{pattern} ({pos}): {message}")]
    Semantic {
        pattern: String,
        pos: Position,
        message: String,
    },
    #[error("{pattern} ({pos}): {message}")]
    Exhausted {
        pattern: String,
        pos: Position,
        message: String,
    },
    #[error("{pattern} ({pos}): {context}: {source}")]
    External {
        pattern: String,
        pos: Position,
        context: String,
        #[source]
        source: BoxError,
    },
}

impl EngineError {
    pub fn syntax(pattern: &str, pos: Position, message: impl Into<String>) -> Self {
        EngineError::Syntax {
            pattern: pattern.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn semantic(pattern: &str, pos: Position, message: impl Into<String>) -> Self {
        EngineError::Semantic {
            pattern: pattern.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn exhausted(pattern: &str, pos: Position, message: impl Into<String>) -> Self {
        EngineError::Exhausted {
            pattern: pattern.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn external<E>(pattern: &str, pos: Position, context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        EngineError::External {
            pattern: pattern.to_string(),
            pos,
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Syntax { .. } => ErrorKind::Syntax,
            EngineError::Semantic { .. } => ErrorKind::Semantic,
            EngineError::Exhausted { .. } => ErrorKind::Exhausted,
            EngineError::External { .. } => ErrorKind::External,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            EngineError::Syntax { pos, .. }
            | EngineError::Semantic { pos, .. }
            | EngineError::Exhausted { pos, .. }
            | EngineError::External { pos, .. } => *pos,
        }
    }

    /// The human-readable message without the location prefix.
    pub fn message(&self) -> String {
        match self {
            EngineError::Syntax { message, .. }
            | EngineError::Semantic { message, .. }
            | EngineError::Exhausted { message, .. } => message.clone(),
            EngineError::External {
                context, source, ..
            } => format!("{}: {}", context, source),
        }
    }
}

/// Errors raised while building an engine from files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid dictionary: {0}")]
    Dictionary(String),
    #[error("predefined subroutines failed: {0}")]
    Prelude(#[from] EngineError),
}
