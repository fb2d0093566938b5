//! Error types for the parse and reparse entry points.
//!
//! Lexical problems never show up here: they are error tokens. These errors
//! only describe why a pass was abandoned.

use thiserror::Error;

/// Why a document could not be built from a token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// The host tokenizer produced a gap or an overlap.
    #[error("token stream broken at offset {offset}: expected a token starting at {expected}")]
    BrokenTokenStream { offset: usize, expected: usize },

    /// The token stream does not reach the end of the text.
    #[error("token stream ends at {covered} but the text is {len} bytes long")]
    Truncated { covered: usize, len: usize },

    /// The per-parse budget ran out before the tree was complete.
    #[error("parse budget exhausted after {steps} steps")]
    BudgetExhausted { steps: u64 },

    #[error("parse cancelled")]
    Cancelled,
}

/// Why a changed-range computation was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReparseError {
    #[error("reparse cancelled")]
    Cancelled,

    /// Tokenizing the new text failed for a reason other than cancellation.
    #[error("tokenizing the new text failed: {0}")]
    Lex(ParseFailure),
}

impl From<ParseFailure> for ReparseError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Cancelled => ReparseError::Cancelled,
            other => ReparseError::Lex(other),
        }
    }
}

/// Errors loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("limit `{name}` must be greater than zero")]
    ZeroLimit { name: &'static str },
}
