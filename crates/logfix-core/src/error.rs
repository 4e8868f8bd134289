//! Engine error taxonomy.
//!
//! Most of these never reach a caller: the engine degrades through
//! pattern match, model synthesis, and generic template before it reports
//! anything. They are still typed so degradations can be logged and
//! surfaced in an analysis' `degraded` list.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineError {
    /// Embedding service down; matching continues keyword-only.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Language-model call exceeded its deadline.
    #[error("Language model timed out after {0:?}")]
    ModelTimeout(Duration),

    /// Language-model call failed or returned an unusable response.
    #[error("Language model error: {0}")]
    ModelError(String),

    /// Pattern store unreachable; matching proceeds with no patterns.
    #[error("Pattern store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed or unknown-target feedback; dropped.
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    /// No solution tier could serve the request.
    #[error("No solution could be produced: {0}")]
    Unrecoverable(String),
}
