//! # logfix core
//!
//! The pattern-matching and confidence-scoring engine behind `logfix`.
//!
//! A free-text log excerpt is turned into a [`models::LogSample`], scored
//! against every stored [`models::Pattern`] by the [`matcher`], and handed
//! to the [`synth`] module, which always produces exactly one
//! [`models::Solution`]. User ratings flow back through [`feedback`] and
//! move each pattern's success rate with an exponential moving average.
//! Alongside the match, [`parse`] scans the log for typed error lines and
//! reports them with line numbers and an overall severity.
//!
//! ```text
//! log text ─▶ Embedder ─▶ Matcher ◀── PatternStore snapshot
//!                            │
//!                            ▼
//!                      Synthesizer ─▶ Solution
//!                            │ (no match)
//!                            ▼
//!                     LanguageModel ─▶ generic fallback on failure
//!
//! feedback ─▶ FeedbackAggregator ─▶ PatternStore / CandidateLedger
//! ```
//!
//! This crate holds no SQL or HTTP code. Concrete embedders, language
//! models, and the SQLite-backed store live in the `logfix` app crate.

pub mod embedding;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod keywords;
pub mod matcher;
pub mod models;
pub mod parse;
pub mod store;
pub mod synth;

pub use engine::{Analysis, Engine, EngineParams};
pub use error::EngineError;
