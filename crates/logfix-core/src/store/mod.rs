//! Pattern storage abstraction.
//!
//! The [`PatternStore`] trait is the read/write contract the engine needs
//! from any backend (SQLite, in-memory, or a remote document store).
//! Implementations must be `Send + Sync` to serve concurrent analyses.
//!
//! # Consistency
//!
//! Readers always see whole patterns. Success-rate writes replace the
//! stored value atomically; concurrent feedback uses
//! [`compare_and_set_success_rate`](PatternStore::compare_and_set_success_rate)
//! in a retry loop so no update is lost.

pub mod cached;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Pattern;

/// Result of a first-write-wins insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A pattern with the same content hash was already stored; it was
    /// left untouched.
    Existing,
}

/// Result of a compare-and-set on a pattern's success rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CasOutcome {
    Applied,
    /// The stored rate no longer matched `expected`.
    Conflict { current: f64 },
    Missing,
}

/// Abstract storage backend for patterns.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`all_patterns`](PatternStore::all_patterns) | Full-scan snapshot for the matcher |
/// | [`get_pattern`](PatternStore::get_pattern) | Exact-key lookup |
/// | [`upsert`](PatternStore::upsert) | First-write-wins insert by content hash |
/// | [`update_success_rate`](PatternStore::update_success_rate) | Atomic replace of the rate |
/// | [`compare_and_set_success_rate`](PatternStore::compare_and_set_success_rate) | Optimistic rate update |
/// | [`record_usage`](PatternStore::record_usage) | Bump the usage counter |
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Every stored pattern, each one a consistent whole.
    async fn all_patterns(&self) -> Result<Vec<Pattern>>;

    /// Look up one pattern by id.
    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>>;

    /// Insert a pattern unless one with the same id already exists.
    async fn upsert(&self, pattern: &Pattern) -> Result<UpsertOutcome>;

    /// Overwrite a pattern's success rate (clamped to `[0, 1]`).
    ///
    /// Returns `false` when no pattern has this id.
    async fn update_success_rate(&self, id: &str, new_rate: f64) -> Result<bool>;

    /// Set the success rate only if it still equals `expected`.
    async fn compare_and_set_success_rate(
        &self,
        id: &str,
        expected: f64,
        new_rate: f64,
    ) -> Result<CasOutcome>;

    /// Increment a pattern's usage count.
    async fn record_usage(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<S: PatternStore + ?Sized> PatternStore for std::sync::Arc<S> {
    async fn all_patterns(&self) -> Result<Vec<Pattern>> {
        (**self).all_patterns().await
    }
    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        (**self).get_pattern(id).await
    }
    async fn upsert(&self, pattern: &Pattern) -> Result<UpsertOutcome> {
        (**self).upsert(pattern).await
    }
    async fn update_success_rate(&self, id: &str, new_rate: f64) -> Result<bool> {
        (**self).update_success_rate(id, new_rate).await
    }
    async fn compare_and_set_success_rate(
        &self,
        id: &str,
        expected: f64,
        new_rate: f64,
    ) -> Result<CasOutcome> {
        (**self)
            .compare_and_set_success_rate(id, expected, new_rate)
            .await
    }
    async fn record_usage(&self, id: &str) -> Result<()> {
        (**self).record_usage(id).await
    }
}
