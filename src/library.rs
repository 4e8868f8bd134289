//! Built-in pattern library.
//!
//! The seed patterns live in `library/patterns.toml`, embedded at compile
//! time and parsed once. Seeding computes each pattern's reference
//! embedding from its canonical text with the configured embedder and
//! inserts it first-write-wins, so running `logfix init` twice is a no-op.

use anyhow::{Context, Result};
use serde::Deserialize;

use logfix_core::embedding::Embedder;
use logfix_core::models::{Category, Keyword, Pattern, SolutionTemplate};
use logfix_core::store::{PatternStore, UpsertOutcome};

const BUILTIN_PATTERNS: &str = include_str!("library/patterns.toml");

#[derive(Debug, Deserialize)]
struct Library {
    pattern: Vec<SeedPattern>,
}

#[derive(Debug, Deserialize)]
struct SeedPattern {
    category: Category,
    #[serde(default)]
    success_rate: Option<f64>,
    keywords: Vec<Keyword>,
    template: SolutionTemplate,
}

/// Parse the embedded library. Patterns without their own success rate
/// start at `prior`. Embeddings are left empty.
pub fn builtin_patterns(prior: f64) -> Result<Vec<Pattern>> {
    let library: Library =
        toml::from_str(BUILTIN_PATTERNS).context("Failed to parse built-in pattern library")?;

    Ok(library
        .pattern
        .into_iter()
        .map(|seed| {
            let keywords = seed
                .keywords
                .into_iter()
                .map(|k| Keyword::new(k.term, k.weight))
                .collect();
            Pattern::new(
                seed.category,
                keywords,
                Vec::new(),
                seed.template,
                seed.success_rate.unwrap_or(prior),
            )
        })
        .collect())
}

/// Counts from one seeding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub existing: usize,
    pub without_embedding: usize,
}

/// Embed and insert every built-in pattern.
pub async fn seed(
    store: &dyn PatternStore,
    embedder: &dyn Embedder,
    prior: f64,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for mut pattern in builtin_patterns(prior)? {
        match embedder.embed(&pattern.canonical_text()).await {
            Ok(v) => pattern.embedding = v,
            Err(e) => {
                tracing::warn!(
                    pattern_id = %pattern.id,
                    error = %format!("{:#}", e),
                    "seeding pattern without embedding"
                );
                report.without_embedding += 1;
            }
        }

        match store.upsert(&pattern).await? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Existing => report.existing += 1,
        }
    }

    tracing::info!(
        inserted = report.inserted,
        existing = report.existing,
        "built-in patterns seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use logfix_core::embedding::{DisabledEmbedder, HashingEmbedder};
    use logfix_core::store::memory::InMemoryPatternStore;

    #[test]
    fn test_library_parses_with_unique_ids() {
        let patterns = builtin_patterns(0.80).unwrap();
        assert_eq!(patterns.len(), 9);
        let ids: HashSet<_> = patterns.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 9);
        for p in &patterns {
            assert!(!p.template.steps.is_empty(), "{} has no steps", p.template.title);
            assert!(p.total_weight() > 0.0);
            assert!((0.0..=1.0).contains(&p.success_rate));
        }
    }

    #[test]
    fn test_missing_success_rate_uses_prior() {
        let patterns = builtin_patterns(0.42).unwrap();
        let crash = patterns
            .iter()
            .find(|p| p.template.title.contains("CrashLoopBackOff"))
            .unwrap();
        assert_eq!(crash.success_rate, 0.42);
    }

    #[test]
    fn test_every_category_except_other_is_covered() {
        let categories: HashSet<Category> = builtin_patterns(0.8)
            .unwrap()
            .into_iter()
            .map(|p| p.category)
            .collect();
        for c in [Category::Docker, Category::Kubernetes, Category::Database, Category::Network] {
            assert!(categories.contains(&c), "no {} pattern", c);
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = InMemoryPatternStore::new();
        let embedder = HashingEmbedder::default();

        let first = seed(&store, &embedder, 0.8).await.unwrap();
        assert_eq!(first.inserted, 9);
        let second = seed(&store, &embedder, 0.8).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, 9);
        assert_eq!(store.len(), 9);

        let all = store.all_patterns().await.unwrap();
        assert!(all.iter().all(|p| p.embedding.len() == 384));
    }

    #[tokio::test]
    async fn test_seed_without_embedder_still_inserts() {
        let store = InMemoryPatternStore::new();
        let report = seed(&store, &DisabledEmbedder, 0.8).await.unwrap();
        assert_eq!(report.inserted, 9);
        assert_eq!(report.without_embedding, 9);
    }
}
