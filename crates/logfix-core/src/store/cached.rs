//! Short-TTL snapshot cache in front of any [`PatternStore`].
//!
//! Analyses read the whole pattern set on every request. The cache keeps
//! the last full scan for `ttl` and serves it to concurrent readers; all
//! writes go straight to the inner store and drop the snapshot so the
//! next read refetches.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Pattern;

use super::{CasOutcome, PatternStore, UpsertOutcome};

struct Snapshot {
    taken_at: Instant,
    patterns: Arc<Vec<Pattern>>,
}

pub struct CachedPatternStore<S> {
    inner: S,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl<S: PatternStore> CachedPatternStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The cached pattern set, refreshed when older than the TTL.
    pub async fn snapshot(&self) -> Result<Arc<Vec<Pattern>>> {
        if let Some(fresh) = self.fresh() {
            return Ok(fresh);
        }
        let patterns = Arc::new(self.inner.all_patterns().await?);
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Snapshot {
            taken_at: Instant::now(),
            patterns: Arc::clone(&patterns),
        });
        Ok(patterns)
    }

    pub fn invalidate(&self) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn fresh(&self) -> Option<Arc<Vec<Pattern>>> {
        if self.ttl.is_zero() {
            return None;
        }
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|s| s.taken_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.patterns))
    }
}

#[async_trait]
impl<S: PatternStore> PatternStore for CachedPatternStore<S> {
    async fn all_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(self.snapshot().await?.as_ref().clone())
    }

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        self.inner.get_pattern(id).await
    }

    async fn upsert(&self, pattern: &Pattern) -> Result<UpsertOutcome> {
        let outcome = self.inner.upsert(pattern).await?;
        if outcome == UpsertOutcome::Inserted {
            self.invalidate();
        }
        Ok(outcome)
    }

    async fn update_success_rate(&self, id: &str, new_rate: f64) -> Result<bool> {
        let updated = self.inner.update_success_rate(id, new_rate).await?;
        self.invalidate();
        Ok(updated)
    }

    async fn compare_and_set_success_rate(
        &self,
        id: &str,
        expected: f64,
        new_rate: f64,
    ) -> Result<CasOutcome> {
        let outcome = self
            .inner
            .compare_and_set_success_rate(id, expected, new_rate)
            .await?;
        if outcome == CasOutcome::Applied {
            self.invalidate();
        }
        Ok(outcome)
    }

    async fn record_usage(&self, id: &str) -> Result<()> {
        // Not invalidated: usage counts refresh with the next TTL expiry.
        self.inner.record_usage(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Keyword, SolutionTemplate};
    use crate::store::memory::InMemoryPatternStore;

    fn sample(term: &str) -> Pattern {
        Pattern::new(
            Category::Network,
            vec![Keyword::new(term, 1.0)],
            vec![],
            SolutionTemplate {
                title: term.to_string(),
                steps: vec!["retry".to_string()],
                snippet: None,
                estimated_time: None,
            },
            0.8,
        )
    }

    #[tokio::test]
    async fn test_snapshot_is_reused_within_ttl() {
        let inner = Arc::new(InMemoryPatternStore::new());
        let cached = CachedPatternStore::new(Arc::clone(&inner), Duration::from_secs(60));

        assert!(cached.all_patterns().await.unwrap().is_empty());
        // Written behind the cache's back: not visible until the TTL lapses.
        inner.upsert(&sample("dns")).await.unwrap();
        assert!(cached.all_patterns().await.unwrap().is_empty());

        cached.invalidate();
        assert_eq!(cached.all_patterns().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_through_cache_invalidate() {
        let cached = CachedPatternStore::new(InMemoryPatternStore::new(), Duration::from_secs(60));
        assert!(cached.all_patterns().await.unwrap().is_empty());

        let p = sample("tls");
        cached.upsert(&p).await.unwrap();
        assert_eq!(cached.all_patterns().await.unwrap().len(), 1);

        cached.update_success_rate(&p.id, 0.1).await.unwrap();
        assert_eq!(cached.all_patterns().await.unwrap()[0].success_rate, 0.1);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let inner = Arc::new(InMemoryPatternStore::new());
        let cached = CachedPatternStore::new(Arc::clone(&inner), Duration::ZERO);
        cached.all_patterns().await.unwrap();
        inner.upsert(&sample("timeout")).await.unwrap();
        assert_eq!(cached.all_patterns().await.unwrap().len(), 1);
    }
}
