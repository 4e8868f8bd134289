//! In-memory [`PatternStore`] for tests and single-process use.
//!
//! Patterns live behind `Arc`s in a `RwLock<HashMap>`. Every write builds
//! a new `Pattern` and swaps the `Arc` under the write lock, so readers
//! never observe a half-updated pattern.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Pattern;

use super::{CasOutcome, PatternStore, UpsertOutcome};

pub struct InMemoryPatternStore {
    patterns: RwLock<HashMap<String, Arc<Pattern>>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_patterns(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        let map = patterns
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        Self {
            patterns: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Pattern>>> {
        self.patterns.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Pattern>>> {
        self.patterns.write().unwrap_or_else(|e| e.into_inner())
    }

    fn replace_with(&self, id: &str, f: impl FnOnce(&mut Pattern)) -> bool {
        let mut map = self.write();
        match map.get_mut(id) {
            Some(slot) => {
                let mut next = Pattern::clone(slot);
                f(&mut next);
                *slot = Arc::new(next);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryPatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn all_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(self.read().values().map(|p| Pattern::clone(p)).collect())
    }

    async fn get_pattern(&self, id: &str) -> Result<Option<Pattern>> {
        Ok(self.read().get(id).map(|p| Pattern::clone(p)))
    }

    async fn upsert(&self, pattern: &Pattern) -> Result<UpsertOutcome> {
        let mut map = self.write();
        if map.contains_key(&pattern.id) {
            return Ok(UpsertOutcome::Existing);
        }
        map.insert(pattern.id.clone(), Arc::new(pattern.clone()));
        Ok(UpsertOutcome::Inserted)
    }

    async fn update_success_rate(&self, id: &str, new_rate: f64) -> Result<bool> {
        Ok(self.replace_with(id, |p| p.success_rate = new_rate.clamp(0.0, 1.0)))
    }

    async fn compare_and_set_success_rate(
        &self,
        id: &str,
        expected: f64,
        new_rate: f64,
    ) -> Result<CasOutcome> {
        let mut map = self.write();
        let Some(slot) = map.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };
        if slot.success_rate != expected {
            return Ok(CasOutcome::Conflict {
                current: slot.success_rate,
            });
        }
        let mut next = Pattern::clone(slot);
        next.success_rate = new_rate.clamp(0.0, 1.0);
        *slot = Arc::new(next);
        Ok(CasOutcome::Applied)
    }

    async fn record_usage(&self, id: &str) -> Result<()> {
        self.replace_with(id, |p| p.usage_count += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Keyword, SolutionTemplate};

    fn sample(term: &str) -> Pattern {
        Pattern::new(
            Category::Other,
            vec![Keyword::new(term, 1.0)],
            vec![],
            SolutionTemplate {
                title: term.to_string(),
                steps: vec!["do it".to_string()],
                snippet: None,
                estimated_time: None,
            },
            0.8,
        )
    }

    #[tokio::test]
    async fn test_upsert_first_write_wins() {
        let store = InMemoryPatternStore::new();
        let first = sample("oom");
        let mut second = first.clone();
        second.template.title = "different".into();

        assert_eq!(store.upsert(&first).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&second).await.unwrap(), UpsertOutcome::Existing);
        let stored = store.get_pattern(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.template.title, "oom");
    }

    #[tokio::test]
    async fn test_update_success_rate_clamps() {
        let p = sample("oom");
        let store = InMemoryPatternStore::with_patterns([p.clone()]);
        assert!(store.update_success_rate(&p.id, 7.0).await.unwrap());
        assert_eq!(store.get_pattern(&p.id).await.unwrap().unwrap().success_rate, 1.0);
        assert!(!store.update_success_rate("missing", 0.5).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let p = sample("oom");
        let store = InMemoryPatternStore::with_patterns([p.clone()]);
        assert_eq!(
            store.compare_and_set_success_rate(&p.id, 0.8, 0.81).await.unwrap(),
            CasOutcome::Applied
        );
        assert_eq!(
            store.compare_and_set_success_rate(&p.id, 0.8, 0.9).await.unwrap(),
            CasOutcome::Conflict { current: 0.81 }
        );
        assert_eq!(
            store.compare_and_set_success_rate("nope", 0.8, 0.9).await.unwrap(),
            CasOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_record_usage() {
        let p = sample("oom");
        let store = InMemoryPatternStore::with_patterns([p.clone()]);
        store.record_usage(&p.id).await.unwrap();
        store.record_usage(&p.id).await.unwrap();
        assert_eq!(store.get_pattern(&p.id).await.unwrap().unwrap().usage_count, 2);
    }
}
