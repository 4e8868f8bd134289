//! Feedback aggregation.
//!
//! Ratings on pattern-derived solutions move the pattern's success rate
//! with an exponential moving average:
//!
//! ```text
//! new = old + α × (outcome − old)      α = 0.05, result clamped to [0, 1]
//! ```
//!
//! The update is a compare-and-set retry loop against the store, so
//! concurrent events on the same pattern never lose an update.
//!
//! Ratings on model-synthesized solutions go to a [`CandidateLedger`].
//! Once a candidate collects `K` (default 3) events with outcome ≥ 0.5 it
//! is promoted into the pattern store, first write wins on its content
//! hash.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::error::EngineError;
use crate::models::{CandidatePattern, FeedbackEvent, FeedbackTarget};
use crate::store::{CasOutcome, PatternStore, UpsertOutcome};

pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_PROMOTION_THRESHOLD: u32 = 3;

/// Attempts before a contended compare-and-set gives up.
const MAX_CAS_ATTEMPTS: usize = 32;

/// One EMA step toward `outcome`, clamped to `[0, 1]`.
pub fn ema(old: f64, outcome: f64, alpha: f64) -> f64 {
    let old = if old.is_finite() { old.clamp(0.0, 1.0) } else { 0.0 };
    (old + alpha * (outcome - old)).clamp(0.0, 1.0)
}

/// Where model-synthesized candidates wait for enough positive votes.
#[async_trait]
pub trait CandidateLedger: Send + Sync {
    /// Record a proposed candidate. Re-proposing keeps the existing vote
    /// count.
    async fn propose(&self, candidate: &CandidatePattern) -> Result<()>;

    /// Count one event for a candidate. Returns the positive-vote total,
    /// or `None` if the signature is unknown.
    async fn vote(&self, signature: &str, positive: bool) -> Result<Option<u32>>;

    /// Remove and return a candidate.
    async fn take(&self, signature: &str) -> Result<Option<CandidatePattern>>;

    /// Number of candidates awaiting promotion.
    async fn pending(&self) -> Result<usize>;
}

/// In-process [`CandidateLedger`].
#[derive(Default)]
pub struct InMemoryCandidateLedger {
    entries: Mutex<HashMap<String, (CandidatePattern, u32)>>,
}

impl InMemoryCandidateLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateLedger for InMemoryCandidateLedger {
    async fn propose(&self, candidate: &CandidatePattern) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(candidate.signature.clone())
            .or_insert_with(|| (candidate.clone(), 0));
        Ok(())
    }

    async fn vote(&self, signature: &str, positive: bool) -> Result<Option<u32>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get_mut(signature).map(|(_, votes)| {
            if positive {
                *votes += 1;
            }
            *votes
        }))
    }

    async fn take(&self, signature: &str) -> Result<Option<CandidatePattern>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(signature).map(|(c, _)| c))
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}

/// Aggregator tuning, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackParams {
    pub alpha: f64,
    /// Positive events needed to promote a candidate (K).
    pub promotion_threshold: u32,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
        }
    }
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    RateUpdated {
        pattern_id: String,
        previous: f64,
        current: f64,
    },
    CandidateVoted {
        signature: String,
        positive_votes: u32,
        threshold: u32,
    },
    Promoted {
        pattern_id: String,
        /// `false` when an identical pattern was already stored.
        inserted: bool,
    },
    Dropped {
        reason: String,
    },
}

pub struct FeedbackAggregator {
    params: FeedbackParams,
}

impl FeedbackAggregator {
    pub fn new(params: FeedbackParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FeedbackParams {
        &self.params
    }

    /// Apply one event. Errors are either `InvalidFeedback` (bad rating,
    /// unknown target) or `StoreUnavailable`.
    pub async fn apply(
        &self,
        event: &FeedbackEvent,
        store: &dyn PatternStore,
        ledger: &dyn CandidateLedger,
    ) -> Result<FeedbackOutcome, EngineError> {
        let outcome = event.rating.outcome().ok_or_else(|| {
            EngineError::InvalidFeedback(format!(
                "rating {:?} is outside [0, 1]",
                event.rating
            ))
        })?;

        match &event.target {
            FeedbackTarget::Pattern(id) => self.update_rate(id, outcome, store).await,
            FeedbackTarget::Candidate(sig) => self.vote(sig, outcome, store, ledger).await,
        }
    }

    async fn update_rate(
        &self,
        id: &str,
        outcome: f64,
        store: &dyn PatternStore,
    ) -> Result<FeedbackOutcome, EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let pattern = store
                .get_pattern(id)
                .await
                .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?
                .ok_or_else(|| EngineError::InvalidFeedback(format!("unknown pattern '{}'", id)))?;

            let previous = pattern.success_rate;
            let current = ema(previous, outcome, self.params.alpha);
            match store
                .compare_and_set_success_rate(id, previous, current)
                .await
                .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?
            {
                CasOutcome::Applied => {
                    tracing::debug!(pattern_id = id, previous, current, "success rate updated");
                    return Ok(FeedbackOutcome::RateUpdated {
                        pattern_id: id.to_string(),
                        previous,
                        current,
                    });
                }
                CasOutcome::Conflict { current } => {
                    tracing::debug!(
                        pattern_id = id,
                        current,
                        "success rate changed underneath, retrying"
                    );
                }
                CasOutcome::Missing => {
                    return Err(EngineError::InvalidFeedback(format!("unknown pattern '{}'", id)));
                }
            }
        }
        Err(EngineError::StoreUnavailable(format!(
            "success rate of '{}' still contended after {} attempts",
            id, MAX_CAS_ATTEMPTS
        )))
    }

    async fn vote(
        &self,
        signature: &str,
        outcome: f64,
        store: &dyn PatternStore,
        ledger: &dyn CandidateLedger,
    ) -> Result<FeedbackOutcome, EngineError> {
        let positive = outcome >= 0.5;
        let votes = ledger
            .vote(signature, positive)
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?;

        let Some(votes) = votes else {
            // Already promoted candidates are plain patterns now.
            if store
                .get_pattern(signature)
                .await
                .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?
                .is_some()
            {
                return self.update_rate(signature, outcome, store).await;
            }
            return Err(EngineError::InvalidFeedback(format!(
                "unknown candidate '{}'",
                signature
            )));
        };

        if !positive || votes < self.params.promotion_threshold {
            return Ok(FeedbackOutcome::CandidateVoted {
                signature: signature.to_string(),
                positive_votes: votes,
                threshold: self.params.promotion_threshold,
            });
        }

        let Some(candidate) = ledger
            .take(signature)
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?
        else {
            // A concurrent event promoted it first.
            return Ok(FeedbackOutcome::Promoted {
                pattern_id: signature.to_string(),
                inserted: false,
            });
        };

        let pattern = candidate.into_pattern();
        let inserted = store
            .upsert(&pattern)
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("{:#}", e)))?
            == UpsertOutcome::Inserted;
        tracing::info!(
            pattern_id = %pattern.id,
            category = %pattern.category,
            inserted,
            "candidate promoted to pattern"
        );
        Ok(FeedbackOutcome::Promoted {
            pattern_id: pattern.id,
            inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::{Category, Keyword, Pattern, Rating, SolutionTemplate, SourceTag};
    use crate::store::memory::InMemoryPatternStore;

    fn template() -> SolutionTemplate {
        SolutionTemplate {
            title: "Fix it".into(),
            steps: vec!["step one".into()],
            snippet: None,
            estimated_time: None,
        }
    }

    fn pattern(rate: f64) -> Pattern {
        Pattern::new(
            Category::Database,
            vec![Keyword::new("relation", 1.0)],
            vec![],
            template(),
            rate,
        )
    }

    fn candidate() -> CandidatePattern {
        CandidatePattern {
            signature: "abc123".into(),
            source: SourceTag::Application,
            category: Category::Other,
            keywords: vec![Keyword::new("flaky", 1.0)],
            embedding: vec![],
            template: template(),
            prior: 0.70,
        }
    }

    fn event(target: FeedbackTarget, rating: Rating) -> FeedbackEvent {
        FeedbackEvent::new(target, rating)
    }

    #[test]
    fn test_ema_moves_toward_outcome() {
        assert!((ema(0.8, 1.0, 0.05) - 0.81).abs() < 1e-12);
        assert!((ema(0.8, 0.0, 0.05) - 0.76).abs() < 1e-12);
        assert_eq!(ema(0.8, 0.8, 0.05), 0.8);
    }

    #[test]
    fn test_ema_clamps_extremes() {
        assert_eq!(ema(1.0, 1.0, 1.0), 1.0);
        assert_eq!(ema(2.0, 1.0, 0.05), 1.0);
        assert_eq!(ema(-3.0, 0.0, 0.05), 0.0);
        assert_eq!(ema(f64::NAN, 0.0, 0.05), 0.0);
    }

    #[test]
    fn test_repeated_positive_feedback_converges_without_overshoot() {
        let mut rate = 0.8;
        let mut prev_gap = 1.0 - rate;
        for _ in 0..500 {
            rate = ema(rate, 1.0, DEFAULT_ALPHA);
            let gap = 1.0 - rate;
            assert!(gap <= prev_gap);
            assert!((0.0..=1.0).contains(&rate));
            prev_gap = gap;
        }
        assert!(rate > 0.99);
    }

    #[tokio::test]
    async fn test_positive_twice_closer_than_once() {
        let p = pattern(0.8);
        let store = InMemoryPatternStore::with_patterns([p.clone()]);
        let ledger = InMemoryCandidateLedger::new();
        let agg = FeedbackAggregator::new(FeedbackParams::default());
        let e = event(FeedbackTarget::Pattern(p.id.clone()), Rating::Positive);

        agg.apply(&e, &store, &ledger).await.unwrap();
        let once = store.get_pattern(&p.id).await.unwrap().unwrap().success_rate;
        agg.apply(&e, &store, &ledger).await.unwrap();
        let twice = store.get_pattern(&p.id).await.unwrap().unwrap().success_rate;

        assert!(once > 0.8);
        assert!(twice > once);
        assert!(twice <= 1.0);
    }

    #[tokio::test]
    async fn test_invalid_rating_is_rejected() {
        let p = pattern(0.8);
        let store = InMemoryPatternStore::with_patterns([p.clone()]);
        let agg = FeedbackAggregator::new(FeedbackParams::default());
        let err = agg
            .apply(
                &event(FeedbackTarget::Pattern(p.id.clone()), Rating::Accuracy(4.0)),
                &store,
                &InMemoryCandidateLedger::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFeedback(_)));
        assert_eq!(store.get_pattern(&p.id).await.unwrap().unwrap().success_rate, 0.8);
    }

    #[tokio::test]
    async fn test_unknown_pattern_is_invalid() {
        let agg = FeedbackAggregator::new(FeedbackParams::default());
        let err = agg
            .apply(
                &event(FeedbackTarget::Pattern("nope".into()), Rating::Positive),
                &InMemoryPatternStore::new(),
                &InMemoryCandidateLedger::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFeedback(_)));
    }

    #[tokio::test]
    async fn test_concurrent_feedback_loses_no_updates() {
        let p = pattern(0.5);
        let store = Arc::new(InMemoryPatternStore::with_patterns([p.clone()]));
        let ledger = Arc::new(InMemoryCandidateLedger::new());
        let agg = Arc::new(FeedbackAggregator::new(FeedbackParams::default()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let (store, ledger, agg, id) =
                (store.clone(), ledger.clone(), agg.clone(), p.id.clone());
            handles.push(tokio::spawn(async move {
                let e = FeedbackEvent::new(FeedbackTarget::Pattern(id), Rating::Positive);
                agg.apply(&e, store.as_ref(), ledger.as_ref()).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut expected = 0.5;
        for _ in 0..20 {
            expected = ema(expected, 1.0, DEFAULT_ALPHA);
        }
        let actual = store.get_pattern(&p.id).await.unwrap().unwrap().success_rate;
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[tokio::test]
    async fn test_candidate_promoted_after_k_positive_events() {
        let store = InMemoryPatternStore::new();
        let ledger = InMemoryCandidateLedger::new();
        ledger.propose(&candidate()).await.unwrap();
        let agg = FeedbackAggregator::new(FeedbackParams::default());
        let e = event(FeedbackTarget::Candidate("abc123".into()), Rating::Positive);

        for expected_votes in 1..=2 {
            let out = agg.apply(&e, &store, &ledger).await.unwrap();
            assert_eq!(
                out,
                FeedbackOutcome::CandidateVoted {
                    signature: "abc123".into(),
                    positive_votes: expected_votes,
                    threshold: 3,
                }
            );
        }
        assert!(store.is_empty());

        let out = agg.apply(&e, &store, &ledger).await.unwrap();
        assert_eq!(
            out,
            FeedbackOutcome::Promoted {
                pattern_id: "abc123".into(),
                inserted: true,
            }
        );
        let promoted = store.get_pattern("abc123").await.unwrap().unwrap();
        assert_eq!(promoted.success_rate, 0.70);
        assert_eq!(ledger.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_candidate_votes_do_not_count() {
        let store = InMemoryPatternStore::new();
        let ledger = InMemoryCandidateLedger::new();
        ledger.propose(&candidate()).await.unwrap();
        let agg = FeedbackAggregator::new(FeedbackParams::default());

        let ratings = [
            Rating::Negative,
            Rating::Accuracy(0.2),
            Rating::Negative,
            Rating::Negative,
        ];
        for rating in ratings {
            let e = event(FeedbackTarget::Candidate("abc123".into()), rating);
            agg.apply(&e, &store, &ledger).await.unwrap();
        }
        assert!(store.is_empty());
        assert_eq!(ledger.pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promotion_is_first_write_wins() {
        let store = InMemoryPatternStore::new();
        let ledger = InMemoryCandidateLedger::new();
        let mut existing = candidate().into_pattern();
        existing.success_rate = 0.95;
        store.upsert(&existing).await.unwrap();
        ledger.propose(&candidate()).await.unwrap();

        let agg = FeedbackAggregator::new(FeedbackParams {
            promotion_threshold: 1,
            ..FeedbackParams::default()
        });
        let e = event(FeedbackTarget::Candidate("abc123".into()), Rating::Positive);
        let out = agg.apply(&e, &store, &ledger).await.unwrap();
        assert_eq!(
            out,
            FeedbackOutcome::Promoted {
                pattern_id: "abc123".into(),
                inserted: false,
            }
        );
        assert_eq!(store.get_pattern("abc123").await.unwrap().unwrap().success_rate, 0.95);
    }

    #[tokio::test]
    async fn test_feedback_on_promoted_candidate_updates_rate() {
        let store = InMemoryPatternStore::with_patterns([candidate().into_pattern()]);
        let agg = FeedbackAggregator::new(FeedbackParams::default());
        let out = agg
            .apply(
                &event(FeedbackTarget::Candidate("abc123".into()), Rating::Negative),
                &store,
                &InMemoryCandidateLedger::new(),
            )
            .await
            .unwrap();
        assert!(matches!(out, FeedbackOutcome::RateUpdated { .. }));
    }
}
