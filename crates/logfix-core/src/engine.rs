//! The analysis engine: one entry point for `analyze` and one for
//! `feedback`.
//!
//! `analyze` degrades instead of failing:
//!
//! - embedding failure or timeout → keyword-only scoring (`vector_score = 0`)
//! - stored embeddings of another width → keyword-only scoring for those
//!   patterns
//! - store failure → empty pattern set, synthesis-only path
//! - model failure → generic fallback template
//!
//! Every degradation is logged and listed in [`Analysis::degraded`]. The
//! only error `analyze` can return is [`EngineError::Unrecoverable`], and
//! only in strict mode when the store and the model were both
//! unavailable.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::embedding::{Embedder, DEFAULT_EMBED_TIMEOUT};
use crate::error::EngineError;
use crate::feedback::{CandidateLedger, FeedbackAggregator, FeedbackOutcome, FeedbackParams};
use crate::matcher::{match_patterns, MatcherParams};
use crate::models::{
    FeedbackEvent, FeedbackTarget, LogSample, MatchResult, Pattern, Rating, Solution, SourceTag,
};
use crate::parse::{self, IssueSummary};
use crate::store::PatternStore;
use crate::synth::{LanguageModel, Synthesizer, SynthesizerParams};

#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub matcher: MatcherParams,
    pub synth: SynthesizerParams,
    pub feedback: FeedbackParams,
    /// Deadline for embedding the log.
    pub embed_timeout: Duration,
    /// Report `Unrecoverable` instead of a generic fallback when neither
    /// the store nor the model could be reached.
    pub strict: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            matcher: MatcherParams::default(),
            synth: SynthesizerParams::default(),
            feedback: FeedbackParams::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            strict: false,
        }
    }
}

/// Result of one analysis: exactly one solution plus how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub solution: Solution,
    #[serde(rename = "match")]
    pub match_result: MatchResult,
    /// Error lines and severity found by scanning the log.
    pub issues: IssueSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<EngineError>,
}

pub struct Engine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn PatternStore>,
    ledger: Arc<dyn CandidateLedger>,
    synthesizer: Synthesizer,
    aggregator: FeedbackAggregator,
    matcher: MatcherParams,
    embed_timeout: Duration,
    strict: bool,
}

impl Engine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn PatternStore>,
        ledger: Arc<dyn CandidateLedger>,
        model: Arc<dyn LanguageModel>,
        params: EngineParams,
    ) -> Self {
        Self {
            embedder,
            store,
            ledger,
            synthesizer: Synthesizer::new(model, params.synth),
            aggregator: FeedbackAggregator::new(params.feedback),
            matcher: params.matcher,
            embed_timeout: params.embed_timeout,
            strict: params.strict,
        }
    }

    pub fn store(&self) -> &Arc<dyn PatternStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn CandidateLedger> {
        &self.ledger
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Classify a log and return exactly one solution.
    pub async fn analyze(
        &self,
        log_text: &str,
        source: SourceTag,
    ) -> Result<Analysis, EngineError> {
        let mut degraded = Vec::new();
        let mut log = LogSample::new(log_text, source);
        let issues = parse::scan(log_text);

        let embedded =
            tokio::time::timeout(self.embed_timeout, self.embedder.embed(log_text)).await;
        match embedded {
            Ok(Ok(v)) if !v.is_empty() => log = log.with_embedding(v),
            Ok(Ok(_)) => {
                degraded.push(EngineError::EmbeddingUnavailable("empty embedding".into()));
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    model = self.embedder.model_name(),
                    error = %format!("{:#}", e),
                    "embedding unavailable, scoring keywords only"
                );
                degraded.push(EngineError::EmbeddingUnavailable(format!("{:#}", e)));
            }
            Err(_) => {
                tracing::warn!(
                    model = self.embedder.model_name(),
                    timeout = ?self.embed_timeout,
                    "embedding timed out, scoring keywords only"
                );
                degraded.push(EngineError::EmbeddingUnavailable(format!(
                    "timed out after {:?}",
                    self.embed_timeout
                )));
            }
        }

        let mut store_down = false;
        let patterns = match self.store.all_patterns().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    error = %format!("{:#}", e),
                    "pattern store unavailable, matching against no patterns"
                );
                degraded.push(EngineError::StoreUnavailable(format!("{:#}", e)));
                store_down = true;
                Vec::new()
            }
        };

        if let Some(embedding) = &log.embedding {
            if let Some(mismatch) = dimension_mismatch(embedding.len(), &patterns) {
                degraded.push(mismatch);
            }
        }

        let match_result = match_patterns(&log, &patterns, &self.matcher);
        let synthesis = self.synthesizer.synthesize(&match_result, &log).await;

        if let Some(pattern) = &match_result.pattern {
            if let Err(e) = self.store.record_usage(&pattern.id).await {
                tracing::warn!(
                    pattern_id = %pattern.id,
                    error = %format!("{:#}", e),
                    "failed to record pattern usage"
                );
            }
        }

        if let Some(candidate) = &synthesis.candidate {
            if let Err(e) = self.ledger.propose(candidate).await {
                tracing::warn!(
                    signature = %candidate.signature,
                    error = %format!("{:#}", e),
                    "failed to record candidate pattern"
                );
            }
        }

        if let Some(failure) = synthesis.failure {
            if store_down && self.strict {
                return Err(EngineError::Unrecoverable(format!(
                    "pattern store unavailable and {}",
                    failure
                )));
            }
            degraded.push(failure);
        }

        Ok(Analysis {
            solution: synthesis.solution,
            match_result,
            issues,
            degraded,
        })
    }

    /// Apply one feedback event and report its effect.
    pub async fn apply_feedback(
        &self,
        event: &FeedbackEvent,
    ) -> Result<FeedbackOutcome, EngineError> {
        self.aggregator
            .apply(event, self.store.as_ref(), self.ledger.as_ref())
            .await
    }

    /// Fire-and-forget feedback: failures are logged and turned into a
    /// [`FeedbackOutcome::Dropped`], never returned.
    pub async fn feedback(
        &self,
        target: &str,
        rating: Rating,
        comment: Option<String>,
    ) -> FeedbackOutcome {
        let Some(target) = FeedbackTarget::parse(target) else {
            tracing::warn!(feedback_target = target, "dropping feedback with empty target");
            return FeedbackOutcome::Dropped {
                reason: EngineError::InvalidFeedback("empty target".into()).to_string(),
            };
        };

        let mut event = FeedbackEvent::new(target, rating);
        if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
            event = event.with_comment(comment);
        }

        match self.apply_feedback(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(feedback_target = %event.target, error = %e, "dropping feedback");
                FeedbackOutcome::Dropped { reason: e.to_string() }
            }
        }
    }
}

/// Stored embeddings whose width differs from the log's never contribute
/// a vector score. Reported once per analysis.
fn dimension_mismatch(dims: usize, patterns: &[Pattern]) -> Option<EngineError> {
    let stale = patterns
        .iter()
        .filter(|p| !p.embedding.is_empty() && p.embedding.len() != dims)
        .count();
    if stale == 0 {
        return None;
    }
    tracing::warn!(
        log_dims = dims,
        stale_patterns = stale,
        "stored pattern embeddings have a different width, scoring them on keywords only"
    );
    Some(EngineError::EmbeddingUnavailable(format!(
        "{} stored pattern(s) have embeddings of a different width than the {}-dim log embedding",
        stale, dims
    )))
}
