//! Pattern matcher: keyword overlap, vector similarity, and historical
//! success merged into one composite confidence per pattern.
//!
//! # Scoring
//!
//! 1. `keyword_score` = weight of trigger keywords found in the log
//!    (case-insensitive substring, each keyword counted once) divided by
//!    the pattern's total weight, clamped to `[0, 1]`.
//! 2. `vector_score` = cosine similarity rescaled from `[-1, 1]` to
//!    `[0, 1]` via `(sim + 1) / 2`; `0.0` when either side has no usable
//!    embedding.
//! 3. `confidence = 0.40 × vector + 0.35 × keyword + 0.25 × success_rate`.
//! 4. Keep the maximum; ties go to the higher `usage_count`, then the
//!    more recent `created_at`.
//! 5. Accept the winner only if `confidence >= confidence_floor` (0.55).
//!
//! Matching is a pure function of its inputs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::models::{ComponentScores, LogSample, MatchResult, Pattern};

pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.40;
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.35;
pub const DEFAULT_SUCCESS_WEIGHT: f64 = 0.25;
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.55;

/// Slack for floating-point rounding when comparing against the floor.
const FLOOR_EPSILON: f64 = 1e-9;

/// Weights of the three composite components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub vector: f64,
    pub keyword: f64,
    pub success: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            vector: DEFAULT_VECTOR_WEIGHT,
            keyword: DEFAULT_KEYWORD_WEIGHT,
            success: DEFAULT_SUCCESS_WEIGHT,
        }
    }
}

/// Matcher tuning, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherParams {
    pub weights: MatchWeights,
    pub confidence_floor: f64,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// Weighted fraction of a pattern's trigger keywords present in the log.
pub fn keyword_score(log: &LogSample, pattern: &Pattern) -> f64 {
    let triggers = pattern.triggers();
    let total: f64 = triggers.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let hit: f64 = triggers
        .iter()
        .filter(|(term, _)| log.contains(term))
        .map(|(_, w)| w)
        .sum();
    (hit / total).clamp(0.0, 1.0)
}

/// Cosine similarity mapped onto `[0, 1]`.
pub fn vector_score(log_embedding: Option<&[f32]>, pattern: &Pattern) -> f64 {
    match log_embedding {
        Some(v) if !v.is_empty() && v.len() == pattern.embedding.len() => {
            let sim = cosine_similarity(v, &pattern.embedding) as f64;
            ((sim + 1.0) / 2.0).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

/// Weighted blend of the component scores, clamped to `[0, 1]`.
pub fn composite(weights: &MatchWeights, scores: &ComponentScores) -> f64 {
    let c = weights.vector * scores.vector_score
        + weights.keyword * scores.keyword_score
        + weights.success * scores.prior_success;
    c.clamp(0.0, 1.0)
}

/// Score one pattern against a log.
pub fn score_pattern(
    log: &LogSample,
    pattern: &Pattern,
    weights: &MatchWeights,
) -> (f64, ComponentScores) {
    let scores = ComponentScores {
        keyword_score: keyword_score(log, pattern),
        vector_score: vector_score(log.embedding.as_deref(), pattern),
        prior_success: pattern.success_rate.clamp(0.0, 1.0),
    };
    (composite(weights, &scores), scores)
}

/// Ranking between two scored patterns: higher confidence, then higher
/// usage count, then more recent creation.
fn rank(a: (f64, &Pattern), b: (f64, &Pattern)) -> Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.usage_count.cmp(&b.1.usage_count))
        .then(a.1.created_at.cmp(&b.1.created_at))
}

/// Score `log` against every pattern and select the best one.
pub fn match_patterns(
    log: &LogSample,
    patterns: &[Pattern],
    params: &MatcherParams,
) -> MatchResult {
    let mut best: Option<(f64, ComponentScores, &Pattern)> = None;
    let mut tied = 0usize;

    for pattern in patterns {
        let (confidence, scores) = score_pattern(log, pattern, &params.weights);
        let replace = match best {
            None => {
                tied = 1;
                true
            }
            Some((best_conf, _, best_pat)) => {
                if confidence == best_conf {
                    tied += 1;
                } else if confidence > best_conf {
                    tied = 1;
                }
                rank((confidence, pattern), (best_conf, best_pat)) == Ordering::Greater
            }
        };
        if replace {
            best = Some((confidence, scores, pattern));
        }
    }

    let Some((confidence, scores, pattern)) = best else {
        tracing::debug!("no patterns to match against");
        return MatchResult::none(params.confidence_floor);
    };

    let accepted = confidence + FLOOR_EPSILON >= params.confidence_floor;
    tracing::debug!(
        pattern_id = %pattern.id,
        confidence,
        keyword_score = scores.keyword_score,
        vector_score = scores.vector_score,
        prior_success = scores.prior_success,
        accepted,
        "best pattern candidate"
    );

    MatchResult {
        pattern: accepted.then(|| pattern.clone()),
        best_pattern_id: Some(pattern.id.clone()),
        confidence,
        scores,
        confidence_floor: params.confidence_floor,
        patterns_considered: patterns.len(),
        tied_candidates: tied,
    }
}
