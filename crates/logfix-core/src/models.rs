//! Core data models used throughout logfix.
//!
//! These types represent the log samples, stored patterns, match results,
//! solutions, and feedback events that flow through the engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keywords::{content_hash, extract_keywords};

/// Declared origin of a log excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Docker,
    Kubernetes,
    Ci,
    Yaml,
    Application,
    Unknown,
}

impl SourceTag {
    pub const ALL: [SourceTag; 6] = [
        SourceTag::Docker,
        SourceTag::Kubernetes,
        SourceTag::Ci,
        SourceTag::Yaml,
        SourceTag::Application,
        SourceTag::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Docker => "docker",
            SourceTag::Kubernetes => "kubernetes",
            SourceTag::Ci => "ci",
            SourceTag::Yaml => "yaml",
            SourceTag::Application => "application",
            SourceTag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsing never fails: unrecognized tags map to [`SourceTag::Unknown`].
impl FromStr for SourceTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "docker" | "docker-compose" | "compose" => SourceTag::Docker,
            "kubernetes" | "k8s" | "kubectl" => SourceTag::Kubernetes,
            "ci" | "ci/cd" | "cicd" | "github-actions" | "gitlab-ci" => SourceTag::Ci,
            "yaml" | "yml" => SourceTag::Yaml,
            "application" | "app" => SourceTag::Application,
            _ => SourceTag::Unknown,
        })
    }
}

/// Issue category a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Docker,
    Kubernetes,
    Database,
    Network,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Docker => "docker",
            Category::Kubernetes => "kubernetes",
            Category::Database => "database",
            Category::Network => "network",
            Category::Other => "other",
        }
    }

    /// Best-effort category for a log that matched nothing, from its
    /// declared source and extracted keywords.
    pub fn infer<'a>(source: SourceTag, keywords: impl IntoIterator<Item = &'a str>) -> Category {
        let keywords: Vec<&str> = keywords.into_iter().collect();
        let has = |needles: &[&str]| keywords.iter().any(|k| needles.contains(k));

        let database = [
            "postgres",
            "postgresql",
            "mysql",
            "relation",
            "database",
            "sql",
            "mongodb",
            "redis",
        ];
        if has(&database) {
            return Category::Database;
        }
        match source {
            SourceTag::Docker => return Category::Docker,
            SourceTag::Kubernetes => return Category::Kubernetes,
            _ => {}
        }
        if has(&["pod", "pods", "kubectl", "deployment", "imagepullbackoff", "crashloopbackoff"]) {
            Category::Kubernetes
        } else if has(&["docker", "container", "dockerfile", "compose"]) {
            Category::Docker
        } else if has(&["connection", "refused", "timeout", "dns", "unreachable", "tls", "ssl"]) {
            Category::Network
        } else {
            Category::Other
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Category::Docker),
            "kubernetes" | "k8s" => Ok(Category::Kubernetes),
            "database" | "db" => Ok(Category::Database),
            "network" => Ok(Category::Network),
            "other" => Ok(Category::Other),
            other => anyhow::bail!(
                "Unknown category: '{}'. Use docker, kubernetes, database, network, or other.",
                other
            ),
        }
    }
}

/// A trigger keyword with its weight inside a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub weight: f64,
}

impl Keyword {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into().trim().to_lowercase(),
            weight,
        }
    }
}

/// Remediation template rendered into a [`Solution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionTemplate {
    pub title: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
}

/// A stored failure signature plus its remediation template.
///
/// The id is the content hash of the canonical keyword set, so two
/// patterns with the same triggers are the same pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub category: Category,
    pub keywords: Vec<Keyword>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub template: SolutionTemplate,
    pub success_rate: f64,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(
        category: Category,
        keywords: Vec<Keyword>,
        embedding: Vec<f32>,
        template: SolutionTemplate,
        success_rate: f64,
    ) -> Self {
        let keywords = canonical_keywords(keywords);
        let id = content_hash(keywords.iter().map(|k| k.term.as_str()));
        Self {
            id,
            category,
            keywords,
            embedding,
            template,
            success_rate: success_rate.clamp(0.0, 1.0),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Distinct trigger terms with their weights, a repeated term keeping
    /// its largest weight. Rows written before keywords were canonicalized
    /// may still carry duplicates.
    pub fn triggers(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<(&str, f64)> = Vec::with_capacity(self.keywords.len());
        for kw in &self.keywords {
            let weight = kw.weight.max(0.0);
            match out.iter().position(|(term, _)| *term == kw.term) {
                Some(i) => out[i].1 = out[i].1.max(weight),
                None => out.push((kw.term.as_str(), weight)),
            }
        }
        out
    }

    /// Sum of distinct trigger weights; the keyword-score denominator.
    pub fn total_weight(&self) -> f64 {
        self.triggers().iter().map(|(_, w)| w).sum()
    }

    /// Text used to compute the reference embedding for a seeded pattern.
    pub fn canonical_text(&self) -> String {
        let terms: Vec<&str> = self.keywords.iter().map(|k| k.term.as_str()).collect();
        format!("{} {}", self.template.title, terms.join(" "))
    }
}

/// Normalize and merge duplicate terms, keeping the first position and the
/// largest weight. Empty terms are dropped.
fn canonical_keywords(keywords: Vec<Keyword>) -> Vec<Keyword> {
    let mut out: Vec<Keyword> = Vec::with_capacity(keywords.len());
    for kw in keywords {
        let kw = Keyword::new(kw.term, kw.weight);
        if kw.term.is_empty() {
            continue;
        }
        match out.iter().position(|k| k.term == kw.term) {
            Some(i) => out[i].weight = out[i].weight.max(kw.weight),
            None => out.push(kw),
        }
    }
    out
}

/// One incoming log excerpt, live for the duration of a single analysis.
#[derive(Debug, Clone)]
pub struct LogSample {
    pub text: String,
    pub source: SourceTag,
    /// `None` when the embedding service was unavailable.
    pub embedding: Option<Vec<f32>>,
    pub keywords: BTreeSet<String>,
    lowered: String,
}

impl LogSample {
    pub fn new(text: impl Into<String>, source: SourceTag) -> Self {
        let text = text.into();
        let lowered = text.to_lowercase();
        let keywords = extract_keywords(&text);
        Self {
            text,
            source,
            embedding: None,
            keywords,
            lowered,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Case-insensitive substring containment of a trigger keyword.
    pub fn contains(&self, term: &str) -> bool {
        let term = term.trim();
        !term.is_empty() && self.lowered.contains(&term.to_lowercase())
    }
}

/// Per-component scores behind a composite confidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComponentScores {
    pub keyword_score: f64,
    pub vector_score: f64,
    pub prior_success: f64,
}

/// Outcome of scoring one log against the pattern library.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// The accepted pattern, present only when the best candidate cleared
    /// the confidence floor.
    #[serde(skip)]
    pub pattern: Option<Pattern>,
    /// Id of the best-scoring pattern, even when it was rejected.
    pub best_pattern_id: Option<String>,
    pub confidence: f64,
    pub scores: ComponentScores,
    pub confidence_floor: f64,
    pub patterns_considered: usize,
    /// How many patterns shared the winning confidence before tie-breaking.
    pub tied_candidates: usize,
}

impl MatchResult {
    pub fn none(confidence_floor: f64) -> Self {
        Self {
            pattern: None,
            best_pattern_id: None,
            confidence: 0.0,
            scores: ComponentScores::default(),
            confidence_floor,
            patterns_considered: 0,
            tied_candidates: 0,
        }
    }

    pub fn accepted(&self) -> bool {
        self.pattern.is_some()
    }
}

/// Where a returned [`Solution`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    PatternDerived,
    ModelSynthesized,
    GenericFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::PatternDerived => "pattern-derived",
            Provenance::ModelSynthesized => "model-synthesized",
            Provenance::GenericFallback => "generic-fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single consolidated remediation returned for an analysis.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub title: String,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub estimated_time: String,
    pub success_rate: f64,
    pub confidence: f64,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Feedback target: a stored pattern id, or `candidate:<signature>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

/// A model-synthesized solution that may later be promoted to a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePattern {
    /// Content hash of the candidate keyword set; becomes the pattern id.
    pub signature: String,
    pub source: SourceTag,
    pub category: Category,
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub template: SolutionTemplate,
    pub prior: f64,
}

impl CandidatePattern {
    pub fn into_pattern(self) -> Pattern {
        let mut pattern = Pattern::new(
            self.category,
            self.keywords,
            self.embedding,
            self.template,
            self.prior,
        );
        pattern.id = self.signature;
        pattern
    }
}

pub const CANDIDATE_PREFIX: &str = "candidate:";

/// What a feedback event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackTarget {
    Pattern(String),
    Candidate(String),
}

impl FeedbackTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.strip_prefix(CANDIDATE_PREFIX) {
            Some(sig) if !sig.trim().is_empty() => {
                Some(FeedbackTarget::Candidate(sig.trim().to_string()))
            }
            Some(_) => None,
            None if raw.is_empty() => None,
            None => Some(FeedbackTarget::Pattern(raw.to_string())),
        }
    }
}

impl fmt::Display for FeedbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackTarget::Pattern(id) => f.write_str(id),
            FeedbackTarget::Candidate(sig) => write!(f, "{}{}", CANDIDATE_PREFIX, sig),
        }
    }
}

/// A user rating for a served solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rating {
    Positive,
    Neutral,
    Negative,
    /// Continuous accuracy in `[0, 1]`.
    Accuracy(f64),
}

impl Rating {
    /// Scalar outcome in `[0, 1]`, or `None` for an out-of-range accuracy.
    pub fn outcome(&self) -> Option<f64> {
        match *self {
            Rating::Positive => Some(1.0),
            Rating::Neutral => Some(0.5),
            Rating::Negative => Some(0.0),
            Rating::Accuracy(a) if a.is_finite() && (0.0..=1.0).contains(&a) => Some(a),
            Rating::Accuracy(_) => None,
        }
    }
}

impl From<bool> for Rating {
    fn from(helpful: bool) -> Self {
        if helpful {
            Rating::Positive
        } else {
            Rating::Negative
        }
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "positive" | "excellent" | "good" | "helpful" | "yes" | "true" | "up" => {
                Ok(Rating::Positive)
            }
            "neutral" | "fair" => Ok(Rating::Neutral),
            "negative" | "poor" | "unhelpful" | "no" | "false" | "down" => Ok(Rating::Negative),
            other => other
                .parse::<f64>()
                .map(Rating::Accuracy)
                .map_err(|_| format!("unrecognized rating '{}'", s.trim())),
        }
    }
}

/// One user rating, consumed once by the feedback aggregator.
#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    pub target: FeedbackTarget,
    pub rating: Rating,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(target: FeedbackTarget, rating: Rating) -> Self {
        Self {
            target,
            rating,
            comment: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tag_lenient_parse() {
        assert_eq!("k8s".parse::<SourceTag>().unwrap(), SourceTag::Kubernetes);
        assert_eq!("Docker".parse::<SourceTag>().unwrap(), SourceTag::Docker);
        assert_eq!("syslog".parse::<SourceTag>().unwrap(), SourceTag::Unknown);
    }

    #[test]
    fn test_pattern_id_ignores_keyword_order_and_case() {
        let template = SolutionTemplate {
            title: "t".into(),
            steps: vec!["s".into()],
            snippet: None,
            estimated_time: None,
        };
        let a = Pattern::new(
            Category::Docker,
            vec![Keyword::new("Port", 1.0), Keyword::new("already allocated", 5.0)],
            vec![],
            template.clone(),
            0.8,
        );
        let b = Pattern::new(
            Category::Docker,
            vec![Keyword::new("already allocated", 2.0), Keyword::new("port", 1.0)],
            vec![],
            template,
            0.8,
        );
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_duplicate_keywords_are_merged() {
        let p = Pattern::new(
            Category::Docker,
            vec![
                Keyword::new("Port", 1.0),
                Keyword::new("port", 2.0),
                Keyword::new("already allocated", 2.0),
                Keyword::new("  ", 3.0),
            ],
            vec![],
            SolutionTemplate {
                title: "t".into(),
                steps: vec!["s".into()],
                snippet: None,
                estimated_time: None,
            },
            0.8,
        );
        assert_eq!(
            p.keywords,
            vec![Keyword::new("port", 2.0), Keyword::new("already allocated", 2.0)]
        );
        assert_eq!(p.total_weight(), 4.0);
    }

    #[test]
    fn test_triggers_merge_stored_duplicates() {
        let mut p = Pattern::new(
            Category::Docker,
            vec![Keyword::new("port", 1.0)],
            vec![],
            SolutionTemplate {
                title: "t".into(),
                steps: vec!["s".into()],
                snippet: None,
                estimated_time: None,
            },
            0.8,
        );
        p.keywords = vec![
            Keyword::new("port", 1.0),
            Keyword::new("port", 1.0),
            Keyword::new("already allocated", 2.0),
        ];
        assert_eq!(p.triggers(), vec![("port", 1.0), ("already allocated", 2.0)]);
        assert_eq!(p.total_weight(), 3.0);
    }

    #[test]
    fn test_log_sample_contains_is_case_insensitive() {
        let log = LogSample::new(
            "Bind for 0.0.0.0:80 failed: PORT is already allocated",
            SourceTag::Docker,
        );
        assert!(log.contains("port is already allocated"));
        assert!(log.contains("BIND FOR"));
        assert!(!log.contains(""));
        assert!(!log.contains("imagepullbackoff"));
    }

    #[test]
    fn test_rating_parse() {
        assert_eq!("excellent".parse::<Rating>().unwrap(), Rating::Positive);
        assert_eq!("fair".parse::<Rating>().unwrap(), Rating::Neutral);
        assert_eq!("poor".parse::<Rating>().unwrap(), Rating::Negative);
        assert_eq!("0.25".parse::<Rating>().unwrap(), Rating::Accuracy(0.25));
        assert!("meh".parse::<Rating>().is_err());
    }

    #[test]
    fn test_rating_outcome_rejects_out_of_range() {
        assert_eq!(Rating::Accuracy(1.5).outcome(), None);
        assert_eq!(Rating::Accuracy(f64::NAN).outcome(), None);
        assert_eq!(Rating::Neutral.outcome(), Some(0.5));
    }

    #[test]
    fn test_feedback_target_parse() {
        assert_eq!(
            FeedbackTarget::parse("candidate:abc"),
            Some(FeedbackTarget::Candidate("abc".into()))
        );
        assert_eq!(
            FeedbackTarget::parse("1f2e"),
            Some(FeedbackTarget::Pattern("1f2e".into()))
        );
        assert_eq!(FeedbackTarget::parse("candidate:"), None);
        assert_eq!(FeedbackTarget::parse("  "), None);
    }

    #[test]
    fn test_category_inference() {
        assert_eq!(
            Category::infer(SourceTag::Application, ["postgres", "timeout"]),
            Category::Database
        );
        assert_eq!(Category::infer(SourceTag::Docker, ["anything"]), Category::Docker);
        assert_eq!(
            Category::infer(SourceTag::Ci, ["connection", "refused"]),
            Category::Network
        );
        assert_eq!(Category::infer(SourceTag::Unknown, ["weird"]), Category::Other);
    }
}
