//! Solution synthesizer: turns a [`MatchResult`] into exactly one
//! [`Solution`].
//!
//! Three tiers, tried in order:
//!
//! | Tier | When | Provenance |
//! |------|------|------------|
//! | Pattern template | the matcher accepted a pattern | `pattern-derived` |
//! | Language model | no pattern cleared the floor | `model-synthesized` |
//! | Generic template | the model failed, timed out, or is disabled | `generic-fallback` |
//!
//! The model backend is a [`LanguageModel`] strategy injected at
//! construction. Its failures are logged and swallowed here; nothing
//! below the generic tier can fail.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::keywords::{content_hash, top_keywords};
use crate::models::{
    CandidatePattern, Category, Keyword, LogSample, MatchResult, Pattern, Provenance, Solution,
    SolutionTemplate, SourceTag, CANDIDATE_PREFIX,
};

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CANDIDATE_PRIOR: f64 = 0.70;
pub const DEFAULT_CANDIDATE_KEYWORDS: usize = 8;

/// Success rate shown on generic fallback solutions.
pub const GENERIC_SUCCESS_RATE: f64 = 0.70;

const DEFAULT_ESTIMATE: &str = "15-30 minutes";
const DEFAULT_PORT: &str = "80";

/// Input to a language-model call.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub log_text: String,
    pub source: SourceTag,
}

/// A single structured solution returned by a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSolution {
    pub title: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
}

impl ModelSolution {
    /// Trim fields and drop blank steps; a blank title or an empty step
    /// list makes the response unusable.
    pub fn validated(mut self) -> Result<Self, ModelError> {
        self.title = self.title.trim().to_string();
        self.steps = self
            .steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.snippet = self.snippet.filter(|s| !s.trim().is_empty());
        self.estimated_time = self.estimated_time.filter(|s| !s.trim().is_empty());

        if self.title.is_empty() {
            return Err(ModelError::Malformed("empty title".into()));
        }
        if self.steps.is_empty() {
            return Err(ModelError::Malformed("no remediation steps".into()));
        }
        Ok(self)
    }
}

/// Errors a language-model backend can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("language model is disabled")]
    Disabled,
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Timeout(d) => EngineError::ModelTimeout(d),
            other => EngineError::ModelError(other.to_string()),
        }
    }
}

/// Strategy for free-form log analysis by an external language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend identifier for logs (e.g. `"openai:llama-3.1-8b-instant"`).
    fn name(&self) -> &str;

    /// Request one structured solution for the log.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelSolution, ModelError>;
}

/// Model strategy used when no backend is configured.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _request: &ModelRequest) -> Result<ModelSolution, ModelError> {
        Err(ModelError::Disabled)
    }
}

/// Synthesizer tuning, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct SynthesizerParams {
    pub timeout: Duration,
    /// Initial success rate of a candidate pattern.
    pub candidate_prior: f64,
    /// How many top log keywords form a candidate's trigger set.
    pub candidate_keywords: usize,
}

impl Default for SynthesizerParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_MODEL_TIMEOUT,
            candidate_prior: DEFAULT_CANDIDATE_PRIOR,
            candidate_keywords: DEFAULT_CANDIDATE_KEYWORDS,
        }
    }
}

/// The synthesized solution plus anything the caller may want to persist
/// or report.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub solution: Solution,
    /// Proposed new pattern, only for model-synthesized solutions.
    pub candidate: Option<CandidatePattern>,
    /// The swallowed model failure behind a generic fallback.
    pub failure: Option<EngineError>,
}

pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    params: SynthesizerParams,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, params: SynthesizerParams) -> Self {
        Self { model, params }
    }

    pub fn params(&self) -> &SynthesizerParams {
        &self.params
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn synthesize(&self, matched: &MatchResult, log: &LogSample) -> Synthesis {
        if let Some(pattern) = &matched.pattern {
            tracing::info!(
                pattern_id = %pattern.id,
                confidence = matched.confidence,
                "serving pattern-derived solution"
            );
            return Synthesis {
                solution: render_pattern(pattern, log, matched.confidence),
                candidate: None,
                failure: None,
            };
        }

        let request = ModelRequest {
            log_text: log.text.clone(),
            source: log.source,
        };
        let completed =
            tokio::time::timeout(self.params.timeout, self.model.complete(&request)).await;
        let result = match completed {
            Ok(inner) => inner.and_then(ModelSolution::validated),
            Err(_) => Err(ModelError::Timeout(self.params.timeout)),
        };

        match result {
            Ok(answer) => {
                let candidate = build_candidate(log, &answer, &self.params);
                tracing::info!(
                    model = self.model.name(),
                    candidate = candidate.as_ref().map(|c| c.signature.as_str()),
                    "serving model-synthesized solution"
                );
                let solution = Solution {
                    title: answer.title,
                    steps: answer.steps,
                    snippet: answer.snippet,
                    estimated_time: answer
                        .estimated_time
                        .unwrap_or_else(|| DEFAULT_ESTIMATE.to_string()),
                    success_rate: self.params.candidate_prior,
                    confidence: matched.confidence,
                    provenance: Provenance::ModelSynthesized,
                    category: candidate.as_ref().map(|c| c.category),
                    pattern_id: candidate
                        .as_ref()
                        .map(|c| format!("{}{}", CANDIDATE_PREFIX, c.signature)),
                };
                Synthesis {
                    solution,
                    candidate,
                    failure: None,
                }
            }
            Err(err) => {
                match &err {
                    ModelError::Disabled => tracing::debug!(
                        source = %log.source,
                        "language model disabled, using generic fallback"
                    ),
                    other => tracing::warn!(
                        model = self.model.name(),
                        source = %log.source,
                        error = %other,
                        "language model failed, using generic fallback"
                    ),
                }
                let mut solution = generic_fallback(log.source);
                solution.confidence = matched.confidence;
                Synthesis {
                    solution,
                    candidate: None,
                    failure: Some(err.into()),
                }
            }
        }
    }
}

fn port_regexes() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"(?i)\bport\b\D{0,20}?(\d{2,5})\b").expect("valid port regex"),
            Regex::new(r"(?:0\.0\.0\.0|127\.0\.0\.1|localhost|\[::\]|::):(\d{2,5})\b")
                .expect("valid bind regex"),
        ]
    })
}

/// First port number mentioned in the log, if any.
pub fn extract_port(text: &str) -> Option<String> {
    port_regexes()
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
}

fn fill_placeholders(s: &str, port: &str) -> String {
    s.replace("{port}", port)
}

/// Render a stored pattern's template for this log.
///
/// `{port}` placeholders are filled from the log (default `80`).
pub fn render_pattern(pattern: &Pattern, log: &LogSample, confidence: f64) -> Solution {
    let port = extract_port(&log.text).unwrap_or_else(|| DEFAULT_PORT.to_string());
    let t = &pattern.template;
    let mut steps: Vec<String> = t
        .steps
        .iter()
        .map(|s| fill_placeholders(s, &port))
        .filter(|s| !s.trim().is_empty())
        .collect();
    if steps.is_empty() {
        steps.push("Review the matched log lines and apply the documented fix".to_string());
    }
    Solution {
        title: fill_placeholders(&t.title, &port),
        steps,
        snippet: t.snippet.as_deref().map(|s| fill_placeholders(s, &port)),
        estimated_time: t
            .estimated_time
            .clone()
            .unwrap_or_else(|| DEFAULT_ESTIMATE.to_string()),
        success_rate: pattern.success_rate,
        confidence,
        provenance: Provenance::PatternDerived,
        category: Some(pattern.category),
        pattern_id: Some(pattern.id.clone()),
    }
}

/// Propose a model answer as a new pattern keyed by the log's top keywords.
///
/// Returns `None` when the log yields no keywords.
pub fn build_candidate(
    log: &LogSample,
    answer: &ModelSolution,
    params: &SynthesizerParams,
) -> Option<CandidatePattern> {
    let terms = top_keywords(&log.text, params.candidate_keywords);
    if terms.is_empty() {
        return None;
    }
    let signature = content_hash(terms.iter().map(String::as_str));
    let category = Category::infer(log.source, terms.iter().map(String::as_str));
    Some(CandidatePattern {
        signature,
        source: log.source,
        category,
        keywords: terms.into_iter().map(|t| Keyword::new(t, 1.0)).collect(),
        embedding: log.embedding.clone().unwrap_or_default(),
        template: SolutionTemplate {
            title: answer.title.clone(),
            steps: answer.steps.clone(),
            snippet: answer.snippet.clone(),
            estimated_time: answer.estimated_time.clone(),
        },
        prior: params.candidate_prior.clamp(0.0, 1.0),
    })
}

fn fallback_template(
    source: SourceTag,
) -> (Category, &'static str, &'static [&'static str], &'static str, &'static str) {
    match source {
        SourceTag::Docker => (
            Category::Docker,
            "Docker Container Troubleshooting",
            &[
                "List all containers and note any that exited or are restarting",
                "Inspect the failing container's logs for the first error",
                "Check published ports and volumes for conflicts",
                "Rebuild the image without cache and recreate the container",
            ],
            "docker ps -a\ndocker logs --tail 100 <container>\ndocker inspect <container> --format '{{json .HostConfig.PortBindings}}'\ndocker compose build --no-cache && docker compose up -d --force-recreate",
            "10-20 minutes",
        ),
        SourceTag::Kubernetes => (
            Category::Kubernetes,
            "Kubernetes Workload Troubleshooting",
            &[
                "List pods that are not Running or Completed",
                "Describe the failing pod and read its recent events",
                "Check container logs, including the previous restart",
                "Verify resource requests, limits, and node capacity",
                "Roll out a restart once the root cause is fixed",
            ],
            "kubectl get pods -A | grep -v -E 'Running|Completed'\nkubectl describe pod <pod> -n <ns>\nkubectl logs <pod> -n <ns> --previous\nkubectl top nodes\nkubectl rollout restart deployment/<app> -n <ns>",
            "15-30 minutes",
        ),
        SourceTag::Ci => (
            Category::Other,
            "CI Pipeline Failure Triage",
            &[
                "Find the first failing step in the pipeline output",
                "Re-run the failing command locally with the same inputs",
                "Compare dependency and tool versions with the last green build",
                "Clear pipeline caches and retry the job",
            ],
            "git log --oneline -5\ngit diff HEAD~1 --stat",
            "15-30 minutes",
        ),
        SourceTag::Yaml => (
            Category::Other,
            "YAML Configuration Validation",
            &[
                "Run the file through a YAML linter to locate the syntax error",
                "Check indentation uses spaces consistently",
                "Quote values containing colons, braces, or leading special characters",
                "Validate the manifest against its schema before applying",
            ],
            "yamllint <file>.yaml\nkubectl apply --dry-run=client -f <file>.yaml",
            "5-15 minutes",
        ),
        SourceTag::Application => (
            Category::Other,
            "Application Error Investigation",
            &[
                "Locate the first exception and its stack trace in the log",
                "Check configuration and environment variables the failing code reads",
                "Verify downstream dependencies (database, cache, APIs) are reachable",
                "Roll back the most recent change if the error started after a deploy",
            ],
            "env | sort\ncurl -fsS http://localhost:<port>/health",
            "20-30 minutes",
        ),
        SourceTag::Unknown => (
            Category::Other,
            "General System Troubleshooting Guide",
            &[
                "Check system logs for error patterns and timestamps",
                "Verify all services are running and responding",
                "Test network connectivity and resource availability",
                "Review recent configuration changes",
                "Restart affected services and monitor results",
            ],
            "systemctl --failed\ndf -h\nfree -h\njournalctl --since \"1 hour ago\" --priority=err | head -20",
            "20-30 minutes",
        ),
    }
}

/// Deterministic one-per-source remediation used when every other tier
/// failed.
pub fn generic_fallback(source: SourceTag) -> Solution {
    let (category, title, steps, snippet, estimate) = fallback_template(source);
    Solution {
        title: title.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        snippet: Some(snippet.to_string()),
        estimated_time: estimate.to_string(),
        success_rate: GENERIC_SUCCESS_RATE,
        confidence: 0.0,
        provenance: Provenance::GenericFallback,
        category: Some(category),
        pattern_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct FixedModel(ModelSolution);

    #[async_trait]
    impl LanguageModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _request: &ModelRequest) -> Result<ModelSolution, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _request: &ModelRequest) -> Result<ModelSolution, ModelError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ModelError::Provider("unreachable".into()))
        }
    }

    fn answer() -> ModelSolution {
        ModelSolution {
            title: "Restart the Redis sidecar".into(),
            steps: vec!["Check redis health".into(), "  ".into(), "Restart the pod".into()],
            snippet: Some("kubectl rollout restart deploy/cache".into()),
            estimated_time: None,
        }
    }

    fn docker_pattern() -> Pattern {
        Pattern::new(
            Category::Docker,
            vec![Keyword::new("port", 1.0), Keyword::new("already allocated", 5.0)],
            vec![],
            SolutionTemplate {
                title: "Docker Port {port} Conflict Resolution".into(),
                steps: vec!["Find the process using port {port}".into(), "Stop it".into()],
                snippet: Some("lsof -i :{port}".into()),
                estimated_time: Some("5-10 minutes".into()),
            },
            0.92,
        )
    }

    #[test]
    fn test_extract_port() {
        assert_eq!(extract_port("port 5432 is busy").as_deref(), Some("5432"));
        assert_eq!(
            extract_port("Bind for 0.0.0.0:8080 failed: port is already allocated").as_deref(),
            Some("8080")
        );
        assert_eq!(extract_port("nothing here"), None);
    }

    #[test]
    fn test_render_pattern_fills_port() {
        let log = LogSample::new(
            "Bind for 0.0.0.0:8080 failed: port is already allocated",
            SourceTag::Docker,
        );
        let s = render_pattern(&docker_pattern(), &log, 0.8);
        assert_eq!(s.title, "Docker Port 8080 Conflict Resolution");
        assert_eq!(s.steps[0], "Find the process using port 8080");
        assert_eq!(s.snippet.as_deref(), Some("lsof -i :8080"));
        assert_eq!(s.provenance, Provenance::PatternDerived);
        assert_eq!(s.success_rate, 0.92);
        assert_eq!(s.category, Some(Category::Docker));
    }

    #[tokio::test]
    async fn test_pattern_path_skips_model() {
        let synth = Synthesizer::new(Arc::new(SlowModel), SynthesizerParams::default());
        let log = LogSample::new("port is already allocated", SourceTag::Docker);
        let mut m = MatchResult::none(0.55);
        m.pattern = Some(docker_pattern());
        m.confidence = 0.9;

        let started = Instant::now();
        let out = synth.synthesize(&m, &log).await;
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(out.solution.provenance, Provenance::PatternDerived);
        assert!(out.candidate.is_none());
    }

    #[tokio::test]
    async fn test_model_path_proposes_candidate() {
        let synth = Synthesizer::new(Arc::new(FixedModel(answer())), SynthesizerParams::default());
        let log = LogSample::new(
            "redis timeout while connecting to redis cache",
            SourceTag::Kubernetes,
        )
        .with_embedding(vec![0.5, 0.5]);
        let out = synth.synthesize(&MatchResult::none(0.55), &log).await;

        assert_eq!(out.solution.provenance, Provenance::ModelSynthesized);
        assert_eq!(out.solution.steps.len(), 2);
        assert_eq!(out.solution.success_rate, DEFAULT_CANDIDATE_PRIOR);
        let candidate = out.candidate.expect("candidate proposed");
        assert_eq!(candidate.prior, 0.70);
        assert_eq!(candidate.embedding, vec![0.5, 0.5]);
        assert_eq!(
            out.solution.pattern_id,
            Some(format!("candidate:{}", candidate.signature))
        );
        assert_eq!(candidate.category, Category::Database);
    }

    #[tokio::test]
    async fn test_malformed_model_answer_falls_back() {
        let bad = ModelSolution {
            title: " ".into(),
            steps: vec![],
            snippet: None,
            estimated_time: None,
        };
        let synth = Synthesizer::new(Arc::new(FixedModel(bad)), SynthesizerParams::default());
        let log = LogSample::new("weird failure", SourceTag::Yaml);
        let out = synth.synthesize(&MatchResult::none(0.55), &log).await;
        assert_eq!(out.solution.provenance, Provenance::GenericFallback);
        assert!(matches!(out.failure, Some(EngineError::ModelError(_))));
    }

    #[tokio::test]
    async fn test_model_timeout_falls_back_within_deadline() {
        let params = SynthesizerParams {
            timeout: Duration::from_millis(50),
            ..SynthesizerParams::default()
        };
        let synth = Synthesizer::new(Arc::new(SlowModel), params);
        let log = LogSample::new("unmatched gibberish", SourceTag::Ci);

        let started = Instant::now();
        let out = synth.synthesize(&MatchResult::none(0.55), &log).await;
        assert!(started.elapsed() < Duration::from_millis(50) + Duration::from_secs(1));
        assert_eq!(out.solution.provenance, Provenance::GenericFallback);
        assert!(matches!(out.failure, Some(EngineError::ModelTimeout(_))));
    }

    #[test]
    fn test_every_source_has_a_usable_fallback() {
        for source in SourceTag::ALL {
            let s = generic_fallback(source);
            assert!(!s.title.is_empty());
            assert!(!s.steps.is_empty());
            assert_eq!(s.provenance, Provenance::GenericFallback);
            assert!(s.pattern_id.is_none());
        }
    }
}
