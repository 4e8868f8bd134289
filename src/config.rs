//! Configuration parsing and validation.
//!
//! logfix is configured via a TOML file (default: `config/logfix.toml`).
//! Only `[db]` is required; every other section falls back to defaults
//! that reproduce the documented scoring behavior.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/logfix.sqlite"
//!
//! [matcher]
//! confidence_floor = 0.55
//!
//! [embedding]
//! provider = "hashing"
//! dims = 384
//!
//! [model]
//! provider = "openai"
//! model = "llama-3.1-8b-instant"
//! url = "https://api.groq.com/openai/v1"
//! api_key_env = "GROQ_API_KEY"
//! timeout_secs = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logfix_core::feedback::{FeedbackParams, DEFAULT_ALPHA, DEFAULT_PROMOTION_THRESHOLD};
use logfix_core::matcher::{
    MatchWeights, MatcherParams, DEFAULT_CONFIDENCE_FLOOR, DEFAULT_KEYWORD_WEIGHT,
    DEFAULT_SUCCESS_WEIGHT, DEFAULT_VECTOR_WEIGHT,
};
use logfix_core::synth::{SynthesizerParams, DEFAULT_CANDIDATE_KEYWORDS, DEFAULT_CANDIDATE_PRIOR};
use logfix_core::EngineParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_success_weight")]
    pub success_weight: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            success_weight: DEFAULT_SUCCESS_WEIGHT,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

fn default_vector_weight() -> f64 {
    DEFAULT_VECTOR_WEIGHT
}
fn default_keyword_weight() -> f64 {
    DEFAULT_KEYWORD_WEIGHT
}
fn default_success_weight() -> f64 {
    DEFAULT_SUCCESS_WEIGHT
}
fn default_confidence_floor() -> f64 {
    DEFAULT_CONFIDENCE_FLOOR
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u32,
    #[serde(default = "default_candidate_prior")]
    pub candidate_prior: f64,
    #[serde(default = "default_candidate_keywords")]
    pub candidate_keywords: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            candidate_prior: DEFAULT_CANDIDATE_PRIOR,
            candidate_keywords: DEFAULT_CANDIDATE_KEYWORDS,
        }
    }
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}
fn default_promotion_threshold() -> u32 {
    DEFAULT_PROMOTION_THRESHOLD
}
fn default_candidate_prior() -> f64 {
    DEFAULT_CANDIDATE_PRIOR
}
fn default_candidate_keywords() -> usize {
    DEFAULT_CANDIDATE_KEYWORDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Success rate given to seeded patterns that do not carry their own.
    #[serde(default = "default_pattern_prior")]
    pub pattern_prior: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 5,
            pattern_prior: 0.80,
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    5
}
fn default_pattern_prior() -> f64 {
    0.80
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for embedding a log during `analyze`, covering retries.
    #[serde(default = "default_analyze_timeout_secs")]
    pub analyze_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: None,
            dims: 384,
            url: None,
            timeout_secs: 30,
            max_retries: 2,
            analyze_timeout_secs: default_analyze_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_analyze_timeout_secs() -> u64 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    /// Base URL. Defaults per provider: the Groq OpenAI-compatible API for
    /// `openai`, `http://localhost:11434` for `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_model_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model_provider() -> String {
    "disabled".to_string()
}
fn default_model_name() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_model_timeout_secs() -> u64 {
    5
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1200
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub strict: bool,
}

impl Config {
    /// Engine tuning assembled from the `[matcher]`, `[feedback]`,
    /// `[embedding]`, `[model]` and `[engine]` sections.
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            matcher: MatcherParams {
                weights: MatchWeights {
                    vector: self.matcher.vector_weight,
                    keyword: self.matcher.keyword_weight,
                    success: self.matcher.success_weight,
                },
                confidence_floor: self.matcher.confidence_floor,
            },
            synth: SynthesizerParams {
                timeout: self.model.timeout(),
                candidate_prior: self.feedback.candidate_prior,
                candidate_keywords: self.feedback.candidate_keywords,
            },
            feedback: FeedbackParams {
                alpha: self.feedback.alpha,
                promotion_threshold: self.feedback.promotion_threshold,
            },
            embed_timeout: self.embedding.analyze_timeout(),
            strict: self.engine.strict,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.store.cache_ttl_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let m = &config.matcher;
    for (name, w) in [
        ("matcher.vector_weight", m.vector_weight),
        ("matcher.keyword_weight", m.keyword_weight),
        ("matcher.success_weight", m.success_weight),
        ("matcher.confidence_floor", m.confidence_floor),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    let sum = m.vector_weight + m.keyword_weight + m.success_weight;
    if (sum - 1.0).abs() > 1e-6 {
        anyhow::bail!("matcher weights must sum to 1.0 (got {})", sum);
    }

    let f = &config.feedback;
    if !(f.alpha > 0.0 && f.alpha <= 1.0) {
        anyhow::bail!("feedback.alpha must be in (0.0, 1.0]");
    }
    if f.promotion_threshold < 1 {
        anyhow::bail!("feedback.promotion_threshold must be >= 1");
    }
    if !(0.0..=1.0).contains(&f.candidate_prior) {
        anyhow::bail!("feedback.candidate_prior must be in [0.0, 1.0]");
    }
    if f.candidate_keywords == 0 {
        anyhow::bail!("feedback.candidate_keywords must be > 0");
    }

    if !(0.0..=1.0).contains(&config.store.pattern_prior) {
        anyhow::bail!("store.pattern_prior must be in [0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hashing" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashing, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    if !(1..=60).contains(&config.embedding.analyze_timeout_secs) {
        anyhow::bail!("embedding.analyze_timeout_secs must be in 1..=60");
    }

    match config.model.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if !(1..=60).contains(&config.model.timeout_secs) {
        anyhow::bail!("model.timeout_secs must be in 1..=60");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(cfg.matcher.confidence_floor, 0.55);
        assert_eq!(cfg.feedback.promotion_threshold, 3);
        assert_eq!(cfg.embedding.provider, "hashing");
        assert_eq!(cfg.model.provider, "disabled");
        assert_eq!(cfg.model.timeout_secs, 5);
        assert!(!cfg.engine.strict);

        let params = cfg.engine_params();
        assert_eq!(params.matcher.weights.vector, 0.40);
        assert_eq!(params.synth.candidate_prior, 0.70);
        assert_eq!(params.feedback.alpha, 0.05);
        assert_eq!(params.embed_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_embedding_deadline_bounds() {
        let cfg = parse("[db]\npath = \"x\"\n[embedding]\nanalyze_timeout_secs = 2\n").unwrap();
        assert_eq!(cfg.engine_params().embed_timeout, Duration::from_secs(2));
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nanalyze_timeout_secs = 0\n").is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = parse("[db]\npath = \"x\"\n[matcher]\nvector_weight = 0.9\n").unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"bert\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[model]\nprovider = \"gemini\"\n").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_model_timeout_bounds() {
        assert!(parse("[db]\npath = \"x\"\n[model]\ntimeout_secs = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[model]\ntimeout_secs = 120\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[model]\ntimeout_secs = 3\n").is_ok());
    }

    #[test]
    fn test_alpha_bounds() {
        assert!(parse("[db]\npath = \"x\"\n[feedback]\nalpha = 0.0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[feedback]\nalpha = 1.0\n").is_ok());
    }

    #[test]
    fn test_model_url_is_optional() {
        let cfg = parse("[db]\npath = \"x\"\n[model]\nprovider = \"ollama\"\n").unwrap();
        assert_eq!(cfg.model.url, None);
        let cfg = parse("[db]\npath = \"x\"\n[model]\nurl = \"http://gpu:8000/v1\"\n").unwrap();
        assert_eq!(cfg.model.url.as_deref(), Some("http://gpu:8000/v1"));
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg = parse(include_str!("../config/logfix.example.toml")).unwrap();
        assert_eq!(cfg.store.cache_ttl_secs, 5);
        assert_eq!(cfg.model.api_key_env, "GROQ_API_KEY");
    }
}
