//! Language-model backends for free-form log analysis.
//!
//! Each backend implements the core [`LanguageModel`] strategy and is
//! selected once at startup from `[model].provider`:
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `disabled` | none; the synthesizer goes straight to the generic fallback |
//! | `openai` | `POST {url}/chat/completions` on any OpenAI-compatible API (Groq, OpenAI, vLLM) |
//! | `ollama` | `POST {url}/api/generate` on a local Ollama server |
//!
//! Backends ask for a single JSON object and translate HTTP and parse
//! failures into [`ModelError`]. Deadlines are enforced by the
//! synthesizer; the client timeout here is only a backstop.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use logfix_core::synth::{DisabledModel, LanguageModel, ModelError, ModelRequest, ModelSolution};

use crate::config::ModelConfig;

const SYSTEM_PROMPT: &str = "You are an expert DevOps engineer specializing in deployment \
troubleshooting. Reply with exactly one JSON object and nothing else.";

const OPENAI_DEFAULT_URL: &str = "https://api.groq.com/openai/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

fn endpoint(config: &ModelConfig, default_url: &str, path: &str) -> String {
    let base = config.url.as_deref().unwrap_or(default_url);
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Build the prompt for one log excerpt.
pub fn build_prompt(request: &ModelRequest) -> String {
    format!(
        "Analyze this {source} log and give the single most likely fix.\n\n\
         ```\n{log}\n```\n\n\
         Respond with JSON of this exact shape:\n\
         {{\"title\": \"short title\", \"steps\": [\"step 1\", \"step 2\"], \
         \"snippet\": \"shell commands or null\", \"estimated_time\": \"5-10 minutes\"}}",
        source = request.source,
        log = request.log_text.trim(),
    )
}

/// Parse a model reply into a [`ModelSolution`].
///
/// Tolerates Markdown code fences and prose around the JSON object.
pub fn parse_solution(text: &str) -> Result<ModelSolution, ModelError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(ModelError::Malformed("no JSON object in reply".into())),
    };
    serde_json::from_str::<ModelSolution>(json)
        .map_err(|e| ModelError::Malformed(e.to_string()))?
        .validated()
}

fn status_error(status: reqwest::StatusCode, body: String) -> ModelError {
    match status.as_u16() {
        429 => ModelError::RateLimited,
        401 | 403 => ModelError::Provider(format!("authentication failed: {}", body)),
        _ => ModelError::Provider(format!("HTTP {}: {}", status, body)),
    }
}

fn transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Provider(format!("request timed out: {}", err))
    } else {
        ModelError::Provider(err.to_string())
    }
}

/// Create the [`LanguageModel`] selected by `[model].provider`.
///
/// A missing API key downgrades to [`DisabledModel`] with a warning, so
/// analyses keep working on patterns and generic fallbacks.
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout() + Duration::from_secs(1))
        .build()?;

    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                Ok(Arc::new(OpenAIChatModel::new(client, config, key)))
            }
            _ => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "API key not set, language model disabled"
                );
                Ok(Arc::new(DisabledModel))
            }
        },
        "ollama" => Ok(Arc::new(OllamaModel::new(client, config))),
        other => anyhow::bail!("Unknown model provider: {}", other),
    }
}

// ============ OpenAI-compatible chat ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAIChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChatModel {
    pub fn new(client: reqwest::Client, config: &ModelConfig, api_key: String) -> Self {
        Self {
            client,
            url: endpoint(config, OPENAI_DEFAULT_URL, "/chat/completions"),
            api_key,
            name: format!("openai:{}", config.model),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelSolution, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(format!("failed to parse response: {}", e)))?;
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Malformed("no choices in response".into()))?;
        parse_solution(&choice.message.content)
    }
}

// ============ Ollama ============

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    model: String,
    name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaModel {
    pub fn new(client: reqwest::Client, config: &ModelConfig) -> Self {
        Self {
            client,
            url: endpoint(config, OLLAMA_DEFAULT_URL, "/api/generate"),
            name: format!("ollama:{}", config.model),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelSolution, ModelError> {
        let body = OllamaRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt: build_prompt(request),
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let reply: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(format!("failed to parse response: {}", e)))?;
        parse_solution(&reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfix_core::models::SourceTag;

    #[test]
    fn test_parse_solution_with_fences() {
        let reply = "Here you go:\n```json\n{\"title\": \"Free port 80\", \"steps\": [\"stop nginx\", \"\"], \"snippet\": null}\n```";
        let s = parse_solution(reply).unwrap();
        assert_eq!(s.title, "Free port 80");
        assert_eq!(s.steps, vec!["stop nginx".to_string()]);
        assert_eq!(s.estimated_time, None);
    }

    #[test]
    fn test_parse_solution_rejects_prose_and_empty_steps() {
        assert!(matches!(
            parse_solution("I think you should restart it."),
            Err(ModelError::Malformed(_))
        ));
        assert!(matches!(
            parse_solution("{\"title\": \"x\", \"steps\": []}"),
            Err(ModelError::Malformed(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_source_and_log() {
        let p = build_prompt(&ModelRequest {
            log_text: "OOMKilled\n".into(),
            source: SourceTag::Kubernetes,
        });
        assert!(p.contains("kubernetes"));
        assert!(p.contains("OOMKilled"));
        assert!(p.contains("\"steps\""));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelError::RateLimited
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            ModelError::Provider(_)
        ));
    }

    #[test]
    fn test_endpoint_defaults_per_provider() {
        let client = reqwest::Client::new();
        let ollama = ModelConfig {
            provider: "ollama".into(),
            ..ModelConfig::default()
        };
        assert_eq!(
            OllamaModel::new(client.clone(), &ollama).url,
            "http://localhost:11434/api/generate"
        );

        let explicit = ModelConfig {
            provider: "ollama".into(),
            url: Some("https://api.groq.com/openai/v1/".into()),
            ..ModelConfig::default()
        };
        assert_eq!(
            OllamaModel::new(client.clone(), &explicit).url,
            "https://api.groq.com/openai/v1/api/generate"
        );

        let openai = OpenAIChatModel::new(client, &ModelConfig::default(), "k".into());
        assert_eq!(openai.url, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn test_missing_key_downgrades_to_disabled() {
        let cfg = ModelConfig {
            provider: "openai".into(),
            api_key_env: "LOGFIX_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ModelConfig::default()
        };
        assert_eq!(create_model(&cfg).unwrap().name(), "disabled");
    }
}
