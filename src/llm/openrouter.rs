//! OpenRouter transport.
//!
//! Chat and vision go through `edgequake_llm`'s [`OpenRouterProvider`],
//! cloned per call with the model the registry picked. Embeddings are a
//! direct `POST /embeddings`: the provider crate has no OpenRouter
//! embedding path, and its OpenAI-compatible one retries 5xx responses
//! with long backoff, where a failed embedding must degrade at once.

use super::{ChatRequest, Completion, ModelClient, Usage};
use crate::error::LlmError;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, OpenRouterProvider};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";

/// Request timeout the provider's own HTTP client enforces.
const PROVIDER_TIMEOUT_SECS: u64 = 300;

/// Client for the OpenRouter chat and embedding endpoints.
#[derive(Clone)]
pub struct OpenRouterClient {
    provider: Option<OpenRouterProvider>,
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
    referer: String,
    title: String,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            provider: None,
            http_client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: "https://github.com/evidence-ingest".to_string(),
            title: "evidence-ingest".to_string(),
        }
        .rebuild()
    }

    /// Reads `OPENROUTER_API_KEY` and `OPENROUTER_BASE_URL`.
    ///
    /// A missing key is not an error here; every call then fails with
    /// [`LlmError::Configuration`], which the pipeline treats as a degraded
    /// stage rather than a crash.
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            api_key,
            ..Self::new(String::new())
        }
        .with_base_url(base_url)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self.rebuild()
    }

    /// Attribution headers OpenRouter shows on its dashboard.
    pub fn with_app(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self.rebuild()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rebuild(mut self) -> Self {
        self.provider = self.api_key.as_ref().map(|key| {
            OpenRouterProvider::new(key.clone())
                .with_base_url(self.base_url.clone())
                .with_site_url(self.referer.clone())
                .with_site_name(self.title.clone())
        });
        self
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LlmError::Configuration(format!("{API_KEY_ENV} not set")))
    }

    /// Provider bound to `model`. Clones share the HTTP client.
    fn provider_for(&self, model: &str) -> Result<OpenRouterProvider, LlmError> {
        self.provider
            .clone()
            .map(|p| p.with_model(model))
            .ok_or_else(|| LlmError::Configuration(format!("{API_KEY_ENV} not set")))
    }
}

/// Map the provider crate's error onto ours.
///
/// The provider formats unparsed HTTP failures as `"<status> <reason>: <body>"`;
/// the status is recovered from that prefix when present.
fn from_provider_error(err: edgequake_llm::LlmError) -> LlmError {
    use edgequake_llm::LlmError as P;
    match err {
        P::AuthError(body) => LlmError::Upstream { status: 401, body },
        P::RateLimited(body) => LlmError::Upstream { status: 429, body },
        P::InvalidRequest(body) => LlmError::Upstream { status: 400, body },
        P::ModelNotFound(body) => LlmError::Upstream { status: 404, body },
        P::TokenLimitExceeded { max, got } => LlmError::Upstream {
            status: 400,
            body: format!("token limit exceeded: max {max}, got {got}"),
        },
        P::NetworkError(msg) => LlmError::Network(msg),
        P::Timeout => LlmError::Timeout {
            secs: PROVIDER_TIMEOUT_SECS,
        },
        P::SerializationError(e) => LlmError::MalformedResponse {
            reason: e.to_string(),
            raw: String::new(),
        },
        P::ConfigError(msg) | P::NotSupported(msg) => LlmError::Configuration(msg),
        P::ApiError(msg) => from_api_message(msg),
        other => LlmError::Network(other.to_string()),
    }
}

fn from_api_message(msg: String) -> LlmError {
    if msg.starts_with("Failed to parse response") {
        return LlmError::MalformedResponse {
            reason: msg.clone(),
            raw: msg,
        };
    }
    if let Some(status) = leading_status(&msg) {
        let body = msg
            .split_once(": ")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| msg.clone());
        return LlmError::Upstream { status, body };
    }
    let status = if msg.starts_with("Insufficient credits") {
        402
    } else if msg.starts_with("Model not found") {
        404
    } else if msg.starts_with("Regional restriction")
        || msg.starts_with("Content policy")
        || msg.starts_with("Access forbidden")
    {
        403
    } else {
        // "Max retries exceeded" and anything else with no status to report.
        return LlmError::Network(msg);
    };
    LlmError::Upstream { status, body: msg }
}

/// `"503 Service Unavailable: ..."` → `Some(503)`.
fn leading_status(msg: &str) -> Option<u16> {
    let code = msg.get(..3)?;
    let rest = &msg[3..];
    if !code.bytes().all(|b| b.is_ascii_digit()) || !rest.starts_with(' ') {
        return None;
    }
    code.parse().ok().filter(|s| (100..600).contains(s))
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn chat(&self, request: &ChatRequest) -> Result<Completion, LlmError> {
        let provider = self.provider_for(&request.model)?;
        let options = request.options();
        let response = provider
            .chat(&request.messages, Some(&options))
            .await
            .map_err(|e| {
                warn!(model = %request.model, error = %e, "OpenRouter chat failed");
                from_provider_error(e)
            })?;

        debug!(
            model = %response.model,
            finish_reason = ?response.finish_reason,
            "OpenRouter chat completion"
        );
        Ok(Completion {
            text: response.content,
            usage: Usage {
                prompt_tokens: response.prompt_tokens as u64,
                completion_tokens: response.completion_tokens as u64,
            },
        })
    }

    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, LlmError> {
        let api_key = self.api_key()?;
        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&json!({"model": model, "input": input}))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Embedding request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), error = %raw, "Embedding API error");
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: EmbeddingResponse =
            serde_json::from_str(&raw).map_err(|e| LlmError::MalformedResponse {
                reason: e.to_string(),
                raw: raw.clone(),
            })?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::MalformedResponse {
                reason: "response has no embedding".into(),
                raw,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::LlmError as P;

    #[test]
    fn builder_trims_trailing_slash() {
        let c = OpenRouterClient::new("sk-test").with_base_url("http://localhost:9/v1/");
        assert_eq!(c.base_url(), "http://localhost:9/v1");
        assert!(c.provider.is_some());
    }

    #[test]
    fn status_prefix_becomes_upstream() {
        let err = from_provider_error(P::ApiError(
            "503 Service Unavailable: provider overloaded".into(),
        ));
        assert_eq!(
            err,
            LlmError::Upstream {
                status: 503,
                body: "provider overloaded".into()
            }
        );
    }

    #[test]
    fn provider_categories_keep_their_status() {
        assert_eq!(
            from_provider_error(P::AuthError("bad key".into())).status(),
            Some(401)
        );
        assert_eq!(
            from_provider_error(P::RateLimited("slow".into())).status(),
            Some(429)
        );
        assert_eq!(
            from_provider_error(P::ApiError("Insufficient credits: top up".into())).status(),
            Some(402)
        );
        assert!(matches!(
            from_provider_error(P::Timeout),
            LlmError::Timeout { secs: 300 }
        ));
    }

    #[test]
    fn unparseable_body_is_malformed() {
        let err = from_provider_error(P::ApiError(
            "Failed to parse response: expected value at line 1 column 1".into(),
        ));
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }

    #[test]
    fn leading_status_needs_three_digits_and_a_space() {
        assert_eq!(leading_status("404 Not Found: gone"), Some(404));
        assert_eq!(leading_status("2024 accounts"), None);
        assert_eq!(leading_status("Max retries exceeded"), None);
        assert_eq!(leading_status("42"), None);
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let c = OpenRouterClient {
            api_key: None,
            ..OpenRouterClient::new("")
        }
        .rebuild();
        let err = c.embed("m", "x").await.unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
        let err = c.chat(&ChatRequest::new("m")).await.unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }
}
