//! LLM invocation layer.
//!
//! [`ModelClient`] is the transport seam: one chat call and one embedding
//! call against an OpenAI-compatible endpoint. [`LlmInvoker`] sits on top of
//! it and gives the pipeline the three shapes it needs (plain text,
//! structured JSON tolerant of code fences, and vision transcription) without
//! knowing anything about HTTP.
//!
//! Messages and images are `edgequake_llm`'s [`ChatMessage`] and
//! [`ImageData`]. The production transport is [`OpenRouterClient`]; tests
//! inject their own.

pub mod openrouter;
pub mod structured;

pub use edgequake_llm::{ChatMessage, ChatRole, ImageData};
pub use openrouter::OpenRouterClient;
pub use structured::{parse_structured, strip_code_fence};

use crate::error::LlmError;
use async_trait::async_trait;
use edgequake_llm::CompletionOptions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

// ── Request / response types ─────────────────────────────────────────────

/// Chat completion request: the model is chosen per call by the registry.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Whether any message carries an image.
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(ChatMessage::has_images)
    }

    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Text returned by a chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

// ── Transport seam ───────────────────────────────────────────────────────

/// An OpenAI-compatible inference endpoint.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One chat completion.
    async fn chat(&self, request: &ChatRequest) -> Result<Completion, LlmError>;

    /// Embedding vector for `input`.
    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, LlmError>;
}

// ── Invoker ──────────────────────────────────────────────────────────────

/// Pipeline-facing wrapper around a [`ModelClient`].
#[derive(Clone)]
pub struct LlmInvoker {
    client: Arc<dyn ModelClient>,
}

impl std::fmt::Debug for LlmInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmInvoker")
            .field("client", &"<dyn ModelClient>")
            .finish()
    }
}

impl LlmInvoker {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Invoker backed by [`OpenRouterClient::from_env`].
    pub fn from_env() -> Self {
        Self::new(Arc::new(OpenRouterClient::from_env()))
    }

    /// System + user prompt → completion with usage.
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<Completion, LlmError> {
        let request = ChatRequest::new(model)
            .message(ChatMessage::system(system_prompt))
            .message(ChatMessage::user(user_prompt))
            .temperature(temperature)
            .max_tokens(max_tokens);
        self.send(&request).await
    }

    /// System + user prompt → raw text.
    pub async fn invoke(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        self.complete(model, system_prompt, user_prompt, temperature, max_tokens)
            .await
            .map(|c| c.text)
    }

    /// Like [`invoke`](Self::invoke), then parse the answer as `T`, tolerating
    /// a single surrounding code fence.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<(T, Usage), LlmError> {
        let completion = self
            .complete(model, system_prompt, user_prompt, temperature, max_tokens)
            .await?;
        let parsed = parse_structured(&completion.text)?;
        Ok((parsed, completion.usage))
    }

    /// Vision call: transcribe `image`.
    pub async fn transcribe_image(
        &self,
        model: &str,
        system_prompt: &str,
        instruction: &str,
        image: ImageData,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<Completion, LlmError> {
        let request = ChatRequest::new(model)
            .message(ChatMessage::system(system_prompt))
            .message(ChatMessage::user_with_images(instruction, vec![image]))
            .temperature(temperature)
            .max_tokens(max_tokens);
        self.send(&request).await
    }

    /// Embedding vector for `input`.
    pub async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, LlmError> {
        let start = Instant::now();
        let vector = self.client.embed(model, input).await?;
        debug!(
            model = %model,
            input_chars = input.chars().count(),
            dimensions = vector.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding generated"
        );
        Ok(vector)
    }

    async fn send(&self, request: &ChatRequest) -> Result<Completion, LlmError> {
        let start = Instant::now();
        let completion = self.client.chat(request).await?;
        debug!(
            model = %request.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            response_chars = completion.text.chars().count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion"
        );
        Ok(completion)
    }
}
