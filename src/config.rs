//! Configuration for document ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. The config is plain data: it is injected into
//! the orchestrator once and never read from the environment afterwards.
//! Model *selection* per stage lives in [`crate::registry::ModelRegistry`];
//! this struct only holds the knobs that are not stage-routed (the vision
//! model used for OCR, token caps, timeouts, enablement switches).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Configuration for an ingestion run.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use evidence_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .ocr_model("openai/gpt-4o-mini")
///     .concurrency(8)
///     .embeddings(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Vision model used to transcribe image uploads. Default: `openai/gpt-4o`.
    pub ocr_model: String,

    /// Sampling temperature for OCR transcription. Default: 0.1.
    ///
    /// Transcription must be faithful to the pixels; anything above ~0.3
    /// starts paraphrasing reference numbers.
    pub ocr_temperature: f32,

    /// Maximum tokens the vision model may generate per image. Default: 4096.
    pub ocr_max_tokens: usize,

    /// Per-call OCR timeout in seconds. Default: 60.
    ///
    /// Elapsing this is the one extraction failure that surfaces as an `Err`;
    /// the orchestrator turns it into a placeholder record.
    pub ocr_timeout_secs: u64,

    /// Per-call timeout for deep analysis and embedding, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Maximum tokens the deep-analysis model may generate. Default: 2000.
    pub analysis_max_tokens: usize,

    /// Characters of anonymised text sent to deep analysis. Default: 400 000.
    ///
    /// Roughly 100k tokens, comfortably inside the 200k window of the primary
    /// document-extraction tier.
    pub analysis_max_input_chars: usize,

    /// Characters of anonymised text sent to the embedding model. Default: 30 000.
    ///
    /// Embedding endpoints reject inputs above ~8k tokens.
    pub embedding_max_input_chars: usize,

    /// Longest edge, in pixels, of images sent for OCR. Default: 2000.
    ///
    /// Larger PNG/JPEG uploads are downscaled and re-encoded as PNG first.
    pub max_image_dimension: u32,

    /// Run the deep-analysis stage. Default: true.
    pub deep_analysis: bool,

    /// Run the embedding stage. Default: true.
    pub embeddings: bool,

    /// Documents processed concurrently by [`crate::batch::process_batch`]. Default: 4.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ocr_model: "openai/gpt-4o".to_string(),
            ocr_temperature: 0.1,
            ocr_max_tokens: 4096,
            ocr_timeout_secs: 60,
            api_timeout_secs: 60,
            analysis_max_tokens: 2000,
            analysis_max_input_chars: 400_000,
            embedding_max_input_chars: 30_000,
            max_image_dimension: 2000,
            deep_analysis: true,
            embeddings: true,
            concurrency: 4,
        }
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn ocr_temperature(mut self, t: f32) -> Self {
        self.config.ocr_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn ocr_max_tokens(mut self, n: usize) -> Self {
        self.config.ocr_max_tokens = n;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn analysis_max_tokens(mut self, n: usize) -> Self {
        self.config.analysis_max_tokens = n;
        self
    }

    pub fn analysis_max_input_chars(mut self, n: usize) -> Self {
        self.config.analysis_max_input_chars = n;
        self
    }

    pub fn embedding_max_input_chars(mut self, n: usize) -> Self {
        self.config.embedding_max_input_chars = n;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(100);
        self
    }

    pub fn deep_analysis(mut self, v: bool) -> Self {
        self.config.deep_analysis = v;
        self
    }

    pub fn embeddings(mut self, v: bool) -> Self {
        self.config.embeddings = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, ConfigError> {
        let c = &self.config;
        if c.ocr_model.trim().is_empty() {
            return Err(ConfigError("OCR model must not be empty".into()));
        }
        if c.ocr_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(ConfigError("Timeouts must be ≥ 1 second".into()));
        }
        if c.ocr_max_tokens == 0 || c.analysis_max_tokens == 0 {
            return Err(ConfigError("Token limits must be ≥ 1".into()));
        }
        if c.embedding_max_input_chars == 0 || c.analysis_max_input_chars == 0 {
            return Err(ConfigError("Input character caps must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(ConfigError("Concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
