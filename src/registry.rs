//! Stage → model routing.
//!
//! Each pipeline [`Stage`] owns an ordered list of named [`ModelTier`]s. One
//! tier per stage is marked primary; an operator can select any other tier
//! for a stage by setting `MODEL_<STAGEKEY>` (for example
//! `MODEL_EMBEDDINGS=costEfficient`). The tier table itself is read-only:
//! only the selection is dynamic, and that selection is read through an
//! injected [`OverrideSource`] on every [`ModelRegistry::resolve`] call.
//!
//! ```rust
//! use evidence_ingest::registry::{FixedOverrides, ModelRegistry, Stage};
//! use std::sync::Arc;
//!
//! let registry = ModelRegistry::new(Arc::new(
//!     FixedOverrides::default().with(Stage::Embeddings, "cost_efficient"),
//! ));
//! assert_eq!(registry.resolve(Stage::Embeddings).model, "openai/text-embedding-3-small");
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

// ── Stages ───────────────────────────────────────────────────────────────

/// A pipeline stage that needs a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Embeddings,
    DocumentExtraction,
    Reranking,
    ComplaintAnalysis,
    LetterFacts,
    LetterStructure,
    LetterTone,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Embeddings,
        Stage::DocumentExtraction,
        Stage::Reranking,
        Stage::ComplaintAnalysis,
        Stage::LetterFacts,
        Stage::LetterStructure,
        Stage::LetterTone,
    ];

    /// Stable key, as used in configuration files and logs.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Embeddings => "embeddings",
            Stage::DocumentExtraction => "documentExtraction",
            Stage::Reranking => "reranking",
            Stage::ComplaintAnalysis => "complaintAnalysis",
            Stage::LetterFacts => "letterFacts",
            Stage::LetterStructure => "letterStructure",
            Stage::LetterTone => "letterTone",
        }
    }

    /// Environment variable that overrides this stage's tier.
    pub fn env_var(&self) -> String {
        format!("MODEL_{}", self.key().to_ascii_uppercase())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── Tiers ────────────────────────────────────────────────────────────────

/// Who serves a tier's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible gateway; the only provider this crate calls directly.
    OpenRouter,
    Voyage,
    Cohere,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::OpenRouter => "openrouter",
            Provider::Voyage => "voyage",
            Provider::Cohere => "cohere",
        })
    }
}

/// Published price of a tier, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pricing {
    /// Separate rates per million input and output tokens.
    PerToken { input_per_1m: f64, output_per_1m: f64 },
    /// One rate per million input tokens (embeddings).
    FlatPerMillion { per_1m: f64 },
    /// Priced per thousand searches; not token-estimable.
    PerThousandSearches { per_1k: f64 },
}

impl fmt::Display for Pricing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pricing::PerToken {
                input_per_1m,
                output_per_1m,
            } => write!(f, "${input_per_1m}/${output_per_1m} per 1M in/out"),
            Pricing::FlatPerMillion { per_1m } => write!(f, "${per_1m} per 1M"),
            Pricing::PerThousandSearches { per_1k } => write!(f, "${per_1k} per 1k searches"),
        }
    }
}

/// One ranked model choice for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTier {
    pub key: String,
    pub model: String,
    pub provider: Provider,
    pub context_window: Option<u32>,
    /// Output vector length, for embedding tiers.
    pub dimensions: Option<usize>,
    pub temperature: Option<f32>,
    pub pricing: Pricing,
    pub supports_strict_json: bool,
    pub notes: String,
    pub primary: bool,
}

impl ModelTier {
    fn new(key: &str, model: &str, provider: Provider, pricing: Pricing) -> Self {
        Self {
            key: key.to_string(),
            model: model.to_string(),
            provider,
            context_window: None,
            dimensions: None,
            temperature: None,
            pricing,
            supports_strict_json: false,
            notes: String::new(),
            primary: false,
        }
    }

    fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    fn context(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }

    fn dims(mut self, n: usize) -> Self {
        self.dimensions = Some(n);
        self
    }

    fn temp(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    fn strict_json(mut self) -> Self {
        self.supports_strict_json = true;
        self
    }

    fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    /// Estimated USD cost of one call against this tier.
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.pricing {
            Pricing::PerToken {
                input_per_1m,
                output_per_1m,
            } => {
                (input_tokens as f64 / 1e6) * input_per_1m
                    + (output_tokens as f64 / 1e6) * output_per_1m
            }
            Pricing::FlatPerMillion { per_1m } => (input_tokens as f64 / 1e6) * per_1m,
            Pricing::PerThousandSearches { .. } => 0.0,
        }
    }
}

fn per_token(input_per_1m: f64, output_per_1m: f64) -> Pricing {
    Pricing::PerToken {
        input_per_1m,
        output_per_1m,
    }
}

/// The built-in tier table, in rank order per stage.
pub fn default_tiers() -> HashMap<Stage, Vec<ModelTier>> {
    use Provider::*;

    let mut t = HashMap::new();
    t.insert(
        Stage::Embeddings,
        vec![
            ModelTier::new(
                "primary",
                "openai/text-embedding-3-large",
                OpenRouter,
                Pricing::FlatPerMillion { per_1m: 0.13 },
            )
            .primary()
            .dims(3072)
            .notes("Best retrieval quality for letters and evidence"),
            ModelTier::new(
                "costEfficient",
                "openai/text-embedding-3-small",
                OpenRouter,
                Pricing::FlatPerMillion { per_1m: 0.02 },
            )
            .dims(1536)
            .notes("6x cheaper; fine for bulk historical imports"),
            ModelTier::new(
                "domainSpecific",
                "voyage-law-2",
                Voyage,
                Pricing::FlatPerMillion { per_1m: 0.12 },
            )
            .dims(1024)
            .notes("Legal-domain embeddings; requires a Voyage client"),
        ],
    );
    t.insert(
        Stage::DocumentExtraction,
        vec![
            ModelTier::new(
                "primary",
                "anthropic/claude-haiku-4.5",
                OpenRouter,
                per_token(0.25, 1.25),
            )
            .primary()
            .context(200_000)
            .temp(0.2)
            .notes("Fast, cheap, reliable JSON for per-document facts"),
            ModelTier::new("hugeContext", "google/gemini-pro-1.5", OpenRouter, per_token(1.25, 5.0))
                .context(2_000_000)
                .temp(0.2)
                .notes("Whole-bundle extraction of very long documents"),
            ModelTier::new("strictJson", "openai/gpt-4o", OpenRouter, per_token(2.5, 10.0))
                .context(128_000)
                .temp(0.2)
                .strict_json()
                .notes("Schema-enforced output"),
        ],
    );
    t.insert(
        Stage::Reranking,
        vec![
            ModelTier::new(
                "primary",
                "cohere/rerank-3.5",
                Cohere,
                Pricing::PerThousandSearches { per_1k: 1.0 },
            )
            .primary()
            .notes("Dedicated reranker"),
            ModelTier::new(
                "alternative",
                "voyage/rerank-2.5",
                Voyage,
                Pricing::PerThousandSearches { per_1k: 0.5 },
            )
            .notes("Cheaper dedicated reranker"),
            ModelTier::new(
                "openrouterFallback",
                "openai/gpt-4o-mini",
                OpenRouter,
                per_token(0.15, 0.0),
            )
            .temp(0.1)
            .notes("LLM-as-reranker when no dedicated key is configured"),
        ],
    );
    t.insert(
        Stage::ComplaintAnalysis,
        vec![
            ModelTier::new(
                "primary",
                "anthropic/claude-sonnet-4.5",
                OpenRouter,
                per_token(3.0, 15.0),
            )
            .primary()
            .context(200_000)
            .temp(0.3)
            .notes("Strongest reasoning over charter breaches"),
            ModelTier::new("strictJson", "openai/gpt-4o", OpenRouter, per_token(2.5, 10.0))
                .context(128_000)
                .temp(0.3)
                .strict_json(),
            ModelTier::new(
                "giantContext",
                "google/gemini-pro-1.5",
                OpenRouter,
                per_token(1.25, 5.0),
            )
            .context(2_000_000)
            .temp(0.3),
        ],
    );
    t.insert(
        Stage::LetterFacts,
        vec![
            ModelTier::new(
                "primary",
                "anthropic/claude-haiku-4.5",
                OpenRouter,
                per_token(0.25, 1.25),
            )
            .primary()
            .context(200_000)
            .temp(0.2),
            ModelTier::new(
                "ultraLowLatency",
                "openai/gpt-4o-mini",
                OpenRouter,
                per_token(0.15, 0.6),
            )
            .context(128_000)
            .temp(0.2)
            .strict_json(),
        ],
    );
    t.insert(
        Stage::LetterStructure,
        vec![
            ModelTier::new(
                "primary",
                "anthropic/claude-sonnet-4.5",
                OpenRouter,
                per_token(3.0, 15.0),
            )
            .primary()
            .context(200_000)
            .temp(0.3),
            ModelTier::new("schemaDriven", "openai/gpt-4o", OpenRouter, per_token(2.5, 10.0))
                .context(128_000)
                .temp(0.3)
                .strict_json(),
        ],
    );
    t.insert(
        Stage::LetterTone,
        vec![
            ModelTier::new(
                "primary",
                "anthropic/claude-opus-4.1",
                OpenRouter,
                per_token(15.0, 75.0),
            )
            .primary()
            .context(200_000)
            .temp(0.7)
            .notes("Best professional register"),
            ModelTier::new("excellentCheaper", "openai/gpt-4o", OpenRouter, per_token(2.5, 10.0))
                .context(128_000)
                .temp(0.7),
        ],
    );
    t
}

// ── Overrides ────────────────────────────────────────────────────────────

/// Where per-stage tier overrides come from.
pub trait OverrideSource: Send + Sync {
    /// Tier key requested for `stage`, if any.
    fn tier_override(&self, stage: Stage) -> Option<String>;
}

/// Reads `MODEL_<STAGEKEY>` from the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides;

impl OverrideSource for EnvOverrides {
    fn tier_override(&self, stage: Stage) -> Option<String> {
        std::env::var(stage.env_var())
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// A fixed override map, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct FixedOverrides {
    overrides: HashMap<Stage, String>,
}

impl FixedOverrides {
    pub fn with(mut self, stage: Stage, tier_key: impl Into<String>) -> Self {
        self.overrides.insert(stage, tier_key.into());
        self
    }
}

impl OverrideSource for FixedOverrides {
    fn tier_override(&self, stage: Stage) -> Option<String> {
        self.overrides.get(&stage).cloned()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Case-insensitive, separator-insensitive tier key comparison.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Tiers of one stage plus the index of its primary.
#[derive(Debug, Clone)]
struct StageTiers {
    tiers: Vec<ModelTier>,
    primary: usize,
}

/// Resolves a stage to the model tier that should serve it.
pub struct ModelRegistry {
    // Indexed by `Stage as usize`; every stage has at least one tier.
    stages: Vec<StageTiers>,
    overrides: Arc<dyn OverrideSource>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("stages", &self.stages.len())
            .field("overrides", &"<dyn OverrideSource>")
            .finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ModelRegistry {
    /// Built-in tier table with the given override source.
    pub fn new(overrides: Arc<dyn OverrideSource>) -> Self {
        let mut table = default_tiers();
        let stages = Stage::ALL
            .iter()
            .map(|stage| index_stage(table.remove(stage).unwrap_or_default()))
            .collect();
        Self { stages, overrides }
    }

    /// Built-in tier table, overrides read from the environment.
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvOverrides))
    }

    /// Custom tier table. Every stage needs at least one tier; a stage without
    /// a tier marked primary uses its first tier as primary.
    pub fn with_tiers(
        mut tiers: HashMap<Stage, Vec<ModelTier>>,
        overrides: Arc<dyn OverrideSource>,
    ) -> Result<Self, ConfigError> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let list = tiers.remove(&stage).unwrap_or_default();
            if list.is_empty() {
                return Err(ConfigError(format!(
                    "no model tiers registered for stage '{stage}'"
                )));
            }
            stages.push(index_stage(list));
        }
        Ok(Self { stages, overrides })
    }

    fn entry(&self, stage: Stage) -> &StageTiers {
        &self.stages[stage as usize]
    }

    /// The stage's tiers in rank order.
    pub fn tiers(&self, stage: Stage) -> &[ModelTier] {
        &self.entry(stage).tiers
    }

    /// Tier for `stage`: the override if it names an existing tier, else the
    /// primary tier.
    pub fn resolve(&self, stage: Stage) -> &ModelTier {
        let entry = self.entry(stage);

        if let Some(requested) = self.overrides.tier_override(stage) {
            let wanted = normalize_key(&requested);
            if let Some(tier) = entry.tiers.iter().find(|t| normalize_key(&t.key) == wanted) {
                return tier;
            }
            warn!(
                stage = %stage,
                requested = %requested,
                env = %stage.env_var(),
                "Unknown model tier override, falling back to primary"
            );
        }

        &entry.tiers[entry.primary]
    }

    /// Estimated USD cost of one call against the stage's resolved tier.
    pub fn estimate_cost(&self, stage: Stage, input_tokens: u64, output_tokens: u64) -> f64 {
        self.resolve(stage).estimate_cost(input_tokens, output_tokens)
    }
}

fn index_stage(tiers: Vec<ModelTier>) -> StageTiers {
    let primary = tiers.iter().position(|t| t.primary).unwrap_or(0);
    StageTiers { tiers, primary }
}
