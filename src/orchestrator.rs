//! The per-document ingestion workflow.
//!
//! ```text
//! bytes ─▶ extract ─▶ anonymise ─▶ fields ─┬─▶ deep analysis ─┐
//!                                          └─▶ embedding ─────┴─▶ persist
//! ```
//!
//! Extraction, deep analysis and embedding degrade: whatever goes wrong is
//! recorded in the record's [`StageStatus`] and the document is still
//! stored. Only anonymisation and persistence failures return `Err`.

use crate::collaborators::{
    Anonymizer, FieldExtractor, PatternAnonymizer, PatternFieldExtractor,
};
use crate::config::IngestConfig;
use crate::document::{
    DeepAnalysis, DerivedMetadata, DocumentRecord, DocumentType, ExtractedText,
    NewDocumentRecord, ProcessedData, RawDocument, SkipReason, StageStatus,
};
use crate::error::{ConfigError, LlmError, ProcessingError};
use crate::llm::{LlmInvoker, ModelClient, OpenRouterClient};
use crate::pipeline::{placeholder, DocumentFormat, ExtractionAdapter};
use crate::prompts::{analysis_user_prompt, ANALYSIS_SYSTEM_PROMPT};
use crate::registry::{ModelRegistry, ModelTier, Provider, Stage};
use crate::store::{DocumentStore, MemoryDocumentStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Temperature used when a document-extraction tier declares none.
const DEFAULT_ANALYSIS_TEMPERATURE: f32 = 0.2;

/// Everything `process_detailed` learned about one document.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub record: DocumentRecord,
    pub extraction: ExtractedText,
    pub analysis: StageStatus,
    pub embedding: StageStatus,
}

/// Digits in the millisecond upload timestamp `storage_path_for` writes.
const UPLOAD_TIMESTAMP_DIGITS: usize = 13;

/// Filename from a storage path: last segment, minus the leading
/// `<millis>_` upload timestamp.
///
/// `c1/evidence/1712345678901_scan.png` → `scan.png`, while a name that
/// merely starts with digits (`2024_accounts.pdf`) is kept whole.
pub fn filename_from_storage_path(storage_path: &str) -> String {
    let last = storage_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(storage_path);
    match last.split_once('_') {
        Some((prefix, rest))
            if prefix.len() == UPLOAD_TIMESTAMP_DIGITS
                && !rest.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest.to_string()
        }
        _ => last.to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Sequences extraction, anonymisation, field extraction, the two optional
/// model stages and persistence.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    config: Arc<IngestConfig>,
    registry: Arc<ModelRegistry>,
    invoker: LlmInvoker,
    extractor: ExtractionAdapter,
    anonymizer: Arc<dyn Anonymizer>,
    field_extractor: Arc<dyn FieldExtractor>,
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for IngestionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("anonymizer", &self.anonymizer.name())
            .finish_non_exhaustive()
    }
}

impl IngestionOrchestrator {
    pub fn builder() -> IngestionOrchestratorBuilder {
        IngestionOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Process an upload already placed at `storage_path`.
    pub async fn process_document(
        &self,
        bytes: impl Into<Vec<u8>>,
        case_id: &str,
        document_type: DocumentType,
        storage_path: &str,
    ) -> Result<DocumentRecord, ProcessingError> {
        let raw = RawDocument::new(
            bytes,
            filename_from_storage_path(storage_path),
            case_id,
            document_type,
        );
        self.process(raw, storage_path).await
    }

    pub async fn process(
        &self,
        raw: RawDocument,
        storage_path: &str,
    ) -> Result<DocumentRecord, ProcessingError> {
        self.process_detailed(raw, storage_path).await.map(|o| o.record)
    }

    pub async fn process_detailed(
        &self,
        raw: RawDocument,
        storage_path: &str,
    ) -> Result<IngestionOutcome, ProcessingError> {
        let start = Instant::now();
        let case_id = raw.case_id.as_str();
        info!(
            case_id,
            filename = %raw.filename,
            document_type = %raw.document_type,
            bytes = raw.bytes.len(),
            "Processing document"
        );

        // ── Step 1: Extract text ─────────────────────────────────────────
        let extraction = match self.extractor.extract_text(&raw.bytes, &raw.filename).await {
            Ok(e) => e,
            Err(e) => {
                warn!(
                    case_id,
                    filename = %raw.filename,
                    error = %e,
                    "Extraction failed, storing placeholder"
                );
                let reason = e.to_string();
                ExtractedText::failed(placeholder::ocr_failed(&reason), reason)
                    .with_format(DocumentFormat::from_filename(&raw.filename))
            }
        };

        // ── Step 2: Anonymise ────────────────────────────────────────────
        let anonymized = self.anonymizer.anonymize(&extraction.text).map_err(|source| {
            ProcessingError::Anonymization {
                case_id: case_id.to_string(),
                source,
            }
        })?;
        debug!(case_id, chars = anonymized.chars().count(), "Text anonymised");

        // ── Step 3: Structured fields ────────────────────────────────────
        let fields = self.field_extractor.extract(&anonymized);
        debug!(
            case_id,
            dates = fields.dates.len(),
            amounts = fields.amounts.len(),
            references = fields.references.len(),
            events = fields.events.len(),
            "Structured fields extracted"
        );

        // ── Step 4: Deep analysis ────────────────────────────────────────
        let gate = meaningful_gate(&extraction.text);
        let (deep_analysis, analysis) = match (&gate, self.config.deep_analysis) {
            (_, false) => (None, skipped(SkipReason::Disabled)),
            (Some(skip), true) => (None, skipped(skip.clone())),
            (None, true) => self.analyse(&raw, &anonymized).await,
        };

        // ── Step 5: Embedding ────────────────────────────────────────────
        let (embedding, embedding_status) = match (&gate, self.config.embeddings) {
            (_, false) => (None, skipped(SkipReason::Disabled)),
            (Some(skip), true) => (None, skipped(skip.clone())),
            (None, true) => self.embed(case_id, &anonymized).await,
        };

        // ── Step 6: Persist ──────────────────────────────────────────────
        let new_record = NewDocumentRecord {
            case_id: raw.case_id.clone(),
            document_type: raw.document_type,
            file_path: storage_path.to_string(),
            filename: raw.filename.clone(),
            processed_data: ProcessedData {
                fields,
                metadata: DerivedMetadata {
                    raw_text_length: extraction.char_len(),
                    extraction_method: extraction.method,
                    extraction_succeeded: extraction.success,
                    has_embedding: embedding.is_some(),
                    has_deep_analysis: deep_analysis.is_some(),
                    analysis: analysis.clone(),
                    embedding: embedding_status.clone(),
                },
            },
            deep_analysis,
            embedding,
        };

        let record = self.store.insert(new_record).await.map_err(|source| {
            warn!(case_id, error = %source, "Persisting document failed");
            ProcessingError::Persistence {
                case_id: case_id.to_string(),
                source,
            }
        })?;

        info!(
            case_id,
            id = %record.id,
            method = %extraction.method,
            analysis = %analysis,
            embedding = %embedding_status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Document stored"
        );

        Ok(IngestionOutcome {
            record,
            extraction,
            analysis,
            embedding: embedding_status,
        })
    }

    async fn analyse(
        &self,
        raw: &RawDocument,
        text: &str,
    ) -> (Option<DeepAnalysis>, StageStatus) {
        let case_id = raw.case_id.as_str();
        let tier = self.registry.resolve(Stage::DocumentExtraction);
        if let Err(e) = ensure_callable(tier) {
            return stage_failed(case_id, Stage::DocumentExtraction, tier, e);
        }

        let input = truncate_chars(text, self.config.analysis_max_input_chars);
        let prompt = analysis_user_prompt(raw.document_type.as_str(), &raw.filename, input);
        let secs = self.config.api_timeout_secs;
        let call = self.invoker.invoke_structured::<DeepAnalysis>(
            &tier.model,
            ANALYSIS_SYSTEM_PROMPT,
            &prompt,
            tier.temperature.unwrap_or(DEFAULT_ANALYSIS_TEMPERATURE),
            self.config.analysis_max_tokens,
        );

        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Err(_) => {
                let e = LlmError::Timeout { secs };
                stage_failed(case_id, Stage::DocumentExtraction, tier, e)
            }
            Ok(Err(e)) => stage_failed(case_id, Stage::DocumentExtraction, tier, e),
            Ok(Ok((mut analysis, usage))) => {
                analysis.model = tier.model.clone();
                info!(
                    case_id,
                    model = %tier.model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    cost_usd = tier.estimate_cost(usage.prompt_tokens, usage.completion_tokens),
                    "Deep analysis complete"
                );
                (
                    Some(analysis),
                    StageStatus::Completed {
                        model: tier.model.clone(),
                    },
                )
            }
        }
    }

    async fn embed(&self, case_id: &str, text: &str) -> (Option<Vec<f32>>, StageStatus) {
        let tier = self.registry.resolve(Stage::Embeddings);
        if let Err(e) = ensure_callable(tier) {
            return stage_failed(case_id, Stage::Embeddings, tier, e);
        }

        let input = truncate_chars(text, self.config.embedding_max_input_chars);
        let secs = self.config.api_timeout_secs;
        let vector = match tokio::time::timeout(
            Duration::from_secs(secs),
            self.invoker.embed(&tier.model, input),
        )
        .await
        {
            Err(_) => {
                let e = LlmError::Timeout { secs };
                return stage_failed(case_id, Stage::Embeddings, tier, e);
            }
            Ok(Err(e)) => return stage_failed(case_id, Stage::Embeddings, tier, e),
            Ok(Ok(v)) => v,
        };

        let expected = tier.dimensions.unwrap_or(vector.len());
        if vector.is_empty() || vector.len() != expected {
            let e = LlmError::MalformedResponse {
                reason: format!(
                    "embedding has {} dimensions, tier '{}' declares {}",
                    vector.len(),
                    tier.key,
                    expected
                ),
                raw: String::new(),
            };
            return stage_failed(case_id, Stage::Embeddings, tier, e);
        }

        // Embedding endpoints rarely report usage; ~4 chars per token.
        let approx_tokens = (input.chars().count() / 4) as u64;
        info!(
            case_id,
            model = %tier.model,
            dimensions = vector.len(),
            cost_usd = tier.estimate_cost(approx_tokens, 0),
            "Embedding complete"
        );
        (
            Some(vector),
            StageStatus::Completed {
                model: tier.model.clone(),
            },
        )
    }
}

/// `None` when the text is meaningful, otherwise why it is not.
fn meaningful_gate(text: &str) -> Option<SkipReason> {
    if placeholder::is_meaningful_text(text) {
        None
    } else if placeholder::is_placeholder(text) {
        Some(SkipReason::PlaceholderText)
    } else {
        Some(SkipReason::InsufficientText {
            chars: text.chars().count(),
        })
    }
}

fn skipped(skip: SkipReason) -> StageStatus {
    StageStatus::Skipped { skip }
}

/// Only OpenRouter-served tiers have a client in this crate.
fn ensure_callable(tier: &ModelTier) -> Result<(), LlmError> {
    match tier.provider {
        Provider::OpenRouter => Ok(()),
        other => Err(LlmError::Configuration(format!(
            "tier '{}' ({}) is served by {other}, which has no client configured",
            tier.key, tier.model
        ))),
    }
}

fn stage_failed<T>(
    case_id: &str,
    stage: Stage,
    tier: &ModelTier,
    error: LlmError,
) -> (Option<T>, StageStatus) {
    warn!(
        case_id,
        stage = %stage,
        model = %tier.model,
        status = ?error.status(),
        error = %error,
        "Stage failed, continuing without it"
    );
    (
        None,
        StageStatus::Failed {
            model: tier.model.clone(),
            reason: error.to_string(),
        },
    )
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`IngestionOrchestrator`]. Every collaborator has a default:
/// environment-driven registry and OpenRouter client, pattern anonymiser and
/// field extractor, in-memory store.
#[derive(Default)]
pub struct IngestionOrchestratorBuilder {
    config: Option<IngestConfig>,
    registry: Option<Arc<ModelRegistry>>,
    client: Option<Arc<dyn ModelClient>>,
    anonymizer: Option<Arc<dyn Anonymizer>>,
    field_extractor: Option<Arc<dyn FieldExtractor>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl IngestionOrchestratorBuilder {
    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn model_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn anonymizer(mut self, anonymizer: Arc<dyn Anonymizer>) -> Self {
        self.anonymizer = Some(anonymizer);
        self
    }

    pub fn field_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.field_extractor = Some(extractor);
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<IngestionOrchestrator, ConfigError> {
        let config = match self.config {
            Some(c) => c,
            None => IngestConfig::builder().build()?,
        };
        let config = Arc::new(config);
        let client = self
            .client
            .unwrap_or_else(|| Arc::new(OpenRouterClient::from_env()));
        let invoker = LlmInvoker::new(client);

        Ok(IngestionOrchestrator {
            extractor: ExtractionAdapter::new(invoker.clone(), Arc::clone(&config)),
            invoker,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ModelRegistry::from_env())),
            anonymizer: self
                .anonymizer
                .unwrap_or_else(|| Arc::new(PatternAnonymizer)),
            field_extractor: self
                .field_extractor
                .unwrap_or_else(|| Arc::new(PatternFieldExtractor)),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryDocumentStore::new())),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_strips_upload_timestamp() {
        assert_eq!(
            filename_from_storage_path("c1/evidence/1712345678901_scan.png"),
            "scan.png"
        );
        assert_eq!(filename_from_storage_path("c1/evidence/my_scan.png"), "my_scan.png");
        assert_eq!(filename_from_storage_path("letter.pdf"), "letter.pdf");
        assert_eq!(filename_from_storage_path("c1/x/123_"), "123_");
    }

    #[test]
    fn filename_keeps_leading_digits_that_are_not_a_timestamp() {
        assert_eq!(
            filename_from_storage_path("c1/evidence/2024_accounts.pdf"),
            "2024_accounts.pdf"
        );
        assert_eq!(
            filename_from_storage_path("c1/evidence/1712345678901_2024_accounts.pdf"),
            "2024_accounts.pdf"
        );
        assert_eq!(
            filename_from_storage_path("c1/evidence/12345678901234_x.pdf"),
            "12345678901234_x.pdf"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("£££", 2), "££");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn gate_explains_why() {
        assert_eq!(
            meaningful_gate("short"),
            Some(SkipReason::InsufficientText { chars: 5 })
        );
        assert_eq!(
            meaningful_gate(&placeholder::unsupported("zip")),
            Some(SkipReason::PlaceholderText)
        );
        assert_eq!(meaningful_gate(&"word ".repeat(20)), None);
    }

    #[test]
    fn non_openrouter_tier_is_not_callable() {
        let registry = ModelRegistry::new(Arc::new(
            crate::registry::FixedOverrides::default().with(Stage::Embeddings, "domainSpecific"),
        ));
        let err = ensure_callable(registry.resolve(Stage::Embeddings)).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }
}
