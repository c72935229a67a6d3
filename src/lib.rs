//! # evidence-ingest
//!
//! Turn uploaded case-evidence files into anonymised, structured,
//! searchable document records.
//!
//! ## Why this crate?
//!
//! Evidence arrives in every shape: native PDFs, Word documents, CSV and
//! Excel exports, phone screenshots and faxed letters. Downstream analysis
//! only wants text it can trust. This crate picks the right extraction path
//! for each format, reads images with a vision model, strips personal data
//! before anything leaves for deep analysis or embedding, and always stores
//! a record, even when a stage degrades.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload bytes + filename
//!  │
//!  ├─ 1. Extract     native PDF / DOCX / text / spreadsheet, or OCR for images
//!  ├─ 2. Anonymise   names, emails, phones, NI numbers, UTRs, postcodes
//!  ├─ 3. Fields      dates, amounts, references, key events
//!  ├─ 4. Analyse     structured JSON from the document-extraction tier
//!  ├─ 5. Embed       vector from the embeddings tier
//!  └─ 6. Persist     DocumentRecord with per-stage status
//! ```
//!
//! Steps 4 and 5 run only on meaningful text (more than 50 characters and
//! no extraction placeholder). A failure in either is recorded and the
//! document is still stored.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evidence_ingest::{DocumentType, IngestionOrchestrator, RawDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model client reads OPENROUTER_API_KEY; tiers honour MODEL_<STAGE>.
//!     let orchestrator = IngestionOrchestrator::builder().build()?;
//!     let bytes = std::fs::read("letter.pdf")?;
//!     let raw = RawDocument::new(bytes, "letter.pdf", "case-42", DocumentType::AuthorityLetter);
//!     let record = orchestrator.process(raw, "case-42/hmrc_letter/1_letter.pdf").await?;
//!     println!("{} references", record.fields().references.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ingest` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! evidence-ingest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! Each stage has ranked tiers (see [`registry::default_tiers`]). Override
//! the primary with `MODEL_<STAGE>=<tier key>`, e.g.
//! `MODEL_DOCUMENTEXTRACTION=strictJson` or `MODEL_EMBEDDINGS=costEfficient`. Unknown
//! keys log a warning and fall back to the primary tier.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod store;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_batch, BatchItem, BatchReport};
pub use collaborators::{Anonymizer, FieldExtractor, PatternAnonymizer, PatternFieldExtractor};
pub use config::{IngestConfig, IngestConfigBuilder};
pub use document::{
    DeepAnalysis, DerivedMetadata, DocumentRecord, DocumentType, ExtractedText, ExtractionMethod,
    NewDocumentRecord, ProcessedData, RawDocument, SkipReason, StageStatus, StructuredFields,
};
pub use error::{
    AnonymizationError, ConfigError, ExtractionError, LlmError, ProcessingError, StorageError,
    StoreError, UploadError,
};
pub use llm::{LlmInvoker, ModelClient, OpenRouterClient};
pub use orchestrator::{IngestionOrchestrator, IngestionOrchestratorBuilder, IngestionOutcome};
pub use pipeline::{DocumentFormat, ExtractionAdapter};
pub use progress::{IngestionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{ModelRegistry, ModelTier, Provider, Stage};
pub use store::{DocumentStore, JsonDirStore, MemoryDocumentStore};
pub use upload::{document_url, upload_and_process, LocalObjectStorage, ObjectStorage};
