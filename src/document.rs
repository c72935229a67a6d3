//! Data model shared by every pipeline stage.
//!
//! The types here trace a document from the upload boundary
//! ([`RawDocument`]) through extraction ([`ExtractedText`]) and field
//! extraction ([`StructuredFields`]) to the persisted unit
//! ([`DocumentRecord`]). Everything that is persisted is `Serialize +
//! Deserialize` so a stored record re-reads byte-for-byte equivalent.

use crate::pipeline::format::DocumentFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── Document type ────────────────────────────────────────────────────────

/// What role a document plays in its case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Letter received from the tax authority.
    #[serde(rename = "hmrc_letter")]
    AuthorityLetter,
    /// The practice's draft complaint.
    #[serde(rename = "complaint_draft")]
    DraftComplaint,
    /// The authority's response to a complaint.
    #[serde(rename = "response")]
    AuthorityResponse,
    /// Any supporting evidence (screenshots, statements, faxes).
    #[serde(rename = "evidence")]
    Evidence,
    /// The final outcome letter.
    #[serde(rename = "final_outcome")]
    FinalOutcome,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::AuthorityLetter,
        DocumentType::DraftComplaint,
        DocumentType::AuthorityResponse,
        DocumentType::Evidence,
        DocumentType::FinalOutcome,
    ];

    /// Wire name, also used as a storage path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::AuthorityLetter => "hmrc_letter",
            DocumentType::DraftComplaint => "complaint_draft",
            DocumentType::AuthorityResponse => "response",
            DocumentType::Evidence => "evidence",
            DocumentType::FinalOutcome => "final_outcome",
        }
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Evidence
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown document type '{s}' (expected one of: {})",
                    DocumentType::ALL.map(|t| t.as_str()).join(", ")
                )
            })
    }
}

// ── Input ────────────────────────────────────────────────────────────────

/// Immutable upload as it arrives from the upload boundary.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub case_id: String,
    pub document_type: DocumentType,
}

impl RawDocument {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        case_id: impl Into<String>,
        document_type: DocumentType,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            case_id: case_id.into(),
            document_type,
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    NativePdf,
    Docx,
    Plain,
    Spreadsheet,
    Ocr,
    Unsupported,
    Failed,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::NativePdf => "native-pdf",
            ExtractionMethod::Docx => "docx",
            ExtractionMethod::Plain => "plain",
            ExtractionMethod::Spreadsheet => "spreadsheet",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Unsupported => "unsupported",
            ExtractionMethod::Failed => "failed",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the extraction adapter over one document.
///
/// Invariant: `text` is never empty. When `success` is false it holds a
/// human-readable placeholder (see [`crate::pipeline::placeholder`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub success: bool,
    pub method: ExtractionMethod,
    /// Format the adapter dispatched on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DocumentFormat>,
    /// Why extraction failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ExtractedText {
    /// Successful extraction.
    pub fn extracted(text: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            text: text.into(),
            success: true,
            method,
            format: None,
            failure: None,
        }
    }

    /// Failed extraction; `placeholder` is what downstream stages will see.
    pub fn failed(placeholder: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            text: placeholder.into(),
            success: false,
            method: ExtractionMethod::Failed,
            format: None,
            failure: Some(reason.into()),
        }
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Character count of the extracted (or placeholder) text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

// ── Structured fields ────────────────────────────────────────────────────

/// Fields pulled out of anonymised text, each in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFields {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

impl StructuredFields {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.amounts.is_empty()
            && self.references.is_empty()
            && self.events.is_empty()
    }
}

/// Model-produced analysis of a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysis {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Model that produced this analysis.
    #[serde(default)]
    pub model: String,
}

// ── Stage outcomes ───────────────────────────────────────────────────────

/// Why an optional stage did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Extracted text was at or below the meaningful-text minimum.
    InsufficientText { chars: usize },
    /// Extracted text is a pending/failed/unsupported placeholder.
    PlaceholderText,
    /// Stage switched off in configuration.
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientText { chars } => {
                write!(f, "insufficient text ({chars} chars)")
            }
            SkipReason::PlaceholderText => f.write_str("placeholder text"),
            SkipReason::Disabled => f.write_str("disabled"),
        }
    }
}

/// Outcome of an optional enrichment stage (deep analysis, embedding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Completed { model: String },
    Skipped { skip: SkipReason },
    Failed { model: String, reason: String },
}

impl StageStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed { .. })
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed { model } => write!(f, "completed ({model})"),
            StageStatus::Skipped { skip } => write!(f, "skipped: {skip}"),
            StageStatus::Failed { model, reason } => write!(f, "failed ({model}): {reason}"),
        }
    }
}

// ── Persisted record ─────────────────────────────────────────────────────

/// Metadata derived during processing, stored next to the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetadata {
    pub raw_text_length: usize,
    pub extraction_method: ExtractionMethod,
    pub extraction_succeeded: bool,
    pub has_embedding: bool,
    pub has_deep_analysis: bool,
    pub analysis: StageStatus,
    pub embedding: StageStatus,
}

/// Structured fields plus derived metadata; the record's `processed_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedData {
    pub fields: StructuredFields,
    pub metadata: DerivedMetadata,
}

/// A record ready for insertion; the store assigns `id` and `uploaded_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocumentRecord {
    pub case_id: String,
    pub document_type: DocumentType,
    pub file_path: String,
    pub filename: String,
    pub processed_data: ProcessedData,
    pub deep_analysis: Option<DeepAnalysis>,
    pub embedding: Option<Vec<f32>>,
}

/// The persisted unit. Read-only from this crate's perspective once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub case_id: String,
    pub document_type: DocumentType,
    pub file_path: String,
    pub filename: String,
    pub processed_data: ProcessedData,
    pub deep_analysis: Option<DeepAnalysis>,
    pub embedding: Option<Vec<f32>>,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Materialise a new record with the given identity.
    pub fn from_new(new: NewDocumentRecord, id: Uuid, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            case_id: new.case_id,
            document_type: new.document_type,
            file_path: new.file_path,
            filename: new.filename,
            processed_data: new.processed_data,
            deep_analysis: new.deep_analysis,
            embedding: new.embedding,
            uploaded_at,
        }
    }

    pub fn fields(&self) -> &StructuredFields {
        &self.processed_data.fields
    }

    pub fn metadata(&self) -> &DerivedMetadata {
        &self.processed_data.metadata
    }

    /// Whether every optional enrichment ran to completion.
    pub fn is_fully_analyzed(&self) -> bool {
        let m = self.metadata();
        m.has_deep_analysis && m.has_embedding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_wire_names() {
        let json = serde_json::to_string(&DocumentType::AuthorityLetter).unwrap();
        assert_eq!(json, "\"hmrc_letter\"");
        let back: DocumentType = serde_json::from_str("\"final_outcome\"").unwrap();
        assert_eq!(back, DocumentType::FinalOutcome);
    }

    #[test]
    fn document_type_from_str_accepts_dashes() {
        assert_eq!(
            "complaint-draft".parse::<DocumentType>().unwrap(),
            DocumentType::DraftComplaint
        );
        assert_eq!("EVIDENCE".parse::<DocumentType>().unwrap(), DocumentType::Evidence);
        let err = "invoice".parse::<DocumentType>().unwrap_err();
        assert!(err.contains("hmrc_letter"), "got: {err}");
    }

    #[test]
    fn extraction_method_serialises_kebab_case() {
        let json = serde_json::to_string(&ExtractionMethod::NativePdf).unwrap();
        assert_eq!(json, "\"native-pdf\"");
        assert_eq!(ExtractionMethod::NativePdf.to_string(), "native-pdf");
    }

    #[test]
    fn failed_extraction_keeps_placeholder_text() {
        let e = ExtractedText::failed("[Text extraction failed: bad zip]", "bad zip");
        assert!(!e.success);
        assert_eq!(e.method, ExtractionMethod::Failed);
        assert!(!e.text.is_empty());
        assert_eq!(e.failure.as_deref(), Some("bad zip"));
    }

    #[test]
    fn stage_status_is_tagged() {
        let s = StageStatus::Skipped {
            skip: SkipReason::InsufficientText { chars: 12 },
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["status"], "skipped");
        assert_eq!(v["skip"]["reason"], "insufficient_text");
        assert_eq!(v["skip"]["chars"], 12);
        assert_eq!(s.to_string(), "skipped: insufficient text (12 chars)");
    }
}
