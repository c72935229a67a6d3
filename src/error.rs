//! Error types for the evidence-ingest library.
//!
//! Two families of error reflect two distinct failure modes:
//!
//! * **Fatal** ([`ProcessingError`]). The document cannot be recorded at all
//!   (the store is down, or the anonymiser broke its totality contract so
//!   downstream text is untrustworthy). Returned as `Err` from
//!   [`crate::orchestrator::IngestionOrchestrator::process_document`].
//!
//! * **Degrading** ([`ExtractionError`], [`LlmError`]). A single stage failed
//!   (OCR timed out, the embedding endpoint returned 500, the model answered
//!   with prose instead of JSON). The orchestrator absorbs these into a
//!   degraded-but-valid [`crate::document::DocumentRecord`] and records the
//!   reason in its [`crate::document::StageStatus`].
//!
//! Callers distinguish "fully analysed" from "stored with reduced metadata"
//! through the record's presence flags, never through `Err`.

use thiserror::Error;

/// The only error that crosses the `process_document` boundary.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The anonymiser failed. Downstream text cannot be trusted, so the
    /// document is not persisted.
    #[error("Failed to process document for case '{case_id}': anonymisation failed: {source}")]
    Anonymization {
        case_id: String,
        #[source]
        source: AnonymizationError,
    },

    /// The persistence collaborator rejected the record.
    #[error("Failed to process document for case '{case_id}': {source}")]
    Persistence {
        case_id: String,
        #[source]
        source: StoreError,
    },
}

impl ProcessingError {
    /// Case the failed document belonged to.
    pub fn case_id(&self) -> &str {
        match self {
            ProcessingError::Anonymization { case_id, .. }
            | ProcessingError::Persistence { case_id, .. } => case_id,
        }
    }
}

/// Failure raised out of the extraction adapter.
///
/// Every format branch recovers its own errors into a placeholder text; the
/// one exception is the OCR network call hitting its explicit timeout, which
/// the orchestrator catches.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("OCR call timed out after {secs}s for '{filename}'")]
    OcrTimeout { filename: String, secs: u64 },
}

/// Anonymisation collaborator failure. Not expected given its totality
/// contract; fatal when it happens.
#[derive(Debug, Clone, Error)]
#[error("Anonymiser '{anonymizer}' failed: {reason}")]
pub struct AnonymizationError {
    pub anonymizer: String,
    pub reason: String,
}

/// Errors from the LLM invocation layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    /// No credential or an unusable model/provider configuration.
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Upstream model API returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Transport failure (DNS, connection reset, TLS).
    #[error("Network error calling model API: {0}")]
    Network(String),

    /// The call exceeded its per-call timeout.
    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response could not be interpreted. `raw` keeps the model output
    /// for diagnostics.
    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

impl LlmError {
    /// HTTP status for upstream failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Persistence collaborator failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document store I/O error at '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document record could not be (de)serialised: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Object-storage collaborator failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage path '{path}' is invalid: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Object '{path}' not found")]
    NotFound { path: String },

    #[error("Storage I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure at the upload boundary: either the bytes never reached storage or
/// processing failed fatally afterwards.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to upload file: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// Builder validation failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn upstream_display_carries_status_and_body() {
        let e = LlmError::Upstream {
            status: 500,
            body: "internal".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("internal"));
        assert_eq!(e.status(), Some(500));
    }

    #[test]
    fn persistence_error_keeps_cause_chain() {
        let e = ProcessingError::Persistence {
            case_id: "case-1".into(),
            source: StoreError::Unavailable("connection refused".into()),
        };
        assert!(e.to_string().contains("Failed to process document"));
        assert_eq!(e.case_id(), "case-1");
        let cause = e.source().expect("source preserved");
        assert!(cause.to_string().contains("connection refused"));
    }

    #[test]
    fn ocr_timeout_display() {
        let e = ExtractionError::OcrTimeout {
            filename: "scan.png".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("scan.png"));
    }

    #[test]
    fn malformed_response_has_no_status() {
        let e = LlmError::MalformedResponse {
            reason: "expected value".into(),
            raw: "Sure! Here you go".into(),
        };
        assert_eq!(e.status(), None);
    }
}
