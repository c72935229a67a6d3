//! The extraction adapter: bytes + filename → [`ExtractedText`].

use super::format::DocumentFormat;
use super::native::{self, NativeExtractionError};
use super::{ocr, placeholder};
use crate::config::IngestConfig;
use crate::document::{ExtractedText, ExtractionMethod};
use crate::error::ExtractionError;
use crate::llm::LlmInvoker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Format-aware text extraction with OCR for images.
#[derive(Debug, Clone)]
pub struct ExtractionAdapter {
    invoker: LlmInvoker,
    config: Arc<IngestConfig>,
}

impl ExtractionAdapter {
    pub fn new(invoker: LlmInvoker, config: Arc<IngestConfig>) -> Self {
        Self { invoker, config }
    }

    /// Extract plain text from `bytes`, dispatching on `filename`'s extension.
    ///
    /// The returned text is never empty: failures produce a placeholder with
    /// `success == false`. The only `Err` is [`ExtractionError::OcrTimeout`].
    pub async fn extract_text(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractedText, ExtractionError> {
        let format = DocumentFormat::from_filename(filename);
        debug!(filename, format = %format, bytes = bytes.len(), "Dispatching extraction");

        let extracted = match &format {
            DocumentFormat::Pdf => {
                run_native(bytes, ExtractionMethod::NativePdf, native::extract_pdf).await
            }
            DocumentFormat::Word => {
                run_native(bytes, ExtractionMethod::Docx, native::extract_word).await
            }
            DocumentFormat::PlainText => {
                ExtractedText::extracted(native::extract_plain(bytes), ExtractionMethod::Plain)
            }
            DocumentFormat::Spreadsheet { kind } => {
                let kind = *kind;
                run_native(bytes, ExtractionMethod::Spreadsheet, move |b| {
                    native::extract_spreadsheet(b, kind)
                })
                .await
            }
            DocumentFormat::Image => {
                ocr::ocr_image(&self.invoker, &self.config, bytes, filename).await?
            }
            DocumentFormat::Unsupported { extension } => {
                warn!(filename, extension = %extension, "Unsupported file type");
                ExtractedText::extracted(
                    placeholder::unsupported(extension),
                    ExtractionMethod::Unsupported,
                )
            }
        };

        let extracted = ensure_non_empty(extracted).with_format(format);
        info!(
            filename,
            method = %extracted.method,
            success = extracted.success,
            chars = extracted.char_len(),
            "Text extracted"
        );
        Ok(extracted)
    }
}

/// Run a synchronous extractor on the blocking pool. Its text is kept as
/// the document has it; only OCR output goes through cleanup.
async fn run_native<F>(bytes: &[u8], method: ExtractionMethod, extractor: F) -> ExtractedText
where
    F: FnOnce(&[u8]) -> Result<String, NativeExtractionError> + Send + 'static,
{
    let owned = bytes.to_vec();
    match tokio::task::spawn_blocking(move || extractor(&owned)).await {
        Ok(Ok(text)) => ExtractedText::extracted(text, method),
        Ok(Err(NativeExtractionError::NoTextLayer)) => {
            ExtractedText::failed(placeholder::no_text_layer(), "PDF has no text layer")
        }
        Ok(Err(NativeExtractionError::LegacyWord)) => ExtractedText::failed(
            placeholder::pending("legacy .doc format"),
            NativeExtractionError::LegacyWord.to_string(),
        ),
        Ok(Err(e)) => {
            warn!(method = %method, error = %e, "Native extraction failed");
            let reason = e.to_string();
            ExtractedText::failed(placeholder::extraction_failed(&reason), reason)
        }
        Err(e) => {
            let reason = format!("extraction task failed: {e}");
            ExtractedText::failed(placeholder::extraction_failed(&reason), reason)
        }
    }
}

/// An extraction that "succeeded" with nothing to show is a failure.
fn ensure_non_empty(extracted: ExtractedText) -> ExtractedText {
    if extracted.text.trim().is_empty() {
        let reason = "document contains no text";
        ExtractedText::failed(placeholder::extraction_failed(reason), reason)
    } else {
        extracted
    }
}
