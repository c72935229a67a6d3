//! OCR of image uploads through a vision model.

use super::encode::{encode_image, prepare_image};
use super::{placeholder, postprocess};
use crate::config::IngestConfig;
use crate::document::{ExtractedText, ExtractionMethod};
use crate::error::ExtractionError;
use crate::llm::LlmInvoker;
use crate::prompts::{OCR_SYSTEM_PROMPT, OCR_USER_PROMPT};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Transcribe an image.
///
/// Every model failure becomes an `[OCR failed: ...]` placeholder; only the
/// per-call timeout elapsing is returned as `Err`.
pub async fn ocr_image(
    invoker: &LlmInvoker,
    config: &IngestConfig,
    bytes: &[u8],
    filename: &str,
) -> Result<ExtractedText, ExtractionError> {
    let start = Instant::now();

    // Decoding and resizing is CPU-bound.
    let owned = bytes.to_vec();
    let max_dimension = config.max_image_dimension;
    let prepared = match tokio::task::spawn_blocking(move || prepare_image(&owned, max_dimension))
        .await
    {
        Ok(p) => p,
        Err(e) => {
            let reason = format!("image preparation failed: {e}");
            return Ok(ExtractedText::failed(placeholder::ocr_failed(&reason), reason));
        }
    };
    let image = encode_image(&prepared);

    let call = invoker.transcribe_image(
        &config.ocr_model,
        OCR_SYSTEM_PROMPT,
        OCR_USER_PROMPT,
        image,
        config.ocr_temperature,
        config.ocr_max_tokens,
    );

    let completion = match tokio::time::timeout(Duration::from_secs(config.ocr_timeout_secs), call)
        .await
    {
        Err(_) => {
            warn!(filename, secs = config.ocr_timeout_secs, "OCR call timed out");
            return Err(ExtractionError::OcrTimeout {
                filename: filename.to_string(),
                secs: config.ocr_timeout_secs,
            });
        }
        Ok(Err(e)) => {
            warn!(filename, model = %config.ocr_model, error = %e, "OCR call failed");
            let reason = e.to_string();
            return Ok(ExtractedText::failed(placeholder::ocr_failed(&reason), reason));
        }
        Ok(Ok(c)) => c,
    };

    let text = postprocess::clean_text(&completion.text);
    if text.is_empty() {
        let reason = "vision model returned no text";
        return Ok(ExtractedText::failed(placeholder::ocr_failed(reason), reason));
    }

    info!(
        filename,
        model = %config.ocr_model,
        mime = prepared.mime,
        resized = prepared.resized,
        chars = text.chars().count(),
        output_tokens = completion.usage.completion_tokens,
        duration_ms = start.elapsed().as_millis() as u64,
        "OCR complete"
    );
    Ok(ExtractedText::extracted(text, ExtractionMethod::Ocr))
}
