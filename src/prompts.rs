//! Prompts sent to the inference endpoint.
//!
//! Centralising every prompt here keeps wording changes in one place and lets
//! unit tests inspect them without a model.

/// System prompt for verbatim OCR of an uploaded image.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are a meticulous document transcriber working on evidence for a tax complaint case.

Transcribe ALL text visible in the image exactly as written:
- Preserve every date, monetary amount and reference number character-for-character
  (e.g. "15 March 2024", "£1,250.00", "BT/2024/12345").
- Keep the reading order a human would use; keep line breaks between blocks.
- Reproduce tables row by row with cells separated by " | ".
- Do not summarise, correct, translate or comment.
- If part of the image is illegible, write [illegible] in its place.

Output ONLY the transcribed text. Do NOT wrap it in code fences."#;

/// User-turn instruction accompanying the image.
pub const OCR_USER_PROMPT: &str =
    "Transcribe all text from this document image verbatim.";

/// System prompt for the deep-analysis stage. The model must answer with JSON.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert at extracting structured facts from correspondence with a tax authority.

Return a single JSON object with exactly these keys:
{
  "dates": ["every date mentioned, as written"],
  "amounts": ["every monetary amount, with currency symbol"],
  "references": ["every reference, case or account number"],
  "events": ["each significant event in one short sentence, in chronological order"],
  "summary": "two or three sentences describing the document"
}

Rules:
- Use empty arrays when nothing is found; never omit a key.
- Copy values exactly; do not normalise formats.
- Redaction tokens such as [NAME] or [EMAIL] must be kept as they appear.
- Output ONLY the JSON object, no commentary."#;

/// Build the user turn for deep analysis.
pub fn analysis_user_prompt(document_type: &str, filename: &str, text: &str) -> String {
    format!(
        "Document type: {document_type}\nFilename: {filename}\n\nExtract the structured facts from this document:\n\n\"\"\"\n{text}\n\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_prompt_asks_to_preserve_references() {
        assert!(OCR_SYSTEM_PROMPT.contains("reference"));
        assert!(OCR_SYSTEM_PROMPT.contains("Do NOT wrap"));
    }

    #[test]
    fn analysis_prompt_lists_every_key() {
        for key in ["dates", "amounts", "references", "events", "summary"] {
            assert!(ANALYSIS_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn analysis_user_prompt_embeds_text() {
        let p = analysis_user_prompt("hmrc_letter", "letter.pdf", "Dear taxpayer");
        assert!(p.contains("hmrc_letter"));
        assert!(p.contains("letter.pdf"));
        assert!(p.contains("Dear taxpayer"));
    }
}
