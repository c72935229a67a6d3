//! Parsing model output that should be JSON but may arrive wrapped in a
//! Markdown code fence.

use crate::error::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Whole response is one fenced block, optionally tagged `json`.
static WHOLE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap());

/// A fenced block somewhere inside surrounding prose.
static EMBEDDED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```").unwrap());

/// Remove a single code fence around `raw`, if present.
///
/// Unfenced input is returned trimmed but otherwise unchanged. When the
/// response is prose with one fenced block inside it, the block's contents
/// are returned.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(inner) = WHOLE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        if let Some(inner) = EMBEDDED_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
            return inner.as_str().trim();
        }
    }
    trimmed
}

/// Strip a fence and deserialize. Failure carries the raw text.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| LlmError::MalformedResponse {
        reason: e.to_string(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Refs {
        references: Vec<String>,
    }

    #[test]
    fn strips_json_tagged_fence() {
        let raw = "```json\n{\"references\": [\"BT/2024/12345\"]}\n```";
        assert_eq!(strip_code_fence(raw), "{\"references\": [\"BT/2024/12345\"]}");
    }

    #[test]
    fn strips_untagged_fence() {
        let raw = "```\n[1, 2]\n```\n";
        assert_eq!(strip_code_fence(raw), "[1, 2]");
    }

    #[test]
    fn unfenced_passes_through() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn fenced_block_inside_prose() {
        let raw = "Here is the result:\n```json\n{\"references\": []}\n```\nLet me know!";
        let parsed: Refs = parse_structured(raw).unwrap();
        assert!(parsed.references.is_empty());
    }

    #[test]
    fn fenced_and_unfenced_parse_identically() {
        let body = "{\"references\": [\"X1\"]}";
        let a: Refs = parse_structured(body).unwrap();
        let b: Refs = parse_structured(&format!("```json\n{body}\n```")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn typed_error_keeps_raw_text() {
        let err = parse_structured::<Refs>("not json at all").unwrap_err();
        match err {
            LlmError::MalformedResponse { raw, reason } => {
                assert_eq!(raw, "not json at all");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = parse_structured::<Refs>("{\"dates\": []}").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }
}
