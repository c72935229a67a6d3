//! Placeholder texts stored in place of real content, and the
//! meaningful-text predicate that gates the model stages.
//!
//! Every placeholder starts with one of [`PLACEHOLDER_MARKERS`]. Downstream
//! code must use [`is_placeholder`] rather than matching literal strings.

pub const PENDING_MARKER: &str = "[Document text extraction pending";
pub const FAILED_MARKER: &str = "[Text extraction failed";
pub const UNSUPPORTED_MARKER: &str = "[Unsupported file type";
pub const OCR_FAILED_MARKER: &str = "[OCR failed";
pub const NO_TEXT_LAYER_MARKER: &str = "[PDF contains no extractable text layer";

pub const PLACEHOLDER_MARKERS: [&str; 5] = [
    PENDING_MARKER,
    FAILED_MARKER,
    UNSUPPORTED_MARKER,
    OCR_FAILED_MARKER,
    NO_TEXT_LAYER_MARKER,
];

/// Minimum character count (exclusive) for text to be worth analysing.
pub const MEANINGFUL_TEXT_MIN_CHARS: usize = 50;

pub fn pending(format: &str) -> String {
    format!("{PENDING_MARKER} - {format}]")
}

pub fn extraction_failed(reason: &str) -> String {
    format!("{FAILED_MARKER}: {reason}]")
}

pub fn unsupported(extension: &str) -> String {
    if extension.is_empty() {
        format!("{UNSUPPORTED_MARKER}: (no extension) - stored for manual review]")
    } else {
        format!("{UNSUPPORTED_MARKER}: .{extension} - stored for manual review]")
    }
}

pub fn ocr_failed(reason: &str) -> String {
    format!("{OCR_FAILED_MARKER}: {reason}]")
}

pub fn no_text_layer() -> String {
    format!("{NO_TEXT_LAYER_MARKER} - likely a scanned document; stored for manual review]")
}

/// Whether `text` contains any placeholder marker.
pub fn is_placeholder(text: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| text.contains(m))
}

/// More than [`MEANINGFUL_TEXT_MIN_CHARS`] characters and no placeholder marker.
pub fn is_meaningful_text(text: &str) -> bool {
    text.chars().count() > MEANINGFUL_TEXT_MIN_CHARS && !is_placeholder(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builder_is_recognised() {
        for p in [
            pending("docx"),
            extraction_failed("corrupt zip"),
            unsupported("zip"),
            ocr_failed("HTTP 500"),
            no_text_layer(),
        ] {
            assert!(is_placeholder(&p), "{p}");
            assert!(!p.is_empty());
        }
    }

    #[test]
    fn unsupported_names_the_extension() {
        assert_eq!(
            unsupported("zip"),
            "[Unsupported file type: .zip - stored for manual review]"
        );
    }

    #[test]
    fn long_placeholder_is_not_meaningful() {
        let p = extraction_failed(&"x".repeat(200));
        assert!(p.chars().count() > MEANINGFUL_TEXT_MIN_CHARS);
        assert!(!is_meaningful_text(&p));
    }

    #[test]
    fn threshold_is_exclusive_and_counts_chars() {
        assert!(!is_meaningful_text(&"a".repeat(50)));
        assert!(is_meaningful_text(&"a".repeat(51)));
        // 26 two-byte chars: 52 bytes but only 26 chars
        assert!(!is_meaningful_text(&"é".repeat(26)));
    }
}
