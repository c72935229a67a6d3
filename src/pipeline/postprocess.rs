//! Deterministic cleanup of extracted text.
//!
//! Applied to every successful extraction (native or OCR) before the text
//! reaches the anonymiser. The rules never touch content characters, only
//! layout noise and wrapping artefacts.
//!
//! Rules run in order: fences are stripped before line endings are
//! normalised so the fence regex sees the model's raw output, and invisible
//! characters go before blank-line collapsing so a line holding only a
//! zero-width space counts as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules.
///
/// 1. Strip an outer code fence (vision models sometimes ignore the prompt)
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to one
/// 6. Trim leading and trailing blank space
pub fn clean_text(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer fence ────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|text|plaintext)?[ \t]*\r?\n(.*)\r?\n```\s*$").unwrap()
});

fn strip_outer_fence(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fence_with_tag() {
        assert_eq!(strip_outer_fence("```text\nRef BT/1\n```"), "Ref BT/1");
    }

    #[test]
    fn test_strip_fence_no_tag() {
        assert_eq!(strip_outer_fence("```\nhello\n```\n"), "hello");
    }

    #[test]
    fn test_unfenced_passthrough() {
        assert_eq!(strip_outer_fence("plain"), "plain");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_text_full_pipeline() {
        let input = "```\nDear Sir   \r\n\r\n\r\n\u{200B}\r\nRef: BT/2024/12345  \n```";
        assert_eq!(clean_text(input), "Dear Sir\n\nRef: BT/2024/12345");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(clean_text(" \n\t\n\u{FEFF}"), "");
    }
}
