//! Text → text and text → fields collaborators.
//!
//! The orchestrator depends only on the [`Anonymizer`] and [`FieldExtractor`]
//! traits. The pattern-based implementations here are deterministic
//! reference implementations tuned for UK tax correspondence; deployments
//! with an NER service inject their own.

use crate::document::StructuredFields;
use crate::error::AnonymizationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// ── Anonymisation ────────────────────────────────────────────────────────

/// Deterministic, total PII redaction.
pub trait Anonymizer: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    fn anonymize(&self, text: &str) -> Result<String, AnonymizationError>;
}

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap());

// UK numbers: +44 or a leading trunk 0.
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+44\s?(?:\(0\)\s?)?|\b0)\d{2,4}[\s-]?\d{3,4}[\s-]?\d{3,4}\b").unwrap()
});

// National Insurance number, e.g. QQ 12 34 56 C
static NI_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[A-CEGHJ-PR-TW-Z]{2}\s?\d{2}\s?\d{2}\s?\d{2}\s?[A-D]\b").unwrap()
});

// Unique Taxpayer Reference: 10 digits, sometimes split 5+5.
static UTR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}\s?\d{5}\b").unwrap());

static POSTCODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{1,2}\d[A-Z\d]?\s?\d[A-Z]{2}\b").unwrap()
});

static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Mr|Mrs|Ms|Miss|Dr)\.?\s+[A-Z][a-z]+(?:[\s-][A-Z][a-z]+)?").unwrap()
});

/// Regex redaction of emails, phone numbers, NI numbers, UTRs, postcodes
/// and titled names.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternAnonymizer;

impl Anonymizer for PatternAnonymizer {
    fn name(&self) -> &str {
        "pattern"
    }

    fn anonymize(&self, text: &str) -> Result<String, AnonymizationError> {
        // Order matters: NI numbers before postcodes, phones before UTRs.
        let s = EMAIL_REGEX.replace_all(text, "[EMAIL]");
        let s = PHONE_REGEX.replace_all(&s, "[PHONE]");
        let s = NI_NUMBER_REGEX.replace_all(&s, "[NI_NUMBER]");
        let s = UTR_REGEX.replace_all(&s, "[UTR]");
        let s = POSTCODE_REGEX.replace_all(&s, "[POSTCODE]");
        let s = NAME_REGEX.replace_all(&s, "[NAME]");
        Ok(s.into_owned())
    }
}

// ── Structured fields ────────────────────────────────────────────────────

/// Deterministic text → [`StructuredFields`].
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, text: &str) -> StructuredFields;
}

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

static DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS})\.?,?\s+\d{{4}}\b|\b(?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b|\b\d{{1,2}}/\d{{1,2}}/\d{{2,4}}\b|\b\d{{4}}-\d{{2}}-\d{{2}}\b"
    ))
    .unwrap()
});

static AMOUNT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:£|GBP\s?)\s?\d[\d,]*(?:\.\d{1,2})?").unwrap());

// Slash-delimited references like BT/2024/12345.
static SLASH_REF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{1,5}/\d{2,4}/[A-Z0-9]{3,}\b").unwrap());

// "Reference: ABC123456", "Our ref CFS-2291-X", "Case No. 88123"
static LABELLED_REF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:our\s+ref|your\s+ref|ref(?:erence)?|case)(?:\s+(?:no|number))?\.?:?\s+([A-Z0-9][A-Z0-9/-]{3,}[A-Z0-9])").unwrap()
});

const EVENT_KEYWORDS: [&str; 16] = [
    "penalty", "appeal", "complaint", "refund", "repayment", "payment", "deadline", "delay",
    "received", "sent", "called", "telephoned", "wrote", "issued", "closed", "escalat",
];

const MAX_EVENTS: usize = 20;
const MAX_EVENT_CHARS: usize = 200;

/// Regex and keyword field extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternFieldExtractor;

impl FieldExtractor for PatternFieldExtractor {
    fn extract(&self, text: &str) -> StructuredFields {
        StructuredFields {
            dates: unique_in_order(DATE_REGEX.find_iter(text).map(|m| m.as_str().to_string())),
            amounts: unique_in_order(
                AMOUNT_REGEX
                    .find_iter(text)
                    .map(|m| m.as_str().trim_end_matches(',').to_string()),
            ),
            references: extract_references(text),
            events: extract_events(text),
        }
    }
}

fn unique_in_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|i| seen.insert(i.clone())).collect()
}

fn extract_references(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = SLASH_REF_REGEX
        .find_iter(text)
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect();
    found.extend(LABELLED_REF_REGEX.captures_iter(text).filter_map(|c| {
        let m = c.get(1)?;
        // Must contain a digit; "Reference: Complaint" is not a reference.
        m.as_str()
            .chars()
            .any(|ch| ch.is_ascii_digit())
            .then(|| (m.start(), m.as_str().to_string()))
    }));
    found.sort_by_key(|(pos, _)| *pos);
    unique_in_order(found.into_iter().map(|(_, r)| r))
}

fn extract_events(text: &str) -> Vec<String> {
    let sentences = text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.len() > 10);

    let events = sentences.filter(|s| {
        let lower = s.to_lowercase();
        EVENT_KEYWORDS.iter().any(|k| lower.contains(k))
    });

    unique_in_order(events.map(|s| s.chars().take(MAX_EVENT_CHARS).collect()))
        .into_iter()
        .take(MAX_EVENTS)
        .collect()
}
