//! Text-extraction stages.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ pdf ─────────── native (pdf-extract) ─┐
//!            ├─ docx/doc ────── native (docx-rs) ─────┤
//! format ────┼─ txt ─────────── native (lossy utf-8) ─┼──▶ postprocess ──▶ ExtractedText
//!            ├─ xlsx/xls/csv ── native (calamine) ────┤
//!            ├─ image ───────── encode ──▶ ocr (VLM) ─┤
//!            └─ other ───────── placeholder ──────────┘
//! ```
//!
//! 1. [`format`]      : resolve the extension once into a closed enum
//! 2. [`native`]      : synchronous extractors, run in `spawn_blocking`
//! 3. [`encode`]      : MIME sniffing, downscaling, data-URI wrapping
//! 4. [`ocr`]         : the only stage with network I/O; bounded by a timeout
//! 5. [`postprocess`] : deterministic cleanup of whatever text came out
//! 6. [`placeholder`] : texts stored when there is no real content
//!
//! [`extract::ExtractionAdapter`] ties them together.

pub mod encode;
pub mod extract;
pub mod format;
pub mod native;
pub mod ocr;
pub mod placeholder;
pub mod postprocess;

pub use extract::ExtractionAdapter;
pub use format::DocumentFormat;
