//! Native (non-OCR) text extraction for PDF, Word, plain text and
//! spreadsheets.
//!
//! Everything here is synchronous and CPU-bound; [`super::extract`] runs it
//! inside `spawn_blocking`. No system libraries are needed.

use super::format::SpreadsheetKind;
use calamine::{open_workbook_auto_from_rs, Reader};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a native extractor produced no text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NativeExtractionError {
    #[error("PDF parse error: {0}")]
    Pdf(String),

    #[error("PDF parser panicked (likely a malformed font or glyph table)")]
    PdfPanicked,

    /// Parsed fine, but no text layer (scanned pages).
    #[error("PDF has no text layer")]
    NoTextLayer,

    #[error("Word document parse error: {0}")]
    Word(String),

    /// OLE2 compound file (pre-2007 `.doc`), not readable as OOXML.
    #[error("legacy binary .doc format")]
    LegacyWord,

    #[error("Spreadsheet parse error: {0}")]
    Spreadsheet(String),
}

/// OLE2 compound-file signature shared by `.doc` and `.xls`.
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

// ── PDF ──────────────────────────────────────────────────────────────────

pub fn extract_pdf(bytes: &[u8]) -> Result<String, NativeExtractionError> {
    // pdf-extract (and its cff-parser dependency) can panic on odd fonts.
    let text = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(Ok(t)) => t,
        Ok(Err(e)) => {
            warn!(error = %e, "PDF text extraction failed");
            return Err(NativeExtractionError::Pdf(e.to_string()));
        }
        Err(_) => {
            warn!("PDF text extraction panicked");
            return Err(NativeExtractionError::PdfPanicked);
        }
    };

    if text.trim().is_empty() {
        return Err(NativeExtractionError::NoTextLayer);
    }
    debug!(chars = text.chars().count(), "PDF text layer extracted");
    Ok(text)
}

// ── Word ─────────────────────────────────────────────────────────────────

pub fn extract_word(bytes: &[u8]) -> Result<String, NativeExtractionError> {
    if bytes.starts_with(&OLE2_MAGIC) {
        return Err(NativeExtractionError::LegacyWord);
    }

    let doc = docx_rs::read_docx(bytes).map_err(|e| NativeExtractionError::Word(e.to_string()))?;

    let mut out = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                push_paragraph(para, &mut out);
                out.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    let mut cells = Vec::with_capacity(tr.cells.len());
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        let mut cell_text = String::new();
                        for content in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(para) = content {
                                if !cell_text.is_empty() {
                                    cell_text.push(' ');
                                }
                                push_paragraph(para, &mut cell_text);
                            }
                        }
                        cells.push(cell_text.trim().to_string());
                    }
                    out.push_str(&cells.join(" | "));
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn push_paragraph(para: &docx_rs::Paragraph, out: &mut String) {
    for child in &para.children {
        push_paragraph_child(child, out);
    }
}

fn push_paragraph_child(child: &docx_rs::ParagraphChild, out: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(text) => out.push_str(&text.text),
                    docx_rs::RunChild::Tab(_) => out.push('\t'),
                    docx_rs::RunChild::Break(_) => out.push('\n'),
                    _ => {}
                }
            }
        }
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for inner in &link.children {
                push_paragraph_child(inner, out);
            }
        }
        _ => {}
    }
}

// ── Plain text ───────────────────────────────────────────────────────────

/// Lossy UTF-8 decode. Never fails.
pub fn extract_plain(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{FEFF}').unwrap_or(&text).to_string()
}

// ── Spreadsheets ─────────────────────────────────────────────────────────

fn sheet_header(name: &str) -> String {
    format!("=== Sheet: {name} ===")
}

pub fn extract_spreadsheet(
    bytes: &[u8],
    kind: SpreadsheetKind,
) -> Result<String, NativeExtractionError> {
    match kind {
        SpreadsheetKind::Csv => Ok(extract_csv(bytes)),
        SpreadsheetKind::Xlsx | SpreadsheetKind::Xls => extract_workbook(bytes),
    }
}

/// A CSV file is one sheet named `Sheet1`; non-blank lines kept in order.
fn extract_csv(bytes: &[u8]) -> String {
    let text = extract_plain(bytes);
    let rows: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    format!("{}\n{}", sheet_header("Sheet1"), rows.join("\n"))
}

fn extract_workbook(bytes: &[u8]) -> Result<String, NativeExtractionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| NativeExtractionError::Spreadsheet(e.to_string()))?;

    let mut blocks = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                warn!(sheet = %name, error = %e, "Skipping unreadable sheet");
                continue;
            }
        };

        let mut block = sheet_header(&name);
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            block.push('\n');
            block.push_str(&csv_row(&cells));
        }
        blocks.push(block);
    }

    debug!(sheets = blocks.len(), "Workbook extracted");
    Ok(blocks.join("\n\n"))
}

/// Join cells as one CSV line, quoting where needed.
fn csv_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| {
            if c.contains([',', '"', '\n']) {
                format!("\"{}\"", c.replace('"', "\"\""))
            } else {
                c.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_keeps_rows_in_order_under_one_sheet() {
        let csv = b"Section A,Amount\r\nPenalty,100\r\n\r\nSection B,Amount\nRefund,250\n\n";
        let out = extract_spreadsheet(csv, SpreadsheetKind::Csv).unwrap();
        assert!(out.starts_with("=== Sheet: Sheet1 ==="));
        let a = out.find("Section A").unwrap();
        let b = out.find("Section B").unwrap();
        assert!(a < b);
        assert!(!out.contains("\n\n"), "blank lines dropped: {out:?}");
    }

    #[test]
    fn empty_csv_yields_empty_text() {
        assert_eq!(extract_spreadsheet(b"\n \n", SpreadsheetKind::Csv).unwrap(), "");
    }

    #[test]
    fn plain_text_is_lossy_and_strips_bom() {
        let bytes = [&[0xEF, 0xBB, 0xBF][..], b"ok ", &[0xFF], b" done"].concat();
        let out = extract_plain(&bytes);
        assert!(out.starts_with("ok "));
        assert!(out.contains('\u{FFFD}'));
    }

    #[test]
    fn garbage_pdf_is_an_error_not_a_panic() {
        let err = extract_pdf(b"definitely not a pdf").unwrap_err();
        assert!(matches!(
            err,
            NativeExtractionError::Pdf(_) | NativeExtractionError::PdfPanicked
        ));
    }

    #[test]
    fn legacy_doc_is_detected() {
        let mut bytes = OLE2_MAGIC.to_vec();
        bytes.extend_from_slice(&[0; 64]);
        assert_eq!(extract_word(&bytes), Err(NativeExtractionError::LegacyWord));
    }

    #[test]
    fn garbage_docx_is_an_error() {
        assert!(matches!(
            extract_word(b"PK not really a zip"),
            Err(NativeExtractionError::Word(_))
        ));
    }

    #[test]
    fn garbage_workbook_is_an_error() {
        assert!(matches!(
            extract_spreadsheet(b"nope", SpreadsheetKind::Xlsx),
            Err(NativeExtractionError::Spreadsheet(_))
        ));
    }

    fn docx_bytes(doc: docx_rs::Docx) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        doc.build().pack(&mut cursor).unwrap();
        cursor.into_inner()
    }

    fn cell(text: &str) -> docx_rs::TableCell {
        docx_rs::TableCell::new().add_paragraph(
            docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(text)),
        )
    }

    #[test]
    fn docx_paragraphs_then_table_rows() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableRow};

        let doc = Docx::new()
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Ref BT/2024/12345"))
                    .add_run(Run::new().add_text(" dated 15 March 2024")),
            )
            .add_table(Table::new(vec![
                TableRow::new(vec![cell("Date"), cell("Amount")]),
                TableRow::new(vec![cell("15/03/2024"), cell("£100")]),
            ]));

        let out = extract_word(&docx_bytes(doc)).unwrap();
        let lines: Vec<&str> = out.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(
            lines,
            [
                "Ref BT/2024/12345 dated 15 March 2024",
                "Date | Amount",
                "15/03/2024 | £100"
            ]
        );
    }

    #[test]
    fn workbook_sheets_in_order_without_blank_rows() {
        // Sheets "Zeta" then "Alpha"; Zeta has an empty row between its two
        // data rows.
        let bytes = include_bytes!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/test_cases/two_sheets.xlsx"
        ));
        let out = extract_spreadsheet(bytes, SpreadsheetKind::Xlsx).unwrap();
        assert_eq!(
            out,
            "=== Sheet: Zeta ===\nPenalty,100\nAppeal,\n\n=== Sheet: Alpha ===\nCall"
        );
    }

    #[test]
    fn csv_row_quotes_when_needed() {
        let row = csv_row(&["a".into(), "b,c".into(), "say \"hi\"".into()]);
        assert_eq!(row, "a,\"b,c\",\"say \"\"hi\"\"\"");
    }
}
