//! Extension → format dispatch, resolved once per document.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetKind {
    Xlsx,
    Xls,
    Csv,
}

/// Every format the extraction adapter knows how to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    /// `.docx` and legacy `.doc`.
    Word,
    PlainText,
    Spreadsheet { kind: SpreadsheetKind },
    Image,
    /// Lower-cased extension, empty when the filename has none.
    Unsupported { extension: String },
}

pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"];

/// Lower-cased text after the last `.` of the final path segment.
pub fn extension_of(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Self {
        let ext = extension_of(filename);
        match ext.as_str() {
            "pdf" => DocumentFormat::Pdf,
            "docx" | "doc" => DocumentFormat::Word,
            "txt" => DocumentFormat::PlainText,
            "xlsx" => DocumentFormat::Spreadsheet {
                kind: SpreadsheetKind::Xlsx,
            },
            "xls" => DocumentFormat::Spreadsheet {
                kind: SpreadsheetKind::Xls,
            },
            "csv" => DocumentFormat::Spreadsheet {
                kind: SpreadsheetKind::Csv,
            },
            e if IMAGE_EXTENSIONS.contains(&e) => DocumentFormat::Image,
            _ => DocumentFormat::Unsupported { extension: ext },
        }
    }

    /// MIME type used when storing the upload.
    pub fn content_type(&self, filename: &str) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Word => {
                if extension_of(filename) == "doc" {
                    "application/msword"
                } else {
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                }
            }
            DocumentFormat::PlainText => "text/plain",
            DocumentFormat::Spreadsheet { kind } => match kind {
                SpreadsheetKind::Xlsx => {
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                }
                SpreadsheetKind::Xls => "application/vnd.ms-excel",
                SpreadsheetKind::Csv => "text/csv",
            },
            DocumentFormat::Image => match extension_of(filename).as_str() {
                "jpg" | "jpeg" => "image/jpeg",
                "gif" => "image/gif",
                "bmp" => "image/bmp",
                "tif" | "tiff" => "image/tiff",
                "webp" => "image/webp",
                _ => "image/png",
            },
            DocumentFormat::Unsupported { .. } => "application/octet-stream",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::Word => f.write_str("word"),
            DocumentFormat::PlainText => f.write_str("text"),
            DocumentFormat::Spreadsheet { kind } => write!(f, "spreadsheet ({kind:?})"),
            DocumentFormat::Image => f.write_str("image"),
            DocumentFormat::Unsupported { extension } => write!(f, "unsupported (.{extension})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_filename("Letter.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("scan.JpEg"), DocumentFormat::Image);
        assert_eq!(
            DocumentFormat::from_filename("ledger.CSV"),
            DocumentFormat::Spreadsheet {
                kind: SpreadsheetKind::Csv
            }
        );
    }

    #[test]
    fn every_image_extension_is_an_image() {
        for ext in IMAGE_EXTENSIONS {
            assert_eq!(
                DocumentFormat::from_filename(&format!("x.{ext}")),
                DocumentFormat::Image,
                "{ext}"
            );
        }
    }

    #[test]
    fn unknown_and_missing_extensions() {
        assert_eq!(
            DocumentFormat::from_filename("bundle.zip"),
            DocumentFormat::Unsupported {
                extension: "zip".into()
            }
        );
        assert_eq!(
            DocumentFormat::from_filename("README"),
            DocumentFormat::Unsupported {
                extension: String::new()
            }
        );
        // Dot-files have no extension
        assert_eq!(extension_of(".env"), "");
    }

    #[test]
    fn extension_uses_last_path_segment() {
        assert_eq!(extension_of("case.v2/evidence/1700_scan.png"), "png");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
    }

    #[test]
    fn content_types() {
        let f = DocumentFormat::from_filename("a.jpg");
        assert_eq!(f.content_type("a.jpg"), "image/jpeg");
        assert_eq!(DocumentFormat::Word.content_type("old.doc"), "application/msword");
    }
}
