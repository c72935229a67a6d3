//! The upload boundary: store the bytes, then process them.

use crate::document::{DocumentRecord, DocumentType, RawDocument};
use crate::error::{StorageError, UploadError};
use crate::orchestrator::IngestionOrchestrator;
use crate::pipeline::DocumentFormat;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Signed URLs are valid for one hour unless asked otherwise.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 3600;

/// Blob storage for original uploads.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path`; returns the stored path.
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Time-limited URL for a stored object.
    async fn signed_url(&self, path: &str, expiry_secs: u64) -> Result<String, StorageError>;
}

/// `<case_id>/<document_type>/<unix_millis>_<filename>`
pub fn storage_path_for(
    case_id: &str,
    document_type: DocumentType,
    filename: &str,
    now_millis: i64,
) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    format!("{case_id}/{}/{now_millis}_{name}", document_type.as_str())
}

/// Upload `raw` to storage, then run it through the orchestrator.
pub async fn upload_and_process(
    storage: &dyn ObjectStorage,
    orchestrator: &IngestionOrchestrator,
    raw: RawDocument,
) -> Result<DocumentRecord, UploadError> {
    let path = storage_path_for(
        &raw.case_id,
        raw.document_type,
        &raw.filename,
        Utc::now().timestamp_millis(),
    );
    let content_type = DocumentFormat::from_filename(&raw.filename).content_type(&raw.filename);
    let stored = storage.upload(&path, &raw.bytes, content_type).await?;
    info!(case_id = %raw.case_id, path = %stored, content_type, "Upload stored");

    Ok(orchestrator.process(raw, &stored).await?)
}

/// Signed URL for a record's original file.
pub async fn document_url(
    storage: &dyn ObjectStorage,
    record: &DocumentRecord,
    expiry_secs: Option<u64>,
) -> Result<String, StorageError> {
    storage
        .signed_url(&record.file_path, expiry_secs.unwrap_or(DEFAULT_URL_EXPIRY_SECS))
        .await
}

// ── Local filesystem ─────────────────────────────────────────────────────

/// Objects as files under a root directory; URLs are `file://` with an
/// `expires` unix-seconds query parameter.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if path.is_empty() {
            return Err(invalid("empty path"));
        }
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::ParentDir => return Err(invalid("'..' is not allowed")),
                _ => return Err(invalid("must be a relative path")),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        let io = |source| StorageError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        tokio::fs::write(&target, bytes).await.map_err(io)?;
        Ok(path.to_string())
    }

    async fn signed_url(&self, path: &str, expiry_secs: u64) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        let absolute = match tokio::fs::canonicalize(&target).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_string(),
                    source,
                })
            }
        };
        let expires = expiry_timestamp(Utc::now().timestamp(), expiry_secs);
        Ok(format!("file://{}?expires={expires}", absolute.display()))
    }
}

/// Unix time `expiry_secs` after `now`, saturating instead of wrapping.
fn expiry_timestamp(now: i64, expiry_secs: u64) -> i64 {
    now.saturating_add(i64::try_from(expiry_secs).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_layout() {
        assert_eq!(
            storage_path_for(
                "case-1",
                DocumentType::AuthorityLetter,
                "letter.pdf",
                1_700_000_000_000,
            ),
            "case-1/hmrc_letter/1700000000000_letter.pdf"
        );
        assert_eq!(
            storage_path_for("c", DocumentType::Evidence, "C:\\scans\\fax.png", 5),
            "c/evidence/5_fax.png"
        );
    }

    #[test]
    fn storage_path_round_trips_filename() {
        let path = storage_path_for("c", DocumentType::Evidence, "my_scan.png", 1_712_345_678_901);
        assert_eq!(
            crate::orchestrator::filename_from_storage_path(&path),
            "my_scan.png"
        );
    }

    #[tokio::test]
    async fn local_storage_upload_and_sign() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let stored = storage
            .upload("c1/evidence/1_a.txt", b"hello", "text/plain")
            .await
            .unwrap();
        assert_eq!(stored, "c1/evidence/1_a.txt");
        assert_eq!(
            std::fs::read(dir.path().join("c1/evidence/1_a.txt")).unwrap(),
            b"hello"
        );

        let url = storage.signed_url(&stored, DEFAULT_URL_EXPIRY_SECS).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("1_a.txt?expires="));
    }

    #[tokio::test]
    async fn local_storage_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        for bad in ["../x", "/etc/passwd", ""] {
            let err = storage.upload(bad, b"x", "text/plain").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath { .. }), "{bad}");
        }
    }

    #[test]
    fn huge_expiry_saturates() {
        assert_eq!(expiry_timestamp(1_700_000_000, 3600), 1_700_003_600);
        assert_eq!(expiry_timestamp(1_700_000_000, u64::MAX), i64::MAX);
        assert_eq!(expiry_timestamp(1, i64::MAX as u64), i64::MAX);
    }

    #[tokio::test]
    async fn signing_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let err = storage.signed_url("c/none.pdf", 60).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
