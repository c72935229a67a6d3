//! Persistence of [`DocumentRecord`]s.
//!
//! The orchestrator only needs [`DocumentStore::insert`]; `get` and
//! `list_for_case` serve the CLI and downstream retrieval. Two reference
//! stores ship with the crate: [`MemoryDocumentStore`] for tests and
//! embedding, and [`JsonDirStore`], one pretty-printed JSON file per record
//! under `<root>/<case>/<id>.json`.

use crate::document::{DocumentRecord, NewDocumentRecord};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a record, assigning its id and upload timestamp.
    async fn insert(&self, record: NewDocumentRecord) -> Result<DocumentRecord, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError>;

    /// A case's documents, newest first.
    async fn list_for_case(&self, case_id: &str) -> Result<Vec<DocumentRecord>, StoreError>;
}

fn newest_first(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
}

// ── In-memory ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<Vec<DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, record: NewDocumentRecord) -> Result<DocumentRecord, StoreError> {
        let record = DocumentRecord::from_new(record, Uuid::new_v4(), Utc::now());
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_for_case(&self, case_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut out: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.case_id == case_id)
            .cloned()
            .collect();
        newest_first(&mut out);
        Ok(out)
    }
}

// ── JSON directory ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

/// Case ids become directory names; anything outside `[A-Za-z0-9_-]` is
/// replaced so an id can never escape the root.
fn case_dir_name(case_id: &str) -> String {
    let name: String = case_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn case_dir(&self, case_id: &str) -> PathBuf {
        self.root.join(case_dir_name(case_id))
    }

    async fn read_record(path: &Path) -> Result<DocumentRecord, StoreError> {
        let bytes = tokio::fs::read(path).await.map_err(io_err(path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read_dir_records(dir: &Path) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(dir)(e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(Self::read_record(&path).await?);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn insert(&self, record: NewDocumentRecord) -> Result<DocumentRecord, StoreError> {
        let record = DocumentRecord::from_new(record, Uuid::new_v4(), Utc::now());
        let dir = self.case_dir(&record.case_id);
        tokio::fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let json = serde_json::to_vec_pretty(&record)?;
        let path = dir.join(format!("{}.json", record.id));

        // Atomic write: temp file, then rename.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(io_err(&tmp_path))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(io_err(&path))?;

        debug!(path = %path.display(), bytes = json.len(), "Record written");
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        let mut cases = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&self.root)(e)),
        };
        let file_name = format!("{id}.json");
        while let Some(entry) = cases.next_entry().await.map_err(io_err(&self.root))? {
            let candidate = entry.path().join(&file_name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Self::read_record(&candidate).await.map(Some);
            }
        }
        Ok(None)
    }

    async fn list_for_case(&self, case_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut out: Vec<_> = Self::read_dir_records(&self.case_dir(case_id))
            .await?
            .into_iter()
            .filter(|r| r.case_id == case_id)
            .collect();
        newest_first(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::*;

    fn new_record(case_id: &str, filename: &str) -> NewDocumentRecord {
        NewDocumentRecord {
            case_id: case_id.into(),
            document_type: DocumentType::AuthorityLetter,
            file_path: format!("{case_id}/hmrc_letter/1_{filename}"),
            filename: filename.into(),
            processed_data: ProcessedData {
                fields: StructuredFields {
                    dates: vec!["15 March 2024".into()],
                    references: vec!["BT/2024/12345".into()],
                    ..Default::default()
                },
                metadata: DerivedMetadata {
                    raw_text_length: 120,
                    extraction_method: ExtractionMethod::NativePdf,
                    extraction_succeeded: true,
                    has_embedding: true,
                    has_deep_analysis: false,
                    analysis: StageStatus::Failed {
                        model: "m".into(),
                        reason: "HTTP 500".into(),
                    },
                    embedding: StageStatus::Completed { model: "e".into() },
                },
            },
            deep_analysis: None,
            embedding: Some(vec![0.25, -1.5, 3.0]),
        }
    }

    #[tokio::test]
    async fn memory_store_lists_newest_first() {
        let store = MemoryDocumentStore::new();
        let a = store.insert(new_record("c1", "a.pdf")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = store.insert(new_record("c1", "b.pdf")).await.unwrap();
        store.insert(new_record("c2", "x.pdf")).await.unwrap();

        let listed = store.list_for_case("c1").await.unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), [b.id, a.id]);
        assert_eq!(store.get(a.id).await.unwrap().unwrap().filename, "a.pdf");
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let inserted = store.insert(new_record("case-7", "letter.pdf")).await.unwrap();

        let read = store.get(inserted.id).await.unwrap().expect("record on disk");
        assert_eq!(read, inserted);
        assert_eq!(read.processed_data.metadata.extraction_method, ExtractionMethod::NativePdf);
        assert!(read.metadata().has_embedding);
        assert!(!read.metadata().has_deep_analysis);

        let listed = store.list_for_case("case-7").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.list_for_case("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hostile_case_id_stays_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        store.insert(new_record("../../etc", "a.txt")).await.unwrap();
        assert!(dir.path().join("______etc").is_dir());
        assert_eq!(store.list_for_case("../../etc").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let store = JsonDirStore::new("/nonexistent/evidence-store");
        assert!(store.list_for_case("c").await.unwrap().is_empty());
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
