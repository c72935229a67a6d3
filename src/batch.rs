//! Bounded-concurrency ingestion of many documents.
//!
//! Each document still runs the sequential per-document workflow; this module
//! only caps how many run at once (`IngestConfig::concurrency`) so a large
//! upload cannot fan out into an unbounded number of inference calls.
//! Results come back in submission order.

use crate::document::{DocumentRecord, RawDocument};
use crate::error::ProcessingError;
use crate::orchestrator::IngestionOrchestrator;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::info;

/// One document to ingest and where its bytes are stored.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub raw: RawDocument,
    pub storage_path: String,
}

impl BatchItem {
    pub fn new(raw: RawDocument, storage_path: impl Into<String>) -> Self {
        Self {
            raw,
            storage_path: storage_path.into(),
        }
    }
}

/// Outcome of one batch, in submission order.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<Result<DocumentRecord, ProcessingError>>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn stored(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.stored()
    }

    pub fn records(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }
}

/// Ingest `items` with at most `concurrency` documents in flight.
pub async fn process_batch(
    orchestrator: &IngestionOrchestrator,
    items: Vec<BatchItem>,
    progress: Option<ProgressCallback>,
) -> BatchReport {
    let start = Instant::now();
    let total = items.len();
    let concurrency = orchestrator.config().concurrency.max(1);
    info!(total, concurrency, "Starting batch ingestion");

    if let Some(cb) = &progress {
        cb.on_batch_start(total);
    }

    let mut indexed: Vec<(usize, Result<DocumentRecord, ProcessingError>)> =
        stream::iter(items.into_iter().enumerate().map(|(index, item)| {
            let progress = progress.clone();
            async move {
                let filename = item.raw.filename.clone();
                if let Some(cb) = &progress {
                    cb.on_document_start(index, total, &filename);
                }

                let result = orchestrator.process(item.raw, &item.storage_path).await;

                if let Some(cb) = &progress {
                    match &result {
                        Ok(record) => cb.on_document_complete(
                            index,
                            total,
                            &filename,
                            record.is_fully_analyzed(),
                        ),
                        Err(e) => cb.on_document_error(index, total, &filename, &e.to_string()),
                    }
                }
                (index, result)
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    let report = BatchReport {
        results: indexed.into_iter().map(|(_, r)| r).collect(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if let Some(cb) = &progress {
        cb.on_batch_complete(total, report.stored());
    }
    info!(
        total,
        stored = report.stored(),
        failed = report.failed(),
        duration_ms = report.duration_ms,
        "Batch ingestion complete"
    );
    report
}
