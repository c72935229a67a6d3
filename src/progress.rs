//! Progress-callback trait for batch ingestion events.
//!
//! Pass an [`Arc<dyn IngestionProgressCallback>`] to
//! [`crate::batch::process_batch`] to receive events as each document moves
//! through the pipeline. The CLI uses it to drive an `indicatif` bar.
//!
//! # Example
//!
//! ```rust
//! use evidence_ingest::IngestionProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Counting {
//!     stored: AtomicUsize,
//! }
//!
//! impl IngestionProgressCallback for Counting {
//!     fn on_document_complete(&self, _index: usize, _total: usize, _filename: &str, _analysed: bool) {
//!         self.stored.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by [`crate::batch::process_batch`] as documents are ingested.
///
/// Documents are processed concurrently, so every method may be called from
/// several tasks at once; guard shared state with atomics or a mutex. All
/// methods default to no-ops.
pub trait IngestionProgressCallback: Send + Sync {
    /// Called once before any document starts.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a document enters the pipeline. `index` is 0-based in
    /// submission order.
    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document has been stored. `fully_analysed` is true when
    /// both deep analysis and embedding completed.
    fn on_document_complete(
        &self,
        index: usize,
        total: usize,
        filename: &str,
        fully_analysed: bool,
    ) {
        let _ = (index, total, filename, fully_analysed);
    }

    /// Called when a document could not be stored.
    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total: usize, stored: usize) {
        let _ = (total, stored);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestionProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn IngestionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        stored_total: AtomicUsize,
    }

    impl IngestionProgressCallback for Tracking {
        fn on_document_start(&self, _index: usize, _total: usize, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _i: usize, _t: usize, _f: &str, _full: bool) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _i: usize, _t: usize, _f: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, stored: usize) {
            self.stored_total.store(stored, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_document_start(0, 2, "a.pdf");
        cb.on_document_complete(0, 2, "a.pdf", true);
        cb.on_document_error(1, 2, "b.pdf", "store down");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_document_start(0, 2, "a.pdf");
        t.on_document_complete(0, 2, "a.pdf", false);
        t.on_document_start(1, 2, "b.png");
        t.on_document_error(1, 2, "b.png", "store down");
        t.on_batch_complete(2, 1);

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.stored_total.load(Ordering::SeqCst), 1);
    }
}
