//! Instrumentation hooks around buffered extraction
//!
//! Observers see the begin/end of every extraction call and each delivered
//! chunk. They are injected into an [`Archive`](crate::Archive) and never
//! influence extraction results.

use crate::error::Error;
use crate::types::{ChunkMeta, Event, ExtractionSummary};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Hooks invoked by the extractor; every method defaults to a no-op
pub trait ExtractionObserver: Send + Sync {
    /// An extraction call was entered, before the entry is resolved
    fn extraction_started(&self, _archive: &Path, _entry: &str) {}

    /// A chunk was handed to the consumer's callback
    fn chunk_delivered(&self, _entry: &str, _chunk: &ChunkMeta) {}

    /// The extraction call is about to return
    fn extraction_finished(
        &self,
        _archive: &Path,
        _entry: &str,
        _outcome: Result<&ExtractionSummary, &Error>,
    ) {
    }
}

/// Observer that ignores every hook
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Observer that emits `tracing` events as begin/end signposts
///
/// This is the default observer of an [`Archive`](crate::Archive).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExtractionObserver for TracingObserver {
    fn extraction_started(&self, archive: &Path, entry: &str) {
        info!(?archive, entry, "buffered extraction begin");
    }

    fn chunk_delivered(&self, entry: &str, chunk: &ChunkMeta) {
        trace!(
            entry,
            offset = chunk.offset,
            len = chunk.len,
            progress = chunk.progress,
            "chunk delivered"
        );
    }

    fn extraction_finished(
        &self,
        archive: &Path,
        entry: &str,
        outcome: Result<&ExtractionSummary, &Error>,
    ) {
        match outcome {
            Ok(summary) => info!(
                ?archive,
                entry,
                bytes = summary.bytes,
                chunks = summary.chunks,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "buffered extraction end"
            ),
            Err(e) => warn!(
                ?archive,
                entry,
                error = %e,
                code = e.error_code(),
                partial_output = !e.is_resolution_failure(),
                "buffered extraction failed"
            ),
        }
    }
}

/// Observer that forwards [`Event`]s to any number of subscribers
///
/// Events are dropped when nobody is subscribed; slow subscribers observe
/// `RecvError::Lagged` rather than slowing extraction down.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    event_tx: broadcast::Sender<Event>,
}

impl BroadcastObserver {
    /// Create an observer whose channel retains up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to extraction events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ExtractionObserver for BroadcastObserver {
    fn extraction_started(&self, archive: &Path, entry: &str) {
        self.emit(Event::ExtractionStarted {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
        });
    }

    fn chunk_delivered(&self, entry: &str, chunk: &ChunkMeta) {
        self.emit(Event::ChunkDelivered {
            entry: entry.to_string(),
            offset: chunk.offset,
            len: chunk.len,
            progress: chunk.progress,
        });
    }

    fn extraction_finished(
        &self,
        archive: &Path,
        entry: &str,
        outcome: Result<&ExtractionSummary, &Error>,
    ) {
        let event = match outcome {
            Ok(summary) => Event::ExtractionCompleted {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
                bytes: summary.bytes,
                chunks: summary.chunks,
                elapsed_ms: summary.elapsed.as_millis() as u64,
            },
            Err(e) => Event::ExtractionFailed {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
                error_code: e.error_code().to_string(),
                error: e.to_string(),
                partial_output: !e.is_resolution_failure(),
            },
        };
        self.emit(event);
    }
}
