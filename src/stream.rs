//! Async adapter over buffered extraction
//!
//! Decoding is blocking, so [`ChunkStream`] moves the archive handle onto
//! tokio's blocking pool and forwards chunks through a bounded channel. A
//! full channel blocks the extractor, which keeps memory bounded by
//! `stream_capacity` chunks when the consumer is slower than the decoder.

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::types::{Chunk, ExtractionSummary};
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stream of one entry's chunks, produced on the blocking pool
///
/// Yields `Ok(chunk)` in entry order. If extraction fails the error is
/// yielded as the final item. Cancelling (or dropping the stream) makes the
/// extractor's next callback fail, so extraction stops with
/// [`Error::CallbackAborted`].
pub struct ChunkStream {
    inner: ReceiverStream<Result<Chunk>>,
    cancel: CancellationToken,
    handle: JoinHandle<(Archive, Option<ExtractionSummary>)>,
}

impl ChunkStream {
    /// Start extracting `entry` on the blocking pool
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(archive: Archive, entry: &str) -> Self {
        let (tx, rx) = mpsc::channel(archive.config().stream_capacity);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let entry = entry.to_string();

        debug!(archive = ?archive.path(), entry = %entry, "spawning chunk stream");

        let handle = tokio::task::spawn_blocking(move || {
            let mut archive = archive;
            let result = archive.extract_buffered(&entry, |chunk| {
                if token.is_cancelled() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "stream cancelled"));
                }
                tx.blocking_send(Ok(chunk))
                    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "stream dropped"))
            });

            match result {
                Ok(summary) => (archive, Some(summary)),
                Err(e) => {
                    debug!(entry = %entry, error = %e, "chunk stream ended with error");
                    // The receiver may already be gone
                    let _ = tx.blocking_send(Err(e));
                    (archive, None)
                }
            }
        });

        Self {
            inner: ReceiverStream::new(rx),
            cancel,
            handle,
        }
    }

    /// Ask the extractor to stop before its next chunk
    ///
    /// Chunks already queued are still yielded, followed by the
    /// `CallbackAborted` error.
    pub fn cancel(&self) {
        debug!("chunk stream cancelled");
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the extractor and take the archive handle back
    ///
    /// Unconsumed chunks are discarded. The summary is `None` when the
    /// extraction failed; the error itself was yielded by the stream.
    pub async fn finish(self) -> Result<(Archive, Option<ExtractionSummary>)> {
        let Self { inner, handle, .. } = self;
        // Unblocks an extractor waiting on a full channel
        drop(inner);

        handle
            .await
            .map_err(|e| Error::Other(format!("extraction task failed: {}", e)))
    }

    /// Wait for the extractor and return the archive handle
    pub async fn into_archive(self) -> Result<Archive> {
        let (archive, _summary) = self.finish().await?;
        Ok(archive)
    }
}

impl Stream for ChunkStream {
    type Item = Result<Chunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
