//! Buffered extraction of a single entry
//!
//! The backend pushes decoded bytes in whatever block sizes its decoder
//! produces. [`BufferedExtractor`] re-blocks them into chunks of the
//! configured size, attaches offset and progress, and hands each chunk to
//! the caller's callback before asking the backend for more.
//!
//! One full chunk is held back so that the last chunk delivered is always
//! known to be last and carries progress `1.0`. Peak memory is therefore
//! about two chunks regardless of entry size.

use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::extraction::{ArchiveBackend, EntrySink};
use crate::observer::ExtractionObserver;
use crate::types::{Chunk, ExtractionState, ExtractionSummary, FileInfo};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Runs one buffered extraction against a backend
pub struct BufferedExtractor<'a> {
    backend: &'a dyn ArchiveBackend,
    config: &'a ExtractorConfig,
    observer: &'a dyn ExtractionObserver,
    state: ExtractionState,
}

impl<'a> BufferedExtractor<'a> {
    /// Create an extractor in the `NotStarted` state
    pub fn new(
        backend: &'a dyn ArchiveBackend,
        config: &'a ExtractorConfig,
        observer: &'a dyn ExtractionObserver,
    ) -> Self {
        Self {
            backend,
            config,
            observer,
            state: ExtractionState::NotStarted,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Extract `entry`, invoking `on_chunk` once per chunk, in order
    ///
    /// On success every byte of the entry has been delivered and the last
    /// chunk carried progress `1.0`. On failure, chunks already delivered
    /// stay delivered; discarding partial output is up to the caller.
    pub fn run<F>(&mut self, entry: &str, on_chunk: F) -> Result<ExtractionSummary>
    where
        F: FnMut(Chunk) -> std::io::Result<()>,
    {
        let archive = self.backend.path();
        let started = Instant::now();
        self.observer.extraction_started(archive, entry);
        self.state = ExtractionState::Extracting;

        let result = self.extract(entry, on_chunk, started);

        self.state = match result {
            Ok(_) => ExtractionState::Completed,
            Err(_) => ExtractionState::Failed,
        };
        self.observer
            .extraction_finished(archive, entry, result.as_ref());
        result
    }

    fn extract<F>(&self, entry: &str, on_chunk: F, started: Instant) -> Result<ExtractionSummary>
    where
        F: FnMut(Chunk) -> std::io::Result<()>,
    {
        if !self.backend.is_reachable() {
            return Err(Error::ArchiveNotFound {
                path: self.backend.path().to_path_buf(),
            });
        }

        debug!(
            archive = ?self.backend.path(),
            entry,
            format = self.backend.format().name(),
            chunk_size = self.config.chunk_size,
            "starting buffered extraction"
        );

        let mut sink = ChunkSink::new(
            self.backend.path(),
            entry,
            self.config,
            self.observer,
            on_chunk,
        );
        self.backend.stream_entry(entry, &mut sink)?;
        let (bytes, chunks) = sink.finish()?;

        Ok(ExtractionSummary {
            entry: entry.to_string(),
            bytes,
            chunks,
            elapsed: started.elapsed(),
            sha256: None,
        })
    }
}

/// Re-blocking sink between a backend and the caller's callback
struct ChunkSink<'a, F> {
    archive: &'a Path,
    entry: &'a str,
    chunk_size: usize,
    verify_size: bool,
    observer: &'a dyn ExtractionObserver,
    on_chunk: F,
    declared: Option<u64>,
    buffer: Vec<u8>,
    pending: Option<Vec<u8>>,
    received: u64,
    delivered: u64,
    chunks: u64,
}

impl<'a, F> ChunkSink<'a, F>
where
    F: FnMut(Chunk) -> std::io::Result<()>,
{
    fn new(
        archive: &'a Path,
        entry: &'a str,
        config: &ExtractorConfig,
        observer: &'a dyn ExtractionObserver,
        on_chunk: F,
    ) -> Self {
        Self {
            archive,
            entry,
            chunk_size: config.chunk_size.max(1),
            verify_size: config.verify_size,
            observer,
            on_chunk,
            declared: None,
            buffer: Vec::new(),
            pending: None,
            received: 0,
            delivered: 0,
            chunks: 0,
        }
    }

    fn progress_after(&self, len: usize, last: bool) -> f64 {
        if last {
            return 1.0;
        }
        match self.declared {
            Some(total) if total > 0 => {
                ((self.delivered + len as u64) as f64 / total as f64).min(1.0)
            }
            _ => 0.0,
        }
    }

    fn deliver(&mut self, data: Vec<u8>, last: bool) -> Result<()> {
        let len = data.len();
        let chunk = Chunk::new(data, self.delivered, self.progress_after(len, last), last);
        let meta = chunk.meta();

        (self.on_chunk)(chunk).map_err(|source| Error::CallbackAborted {
            entry: self.entry.to_string(),
            offset: self.delivered,
            source,
        })?;

        self.delivered += len as u64;
        self.chunks += 1;
        self.observer.chunk_delivered(self.entry, &meta);
        Ok(())
    }

    /// Flush the held-back data as the final chunk
    fn finish(mut self) -> Result<(u64, u64)> {
        let Some(declared) = self.declared else {
            // Backends report a missing entry before touching the sink
            return Err(Error::entry_not_found(self.archive, self.entry));
        };

        if self.received != declared {
            if self.verify_size {
                return Err(Error::corrupt(
                    self.archive,
                    format!(
                        "entry {:?} decoded to {} bytes, directory records {}",
                        self.entry, self.received, declared
                    ),
                ));
            }
            warn!(
                archive = ?self.archive,
                entry = self.entry,
                received = self.received,
                declared,
                "decoded size differs from directory size"
            );
        }

        let tail = std::mem::take(&mut self.buffer);
        match self.pending.take() {
            Some(held) if tail.is_empty() => self.deliver(held, true)?,
            Some(held) => {
                self.deliver(held, false)?;
                self.deliver(tail, true)?;
            }
            // Also covers empty entries: a single empty chunk at progress 1.0
            None => self.deliver(tail, true)?,
        }

        Ok((self.delivered, self.chunks))
    }
}

impl<F> EntrySink for ChunkSink<'_, F>
where
    F: FnMut(Chunk) -> std::io::Result<()>,
{
    fn begin(&mut self, info: &FileInfo) -> Result<()> {
        debug!(
            archive = ?self.archive,
            entry = %info.filename,
            unpacked_size = info.unpacked_size,
            "entry resolved"
        );
        self.declared = Some(info.unpacked_size);
        self.buffer = Vec::with_capacity(self.chunk_size.min(info.unpacked_size as usize));
        Ok(())
    }

    fn write(&mut self, mut data: &[u8]) -> Result<()> {
        self.received += data.len() as u64;
        if self.verify_size
            && let Some(declared) = self.declared
            && self.received > declared
        {
            return Err(Error::corrupt(
                self.archive,
                format!(
                    "entry {:?} decoded past its directory size of {} bytes",
                    self.entry, declared
                ),
            ));
        }

        while !data.is_empty() {
            let room = self.chunk_size - self.buffer.len();
            let take = room.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == self.chunk_size {
                let full = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
                if let Some(held) = self.pending.replace(full) {
                    self.deliver(held, false)?;
                }
            }
        }
        Ok(())
    }
}
