//! The archive handle
//!
//! [`Archive`] ties together the detected format, a decoder backend, the
//! extractor configuration and an observer. Every operation re-checks that
//! the archive is still reachable and re-opens it through the backend, so a
//! handle never caches decoder state between calls.

use crate::buffered::BufferedExtractor;
use crate::config::{ExtractorConfig, FileCollisionAction};
use crate::error::{Error, Result};
use crate::extraction::{self, ArchiveBackend, detect_archive_type};
use crate::observer::{ExtractionObserver, TracingObserver};
use crate::stream::ChunkStream;
use crate::types::{ArchiveFormat, Chunk, ExtractionState, ExtractionSummary, FileInfo};
use crate::utils::Checksum;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Open archive handle
///
/// Extraction methods take `&mut self`: a handle runs at most one
/// extraction at a time. Open one handle per thread for parallel work.
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
    backend: Box<dyn ArchiveBackend>,
    config: ExtractorConfig,
    observer: Arc<dyn ExtractionObserver>,
    last_state: ExtractionState,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("config", &self.config)
            .field("last_state", &self.last_state)
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Open the archive at `path` with the default configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, ExtractorConfig::default())
    }

    /// Open the archive at `path`
    ///
    /// The format is detected from the file's magic bytes, falling back to
    /// its extension.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `config` fails validation
    /// - [`Error::ArchiveNotFound`] if `path` is not a readable file
    /// - [`Error::UnsupportedFormat`] if the format cannot be detected
    pub fn open_with_config(path: impl AsRef<Path>, config: ExtractorConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;

        if !path.is_file() {
            return Err(Error::ArchiveNotFound {
                path: path.to_path_buf(),
            });
        }

        let format = detect_archive_type(path)?.ok_or_else(|| Error::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let backend = extraction::open_backend(path, format);

        info!(archive = ?path, format = format.name(), "opened archive");
        Self::with_backend(backend, config)
    }

    /// Wrap an existing backend
    pub fn with_backend(backend: Box<dyn ArchiveBackend>, config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            path: backend.path().to_path_buf(),
            format: backend.format(),
            backend,
            config,
            observer: Arc::new(TracingObserver),
            last_state: ExtractionState::NotStarted,
        })
    }

    /// Replace the observer (default: [`TracingObserver`])
    pub fn with_observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Path of the archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected format
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Configuration in effect
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// State reached by the most recent buffered extraction
    pub fn last_extraction_state(&self) -> ExtractionState {
        self.last_state
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.backend.is_reachable() {
            Ok(())
        } else {
            Err(Error::ArchiveNotFound {
                path: self.path.clone(),
            })
        }
    }

    /// Entry names in archive order
    pub fn list_filenames(&self) -> Result<Vec<String>> {
        Ok(self
            .list_file_info()?
            .into_iter()
            .map(|info| info.filename)
            .collect())
    }

    /// Entry metadata in archive order
    pub fn list_file_info(&self) -> Result<Vec<FileInfo>> {
        self.ensure_reachable()?;
        self.backend.list()
    }

    /// Metadata of a single entry
    pub fn file_info(&self, name: &str) -> Result<FileInfo> {
        self.list_file_info()?
            .into_iter()
            .find(|info| extraction::entry_name_matches(&info.filename, name))
            .ok_or_else(|| Error::entry_not_found(&self.path, name))
    }

    /// Extract one entry, handing it to `on_chunk` in bounded chunks
    ///
    /// Chunks arrive in order, each at most `chunk_size` bytes, with a
    /// non-decreasing progress value that is exactly `1.0` on the last one.
    /// Returning an error from `on_chunk` stops extraction with
    /// [`Error::CallbackAborted`]. Chunks delivered before a failure are not
    /// retracted.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::io::Write;
    /// use unrar_kit::Archive;
    ///
    /// # fn main() -> unrar_kit::Result<()> {
    /// let mut archive = Archive::open("media.rar")?;
    /// let mut out = std::fs::File::create("video.mkv")?;
    /// archive.extract_buffered("video.mkv", |chunk| {
    ///     println!("{:.0}%", chunk.progress() * 100.0);
    ///     out.write_all(&chunk)
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn extract_buffered<F>(&mut self, entry: &str, on_chunk: F) -> Result<ExtractionSummary>
    where
        F: FnMut(Chunk) -> std::io::Result<()>,
    {
        self.last_state = ExtractionState::Extracting;
        let mut extractor =
            BufferedExtractor::new(self.backend.as_ref(), &self.config, self.observer.as_ref());
        let result = extractor.run(entry, on_chunk);
        self.last_state = extractor.state();
        result
    }

    /// Extract one entry into memory
    pub fn extract_data(&mut self, entry: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.extract_buffered(entry, |chunk| {
            data.extend_from_slice(&chunk);
            Ok(())
        })?;
        Ok(data)
    }

    /// Extract one entry below `dest`, replacing the target only on success
    ///
    /// Bytes are written to a temporary file in the target directory, synced,
    /// and renamed into place. On failure the temporary file is removed and any
    /// existing target is left untouched. The returned summary carries the
    /// SHA-256 of the written bytes.
    pub fn extract_entry_to_file(
        &mut self,
        entry: &str,
        dest: &Path,
        collision: FileCollisionAction,
    ) -> Result<ExtractionSummary> {
        self.ensure_reachable()?;
        std::fs::create_dir_all(dest)?;

        let relative = extraction::sanitize_entry_path(entry).ok_or_else(|| Error::InvalidPath {
            path: PathBuf::from(entry),
            reason: "entry name escapes the destination directory".to_string(),
        })?;
        let target = crate::utils::get_unique_path(&dest.join(relative), collision)?;
        let parent = target.parent().unwrap_or(dest).to_path_buf();
        std::fs::create_dir_all(&parent)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".unrar-kit-")
            .suffix(".partial")
            .tempfile_in(&parent)?;
        let mut checksum = Checksum::new();

        let mut summary = self.extract_buffered(entry, |chunk| {
            checksum.update(&chunk);
            temp.write_all(&chunk)
        })?;

        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| Error::Io(e.error))?;

        summary.sha256 = Some(checksum.finalize_hex());
        info!(
            archive = ?self.path,
            entry,
            target = ?target,
            bytes = summary.bytes,
            "entry written to file"
        );
        Ok(summary)
    }

    /// Extract every file entry below `dest`
    ///
    /// Entry names that would escape `dest` are skipped.
    pub fn extract_files_to(
        &mut self,
        dest: &Path,
        collision: FileCollisionAction,
    ) -> Result<Vec<PathBuf>> {
        self.ensure_reachable()?;
        let written = self.backend.extract_all(dest, collision)?;
        info!(archive = ?self.path, ?dest, files = written.len(), "archive extracted");
        Ok(written)
    }

    /// Visit every entry's metadata in archive order
    pub fn perform_on_files<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&FileInfo) -> Result<()>,
    {
        for info in self.list_file_info()? {
            visit(&info)?;
        }
        Ok(())
    }

    /// Visit every entry's metadata and decoded data in archive order
    pub fn perform_on_data<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&FileInfo, &[u8]) -> Result<()>,
    {
        self.ensure_reachable()?;
        self.backend.for_each_data(&mut visit)
    }

    /// Decode every entry and discard the output
    ///
    /// Returns [`Error::CorruptArchive`] (or [`Error::Encrypted`]) for the first
    /// entry that fails to decode.
    pub fn check_data_integrity(&mut self) -> Result<()> {
        self.ensure_reachable()?;
        self.backend.test_integrity()?;
        debug!(archive = ?self.path, "integrity check passed");
        Ok(())
    }

    /// Stream one entry asynchronously, consuming the handle
    ///
    /// See [`ChunkStream`]. Must be called within a tokio runtime.
    pub fn into_chunk_stream(self, entry: &str) -> ChunkStream {
        ChunkStream::spawn(self, entry)
    }

    /// Release the handle
    pub fn close(self) {
        debug!(archive = ?self.path, "archive closed");
    }
}
