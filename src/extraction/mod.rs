//! Archive decoder backends
//!
//! Each supported format is wrapped in an [`ArchiveBackend`] that turns the
//! external decoder's API into a small set of operations: listing, streaming
//! a single entry into an [`EntrySink`], visiting every entry's data,
//! extracting to disk and integrity testing. The buffered extractor only
//! talks to this trait.

mod rar;
mod sevenz;
mod shared;
mod unrar_native;
mod zip;


// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use rar::RarBackend;
pub use sevenz::SevenZipBackend;
pub use shared::{detect_archive_type, entry_name_matches, sanitize_entry_path};
pub use zip::ZipBackend;

use crate::config::FileCollisionAction;
use crate::error::Result;
use crate::types::{ArchiveFormat, FileInfo};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Receiver for one entry's decoded bytes
///
/// A backend calls [`begin`](EntrySink::begin) exactly once after resolving
/// the entry and before the first [`write`](EntrySink::write). An entry that
/// cannot be resolved never reaches the sink.
pub trait EntrySink {
    /// The entry was found; `info` carries its declared size
    fn begin(&mut self, info: &FileInfo) -> Result<()>;

    /// The next decoded bytes, in entry order
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// Format-specific access to an archive on disk
///
/// Backends hold no open decoder state between calls, so every operation
/// re-opens the archive and observes its current state on disk.
pub trait ArchiveBackend: Send {
    /// Format decoded by this backend
    fn format(&self) -> ArchiveFormat;

    /// Path of the archive
    fn path(&self) -> &Path;

    /// Whether the archive can currently be reached
    fn is_reachable(&self) -> bool {
        self.path().is_file()
    }

    /// Directory listing, in archive order
    fn list(&self) -> Result<Vec<FileInfo>>;

    /// Decode one entry into `sink`
    fn stream_entry(&self, name: &str, sink: &mut dyn EntrySink) -> Result<()>;

    /// Decode every entry in archive order, handing each one's full data to `visit`
    fn for_each_data(&self, visit: &mut dyn FnMut(&FileInfo, &[u8]) -> Result<()>) -> Result<()>;

    /// Write every file entry below `dest`, returning the written paths
    fn extract_all(&self, dest: &Path, collision: FileCollisionAction) -> Result<Vec<PathBuf>>;

    /// Decode every entry and discard the output, surfacing decoder errors
    fn test_integrity(&self) -> Result<()>;
}

/// Build the backend for an archive of the given format
pub fn open_backend(path: &Path, format: ArchiveFormat) -> Box<dyn ArchiveBackend> {
    debug!(?path, format = format.name(), "selecting archive backend");

    match format {
        ArchiveFormat::Rar => Box::new(RarBackend::new(path)),
        ArchiveFormat::SevenZip => Box::new(SevenZipBackend::new(path)),
        ArchiveFormat::Zip => Box::new(ZipBackend::new(path)),
    }
}
