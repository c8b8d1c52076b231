//! Error types for unrar-kit
//!
//! This module provides the single error type used by the library:
//! - Archive and entry resolution failures (missing archive, missing entry)
//! - Decoder failures surfaced by the external archive libraries
//! - Failures raised by the caller's chunk callback
//! - Machine-readable error codes for programmatic handling

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for unrar-kit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unrar-kit
///
/// Every variant carries enough context (archive path, entry name, offset)
/// to identify where a failed operation stopped.
#[derive(Debug, Error)]
pub enum Error {
    /// The archive path does not exist or is not a readable file
    #[error("archive not found: {path}")]
    ArchiveNotFound {
        /// The path that could not be opened
        path: PathBuf,
    },

    /// The requested entry is not in the archive's directory listing
    #[error("entry {entry:?} not found in archive {archive}")]
    EntryNotFound {
        /// The archive that was searched
        archive: PathBuf,
        /// The entry name that was requested
        entry: String,
    },

    /// The decoder rejected the archive or failed mid-stream
    #[error("corrupt archive {archive}: {reason}")]
    CorruptArchive {
        /// The archive that failed to decode
        archive: PathBuf,
        /// Decoder-provided reason
        reason: String,
    },

    /// I/O error from the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chunk callback returned an error, extraction stopped
    #[error("extraction of {entry:?} aborted by callback at offset {offset}: {source}")]
    CallbackAborted {
        /// The entry being extracted
        entry: String,
        /// Number of bytes delivered before the abort
        offset: u64,
        /// The error returned by the callback
        #[source]
        source: std::io::Error,
    },

    /// The entry (or the whole archive) is password protected
    #[error("entry {entry:?} in archive {archive} is encrypted")]
    Encrypted {
        /// The archive holding the encrypted data
        archive: PathBuf,
        /// The encrypted entry, empty when the archive headers themselves are encrypted
        entry: String,
    },

    /// The file is not an archive format this library can read
    #[error("unsupported archive format: {path}")]
    UnsupportedFormat {
        /// The file whose format could not be determined
        path: PathBuf,
    },

    /// A file already exists at an extraction destination
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// Invalid path encountered while writing output
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ArchiveNotFound { .. } => "archive_not_found",
            Error::EntryNotFound { .. } => "entry_not_found",
            Error::CorruptArchive { .. } => "corrupt_archive",
            Error::Io(_) => "io_error",
            Error::CallbackAborted { .. } => "callback_aborted",
            Error::Encrypted { .. } => "encrypted",
            Error::UnsupportedFormat { .. } => "unsupported_format",
            Error::FileCollision { .. } => "file_collision",
            Error::InvalidPath { .. } => "invalid_path",
            Error::Config { .. } => "config_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the failure happened before any byte could have been delivered
    ///
    /// Resolution failures never reach the callback; decoder, I/O and
    /// callback failures may leave partial output behind.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Error::ArchiveNotFound { .. }
                | Error::EntryNotFound { .. }
                | Error::UnsupportedFormat { .. }
                | Error::Encrypted { .. }
                | Error::Config { .. }
        )
    }

    pub(crate) fn corrupt(archive: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::CorruptArchive {
            archive: archive.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn entry_not_found(archive: &std::path::Path, entry: &str) -> Self {
        Error::EntryNotFound {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
        }
    }
}
