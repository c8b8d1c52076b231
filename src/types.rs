//! Core types: archive formats, entry metadata, chunks and events

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;

/// Archive container format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// RAR archive (.rar, .r00), decoded by the native unrar library
    Rar,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// ZIP archive (.zip)
    Zip,
}

impl ArchiveFormat {
    /// Human-readable format name used in log messages
    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Rar => "RAR",
            ArchiveFormat::SevenZip => "7z",
            ArchiveFormat::Zip => "ZIP",
        }
    }
}

/// Per-entry flags read from the archive directory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFlags {
    /// Entry data starts in a previous volume
    pub continued_from_previous: bool,
    /// Entry data continues in the next volume
    pub continued_on_next: bool,
    /// Entry data is encrypted
    pub encrypted: bool,
    /// Entry is a directory
    pub directory: bool,
}

/// Packing method recorded for a RAR entry
///
/// Values follow the RAR file header `METHOD` byte (`0x30`..=`0x35`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMethod {
    /// Stored without compression
    Storage,
    /// Fastest compression
    Fastest,
    /// Fast compression
    Fast,
    /// Normal compression
    Normal,
    /// Good compression
    Good,
    /// Best compression
    Best,
}

impl PackingMethod {
    /// Map a RAR header method byte to a packing method
    pub fn from_rar_method(method: u32) -> Option<Self> {
        match method {
            0x30 => Some(PackingMethod::Storage),
            0x31 => Some(PackingMethod::Fastest),
            0x32 => Some(PackingMethod::Fast),
            0x33 => Some(PackingMethod::Normal),
            0x34 => Some(PackingMethod::Good),
            0x35 => Some(PackingMethod::Best),
            _ => None,
        }
    }
}

/// Metadata for a single entry inside an archive
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name of the archive holding the entry
    pub archive_name: String,
    /// Path of the entry inside the archive
    pub filename: String,
    /// Last modification time, when recorded
    pub modified: Option<NaiveDateTime>,
    /// CRC32 of the decompressed data, when recorded
    pub crc32: Option<u32>,
    /// Decompressed size in bytes
    pub unpacked_size: u64,
    /// Compressed size in bytes, when the decoder exposes it
    pub packed_size: Option<u64>,
    /// Entry flags
    pub flags: FileFlags,
    /// Packing method, when the format records one
    pub packing_method: Option<PackingMethod>,
}

impl FileInfo {
    /// Create metadata with only a name and size set
    pub fn new(archive_name: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            archive_name: archive_name.into(),
            filename: filename.into(),
            modified: None,
            crc32: None,
            unpacked_size: size,
            packed_size: None,
            flags: FileFlags::default(),
            packing_method: None,
        }
    }

    /// Whether the entry is a directory
    pub fn is_directory(&self) -> bool {
        self.flags.directory
    }
}

/// A contiguous slice of an entry's decompressed contents
///
/// Ownership of the bytes moves to the consumer; the extractor keeps no
/// reference after delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    data: Vec<u8>,
    offset: u64,
    progress: f64,
    last: bool,
}

impl Chunk {
    pub(crate) fn new(data: Vec<u8>, offset: u64, progress: f64, last: bool) -> Self {
        Self {
            data,
            offset,
            progress,
            last,
        }
    }

    /// The chunk bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the chunk bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of this chunk within the entry
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fraction of the entry delivered once this chunk is consumed, in `[0.0, 1.0]`
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Whether this is the final chunk of the entry
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Position and progress of this chunk, without the bytes
    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            offset: self.offset,
            len: self.data.len(),
            progress: self.progress,
            last: self.last,
        }
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Position and progress of a delivered chunk
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Byte offset within the entry
    pub offset: u64,
    /// Chunk length in bytes
    pub len: usize,
    /// Progress after this chunk
    pub progress: f64,
    /// Final chunk of the entry
    pub last: bool,
}

/// Lifecycle of a buffered extraction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    /// No extraction has run on the handle yet
    #[default]
    NotStarted,
    /// Chunks are being produced
    Extracting,
    /// Every byte of the entry was delivered
    Completed,
    /// Extraction stopped with an error
    Failed,
}

/// Outcome of a successful buffered extraction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// The extracted entry
    pub entry: String,
    /// Total bytes delivered
    pub bytes: u64,
    /// Number of chunks delivered
    pub chunks: u64,
    /// Wall-clock time spent in the extraction call
    pub elapsed: Duration,
    /// Lowercase hex SHA-256 of the delivered bytes, when computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Event emitted around an extraction
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Extraction call entered
    ExtractionStarted {
        /// Archive path
        archive: PathBuf,
        /// Entry name
        entry: String,
    },

    /// A chunk was handed to the consumer
    ChunkDelivered {
        /// Entry name
        entry: String,
        /// Byte offset of the chunk
        offset: u64,
        /// Chunk length in bytes
        len: usize,
        /// Progress after the chunk (0.0 to 1.0)
        progress: f64,
    },

    /// Extraction finished with every byte delivered
    ExtractionCompleted {
        /// Archive path
        archive: PathBuf,
        /// Entry name
        entry: String,
        /// Total bytes delivered
        bytes: u64,
        /// Number of chunks delivered
        chunks: u64,
        /// Elapsed time in milliseconds
        elapsed_ms: u64,
    },

    /// Extraction stopped with an error
    ExtractionFailed {
        /// Archive path
        archive: PathBuf,
        /// Entry name
        entry: String,
        /// Machine-readable error code
        error_code: String,
        /// Error message
        error: String,
        /// Whether chunks may already have reached the callback
        partial_output: bool,
    },
}
