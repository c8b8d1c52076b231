//! Configuration types for unrar-kit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest accepted chunk size in bytes
pub const MIN_CHUNK_SIZE: usize = 1;

/// Largest accepted chunk size in bytes (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Extraction tuning for an [`Archive`](crate::Archive) handle
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Size in bytes of each chunk handed to the callback (default: 1 MiB)
    ///
    /// Only the final chunk of an entry may be shorter.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Fail with `CorruptArchive` when the decoded byte count differs from
    /// the size recorded in the archive directory (default: true)
    #[serde(default = "default_true")]
    pub verify_size: bool,

    /// Number of chunks buffered between the extractor and an async consumer (default: 4)
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            verify_size: true,
            stream_capacity: default_stream_capacity(),
        }
    }
}

impl ExtractorConfig {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that every field is within its accepted range
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::Config {
                message: format!(
                    "chunk_size must be between {} and {} bytes, got {}",
                    MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
                ),
                key: Some("chunk_size".to_string()),
            });
        }

        if self.stream_capacity == 0 {
            return Err(Error::Config {
                message: "stream_capacity must be at least 1".to_string(),
                key: Some("stream_capacity".to_string()),
            });
        }

        Ok(())
    }
}

/// File collision handling strategy for extraction to disk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Refuse to write, keep existing
    Skip,
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_stream_capacity() -> usize {
    4
}

fn default_true() -> bool {
    true
}
