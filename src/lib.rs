//! # unrar-kit
//!
//! Bounded-memory extraction of single entries from RAR, 7z and ZIP archives.
//!
//! ## Design Philosophy
//!
//! unrar-kit is designed to be:
//! - **Memory-bounded** - An entry is handed to the caller in fixed-size chunks,
//!   never materialized whole
//! - **Progress-aware** - Every chunk carries its offset and a progress value
//!   that ends at exactly 1.0
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Observable** - Extraction is bracketed by observer hooks, traced by default
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::Write;
//! use unrar_kit::{Archive, ExtractorConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig {
//!         chunk_size: 4 * 1024 * 1024,
//!         ..Default::default()
//!     };
//!     let mut archive = Archive::open_with_config("release.rar", config)?;
//!
//!     for info in archive.list_file_info()? {
//!         println!("{} ({} bytes)", info.filename, info.unpacked_size);
//!     }
//!
//!     let mut out = std::fs::File::create("release.mkv")?;
//!     let summary = archive.extract_buffered("release.mkv", |chunk| {
//!         println!("{:>5.1}%", chunk.progress() * 100.0);
//!         out.write_all(&chunk)
//!     })?;
//!     println!("{} bytes in {:?}", summary.bytes, summary.elapsed);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Async consumers
//!
//! ```no_run
//! use futures::StreamExt;
//! use unrar_kit::Archive;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let archive = Archive::open("release.rar")?;
//!     let mut stream = archive.into_chunk_stream("release.mkv");
//!
//!     while let Some(chunk) = stream.next().await {
//!         let chunk = chunk?;
//!         println!("{} bytes at {}", chunk.len(), chunk.offset());
//!     }
//!
//!     let archive = stream.into_archive().await?;
//!     archive.close();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive handle
pub mod archive;
/// Buffered extraction of a single entry
pub mod buffered;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive decoder backends
pub mod extraction;
/// Extraction observers
pub mod observer;
/// Async chunk stream
pub mod stream;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::Archive;
pub use buffered::BufferedExtractor;
pub use config::{ExtractorConfig, FileCollisionAction};
pub use error::{Error, Result};
pub use extraction::{ArchiveBackend, EntrySink};
pub use observer::{BroadcastObserver, ExtractionObserver, NoopObserver, TracingObserver};
pub use stream::ChunkStream;
pub use types::{
    ArchiveFormat, Chunk, ChunkMeta, Event, ExtractionState, ExtractionSummary, FileFlags,
    FileInfo, PackingMethod,
};
