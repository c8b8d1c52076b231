use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::ArchiveFormat;
use crate::utils::get_unique_path;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::EntrySink;

/// Read size used when pulling decoded bytes out of a decoder
pub(crate) const READ_BLOCK_SIZE: usize = 64 * 1024;

const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const SEVENZ_MAGIC: &[u8] = &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Detect archive type from the file's signature, falling back to its extension
///
/// Supports RAR (.rar, .r00), 7z (.7z), and ZIP (.zip) formats.
/// Returns `Ok(None)` when neither the signature nor the extension is recognized.
pub fn detect_archive_type(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut header = [0u8; 8];
    let read = read_prefix(&mut open_archive_file(path)?, &mut header)?;
    let header = &header[..read];

    if header.starts_with(RAR_MAGIC) {
        return Ok(Some(ArchiveFormat::Rar));
    }
    if header.starts_with(SEVENZ_MAGIC) {
        return Ok(Some(ArchiveFormat::SevenZip));
    }
    if ZIP_MAGICS.iter().any(|magic| header.starts_with(magic)) {
        return Ok(Some(ArchiveFormat::Zip));
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(None);
    };
    debug!(?path, ext, "no known signature, falling back to extension");

    Ok(match ext.to_lowercase().as_str() {
        "rar" | "r00" => Some(ArchiveFormat::Rar),
        "7z" => Some(ArchiveFormat::SevenZip),
        "zip" => Some(ArchiveFormat::Zip),
        _ => None,
    })
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

/// Open an archive file, reporting a missing or non-regular path as `ArchiveNotFound`
pub(crate) fn open_archive_file(path: &Path) -> Result<File> {
    if !path.is_file() {
        return Err(Error::ArchiveNotFound {
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::ArchiveNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })
}

/// File name of the archive, used in [`FileInfo::archive_name`](crate::FileInfo)
pub(crate) fn archive_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare an archive entry name with a requested name
///
/// `/` and `\` are treated as the same separator and a leading `./` or `/`
/// is ignored, so names copied from a listing on any platform resolve.
pub fn entry_name_matches(candidate: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> impl Iterator<Item = &str> {
        name.split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != ".")
    }
    normalize(candidate).eq(normalize(wanted))
}

/// Sanitize an entry name to prevent path traversal (e.g., "../../../etc/passwd")
///
/// Only normal path components are kept; parent references, roots and drive
/// prefixes are dropped. Returns `None` if nothing remains.
pub fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let unified = name.replace('\\', "/");
    let sanitized = Path::new(&unified)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect::<PathBuf>();

    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Resolve where a file entry is written below `dest`, creating parent directories
///
/// Returns `Ok(None)` for entries whose name sanitizes to nothing.
pub(crate) fn prepare_output_path(
    dest: &Path,
    entry_name: &str,
    collision: FileCollisionAction,
) -> Result<Option<PathBuf>> {
    let Some(relative) = sanitize_entry_path(entry_name) else {
        return Ok(None);
    };
    let target = get_unique_path(&dest.join(relative), collision)?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Some(target))
}

/// Classify an error raised while reading decoded bytes
///
/// Decoders report checksum mismatches and truncated streams through
/// `std::io::Error`; those are archive corruption, not storage failures.
pub(crate) fn decode_read_error(archive: &Path, entry: &str, e: std::io::Error) -> Error {
    let message = e.to_string();
    if message.to_lowercase().contains("password") {
        return Error::Encrypted {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
        };
    }
    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::UnexpectedEof | ErrorKind::Other => {
            Error::corrupt(archive, format!("failed to decode {entry:?}: {message}"))
        }
        _ => Error::Io(e),
    }
}

/// Pump a decoder's reader into a sink in [`READ_BLOCK_SIZE`] blocks
pub(crate) fn copy_to_sink(
    reader: &mut dyn Read,
    sink: &mut dyn EntrySink,
    archive: &Path,
    entry: &str,
) -> Result<u64> {
    let mut buf = vec![0u8; READ_BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(decode_read_error(archive, entry, e)),
        };
        sink.write(&buf[..n])?;
        total += n as u64;
    }
}

/// Heuristic used by decoders that only report password problems as text
pub(crate) fn is_password_error(error_msg: &str) -> bool {
    let lower = error_msg.to_lowercase();
    lower.contains("password") || lower.contains("encrypted")
}
