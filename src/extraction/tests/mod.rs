use crate::archive::Archive;
use crate::config::{ExtractorConfig, FileCollisionAction};
use crate::error::Error;
use crate::extraction::*;
use crate::types::{ArchiveFormat, Chunk};
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a valid ZIP archive containing a single file with the given name and content
fn create_zip_archive(archive_path: &Path, file_name: &str, content: &[u8]) {
    create_zip_archive_multi(archive_path, &[(file_name, content)]);
}

/// Create a valid ZIP archive containing multiple files
fn create_zip_archive_multi(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a password-encrypted ZIP using the deprecated ZipCrypto method
/// (only encryption method supported for writing by zip 0.6)
fn create_encrypted_zip(archive_path: &Path, file_name: &str, content: &[u8], password: &[u8]) {
    use ::zip::unstable::write::FileOptionsExt;
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Stored)
        .with_deprecated_encryption(password);
    writer.start_file(file_name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

/// Create a valid 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

/// Create a solid 7z archive: every entry packed into one compressed block
fn create_solid_7z_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let mut writer = sevenz_rust::SevenZWriter::create(archive_path).unwrap();
    push_solid_block(&mut writer, files);
    writer.finish().unwrap();
}

fn push_solid_block(writer: &mut sevenz_rust::SevenZWriter<std::fs::File>, files: &[(&str, &[u8])]) {
    let entries = files
        .iter()
        .map(|(name, _)| {
            let mut entry = sevenz_rust::SevenZArchiveEntry::new();
            entry.name = name.to_string();
            entry.has_stream = true;
            entry
        })
        .collect();
    let readers = files
        .iter()
        .map(|(_, content)| sevenz_rust::SourceReader::from(*content))
        .collect();
    writer
        .push_archive_entries(entries, sevenz_rust::SeqReader::new(readers))
        .unwrap();
}

/// MS-DOS timestamp for 2024-03-15 12:30:00
const RAR_ENTRY_TIME: u32 = 1_483_695_040;

/// Create a RAR 4.x archive with stored (uncompressed) entries
///
/// Layout: marker block, main header, one file header plus raw data per
/// entry, end-of-archive block. Header CRCs are the low 16 bits of CRC32.
fn create_rar_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let mut out = b"Rar!\x1a\x07\x00".to_vec();
    push_rar_block(&mut out, 0x73, 0x0000, &[0u8; 6]);

    for (name, content) in files {
        let size = u32::try_from(content.len()).unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&size.to_le_bytes()); // packed size
        body.extend_from_slice(&size.to_le_bytes()); // unpacked size
        body.push(0); // host OS: MS-DOS
        body.extend_from_slice(&crc32fast::hash(content).to_le_bytes());
        body.extend_from_slice(&RAR_ENTRY_TIME.to_le_bytes());
        body.push(20); // version needed to extract
        body.push(0x30); // method: store
        body.extend_from_slice(&u16::try_from(name.len()).unwrap().to_le_bytes());
        body.extend_from_slice(&0x20u32.to_le_bytes()); // attributes: archive
        body.extend_from_slice(name.as_bytes());

        // 0x8000: data follows the header
        push_rar_block(&mut out, 0x74, 0x8000, &body);
        out.extend_from_slice(content);
    }

    push_rar_block(&mut out, 0x7b, 0x4000, &[]);
    std::fs::write(archive_path, out).unwrap();
}

fn push_rar_block(out: &mut Vec<u8>, kind: u8, flags: u16, body: &[u8]) {
    let mut header = vec![kind];
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&u16::try_from(7 + body.len()).unwrap().to_le_bytes());
    header.extend_from_slice(body);

    let crc = (crc32fast::hash(&header) & 0xffff) as u16;
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&header);
}

/// Flip one byte of the first occurrence of `needle` inside `path`
fn corrupt_bytes(path: &Path, needle: &[u8]) {
    let mut bytes = std::fs::read(path).unwrap();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present in archive");
    bytes[at] ^= 0xff;
    std::fs::write(path, bytes).unwrap();
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn small_chunks(chunk_size: usize) -> ExtractorConfig {
    ExtractorConfig {
        chunk_size,
        ..Default::default()
    }
}

fn collect_chunks(archive: &mut Archive, entry: &str) -> crate::Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    archive.extract_buffered(entry, |chunk| {
        chunks.push(chunk);
        Ok(())
    })?;
    Ok(chunks)
}

// ===========================================================================
// Backend selection
// ===========================================================================

#[test]
fn open_backend_matches_format() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a.zip");
    create_zip_archive(&path, "a.txt", b"a");

    for format in [ArchiveFormat::Rar, ArchiveFormat::SevenZip, ArchiveFormat::Zip] {
        let backend = open_backend(&path, format);
        assert_eq!(backend.format(), format);
        assert_eq!(backend.path(), path);
        assert!(backend.is_reachable());
    }
}

#[test]
fn archive_open_detects_zip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("renamed.bin");
    create_zip_archive(&path, "a.txt", b"a");

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::Zip);
}

// ===========================================================================
// ZIP backend
// ===========================================================================

#[test]
fn zip_lists_entries_in_archive_order() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("multi.zip");
    create_zip_archive_multi(
        &archive_path,
        &[
            ("b.txt", b"second"),
            ("a.txt", b"first"),
            ("subdir/c.txt", b"third!"),
        ],
    );

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(
        archive.list_filenames().unwrap(),
        vec!["b.txt", "a.txt", "subdir/c.txt"]
    );

    let info = archive.file_info("subdir\\c.txt").unwrap();
    assert_eq!(info.unpacked_size, 6);
    assert_eq!(info.packed_size, Some(6));
    assert_eq!(info.archive_name, "multi.zip");
    assert!(info.crc32.is_some());
    assert!(info.modified.is_some());
    assert!(!info.is_directory());
}

#[test]
fn zip_buffered_extraction_reproduces_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("big.zip");
    let content = pattern(200_000);
    create_zip_archive(&archive_path, "movie.mkv", &content);

    let mut archive = Archive::open_with_config(&archive_path, small_chunks(16 * 1024)).unwrap();
    let chunks = collect_chunks(&mut archive, "movie.mkv").unwrap();

    assert_eq!(chunks.len(), 13);
    assert!(chunks.iter().all(|c| c.len() <= 16 * 1024));
    assert_eq!(chunks.last().unwrap().progress(), 1.0);
    assert!(chunks.windows(2).all(|w| w[0].progress() <= w[1].progress()));

    let joined: Vec<u8> = chunks.into_iter().flat_map(Chunk::into_data).collect();
    assert_eq!(joined, content);
}

#[test]
fn zip_empty_entry_yields_single_empty_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("empty.zip");
    create_zip_archive(&archive_path, "empty.txt", b"");

    let mut archive = Archive::open(&archive_path).unwrap();
    let chunks = collect_chunks(&mut archive, "empty.txt").unwrap();

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_empty());
    assert_eq!(chunks[0].progress(), 1.0);
}

#[test]
fn zip_missing_entry_delivers_no_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    create_zip_archive(&archive_path, "present.txt", b"here");

    let mut archive = Archive::open(&archive_path).unwrap();
    let mut calls = 0;
    let err = archive
        .extract_buffered("absent.txt", |_| {
            calls += 1;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Error::EntryNotFound { .. }));
    assert_eq!(calls, 0);
}

#[test]
fn zip_corrupt_archive_returns_corrupt_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("corrupt.zip");
    std::fs::write(&archive_path, b"not a zip file at all").unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    match archive.list_filenames() {
        Err(Error::CorruptArchive { archive, .. }) => assert_eq!(archive, archive_path),
        other => panic!("expected CorruptArchive, got: {other:?}"),
    }
}

#[test]
fn zip_checksum_mismatch_fails_integrity_and_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("damaged.zip");
    let content = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".repeat(10);
    create_zip_archive_multi(
        &archive_path,
        &[("fine.txt", b"intact"), ("damaged.txt", content.as_slice())],
    );

    let mut archive = Archive::open(&archive_path).unwrap();
    archive.check_data_integrity().unwrap();

    corrupt_bytes(&archive_path, b"ABCDEFGHIJ");

    let err = archive.check_data_integrity().unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");

    // The intact entry still extracts
    assert_eq!(archive.extract_data("fine.txt").unwrap(), b"intact");
    let err = archive.extract_data("damaged.txt").unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
}

#[test]
fn zip_encrypted_entry_reports_encrypted() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("encrypted.zip");
    create_encrypted_zip(&archive_path, "secret.txt", b"secret data", b"correcthorse");

    let mut archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.list_filenames().unwrap(), vec!["secret.txt"]);

    let err = archive.extract_data("secret.txt").unwrap_err();
    assert!(matches!(err, Error::Encrypted { .. }), "{err:?}");
}

#[test]
fn zip_extract_files_to_sanitizes_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("evil.zip");
    create_zip_archive_multi(
        &archive_path,
        &[
            ("../../escape.txt", b"nope"),
            ("nested/ok.txt", b"fine"),
        ],
    );

    let dest = temp_dir.path().join("out").join("inner");
    let mut archive = Archive::open(&archive_path).unwrap();
    let files = archive
        .extract_files_to(&dest, FileCollisionAction::Overwrite)
        .unwrap();

    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|p| p.starts_with(&dest)), "{files:?}");
    assert_eq!(std::fs::read(dest.join("escape.txt")).unwrap(), b"nope");
    assert_eq!(std::fs::read(dest.join("nested/ok.txt")).unwrap(), b"fine");
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[test]
fn zip_extract_files_to_collision_actions() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    create_zip_archive(&archive_path, "report.txt", b"fresh");

    let dest = temp_dir.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("report.txt"), b"stale").unwrap();

    let mut archive = Archive::open(&archive_path).unwrap();

    let err = archive
        .extract_files_to(&dest, FileCollisionAction::Skip)
        .unwrap_err();
    assert!(matches!(err, Error::FileCollision { .. }));
    assert_eq!(std::fs::read(dest.join("report.txt")).unwrap(), b"stale");

    let files = archive
        .extract_files_to(&dest, FileCollisionAction::Rename)
        .unwrap();
    assert!(files[0].ends_with("report (1).txt"));

    archive
        .extract_files_to(&dest, FileCollisionAction::Overwrite)
        .unwrap();
    assert_eq!(std::fs::read(dest.join("report.txt")).unwrap(), b"fresh");
}

#[test]
fn zip_perform_on_data_visits_every_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("multi.zip");
    create_zip_archive_multi(&archive_path, &[("one.txt", b"1"), ("two.txt", b"22")]);

    let mut archive = Archive::open(&archive_path).unwrap();
    let mut seen = Vec::new();
    archive
        .perform_on_data(|info, data| {
            seen.push((info.filename.clone(), data.to_vec()));
            Ok(())
        })
        .unwrap();

    assert_eq!(
        seen,
        vec![
            ("one.txt".to_string(), b"1".to_vec()),
            ("two.txt".to_string(), b"22".to_vec()),
        ]
    );
}

#[test]
fn zip_archive_removed_after_open_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("gone.zip");
    create_zip_archive(&archive_path, "a.txt", b"a");

    let mut archive = Archive::open(&archive_path).unwrap();
    std::fs::remove_file(&archive_path).unwrap();

    let err = archive.extract_data("a.txt").unwrap_err();
    assert!(matches!(err, Error::ArchiveNotFound { .. }));
}

// ===========================================================================
// 7z backend
// ===========================================================================

fn sevenz_fixture(temp_dir: &TempDir) -> (std::path::PathBuf, Vec<u8>) {
    let src_dir = temp_dir.path().join("source");
    std::fs::create_dir_all(&src_dir).unwrap();
    let content = pattern(50_000);
    std::fs::write(src_dir.join("readme.txt"), b"hello world").unwrap();
    std::fs::write(src_dir.join("data.bin"), &content).unwrap();

    let archive_path = temp_dir.path().join("test.7z");
    create_7z_archive(&archive_path, &src_dir);
    (archive_path, content)
}

fn entry_ending_with(archive: &Archive, suffix: &str) -> String {
    archive
        .list_filenames()
        .unwrap()
        .into_iter()
        .find(|name| name.ends_with(suffix))
        .unwrap()
}

#[test]
fn sevenz_lists_entries() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, _) = sevenz_fixture(&temp_dir);

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::SevenZip);

    let infos = archive.list_file_info().unwrap();
    let readme = infos
        .iter()
        .find(|i| i.filename.ends_with("readme.txt"))
        .unwrap();
    assert_eq!(readme.unpacked_size, 11);
    assert_eq!(readme.archive_name, "test.7z");
}

#[test]
fn sevenz_buffered_extraction_reproduces_entry() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, content) = sevenz_fixture(&temp_dir);

    let mut archive = Archive::open_with_config(&archive_path, small_chunks(4096)).unwrap();
    let name = entry_ending_with(&archive, "data.bin");
    let chunks = collect_chunks(&mut archive, &name).unwrap();

    assert_eq!(chunks.len(), 13);
    assert_eq!(chunks.last().unwrap().progress(), 1.0);
    let joined: Vec<u8> = chunks.into_iter().flat_map(Chunk::into_data).collect();
    assert_eq!(joined, content);
}

#[test]
fn sevenz_missing_entry_is_entry_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, _) = sevenz_fixture(&temp_dir);

    let mut archive = Archive::open(&archive_path).unwrap();
    let err = archive.extract_data("not-there.txt").unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { .. }));
}

#[test]
fn sevenz_extract_files_and_integrity() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, content) = sevenz_fixture(&temp_dir);

    let mut archive = Archive::open(&archive_path).unwrap();
    archive.check_data_integrity().unwrap();

    let dest = temp_dir.path().join("extracted");
    let files = archive
        .extract_files_to(&dest, FileCollisionAction::Overwrite)
        .unwrap();
    assert_eq!(files.len(), 2);

    let data = files.iter().find(|p| p.ends_with("data.bin")).unwrap();
    assert_eq!(std::fs::read(data).unwrap(), content);
    let readme = files.iter().find(|p| p.ends_with("readme.txt")).unwrap();
    assert_eq!(std::fs::read_to_string(readme).unwrap(), "hello world");
}

#[test]
fn sevenz_garbage_with_signature_is_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("broken.7z");
    let mut bytes = vec![0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0x00, 0x04];
    bytes.extend_from_slice(&[0xAA; 64]);
    std::fs::write(&archive_path, bytes).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    let err = archive.list_filenames().unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
}

#[test]
fn sevenz_solid_block_extracts_every_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("solid.7z");
    let bulk = pattern(120_000);
    create_solid_7z_archive(
        &archive_path,
        &[
            ("first.txt", b"FIRST-ENTRY-DATA"),
            ("second.txt", b"SECOND-ENTRY-DATA"),
            ("third.bin", bulk.as_slice()),
        ],
    );

    let mut archive = Archive::open_with_config(&archive_path, small_chunks(32 * 1024)).unwrap();
    assert_eq!(
        archive.list_filenames().unwrap(),
        vec!["first.txt", "second.txt", "third.bin"]
    );

    assert_eq!(archive.extract_data("first.txt").unwrap(), b"FIRST-ENTRY-DATA");
    assert_eq!(archive.extract_data("second.txt").unwrap(), b"SECOND-ENTRY-DATA");

    let chunks = collect_chunks(&mut archive, "third.bin").unwrap();
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.last().unwrap().progress(), 1.0);
    let joined: Vec<u8> = chunks.into_iter().flat_map(Chunk::into_data).collect();
    assert_eq!(joined, bulk);

    archive.check_data_integrity().unwrap();
    let dest = temp_dir.path().join("out");
    let files = archive
        .extract_files_to(&dest, FileCollisionAction::Overwrite)
        .unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(std::fs::read(dest.join("second.txt")).unwrap(), b"SECOND-ENTRY-DATA");
}

#[test]
fn sevenz_first_matching_entry_wins_across_blocks() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("twice.7z");
    let mut writer = sevenz_rust::SevenZWriter::create(&archive_path).unwrap();
    push_solid_block(&mut writer, &[("dup.txt", b"from block one")]);
    push_solid_block(&mut writer, &[("dup.txt", b"from block two, longer")]);
    writer.finish().unwrap();

    let mut archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.list_filenames().unwrap(), vec!["dup.txt", "dup.txt"]);

    let chunks = collect_chunks(&mut archive, "dup.txt").unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(&chunks[0][..], b"from block one");
}

// ===========================================================================
// RAR backend
// ===========================================================================

/// Sink that records writes and can refuse one
#[derive(Default)]
struct RecordingSink {
    begun: Vec<String>,
    writes: Vec<usize>,
    fail_on_write: Option<usize>,
    panic_on_write: bool,
}

impl EntrySink for RecordingSink {
    fn begin(&mut self, info: &crate::types::FileInfo) -> crate::Result<()> {
        self.begun.push(info.filename.clone());
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        if self.panic_on_write {
            panic!("sink exploded");
        }
        self.writes.push(data.len());
        if self.fail_on_write == Some(self.writes.len()) {
            return Err(Error::Other("sink refused".to_string()));
        }
        Ok(())
    }
}

fn rar_fixture(temp_dir: &TempDir) -> (std::path::PathBuf, Vec<u8>) {
    let archive_path = temp_dir.path().join("release.rar");
    let content = pattern(300_000);
    create_rar_archive(
        &archive_path,
        &[
            ("readme.txt", b"RAR-README-PAYLOAD"),
            ("video.mkv", content.as_slice()),
            ("empty.dat", b""),
        ],
    );
    (archive_path, content)
}

#[test]
fn rar_lists_entries_with_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, _) = rar_fixture(&temp_dir);

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::Rar);
    assert_eq!(
        archive.list_filenames().unwrap(),
        vec!["readme.txt", "video.mkv", "empty.dat"]
    );

    let info = archive.file_info("video.mkv").unwrap();
    assert_eq!(info.unpacked_size, 300_000);
    assert_eq!(info.crc32, Some(crc32fast::hash(&pattern(300_000))));
    assert_eq!(info.packing_method, Some(crate::types::PackingMethod::Storage));
    assert_eq!(info.archive_name, "release.rar");
    assert_eq!(
        info.modified.unwrap().to_string(),
        "2024-03-15 12:30:00"
    );
    assert!(!info.is_directory());
    assert!(!info.flags.encrypted);
}

#[test]
fn rar_buffered_extraction_reproduces_entry() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, content) = rar_fixture(&temp_dir);

    let mut archive = Archive::open_with_config(&archive_path, small_chunks(64 * 1024)).unwrap();
    let chunks = collect_chunks(&mut archive, "video.mkv").unwrap();

    assert_eq!(chunks.len(), 5);
    assert!(chunks[..4].iter().all(|c| c.len() == 64 * 1024));
    assert_eq!(chunks.last().unwrap().progress(), 1.0);
    assert!(chunks.windows(2).all(|w| w[0].progress() < w[1].progress()));
    assert_eq!(chunks[4].offset(), 4 * 64 * 1024);

    let joined: Vec<u8> = chunks.into_iter().flat_map(Chunk::into_data).collect();
    assert_eq!(joined, content);

    // Entries before and after the large one resolve too
    assert_eq!(archive.extract_data("readme.txt").unwrap(), b"RAR-README-PAYLOAD");
    let chunks = collect_chunks(&mut archive, "empty.dat").unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_empty());
}

#[test]
fn rar_missing_entry_is_entry_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, _) = rar_fixture(&temp_dir);

    let mut archive = Archive::open(&archive_path).unwrap();
    let mut calls = 0;
    let err = archive
        .extract_buffered("absent.mkv", |_| {
            calls += 1;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Error::EntryNotFound { .. }), "{err:?}");
    assert_eq!(calls, 0);
}

#[test]
fn rar_crc_mismatch_is_corrupt_after_streaming_decoded_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("damaged.rar");
    let mut content = pattern(300_000);
    content[250_000..250_010].copy_from_slice(b"DAMAGE-ME!");
    create_rar_archive(
        &archive_path,
        &[("fine.txt", b"intact"), ("video.mkv", content.as_slice())],
    );

    let mut archive = Archive::open_with_config(&archive_path, small_chunks(64 * 1024)).unwrap();
    archive.check_data_integrity().unwrap();

    corrupt_bytes(&archive_path, b"DAMAGE-ME!");

    // Chunks reach the callback while the entry decodes. The last full chunk
    // and the tail stay held back, so the failure arrives before progress 1.0
    let mut delivered = 0;
    let err = archive
        .extract_buffered("video.mkv", |_| {
            delivered += 1;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
    assert_eq!(delivered, 3);

    let err = archive.check_data_integrity().unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
    assert_eq!(archive.extract_data("fine.txt").unwrap(), b"intact");
}

#[test]
fn rar_sink_error_stops_decoding() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("big.rar");
    // Stored data is handed out in 4 MiB blocks
    let content = pattern(9 * 1024 * 1024);
    create_rar_archive(&archive_path, &[("big.bin", content.as_slice())]);

    let backend = RarBackend::new(&archive_path);
    let mut sink = RecordingSink {
        fail_on_write: Some(1),
        ..Default::default()
    };
    let err = backend.stream_entry("big.bin", &mut sink).unwrap_err();

    assert!(matches!(err, Error::Other(ref m) if m == "sink refused"), "{err:?}");
    assert_eq!(sink.begun, vec!["big.bin"]);
    assert_eq!(sink.writes.len(), 1);
    assert!(sink.writes[0] < content.len());

    // The handle is closed cleanly, so the archive can be read again
    let mut sink = RecordingSink::default();
    backend.stream_entry("big.bin", &mut sink).unwrap();
    assert_eq!(sink.writes.iter().sum::<usize>(), content.len());
    assert!(sink.writes.len() > 1);
}

#[test]
#[should_panic(expected = "sink exploded")]
fn rar_sink_panic_propagates_to_caller() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, _) = rar_fixture(&temp_dir);

    let backend = RarBackend::new(&archive_path);
    let mut sink = RecordingSink {
        panic_on_write: true,
        ..Default::default()
    };
    let _ = backend.stream_entry("video.mkv", &mut sink);
}

#[test]
fn rar_extract_files_and_perform_on_data() {
    let temp_dir = TempDir::new().unwrap();
    let (archive_path, content) = rar_fixture(&temp_dir);

    let mut archive = Archive::open(&archive_path).unwrap();
    archive.check_data_integrity().unwrap();

    let dest = temp_dir.path().join("out");
    let files = archive
        .extract_files_to(&dest, FileCollisionAction::Overwrite)
        .unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(std::fs::read(dest.join("video.mkv")).unwrap(), content);
    assert_eq!(std::fs::read(dest.join("readme.txt")).unwrap(), b"RAR-README-PAYLOAD");

    let mut sizes = Vec::new();
    archive
        .perform_on_data(|info, data| {
            sizes.push((info.filename.clone(), data.len()));
            Ok(())
        })
        .unwrap();
    assert_eq!(
        sizes,
        vec![
            ("readme.txt".to_string(), 18),
            ("video.mkv".to_string(), 300_000),
            ("empty.dat".to_string(), 0),
        ]
    );
}

#[tokio::test]
async fn rar_chunk_stream_matches_blocking_extraction() {
    use futures::StreamExt;

    let temp_dir = TempDir::new().unwrap();
    let (archive_path, content) = rar_fixture(&temp_dir);

    let archive = Archive::open_with_config(&archive_path, small_chunks(100_000)).unwrap();
    let mut stream = archive.into_chunk_stream("video.mkv");
    let mut joined = Vec::new();
    while let Some(chunk) = stream.next().await {
        joined.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(joined, content);

    let (_archive, summary) = stream.finish().await.unwrap();
    assert_eq!(summary.unwrap().chunks, 3);
}
