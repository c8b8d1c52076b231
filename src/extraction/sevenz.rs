use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::{ArchiveFormat, FileFlags, FileInfo};
use sevenz_rust::{BlockDecoder, Password, SevenZArchiveEntry};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::shared::{archive_name, copy_to_sink, decode_read_error, entry_name_matches};
use super::shared::{is_password_error, open_archive_file, prepare_output_path};
use super::{ArchiveBackend, EntrySink};

/// Archive backend for 7z files
pub struct SevenZipBackend {
    path: PathBuf,
}

impl SevenZipBackend {
    /// Create a backend for the 7z archive at `path`
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read the archive directory, returning it with the positioned source
    fn open(&self) -> Result<(sevenz_rust::Archive, BufReader<File>)> {
        let file = open_archive_file(&self.path)?;
        let len = file.metadata()?.len();
        let mut source = BufReader::new(file);

        // Empty password: encrypted archives fail here or on first read
        let archive = sevenz_rust::Archive::read(&mut source, len, Password::empty().as_slice())
            .map_err(|e| self.convert_sevenz_error(e))?;
        Ok((archive, source))
    }

    fn convert_sevenz_error(&self, e: sevenz_rust::Error) -> Error {
        let message = e.to_string();
        if is_password_error(&message) {
            Error::Encrypted {
                archive: self.path.clone(),
                entry: String::new(),
            }
        } else {
            Error::corrupt(&self.path, format!("7z: {}", message))
        }
    }

    fn file_info(&self, entry: &SevenZArchiveEntry) -> FileInfo {
        FileInfo {
            archive_name: archive_name(&self.path),
            filename: entry.name().to_string(),
            modified: None,
            crc32: None,
            unpacked_size: entry.size(),
            packed_size: None,
            flags: FileFlags {
                directory: entry.is_directory(),
                ..FileFlags::default()
            },
            packing_method: None,
        }
    }

    /// Walk the archive's entries in order until `each` returns `false`
    ///
    /// Entries of a solid block share one decode stream, so `each` must read
    /// an entry to its end before asking for the next one.
    /// The decoder's callback has its own error type, so our errors are
    /// parked in `failure` while iteration stops.
    fn walk(
        &self,
        each: &mut dyn FnMut(&FileInfo, &mut dyn Read) -> Result<bool>,
    ) -> Result<()> {
        let (archive, mut source) = self.open()?;
        let mut failure = None;

        for_each_entry(&archive, &mut source, &mut |entry, reader| {
            match each(&self.file_info(entry), reader) {
                Ok(keep_going) => Ok(keep_going),
                Err(e) => {
                    failure = Some(e);
                    Ok(false)
                }
            }
        })
        .map_err(|e| self.convert_sevenz_error(e))?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read and discard the rest of an entry
    fn drain(&self, info: &FileInfo, reader: &mut dyn Read) -> Result<()> {
        std::io::copy(reader, &mut std::io::sink())
            .map_err(|e| decode_read_error(&self.path, &info.filename, e))?;
        Ok(())
    }
}

/// Visit every entry, block by block, then the entries without data
///
/// Returns `Ok(false)` as soon as `visit` asks to stop. No decoder is built
/// for the blocks after that point.
fn for_each_entry<F>(
    archive: &sevenz_rust::Archive,
    source: &mut BufReader<File>,
    visit: &mut F,
) -> std::result::Result<bool, sevenz_rust::Error>
where
    F: FnMut(&SevenZArchiveEntry, &mut dyn Read) -> std::result::Result<bool, sevenz_rust::Error>,
{
    let password = Password::empty();
    for folder_index in 0..archive.folders.len() {
        let decoder = BlockDecoder::new(folder_index, archive, password.as_slice(), &mut *source);
        if !decoder.for_each_entries(visit)? {
            return Ok(false);
        }
    }

    let folders = &archive.stream_map.file_folder_index;
    for (entry, folder) in archive.files.iter().zip(folders) {
        if folder.is_none() && !visit(entry, &mut std::io::empty())? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl ArchiveBackend for SevenZipBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> Result<Vec<FileInfo>> {
        let (archive, _source) = self.open()?;
        let infos: Vec<FileInfo> = archive.files.iter().map(|e| self.file_info(e)).collect();

        debug!(archive = ?self.path, entries = infos.len(), "listed 7z archive");
        Ok(infos)
    }

    fn stream_entry(&self, name: &str, sink: &mut dyn EntrySink) -> Result<()> {
        let mut found = false;
        self.walk(&mut |info, reader| {
            if !entry_name_matches(&info.filename, name) {
                self.drain(info, reader)?;
                return Ok(true);
            }
            found = true;
            sink.begin(info)?;
            let copied = copy_to_sink(reader, sink, &self.path, &info.filename)?;
            debug!(archive = ?self.path, entry = %info.filename, bytes = copied, "streamed 7z entry");
            Ok(false)
        })?;

        if found {
            Ok(())
        } else {
            Err(Error::entry_not_found(&self.path, name))
        }
    }

    fn for_each_data(&self, visit: &mut dyn FnMut(&FileInfo, &[u8]) -> Result<()>) -> Result<()> {
        self.walk(&mut |info, reader| {
            let mut data = Vec::new();
            reader
                .read_to_end(&mut data)
                .map_err(|e| decode_read_error(&self.path, &info.filename, e))?;
            visit(info, &data)?;
            Ok(true)
        })
    }

    fn extract_all(&self, dest: &Path, collision: FileCollisionAction) -> Result<Vec<PathBuf>> {
        debug!(archive = ?self.path, ?dest, ?collision, "extracting 7z archive");

        std::fs::create_dir_all(dest)?;
        let mut extracted_files = Vec::new();

        self.walk(&mut |info, reader| {
            if info.is_directory() {
                if let Some(relative) = super::sanitize_entry_path(&info.filename) {
                    std::fs::create_dir_all(dest.join(relative))?;
                }
                return Ok(true);
            }

            let Some(file_path) = prepare_output_path(dest, &info.filename, collision)? else {
                warn!(archive = ?self.path, entry = %info.filename, "skipping entry with unsafe path");
                self.drain(info, reader)?;
                return Ok(true);
            };

            let mut outfile = File::create(&file_path)?;
            std::io::copy(reader, &mut outfile)
                .map_err(|e| decode_read_error(&self.path, &info.filename, e))?;
            extracted_files.push(file_path);
            Ok(true)
        })?;

        info!(
            archive = ?self.path,
            extracted_count = extracted_files.len(),
            "7z extraction successful"
        );
        Ok(extracted_files)
    }

    fn test_integrity(&self) -> Result<()> {
        let mut tested = 0usize;
        self.walk(&mut |info, reader| {
            self.drain(info, reader)?;
            tested += 1;
            Ok(true)
        })?;

        debug!(archive = ?self.path, tested, "7z integrity check passed");
        Ok(())
    }
}
