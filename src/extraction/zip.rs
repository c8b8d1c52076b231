use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::{ArchiveFormat, FileFlags, FileInfo, PackingMethod};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::shared::{archive_name, copy_to_sink, decode_read_error, entry_name_matches};
use super::shared::{is_password_error, open_archive_file, prepare_output_path};
use super::{ArchiveBackend, EntrySink};

type Reader = zip::ZipArchive<BufReader<File>>;

/// Archive backend for ZIP files
pub struct ZipBackend {
    path: PathBuf,
}

impl ZipBackend {
    /// Create a backend for the ZIP archive at `path`
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn open(&self) -> Result<Reader> {
        let file = open_archive_file(&self.path)?;
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| self.convert_zip_error(e, ""))
    }

    /// Convert a zip error to our error type, checking for password errors
    fn convert_zip_error(&self, e: zip::result::ZipError, entry: &str) -> Error {
        match e {
            zip::result::ZipError::Io(io) => decode_read_error(&self.path, entry, io),
            zip::result::ZipError::FileNotFound => Error::entry_not_found(&self.path, entry),
            other => {
                let message = other.to_string();
                if is_password_error(&message) {
                    Error::Encrypted {
                        archive: self.path.clone(),
                        entry: entry.to_string(),
                    }
                } else {
                    Error::corrupt(&self.path, message)
                }
            }
        }
    }

    fn file_info(&self, file: &zip::read::ZipFile) -> FileInfo {
        FileInfo {
            archive_name: archive_name(&self.path),
            filename: file.name().to_string(),
            modified: zip_datetime(file.last_modified()),
            crc32: Some(file.crc32()),
            unpacked_size: file.size(),
            packed_size: Some(file.compressed_size()),
            flags: FileFlags {
                directory: file.is_dir(),
                ..FileFlags::default()
            },
            packing_method: match file.compression() {
                zip::CompressionMethod::Stored => Some(PackingMethod::Storage),
                _ => None,
            },
        }
    }

    /// Find the index of an entry by name without decrypting or decoding it
    fn find_index(&self, archive: &mut Reader, name: &str) -> Result<Option<usize>> {
        for i in 0..archive.len() {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| self.convert_zip_error(e, name))?;
            if entry_name_matches(file.name(), name) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

impl ArchiveBackend for ZipBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> Result<Vec<FileInfo>> {
        let mut archive = self.open()?;
        let mut infos = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| self.convert_zip_error(e, ""))?;
            infos.push(self.file_info(&file));
        }

        debug!(archive = ?self.path, entries = infos.len(), "listed ZIP archive");
        Ok(infos)
    }

    fn stream_entry(&self, name: &str, sink: &mut dyn EntrySink) -> Result<()> {
        let mut archive = self.open()?;
        let index = self
            .find_index(&mut archive, name)?
            .ok_or_else(|| Error::entry_not_found(&self.path, name))?;

        let mut file = archive
            .by_index(index)
            .map_err(|e| self.convert_zip_error(e, name))?;
        let info = self.file_info(&file);

        sink.begin(&info)?;
        let copied = copy_to_sink(&mut file, sink, &self.path, &info.filename)?;
        debug!(archive = ?self.path, entry = %info.filename, bytes = copied, "streamed ZIP entry");
        Ok(())
    }

    fn for_each_data(&self, visit: &mut dyn FnMut(&FileInfo, &[u8]) -> Result<()>) -> Result<()> {
        let mut archive = self.open()?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| self.convert_zip_error(e, ""))?;
            let info = self.file_info(&file);

            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| decode_read_error(&self.path, &info.filename, e))?;
            visit(&info, &data)?;
        }
        Ok(())
    }

    fn extract_all(&self, dest: &Path, collision: FileCollisionAction) -> Result<Vec<PathBuf>> {
        debug!(archive = ?self.path, ?dest, ?collision, "extracting ZIP archive");

        std::fs::create_dir_all(dest)?;
        let mut archive = self.open()?;
        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| self.convert_zip_error(e, ""))?;
            let name = file.name().to_string();

            if file.is_dir() {
                if let Some(relative) = super::sanitize_entry_path(&name) {
                    std::fs::create_dir_all(dest.join(relative))?;
                }
                continue;
            }

            let Some(file_path) = prepare_output_path(dest, &name, collision)? else {
                warn!(archive = ?self.path, entry = %name, "skipping entry with unsafe path");
                continue;
            };

            let mut outfile = File::create(&file_path)?;
            std::io::copy(&mut file, &mut outfile)
                .map_err(|e| decode_read_error(&self.path, &name, e))?;
            extracted_files.push(file_path);
        }

        info!(
            archive = ?self.path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );
        Ok(extracted_files)
    }

    fn test_integrity(&self) -> Result<()> {
        let mut archive = self.open()?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| self.convert_zip_error(e, ""))?;
            let name = file.name().to_string();
            // The CRC is checked once the entry has been read to the end
            std::io::copy(&mut file, &mut std::io::sink())
                .map_err(|e| decode_read_error(&self.path, &name, e))?;
        }

        debug!(archive = ?self.path, tested = archive.len(), "ZIP integrity check passed");
        Ok(())
    }
}

fn zip_datetime(dt: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(dt.year()), u32::from(dt.month()), u32::from(dt.day()))?
        .and_hms_opt(
            u32::from(dt.hour()),
            u32::from(dt.minute()),
            u32::from(dt.second()),
        )
}
