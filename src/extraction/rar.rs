use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::{ArchiveFormat, FileFlags, FileInfo, PackingMethod};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use unrar::error::{Code, UnrarError};

use super::shared::{archive_name, entry_name_matches, is_password_error};
use super::shared::{open_archive_file, prepare_output_path};
use super::unrar_native::{NativeArchive, StreamFailure};
use super::{ArchiveBackend, EntrySink};

type HeaderCursor = unrar::OpenArchive<unrar::Process, unrar::CursorBeforeHeader>;

/// Archive backend for RAR files, backed by the native unrar library
pub struct RarBackend {
    path: PathBuf,
}

impl RarBackend {
    /// Create a backend for the RAR archive at `path`
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Convert an unrar error to our error type
    fn convert_unrar_error(&self, e: UnrarError, entry: Option<&str>) -> Error {
        let message = e.to_string();
        match e.code {
            Code::EOpen => Error::ArchiveNotFound {
                path: self.path.clone(),
            },
            Code::MissingPassword => Error::Encrypted {
                archive: self.path.clone(),
                entry: entry.unwrap_or_default().to_string(),
            },
            Code::ERead | Code::EWrite | Code::ECreate | Code::EClose => {
                Error::Io(std::io::Error::other(format!("unrar: {}", message)))
            }
            _ if is_password_error(&message) => Error::Encrypted {
                archive: self.path.clone(),
                entry: entry.unwrap_or_default().to_string(),
            },
            _ => Error::corrupt(&self.path, message),
        }
    }

    fn open_for_processing(&self) -> Result<HeaderCursor> {
        // Surface a missing file before unrar turns it into a generic open error
        open_archive_file(&self.path)?;
        unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| self.convert_unrar_error(e, None))
    }

    fn file_info(&self, header: &unrar::FileHeader) -> FileInfo {
        FileInfo {
            archive_name: archive_name(&self.path),
            filename: header.filename.to_string_lossy().into_owned(),
            modified: dos_datetime(header.file_time),
            crc32: Some(header.file_crc),
            unpacked_size: header.unpacked_size,
            packed_size: None,
            flags: FileFlags {
                continued_from_previous: header.is_split_before(),
                continued_on_next: header.is_split_after(),
                encrypted: header.is_encrypted(),
                directory: header.is_directory(),
            },
            packing_method: PackingMethod::from_rar_method(header.method),
        }
    }
}

impl ArchiveBackend for RarBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn list(&self) -> Result<Vec<FileInfo>> {
        open_archive_file(&self.path)?;
        let listing = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| self.convert_unrar_error(e, None))?;

        let mut infos = Vec::new();
        for header in listing {
            let header = header.map_err(|e| self.convert_unrar_error(e, None))?;
            infos.push(self.file_info(&header));
        }

        debug!(archive = ?self.path, entries = infos.len(), "listed RAR archive");
        Ok(infos)
    }

    fn stream_entry(&self, name: &str, sink: &mut dyn EntrySink) -> Result<()> {
        // Surface a missing file before unrar turns it into a generic open error
        open_archive_file(&self.path)?;
        let mut archive =
            NativeArchive::open(&self.path).map_err(|e| self.convert_unrar_error(e, None))?;

        loop {
            let header = match archive.read_header() {
                Ok(Some(header)) => header,
                Ok(None) => return Err(Error::entry_not_found(&self.path, name)),
                Err(e) => return Err(self.convert_unrar_error(e, Some(name))),
            };

            let info = self.file_info(&header);
            if !entry_name_matches(&info.filename, name) {
                archive
                    .skip()
                    .map_err(|e| self.convert_unrar_error(e, Some(&info.filename)))?;
                continue;
            }

            if info.flags.encrypted {
                return Err(Error::Encrypted {
                    archive: self.path.clone(),
                    entry: info.filename,
                });
            }

            sink.begin(&info)?;
            if info.is_directory() {
                return Ok(());
            }

            let streamed = archive.stream_to(sink).map_err(|failure| match failure {
                StreamFailure::Sink(e) => e,
                StreamFailure::Native(e) => self.convert_unrar_error(e, Some(&info.filename)),
            })?;
            debug!(archive = ?self.path, entry = %info.filename, bytes = streamed, "streamed RAR entry");
            return Ok(());
        }
    }

    fn for_each_data(&self, visit: &mut dyn FnMut(&FileInfo, &[u8]) -> Result<()>) -> Result<()> {
        let mut at_header = self.open_for_processing()?;

        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.convert_unrar_error(e, None)),
            };

            let info = self.file_info(at_file.entry());
            if info.is_directory() {
                visit(&info, &[])?;
                at_header = at_file
                    .skip()
                    .map_err(|e| self.convert_unrar_error(e, Some(&info.filename)))?;
                continue;
            }

            let (data, next) = at_file
                .read()
                .map_err(|e| self.convert_unrar_error(e, Some(&info.filename)))?;
            visit(&info, &data)?;
            at_header = next;
        }
    }

    fn extract_all(&self, dest: &Path, collision: FileCollisionAction) -> Result<Vec<PathBuf>> {
        debug!(archive = ?self.path, ?dest, ?collision, "extracting RAR archive");

        std::fs::create_dir_all(dest)?;
        let mut at_header = self.open_for_processing()?;
        let mut extracted_files = Vec::new();

        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(self.convert_unrar_error(e, None)),
            };

            let header = at_file.entry();
            let name = header.filename.to_string_lossy().into_owned();

            if header.is_directory() {
                if let Some(relative) = super::sanitize_entry_path(&name) {
                    std::fs::create_dir_all(dest.join(relative))?;
                }
                at_header = at_file
                    .skip()
                    .map_err(|e| self.convert_unrar_error(e, Some(&name)))?;
                continue;
            }

            // Entries with no valid path components (e.g., pure ".." entries) are skipped
            let Some(file_path) = prepare_output_path(dest, &name, collision)? else {
                debug!(archive = ?self.path, entry = %name, "skipping entry with unsafe path");
                at_header = at_file
                    .skip()
                    .map_err(|e| self.convert_unrar_error(e, Some(&name)))?;
                continue;
            };

            at_header = at_file
                .extract_to(&file_path)
                .map_err(|e| self.convert_unrar_error(e, Some(&name)))?;
            extracted_files.push(file_path);
        }

        info!(
            archive = ?self.path,
            extracted_count = extracted_files.len(),
            "RAR extraction successful"
        );
        Ok(extracted_files)
    }

    fn test_integrity(&self) -> Result<()> {
        let mut at_header = self.open_for_processing()?;
        let mut tested = 0usize;

        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(self.convert_unrar_error(e, None)),
            };
            let name = at_file.entry().filename.to_string_lossy().into_owned();
            at_header = at_file
                .test()
                .map_err(|e| self.convert_unrar_error(e, Some(&name)))?;
            tested += 1;
        }

        debug!(archive = ?self.path, tested, "RAR integrity check passed");
        Ok(())
    }
}

/// Convert an MS-DOS packed date/time (date in the high word) to a timestamp
///
/// Returns `None` for values that do not form a valid calendar date.
pub(crate) fn dos_datetime(packed: u32) -> Option<NaiveDateTime> {
    let date = packed >> 16;
    let time = packed & 0xffff;

    let year = 1980 + ((date >> 9) & 0x7f) as i32;
    let month = (date >> 5) & 0x0f;
    let day = date & 0x1f;
    let hour = (time >> 11) & 0x1f;
    let minute = (time >> 5) & 0x3f;
    let second = (time & 0x1f) * 2;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
