//! Direct access to the native unrar library for streaming one entry
//!
//! The `unrar` crate hands out whole entries only (`read()` into a `Vec` or
//! `extract_to()` a path). The library underneath reports every decoded block
//! through its `UCM_PROCESSDATA` callback, so this module drives `unrar_sys`
//! directly and forwards each block to an [`EntrySink`] while decoding. A sink
//! error stops the decoder inside the same call.
//!
//! All `unsafe` code of the RAR backend lives here.

use crate::error::Error;
use std::any::Any;
use std::ffi::c_int;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::path::Path;
use std::ptr::NonNull;
use unrar::error::{Code, UnrarError, When};
use unrar_sys as native;

use super::EntrySink;

/// Why streaming an entry stopped early
#[derive(Debug)]
pub(crate) enum StreamFailure {
    /// The sink refused a block
    Sink(Error),
    /// The library reported an error
    Native(UnrarError),
}

/// An archive opened for processing, closed on drop
pub(crate) struct NativeArchive {
    handle: NonNull<native::Handle>,
}

/// State shared with [`on_message`] while one entry is decoded
struct DataContext<'a> {
    sink: &'a mut dyn EntrySink,
    bytes: u64,
    failure: Option<Error>,
    panic: Option<Box<dyn Any + Send>>,
}

impl DataContext<'_> {
    /// Forward one decoded block, returning the library's continue (0) or stop (-1) code
    fn deliver(&mut self, data: &[u8]) -> c_int {
        if self.failure.is_some() || self.panic.is_some() {
            return -1;
        }

        // Unwinding through the C++ frames of the library is not allowed
        match catch_unwind(AssertUnwindSafe(|| self.sink.write(data))) {
            Ok(Ok(())) => {
                self.bytes += data.len() as u64;
                0
            }
            Ok(Err(e)) => {
                self.failure = Some(e);
                -1
            }
            Err(payload) => {
                self.panic = Some(payload);
                -1
            }
        }
    }
}

impl NativeArchive {
    /// Open `path` in extract mode
    pub(crate) fn open(path: &Path) -> Result<Self, UnrarError> {
        let name = NativePath::new(path).ok_or(UnrarError::from(Code::EOpen, When::Open))?;
        let mut data = native::OpenArchiveDataEx::new(name.as_ptr(), native::RAR_OM_EXTRACT);

        // SAFETY: `data` is a properly initialized open request whose name
        // pointer stays valid for the duration of the call.
        let raw = unsafe { native::RAROpenArchiveEx(&mut data as *mut native::OpenArchiveDataEx) };
        let code = to_code(data.open_result as c_int);

        // A handle returned alongside an error is still closed by Drop
        let archive = NonNull::new(raw as *mut native::Handle).map(|handle| Self { handle });
        match (archive, code) {
            (Some(archive), Code::Success) => {
                archive.set_callback(0);
                Ok(archive)
            }
            (_, Code::Success) => Err(UnrarError::from(Code::Unknown, When::Open)),
            (_, code) => Err(UnrarError::from(code, When::Open)),
        }
    }

    /// Read the next entry header, `None` at the end of the archive
    pub(crate) fn read_header(&mut self) -> Result<Option<unrar::FileHeader>, UnrarError> {
        let mut header = native::HeaderDataEx::default();

        // SAFETY: the handle is open and `header` is a writable header struct
        let code = unsafe {
            native::RARReadHeaderEx(
                self.handle.as_ptr(),
                &mut header as *mut native::HeaderDataEx,
            )
        };
        match to_code(code) {
            Code::Success => Ok(Some(header.into())),
            Code::EndArchive => Ok(None),
            code => Err(UnrarError::from(code, When::Read)),
        }
    }

    /// Move past the entry whose header was just read
    pub(crate) fn skip(&mut self) -> Result<(), UnrarError> {
        match self.process(native::RAR_SKIP) {
            Code::Success => Ok(()),
            code => Err(UnrarError::from(code, When::Process)),
        }
    }

    /// Decode the entry whose header was just read into `sink`
    ///
    /// Blocks reach the sink as the library produces them, at most one
    /// decoder window at a time. Returns the number of bytes delivered.
    pub(crate) fn stream_to(&mut self, sink: &mut dyn EntrySink) -> Result<u64, StreamFailure> {
        let mut context = DataContext {
            sink,
            bytes: 0,
            failure: None,
            panic: None,
        };

        self.set_callback(&mut context as *mut DataContext as native::LPARAM);
        let code = self.process(native::RAR_TEST);
        self.set_callback(0);

        if let Some(payload) = context.panic {
            resume_unwind(payload);
        }
        if let Some(e) = context.failure {
            return Err(StreamFailure::Sink(e));
        }
        match code {
            Code::Success => Ok(context.bytes),
            code => Err(StreamFailure::Native(UnrarError::from(code, When::Process))),
        }
    }

    fn process(&mut self, operation: c_int) -> Code {
        // SAFETY: the handle is open and positioned after a header; null
        // destination pointers are accepted for skip and test operations.
        let code = unsafe {
            native::RARProcessFile(
                self.handle.as_ptr(),
                operation,
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        to_code(code)
    }

    fn set_callback(&self, user_data: native::LPARAM) {
        // SAFETY: the handle is open. A non-zero `user_data` points at a
        // `DataContext` that outlives the process call it is registered for,
        // and is reset to zero before that context is dropped.
        unsafe { native::RARSetCallback(self.handle.as_ptr(), Some(on_message), user_data) }
    }
}

impl Drop for NativeArchive {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by RAROpenArchiveEx and is closed once
        unsafe {
            native::RARCloseArchive(self.handle.as_ptr());
        }
    }
}

extern "C" fn on_message(
    msg: native::UINT,
    user_data: native::LPARAM,
    p1: native::LPARAM,
    p2: native::LPARAM,
) -> c_int {
    match msg {
        // Stop when the next volume is missing, continue when it was found
        native::UCM_CHANGEVOLUME | native::UCM_CHANGEVOLUMEW => {
            if p2 == native::RAR_VOL_ASK {
                -1
            } else {
                0
            }
        }
        // No password support
        native::UCM_NEEDPASSWORD | native::UCM_NEEDPASSWORDW => -1,
        native::UCM_PROCESSDATA if user_data != 0 && p1 != 0 && p2 > 0 => {
            // SAFETY: non-zero user data is always a live `DataContext` (see
            // `set_callback`), and the library passes a block of `p2` bytes at `p1`.
            let context = unsafe { &mut *(user_data as *mut DataContext) };
            let data = unsafe { std::slice::from_raw_parts(p1 as *const u8, p2 as usize) };
            context.deliver(data)
        }
        _ => 0,
    }
}

fn to_code(code: c_int) -> Code {
    Code::from(code).unwrap_or(Code::Unknown)
}

/// Archive path in the encoding the library expects on this platform
#[cfg(any(target_os = "linux", target_os = "netbsd"))]
struct NativePath(std::ffi::CString);

#[cfg(any(target_os = "linux", target_os = "netbsd"))]
impl NativePath {
    fn new(path: &Path) -> Option<Self> {
        use std::os::unix::ffi::OsStrExt;
        std::ffi::CString::new(path.as_os_str().as_bytes())
            .ok()
            .map(Self)
    }

    fn as_ptr(&self) -> *const std::ffi::c_char {
        self.0.as_ptr()
    }
}

#[cfg(not(any(target_os = "linux", target_os = "netbsd")))]
struct NativePath(Vec<native::WCHAR>);

#[cfg(not(any(target_os = "linux", target_os = "netbsd")))]
impl NativePath {
    fn new(path: &Path) -> Option<Self> {
        #[cfg(windows)]
        let wide: Vec<native::WCHAR> = {
            use std::os::windows::ffi::OsStrExt;
            path.as_os_str().encode_wide().collect()
        };
        #[cfg(not(windows))]
        let wide: Vec<native::WCHAR> = path.to_str()?.chars().map(|c| c as native::WCHAR).collect();

        if wide.contains(&0) {
            return None;
        }
        Some(Self(wide.into_iter().chain(std::iter::once(0)).collect()))
    }

    fn as_ptr(&self) -> *const native::WCHAR {
        self.0.as_ptr()
    }
}
