#![cfg_attr(not(test), no_std)]

// must come first so the log macros are in scope for every other module
mod fmt;

mod bus;
mod engine;
mod listing;
mod peaks;
pub mod view;
mod window;

#[cfg(test)]
pub(crate) mod mock;

pub use bus::{Bus, StorageAccess};
pub use engine::{AudioCallback, Engine, Mode};
pub use listing::{is_audio_file, FileList};
pub use peaks::{
    analyze, analyze_file, analyze_with_header, read_header, samples_per_peak, Format, Header,
};
pub use window::ScrubWindow;

use embedded_io::{ErrorKind, ErrorType, ReadExactError, SeekFrom};

/// samples per real-time tick
pub const BLOCK_LEN: usize = 128;
/// window capacity in ticks
pub const WINDOW_BLOCKS: usize = 128;
/// window capacity in samples
pub const WINDOW_LEN: usize = BLOCK_LEN * WINDOW_BLOCKS;
/// largest single read issued by a window refill, in bytes
pub const CHUNK_LEN: usize = 512;
/// filename capacity in bytes
pub const PATH_LEN: usize = 100;
/// waveform area in screen columns
pub const WAVEFORM_WIDTH: usize = 280;
/// waveform area in screen rows
pub const WAVEFORM_HEIGHT: u16 = 120;

#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// medium could not be re-initialized
    StorageUnavailable(E),
    NotFound,
    OpenFailed(E),
    /// file opened fine but holds zero bytes
    EmptyFile,
    /// not a RIFF/WAVE container
    BadFormat,
    FmtNotFound,
    DataNotFound,
    UnsupportedDepth(u16),
    Other(E),
}

impl<E> Error<E> {
    /// container-level failures, as opposed to storage failures
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::BadFormat | Error::FmtNotFound | Error::DataNotFound | Error::UnsupportedDepth(_)
        )
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::StorageUnavailable(e) => write!(f, "storage unavailable: {:?}", e),
            Error::NotFound => write!(f, "file not found"),
            Error::OpenFailed(e) => write!(f, "open failed: {:?}", e),
            Error::EmptyFile => write!(f, "file is empty"),
            Error::BadFormat => write!(f, "not a RIFF/WAVE file"),
            Error::FmtNotFound => write!(f, "`fmt ` chunk not found"),
            Error::DataNotFound => write!(f, "`data` chunk not found"),
            Error::UnsupportedDepth(bits) => write!(f, "unsupported bit depth: {}", bits),
            Error::Other(e) => write!(f, "io error: {:?}", e),
        }
    }
}

/// classify a failed open by its kind
pub(crate) fn open_error<E: embedded_io::Error>(e: E) -> Error<E> {
    match e.kind() {
        ErrorKind::NotFound => Error::NotFound,
        _ => Error::OpenFailed(e),
    }
}

/// directory entry handed out by [`FileHandler::iterate_dir`]
#[derive(Clone, Copy, Debug)]
pub struct Entry<'a> {
    pub name: &'a str,
    pub is_dir: bool,
}

/// read-only access to a single storage medium
pub trait FileHandler: ErrorType {
    type File;

    /// re-initialize the medium ahead of an open
    fn remount(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// open file handle
    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    /// close file; consumes the handle
    fn close(&mut self, file: Self::File) -> Result<(), Self::Error>;

    /// file length in bytes
    fn len(&mut self, file: &mut Self::File) -> Result<u64, Self::Error>;

    /// Read some bytes into `buf`, returning how many were read.
    ///
    /// Fewer bytes than requested, including `Ok(0)`, may come back at end-of-file or on a
    /// transient error. Implementations must not block indefinitely.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Seek to an offset, in bytes. Seeking past the end of the file is an error.
    fn seek(&mut self, file: &mut Self::File, pos: SeekFrom) -> Result<u64, Self::Error>;

    /// call `f` once per entry of the directory at `path`
    fn iterate_dir<C: FnMut(Entry<'_>)>(&mut self, path: &str, f: C) -> Result<(), Self::Error>;

    /// Returns the current seek position from the start of the stream.
    fn stream_position(&mut self, file: &mut Self::File) -> Result<u64, Self::Error> {
        self.seek(file, SeekFrom::Current(0))
    }

    /// fill `buf` entirely or fail
    fn read_exact(
        &mut self,
        file: &mut Self::File,
        mut buf: &mut [u8],
    ) -> Result<(), ReadExactError<Self::Error>> {
        while !buf.is_empty() {
            match self.read(file, buf) {
                Ok(0) => return Err(ReadExactError::UnexpectedEof),
                Ok(n) => buf = &mut buf[n..],
                Err(e) => return Err(ReadExactError::Other(e)),
            }
        }
        Ok(())
    }
}
