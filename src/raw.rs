//! Byte-exact transfer primitives that tolerate short and interrupted calls.
//!
//! These move bytes only. They never interpret or convert content.

use std::fs::File;
use std::io::{self, ErrorKind, Read};

/// Positioned, non-seeking I/O on a backing device.
pub trait PositionedIo {
    /// Read up to `buf.len()` bytes at `offset`, returning how many were read.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes at `offset`, returning how many were written.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

impl PositionedIo for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                std::os::unix::fs::FileExt::read_at(self, buf, offset)
            } else if #[cfg(windows)] {
                std::os::windows::fs::FileExt::seek_read(self, buf, offset)
            } else {
                compile_error!("positioned I/O is only implemented for unix and windows");
            }
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                std::os::unix::fs::FileExt::write_at(self, buf, offset)
            } else if #[cfg(windows)] {
                std::os::windows::fs::FileExt::seek_write(self, buf, offset)
            } else {
                compile_error!("positioned I/O is only implemented for unix and windows");
            }
        }
    }
}

fn no_space() -> io::Error {
    io::Error::new(ErrorKind::WriteZero, "no space left on device")
}

fn too_short() -> io::Error {
    io::Error::new(ErrorKind::UnexpectedEof, "short read")
}

/// Write all of `buf` at `offset`.
///
/// Partial writes continue where they stopped and `Interrupted` is retried.
/// A write that makes no progress is treated as exhausted capacity.
///
/// # Errors
///
/// Returns the underlying error, or `WriteZero` when no progress is made.
pub fn pwrite_all<D: PositionedIo + ?Sized>(dev: &D, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match dev.write_at(buf, offset) {
            Ok(0) => return Err(no_space()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fill all of `buf` from `offset`.
///
/// # Errors
///
/// Returns the underlying error, or `UnexpectedEof` when the device runs out
/// of bytes before `buf` is full.
pub fn pread_all<D: PositionedIo + ?Sized>(dev: &D, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match dev.read_at(buf, offset) {
            Ok(0) => return Err(too_short()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fill all of `buf` from the current position of `reader`.
///
/// Used for bootstrap reads before random access is meaningful.
///
/// # Errors
///
/// Same as [`pread_all`].
pub fn read_all<R: Read + ?Sized>(reader: &mut R, mut buf: &mut [u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => return Err(too_short()),
            Ok(n) => buf = &mut buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
