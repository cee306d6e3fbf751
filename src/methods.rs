//! The capability interface every backend provides.
//!
//! A [`Store`] routes its five primitive operations through an installed
//! [`IoMethods`] implementation. [`MappedIo`] serves a plain file or heap
//! buffer; higher layers (a transaction overlay, say) can install their own
//! and delegate to `MappedIo` for what they do not override.

use std::sync::Arc;

use crate::access::DirectRegion;
use crate::errors::{Result, TdbError};
use crate::logging::Severity;
use crate::mmap::Store;
use crate::raw::{pread_all, pwrite_all};
use crate::utils::range_end;

/// Primitive operations over a store's bytes.
pub trait IoMethods: Send + Sync {
    /// Fill `buf` from `off`.
    ///
    /// # Errors
    ///
    /// Returns bounds and transfer failures.
    fn read(&self, store: &Store, off: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `off`.
    ///
    /// # Errors
    ///
    /// Returns read-only, bounds and transfer failures.
    fn write(&self, store: &Store, off: u64, data: &[u8]) -> Result<()>;

    /// Make sure `len` bytes are addressable. See [`Store::bounds_check`].
    ///
    /// # Errors
    ///
    /// Returns bounds failures.
    fn oob(&self, store: &Store, len: u64, probe: bool) -> Result<()>;

    /// Append `addition` bytes.
    ///
    /// # Errors
    ///
    /// Returns read-only, allocation and transfer failures.
    fn expand(&self, store: &Store, addition: u64) -> Result<()>;

    /// Lease `[off, off + len)` of the mapping, if that is possible right now.
    fn direct<'a>(&self, store: &'a Store, off: u64, len: u64, write: bool) -> Option<DirectRegion<'a>>;
}

/// Default backend: the store's own mapping, heap buffer or file.
#[derive(Debug, Default, Clone, Copy)]
pub struct MappedIo;

impl IoMethods for MappedIo {
    fn read(&self, store: &Store, off: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u64;
        let end = range_end(off, len).map_err(|e| store.record(e))?;
        store.check_bounds(end, false)?;

        if store.state.lock().copy_out(off, buf).map_err(|e| store.record(e))? {
            return Ok(());
        }
        let Some(file) = store.file.as_ref() else {
            return Err(store.record(TdbError::BeyondMemory { len: end, size: 0 }));
        };
        pread_all(file, buf, off).map_err(|e| {
            let err = store.record(e.into());
            store.log(
                Severity::Fatal,
                format_args!("read failed at {off} len={len} ({err}) map_size={}", store.len()),
            );
            err
        })
    }

    fn write(&self, store: &Store, off: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if store.flags.read_only {
            return Err(store.read_only_violation("write"));
        }
        let len = data.len() as u64;
        let end = range_end(off, len).map_err(|e| store.record(e))?;
        store.check_bounds(end, false)?;

        if store.state.lock().copy_in(off, data).map_err(|e| store.record(e))? {
            return Ok(());
        }
        let Some(file) = store.file.as_ref() else {
            return Err(store.record(TdbError::BeyondMemory { len: end, size: 0 }));
        };
        pwrite_all(file, data, off).map_err(|e| {
            let err = store.record(e.into());
            store.log(
                Severity::Fatal,
                format_args!("write failed at {off} len={len} ({err})"),
            );
            err
        })
    }

    fn oob(&self, store: &Store, len: u64, probe: bool) -> Result<()> {
        store.check_bounds(len, probe)
    }

    fn expand(&self, store: &Store, addition: u64) -> Result<()> {
        store.grow(addition)
    }

    fn direct<'a>(&self, store: &'a Store, off: u64, len: u64, write: bool) -> Option<DirectRegion<'a>> {
        store.lease_direct(off, len, write)
    }
}

impl Store {
    /// The installed backend.
    #[must_use]
    pub fn methods(&self) -> &Arc<dyn IoMethods> {
        &self.methods
    }

    /// Install a different backend.
    pub fn set_methods(&mut self, methods: Arc<dyn IoMethods>) {
        self.methods = methods;
    }

    /// Fill `buf` with the bytes at `off`.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::OutOfBounds` if the store is too short even after
    /// resynchronizing, or the transfer error.
    pub fn read(&self, off: u64, buf: &mut [u8]) -> Result<()> {
        self.methods.read(self, off, buf)
    }

    /// Write `data` at `off`. The range must already exist.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly` on read-only stores, bounds failures, or
    /// the transfer error.
    pub fn write(&self, off: u64, data: &[u8]) -> Result<()> {
        self.methods.write(self, off, data)
    }

    /// Check that `len` bytes are addressable, resynchronizing with the file
    /// (and remapping) if it has grown. With `probe` set, the expected
    /// "not grown yet" outcome is neither logged nor latched.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::OutOfBounds` or `TdbError::BeyondMemory` when too
    /// short, `TdbError::BorrowsOutstanding` if a remap is needed while
    /// direct borrows are live.
    pub fn bounds_check(&self, len: u64, probe: bool) -> Result<()> {
        self.methods.oob(self, len, probe)
    }

    /// Append `addition` bytes. New file space reads as
    /// [`FILL_BYTE`](crate::expand::FILL_BYTE), new memory as zero. Callers
    /// sharing the file hold the expansion lock exclusively around this.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly`, `TdbError::OutOfMemory`,
    /// `TdbError::BorrowsOutstanding` or the fill write error.
    pub fn expand(&self, addition: u64) -> Result<()> {
        self.methods.expand(self, addition)
    }

    /// Lease `[off, off + len)` of the mapping for zero-copy access, or
    /// `None` when that is not possible (no mapping, out of reach, or
    /// clashing with a live lease).
    #[must_use]
    pub fn direct(&self, off: u64, len: u64, write: bool) -> Option<DirectRegion<'_>> {
        self.methods.direct(self, off, len, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts writes and never offers direct access.
    #[derive(Default)]
    struct Counting {
        writes: AtomicUsize,
    }

    impl IoMethods for Counting {
        fn read(&self, store: &Store, off: u64, buf: &mut [u8]) -> Result<()> {
            MappedIo.read(store, off, buf)
        }

        fn write(&self, store: &Store, off: u64, data: &[u8]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            MappedIo.write(store, off, data)
        }

        fn oob(&self, store: &Store, len: u64, probe: bool) -> Result<()> {
            MappedIo.oob(store, len, probe)
        }

        fn expand(&self, store: &Store, addition: u64) -> Result<()> {
            MappedIo.expand(store, addition)
        }

        fn direct<'a>(&self, _store: &'a Store, _off: u64, _len: u64, _write: bool) -> Option<DirectRegion<'a>> {
            None
        }
    }

    #[test]
    fn installed_backend_sees_every_write() {
        let counting = Arc::new(Counting::default());
        let store = Store::builder()
            .methods(counting.clone())
            .memory(64)
            .expect("memory");

        let mut view = store.write_borrow(0, 16, false).expect("borrow");
        assert!(!view.is_direct());
        view.fill(3);
        view.commit().expect("commit");
        store.write_off(16, 1).expect("write_off");
        store.zero(24, 8).expect("zero");

        assert_eq!(counting.writes.load(Ordering::SeqCst), 3);
        assert_eq!(store.alloc_read(0, 16).expect("read"), vec![3; 16]);
    }

    #[test]
    fn set_methods_swaps_backend() {
        let mut store = Store::builder().memory(16).expect("memory");
        assert!(store.direct(0, 8, false).is_some());
        store.set_methods(Arc::new(Counting::default()));
        assert!(store.direct(0, 8, false).is_none());
    }

    #[test]
    fn empty_write_is_a_no_op_even_read_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ro.tdb");
        std::fs::write(&path, [1u8; 8]).expect("seed");
        let store = Store::builder().read_only(true).open(&path).expect("open");
        store.write(4, &[]).expect("empty write");
        assert!(matches!(store.write(0, &[2]), Err(TdbError::ReadOnly)));
    }
}
