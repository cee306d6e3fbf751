//! The store handle and its mapping lifecycle.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use memmap2::{Mmap, MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::access::Leases;
use crate::convert::ByteOrder;
use crate::errors::{ErrorCode, Result, TdbError};
use crate::lock::ExpansionLock;
use crate::logging::{LogSink, Severity};
use crate::methods::IoMethods;
use crate::stats::IoStats;
use crate::utils::{range_end, slice_range};

/// Active mapping over the backing file.
pub(crate) enum Mapping {
    Ro(Mmap),
    Rw(MmapMut),
}

/// Mutable per-handle state, guarded by the store's mutex.
pub(crate) struct State {
    /// Bytes currently mapped or allocated. Never exceeds the backing size.
    pub(crate) size: u64,
    /// Present only while a file mapping is active.
    pub(crate) map: Option<Mapping>,
    /// The whole store for memory-only handles.
    pub(crate) heap: Option<Vec<u8>>,
    /// Outstanding direct borrows.
    pub(crate) leases: Leases,
}

impl State {
    /// Base address of the current view, if any. Read-only mappings have no
    /// writable base.
    pub(crate) fn base(&mut self, write: bool) -> Option<NonNull<u8>> {
        if let Some(heap) = self.heap.as_mut() {
            return NonNull::new(heap.as_mut_ptr());
        }
        match self.map.as_mut()? {
            Mapping::Rw(m) => NonNull::new(m.as_mut_ptr()),
            Mapping::Ro(m) if !write => NonNull::new(m.as_ptr().cast_mut()),
            Mapping::Ro(_) => None,
        }
    }

    /// Whether accesses can be served from memory.
    pub(crate) fn has_view(&self) -> bool {
        self.heap.is_some() || self.map.is_some()
    }

    /// Copy `[off, off + buf.len())` out of the view. `Ok(false)` means there
    /// is no view and the caller must go to the file.
    pub(crate) fn copy_out(&mut self, off: u64, buf: &mut [u8]) -> Result<bool> {
        let len = buf.len() as u64;
        let end = range_end(off, len)?;
        if self.leases.conflicts(off, end, false) {
            return Err(TdbError::Aliased { offset: off, len });
        }
        if end > self.size {
            return Err(TdbError::OutOfBounds { len: end, size: self.size });
        }
        let Some(base) = self.base(false) else {
            return Ok(false);
        };
        let (start, _) = slice_range(off, len)?;
        // SAFETY: [start, start + len) lies inside the view (checked against
        // `size` above), no live write lease covers it, and `buf` is a
        // separate allocation.
        unsafe {
            ptr::copy_nonoverlapping(base.as_ptr().add(start), buf.as_mut_ptr(), buf.len());
        }
        Ok(true)
    }

    /// Copy `data` into the view at `off`. `Ok(false)` means there is no
    /// writable view.
    pub(crate) fn copy_in(&mut self, off: u64, data: &[u8]) -> Result<bool> {
        let len = data.len() as u64;
        let end = range_end(off, len)?;
        if self.leases.conflicts(off, end, true) {
            return Err(TdbError::Aliased { offset: off, len });
        }
        if end > self.size {
            return Err(TdbError::OutOfBounds { len: end, size: self.size });
        }
        let Some(base) = self.base(true) else {
            return Ok(false);
        };
        let (start, _) = slice_range(off, len)?;
        // SAFETY: in bounds as above, and no live lease of any kind overlaps
        // the destination.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), base.as_ptr().add(start), data.len());
        }
        Ok(true)
    }
}

/// Fixed mode flags of a handle.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Flags {
    pub(crate) read_only: bool,
    pub(crate) no_mmap: bool,
    pub(crate) order: ByteOrder,
    /// Make every mapping attempt fail.
    #[cfg(test)]
    pub(crate) refuse_map: bool,
}

/// One open instance of the store: a file (or heap buffer), its mapping and
/// the hooks it reports through.
///
/// All operations take `&self`; internal state sits behind a mutex so a
/// `Store` can be shared between threads. Direct views borrow the store and
/// keep a lease that blocks remapping until they are dropped.
///
/// # Examples
///
/// ```no_run
/// use tdb_io::Store;
///
/// let store = Store::builder().create("data.tdb")?;
/// store.expand(4096)?;
/// store.write_off(64, 0xfeed)?;
/// assert_eq!(store.read_off(64)?, 0xfeed);
/// # Ok::<(), tdb_io::TdbError>(())
/// ```
pub struct Store {
    pub(crate) file: Option<File>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) flags: Flags,
    pub(crate) state: Mutex<State>,
    pub(crate) ecode: Mutex<Option<ErrorCode>>,
    pub(crate) log: Arc<dyn LogSink>,
    pub(crate) stats: Arc<IoStats>,
    pub(crate) lock: Arc<dyn ExpansionLock>,
    pub(crate) methods: Arc<dyn IoMethods>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("len", &self.len())
            .field("mapped", &self.has_mapping())
            .finish()
    }
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        file: Option<File>,
        path: Option<PathBuf>,
        size: u64,
        heap: Option<Vec<u8>>,
        flags: Flags,
        log: Arc<dyn LogSink>,
        stats: Arc<IoStats>,
        lock: Arc<dyn ExpansionLock>,
        methods: Arc<dyn IoMethods>,
    ) -> Self {
        let store = Self {
            file,
            path,
            flags,
            state: Mutex::new(State {
                size,
                map: None,
                heap,
                leases: Leases::default(),
            }),
            ecode: Mutex::new(None),
            log,
            stats,
            lock,
            methods,
        };
        {
            let mut st = store.state.lock();
            store.establish(&mut st);
        }
        store
    }

    /// Map `[0, size)` of the file. Does nothing for memory-only or
    /// `no_mmap` handles. A failed mapping is logged and I/O falls back to
    /// positioned reads and writes.
    pub(crate) fn establish(&self, st: &mut State) {
        if self.flags.no_mmap || st.size == 0 {
            return;
        }
        let Some(file) = self.file.as_ref() else {
            return;
        };
        let Ok(len) = usize::try_from(st.size) else {
            self.log(
                Severity::Warning,
                format_args!("mmap skipped: size {} exceeds address space", st.size),
            );
            return;
        };
        let mut opts = MmapOptions::new();
        opts.len(len);
        // SAFETY: the mapping covers bytes the file already has (size never
        // exceeds the file length). Other processes may change those bytes;
        // every access through this crate copies or hands out leases bounded
        // by the handle, never references that outlive a remap.
        let mapped = if self.refuses_map() {
            Err(io::Error::other("mapping refused"))
        } else if self.flags.read_only {
            unsafe { opts.map(file) }.map(Mapping::Ro)
        } else {
            unsafe { opts.map_mut(file) }.map(Mapping::Rw)
        };
        match mapped {
            Ok(m) => st.map = Some(m),
            Err(e) => {
                st.map = None;
                self.log(
                    Severity::Warning,
                    format_args!("mmap failed for size {} ({e})", st.size),
                );
            }
        }
    }

    #[cfg(test)]
    fn refuses_map(&self) -> bool {
        self.flags.refuse_map
    }

    #[cfg(not(test))]
    fn refuses_map(&self) -> bool {
        false
    }

    /// Drop the file mapping if one is active.
    pub(crate) fn release(&self, st: &mut State) {
        st.map = None;
    }

    pub(crate) fn log(&self, severity: Severity, args: std::fmt::Arguments<'_>) {
        self.log.log(severity, args);
    }

    /// Latch the error's code on the handle and hand the error back.
    pub(crate) fn record(&self, err: TdbError) -> TdbError {
        *self.ecode.lock() = Some(err.code());
        err
    }

    /// Latch, log at fatal severity and build the read-only error.
    pub(crate) fn read_only_violation(&self, what: &str) -> TdbError {
        let err = self.record(TdbError::ReadOnly);
        self.log(Severity::Fatal, format_args!("{what}: store is read-only"));
        err
    }

    /// Current mapped or allocated size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.state.lock().size
    }

    /// Whether the store holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether writes are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    /// Whether the store lives only in memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.file.is_none()
    }

    /// On-disk byte order of structural words.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.flags.order
    }

    /// Whether structural words are swapped on the way in and out.
    #[must_use]
    pub fn converts(&self) -> bool {
        self.flags.order.needs_swap()
    }

    /// Whether reads and writes can currently be served from memory.
    #[must_use]
    pub fn has_mapping(&self) -> bool {
        self.state.lock().has_view()
    }

    /// Number of direct borrows that have not been released or committed.
    #[must_use]
    pub fn direct_borrows(&self) -> usize {
        self.state.lock().leases.len()
    }

    /// Code of the most recent recorded failure.
    #[must_use]
    pub fn last_error(&self) -> Option<ErrorCode> {
        *self.ecode.lock()
    }

    /// Forget the latched error code.
    pub fn clear_error(&self) {
        *self.ecode.lock() = None;
    }

    /// Counters for this handle.
    #[must_use]
    pub fn stats(&self) -> &Arc<IoStats> {
        &self.stats
    }

    /// Expansion lock shared with other writers.
    #[must_use]
    pub fn expansion_lock(&self) -> &dyn ExpansionLock {
        self.lock.as_ref()
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush a writable mapping and sync file data to disk. Memory-only and
    /// read-only handles have nothing to sync.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::Io` if the flush or sync fails.
    pub fn sync(&self) -> Result<()> {
        let Some(file) = self.file.as_ref() else {
            return Ok(());
        };
        if self.flags.read_only {
            return Ok(());
        }
        {
            let st = self.state.lock();
            if let Some(Mapping::Rw(m)) = st.map.as_ref() {
                m.flush().map_err(|e| self.record(e.into()))?;
            }
        }
        file.sync_data().map_err(|e| self.record(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::logging::testing::RecordingSink;
    use crate::logging::Severity;
    use crate::{Store, FILL_BYTE};

    #[test]
    fn failed_mapping_falls_back_to_positioned_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = Arc::new(RecordingSink::default());
        let store = Store::builder()
            .log_sink(sink.clone())
            .refuse_map()
            .create(dir.path().join("unmapped.tdb"))
            .expect("create");

        store.expand(256).expect("grow without a mapping");
        assert_eq!(store.len(), 256);
        assert!(!store.has_mapping());
        assert_eq!(sink.count(Severity::Warning), 1);
        let (_, msg) = sink.last().expect("logged");
        assert!(msg.contains("mmap failed for size 256"));

        store.write_off(8, 0xabcd).expect("write");
        assert_eq!(store.read_off(8).expect("read"), 0xabcd);
        let view = store.read_borrow(64, 16, false).expect("borrow");
        assert!(!view.is_direct());
        assert!(view.iter().all(|&b| b == FILL_BYTE));
        assert!(store.direct(0, 8, false).is_none());
        assert_eq!(store.last_error(), None);
    }
}
