//! Builder for opening stores.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use crate::convert::ByteOrder;
use crate::errors::{Result, TdbError};
use crate::lock::{ExpansionLock, NoLock};
use crate::logging::{LogCrateSink, LogSink};
use crate::methods::{IoMethods, MappedIo};
use crate::mmap::{Flags, Store};
use crate::stats::IoStats;

/// Configures and opens a [`Store`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tdb_io::{ByteOrder, FileExpansionLock, Store};
///
/// let lock = Arc::new(FileExpansionLock::open("data.tdb.lock")?);
/// let store = Store::builder()
///     .byte_order(ByteOrder::Big)
///     .expansion_lock(lock)
///     .open("data.tdb")?;
/// # Ok::<(), tdb_io::TdbError>(())
/// ```
#[derive(Clone)]
pub struct StoreBuilder {
    flags: Flags,
    log: Arc<dyn LogSink>,
    stats: Arc<IoStats>,
    lock: Arc<dyn ExpansionLock>,
    methods: Arc<dyn IoMethods>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            flags: Flags::default(),
            log: Arc::new(LogCrateSink),
            stats: Arc::new(IoStats::default()),
            lock: Arc::new(NoLock),
            methods: Arc::new(MappedIo),
        }
    }
}

impl Store {
    /// Start configuring a store.
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }
}

impl StoreBuilder {
    /// Reject every write.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.flags.read_only = read_only;
        self
    }

    /// Never map the file; all I/O goes through positioned reads and writes.
    #[must_use]
    pub fn no_mmap(mut self, no_mmap: bool) -> Self {
        self.flags.no_mmap = no_mmap;
        self
    }

    /// Byte order the store keeps its structural words in. Defaults to the host's.
    #[must_use]
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.flags.order = order;
        self
    }

    /// Where diagnostics go. Defaults to the `log` facade.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = sink;
        self
    }

    /// Counters to update. Defaults to a fresh set per store.
    #[must_use]
    pub fn stats(mut self, stats: Arc<IoStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Lock taken around size resynchronization. Defaults to [`NoLock`].
    #[must_use]
    pub fn expansion_lock(mut self, lock: Arc<dyn ExpansionLock>) -> Self {
        self.lock = lock;
        self
    }

    /// Backend for the primitive operations. Defaults to [`MappedIo`].
    #[must_use]
    pub fn methods(mut self, methods: Arc<dyn IoMethods>) -> Self {
        self.methods = methods;
        self
    }

    #[cfg(test)]
    pub(crate) fn refuse_map(mut self) -> Self {
        self.flags.refuse_map = true;
        self
    }

    /// Open an existing file; its current length is the initial size.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::Io` if the file cannot be opened or queried.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Store> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(!self.flags.read_only)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(self.finish(Some(file), Some(path), size, None))
    }

    /// Create (or truncate) a file and open it empty.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly` if the builder is read-only, or
    /// `TdbError::Io` if the file cannot be created.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<Store> {
        if self.flags.read_only {
            return Err(TdbError::ReadOnly);
        }
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(self.finish(Some(file), Some(path), 0, None))
    }

    /// Open a memory-only store of `size` zero bytes.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::OutOfMemory` if the buffer cannot be allocated.
    pub fn memory(self, size: u64) -> Result<Store> {
        let n = usize::try_from(size).map_err(|_| TdbError::OutOfMemory(size))?;
        let mut heap = Vec::new();
        heap.try_reserve_exact(n)
            .map_err(|_| TdbError::OutOfMemory(size))?;
        heap.resize(n, 0);
        Ok(self.finish(None, None, size, Some(heap)))
    }

    fn finish(self, file: Option<std::fs::File>, path: Option<&Path>, size: u64, heap: Option<Vec<u8>>) -> Store {
        Store::from_parts(
            file,
            path.map(Path::to_path_buf),
            size,
            heap,
            self.flags,
            self.log,
            self.stats,
            self.lock,
            self.methods,
        )
    }
}
