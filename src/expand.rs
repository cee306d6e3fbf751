//! Growing the store and clearing ranges of it.

use std::fs::File;

use crate::errors::{Result, TdbError};
use crate::logging::Severity;
use crate::mmap::{State, Store};
use crate::raw::pwrite_all;
use crate::utils::{range_end, FILL_CHUNK};

/// Byte written over space added to a file-backed store.
pub const FILL_BYTE: u8 = 0x43;

impl Store {
    /// Set `[off, off + len)` to zero.
    ///
    /// Cleared in place through a direct lease when one is available,
    /// otherwise streamed through [`Store::write`] in bounded chunks.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly` on read-only stores, plus write failures.
    pub fn zero(&self, off: u64, len: u64) -> Result<()> {
        if self.flags.read_only {
            return Err(self.read_only_violation("zero"));
        }
        if let Some(mut lease) = self.direct(off, len, true) {
            if let Some(bytes) = lease.as_mut_slice() {
                bytes.fill(0);
                return Ok(());
            }
        }
        let zeros = [0u8; FILL_CHUNK];
        let mut off = off;
        let mut left = len;
        while left > 0 {
            let todo = left.min(FILL_CHUNK as u64) as usize;
            self.write(off, &zeros[..todo])?;
            off += todo as u64;
            left -= todo as u64;
        }
        Ok(())
    }

    /// Append `addition` bytes to the store.
    ///
    /// Memory-only stores extend their buffer with zeros. File stores unmap,
    /// try to extend the file, write [`FILL_BYTE`] over the new space so it is
    /// really allocated, and map again at the new size.
    pub(crate) fn grow(&self, addition: u64) -> Result<()> {
        if self.flags.read_only {
            return Err(self.read_only_violation("expand"));
        }
        if addition == 0 {
            return Ok(());
        }

        let mut st = self.state.lock();
        let live = st.leases.len();
        if live > 0 {
            let err = self.record(TdbError::BorrowsOutstanding(live));
            self.log(
                Severity::Error,
                format_args!("expand: {live} direct borrows live, refusing to remap"),
            );
            return Err(err);
        }
        let new_size = range_end(st.size, addition).map_err(|e| self.record(e))?;

        match self.file.as_ref() {
            None => self.grow_heap(&mut st, new_size)?,
            Some(file) => self.grow_file(&mut st, file, new_size)?,
        }
        self.stats.add_expand();
        Ok(())
    }

    fn grow_heap(&self, st: &mut State, new_size: u64) -> Result<()> {
        let heap = st.heap.get_or_insert_with(Vec::new);
        let reserved = usize::try_from(new_size)
            .ok()
            .filter(|&n| heap.try_reserve_exact(n - heap.len()).is_ok());
        let Some(n) = reserved else {
            let err = self.record(TdbError::OutOfMemory(new_size));
            self.log(
                Severity::Error,
                format_args!("expand: cannot grow internal buffer to {new_size} bytes"),
            );
            return Err(err);
        };
        heap.resize(n, 0);
        st.size = new_size;
        Ok(())
    }

    fn grow_file(&self, st: &mut State, file: &File, new_size: u64) -> Result<()> {
        // Some platforms misbehave when a mapped file changes length.
        self.release(st);

        if let Err(e) = file.set_len(new_size) {
            self.log(
                Severity::Debug,
                format_args!("expand: set_len to {new_size} failed ({e}), filling anyway"),
            );
        }

        // Written, not mapped: the file must not stay sparse.
        let pattern = [FILL_BYTE; FILL_CHUNK];
        let mut off = st.size;
        while off < new_size {
            let todo = (new_size - off).min(FILL_CHUNK as u64) as usize;
            if let Err(e) = pwrite_all(file, &pattern[..todo], off) {
                let err = self.record(e.into());
                self.log(
                    Severity::Fatal,
                    format_args!("expand: fill write failed at {off}: giving up"),
                );
                self.establish(st);
                return Err(err);
            }
            off += todo as u64;
        }

        st.size = new_size;
        self.establish(st);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FILL_BYTE;
    use crate::{ErrorCode, Store, TdbError};

    #[test]
    fn memory_growth_is_zeroed() {
        let store = Store::builder().memory(0).expect("memory");
        store.expand(4096).expect("grow");
        assert_eq!(store.len(), 4096);
        assert!(store.alloc_read(0, 4096).expect("read").iter().all(|&b| b == 0));
        assert_eq!(store.stats().snapshot().expands, 1);
    }

    #[test]
    fn file_growth_is_filled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::builder().create(dir.path().join("fill.tdb")).expect("create");
        store.expand(10_000).expect("grow");
        assert_eq!(store.len(), 10_000);
        let bytes = store.alloc_read(0, 10_000).expect("read");
        assert!(bytes.iter().all(|&b| b == FILL_BYTE));
        assert!(store.has_mapping());
    }

    #[test]
    fn growth_refused_while_borrowed() {
        let store = Store::builder().memory(64).expect("memory");
        let view = store.read_borrow(0, 8, false).expect("borrow");
        assert!(matches!(store.expand(64), Err(TdbError::BorrowsOutstanding(1))));
        assert_eq!(store.len(), 64);
        drop(view);
        store.expand(64).expect("grow");
        assert_eq!(store.len(), 128);
    }

    #[test]
    fn zero_direct_and_streamed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mapped = Store::builder().create(dir.path().join("a.tdb")).expect("create");
        let unmapped = Store::builder()
            .no_mmap(true)
            .create(dir.path().join("b.tdb"))
            .expect("create");

        for store in [&mapped, &unmapped] {
            store.expand(20_000).expect("grow");
            store.zero(100, 17_000).expect("zero");
            let bytes = store.alloc_read(0, 20_000).expect("read");
            assert!(bytes[..100].iter().all(|&b| b == FILL_BYTE));
            assert!(bytes[100..17_100].iter().all(|&b| b == 0));
            assert!(bytes[17_100..].iter().all(|&b| b == FILL_BYTE));
        }
        assert!(!unmapped.has_mapping());
    }

    #[test]
    fn zero_on_read_only_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ro.tdb");
        std::fs::write(&path, [5u8; 32]).expect("seed");
        let store = Store::builder().read_only(true).open(&path).expect("open");
        assert!(matches!(store.zero(0, 8), Err(TdbError::ReadOnly)));
        assert!(matches!(store.expand(8), Err(TdbError::ReadOnly)));
        assert_eq!(store.last_error(), Some(ErrorCode::ReadOnly));
        assert_eq!(std::fs::read(&path).expect("read"), vec![5u8; 32]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_fill_keeps_old_size() {
        use std::sync::Arc;

        use crate::logging::testing::RecordingSink;
        use crate::logging::Severity;

        // set_len and every write fail on this device
        let sink = Arc::new(RecordingSink::default());
        let store = Store::builder()
            .log_sink(sink.clone())
            .open("/dev/full")
            .expect("open /dev/full");
        assert_eq!(store.len(), 0);

        let err = store.expand(100).expect_err("no space");
        assert!(matches!(err, TdbError::Io(_)));
        assert_eq!(store.len(), 0);
        assert!(!store.has_mapping());
        assert_eq!(store.last_error(), Some(ErrorCode::Io));
        assert_eq!(sink.count(Severity::Debug), 1);
        assert_eq!(sink.count(Severity::Fatal), 1);
        let (_, msg) = sink.last().expect("logged");
        assert!(msg.contains("fill write failed at 0"));
        assert_eq!(store.stats().snapshot().expands, 0);
    }
}
