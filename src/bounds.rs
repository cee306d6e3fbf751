//! Bounds tracking against the authoritative backing size.
//!
//! Another writer may have grown the file since this handle last looked, so a
//! failed check never trusts the cached size: it asks the file, under the
//! shared expansion lock, and remaps if the file is now long enough.

use crate::errors::{Result, TdbError};
use crate::lock::{ExpansionGuard, LockMode};
use crate::logging::Severity;
use crate::mmap::Store;

impl Store {
    /// Make sure at least `len` bytes are addressable.
    ///
    /// `probe` suppresses logging and error latching for the expected
    /// "not grown yet" outcome; the result alone carries the answer.
    pub(crate) fn check_bounds(&self, len: u64, probe: bool) -> Result<()> {
        let size = self.state.lock().size;
        if len <= size {
            return Ok(());
        }

        let Some(file) = self.file.as_ref() else {
            // Memory-only stores never grow implicitly.
            let err = TdbError::BeyondMemory { len, size };
            if probe {
                return Err(err);
            }
            let err = self.record(err);
            self.log(
                Severity::Fatal,
                format_args!("bounds check: length {len} beyond internal buffer size {size}"),
            );
            return Err(err);
        };

        let actual = {
            let _guard = ExpansionGuard::acquire(self.lock.as_ref(), LockMode::Shared)
                .map_err(|e| self.record(e.into()))?;
            file.metadata().map_err(|e| self.record(e.into()))?.len()
        };

        if actual < len {
            let err = TdbError::OutOfBounds { len, size: actual };
            if probe {
                return Err(err);
            }
            let err = self.record(err);
            self.log(
                Severity::Fatal,
                format_args!("bounds check: length {len} beyond eof at {actual}"),
            );
            return Err(err);
        }

        let mut st = self.state.lock();
        if st.size >= len {
            // Someone on another thread already caught up.
            return Ok(());
        }
        let live = st.leases.len();
        if live > 0 {
            let err = TdbError::BorrowsOutstanding(live);
            if probe {
                return Err(err);
            }
            let err = self.record(err);
            self.log(
                Severity::Error,
                format_args!("bounds check: cannot remap to {actual} with {live} direct borrows live"),
            );
            return Err(err);
        }

        self.release(&mut st);
        st.size = actual;
        self.establish(&mut st);
        self.stats.add_resync();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::logging::testing::RecordingSink;
    use crate::logging::Severity;
    use crate::{ErrorCode, Store, TdbError};

    #[test]
    fn memory_store_fails_fatally_past_its_buffer() {
        let sink = Arc::new(RecordingSink::default());
        let store = Store::builder().log_sink(sink.clone()).memory(64).expect("memory");

        store.check_bounds(64, false).expect("exactly full is fine");
        assert!(matches!(
            store.check_bounds(65, true),
            Err(TdbError::BeyondMemory { len: 65, size: 64 })
        ));
        assert_eq!(sink.count(Severity::Fatal), 0);
        assert_eq!(store.last_error(), None);

        assert!(store.check_bounds(65, false).is_err());
        assert_eq!(sink.count(Severity::Fatal), 1);
        assert_eq!(store.last_error(), Some(ErrorCode::Io));
    }

    #[test]
    fn file_store_resyncs_after_external_growth() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grown.tdb");
        std::fs::write(&path, vec![7u8; 128]).expect("seed");

        let store = Store::builder().open(&path).expect("open");
        assert_eq!(store.len(), 128);

        let f = std::fs::OpenOptions::new().write(true).open(&path).expect("reopen");
        f.set_len(512).expect("grow externally");

        store.check_bounds(300, false).expect("resync");
        assert_eq!(store.len(), 512);
        assert_eq!(store.stats().snapshot().resyncs, 1);

        store.check_bounds(400, false).expect("already covered");
        assert_eq!(store.stats().snapshot().resyncs, 1);
    }

    #[test]
    fn probe_past_eof_is_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("short.tdb");
        std::fs::write(&path, [0u8; 16]).expect("seed");

        let sink = Arc::new(RecordingSink::default());
        let store = Store::builder().log_sink(sink.clone()).open(&path).expect("open");

        assert!(matches!(
            store.check_bounds(17, true),
            Err(TdbError::OutOfBounds { len: 17, size: 16 })
        ));
        assert!(sink.entries.lock().is_empty());
        assert_eq!(store.last_error(), None);

        assert!(store.check_bounds(17, false).is_err());
        let (severity, msg) = sink.last().expect("logged");
        assert_eq!(severity, Severity::Fatal);
        assert!(msg.contains("beyond eof at 16"));
        assert_eq!(store.len(), 16);
    }
}
