//! Two handles on one file: growth by one is picked up by the other.

use std::sync::Arc;

use tdb_io::{
    create_store, ExpansionGuard, FileExpansionLock, LockMode, Store, TdbError, FILL_BYTE,
};

fn locked(path: &std::path::Path, lock: &Arc<FileExpansionLock>) -> Store {
    Store::builder()
        .expansion_lock(lock.clone())
        .open(path)
        .expect("open")
}

#[test]
fn reader_resyncs_after_writer_grows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared.tdb");
    let lock = Arc::new(FileExpansionLock::open(dir.path().join("shared.lock")).expect("lock"));

    let writer = Store::builder()
        .expansion_lock(lock.clone())
        .create(&path)
        .expect("create");
    writer.expand(4096).expect("grow");
    let reader = locked(&path, &lock);
    assert_eq!(reader.len(), 4096);

    {
        let _excl = ExpansionGuard::acquire(writer.expansion_lock(), LockMode::Exclusive)
            .expect("exclusive");
        writer.expand(4096).expect("grow again");
    }
    writer.write_off(6000, 77).expect("write past old end");

    // cached size is stale; the read resyncs exactly once
    assert_eq!(reader.len(), 4096);
    assert_eq!(reader.read_off(6000).expect("read"), 77);
    assert_eq!(reader.len(), 8192);
    assert_eq!(reader.stats().snapshot().resyncs, 1);

    assert_eq!(reader.read_off(6008).expect("fill"), u64::from_ne_bytes([FILL_BYTE; 8]));
    assert_eq!(reader.stats().snapshot().resyncs, 1);
}

#[test]
fn resync_failure_keeps_cached_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("small.tdb");
    let lock = Arc::new(FileExpansionLock::open(dir.path().join("small.lock")).expect("lock"));

    let writer = create_store(&path).expect("create");
    writer.expand(1024).expect("grow");
    let reader = locked(&path, &lock);

    let err = reader.bounds_check(2048, false).expect_err("too short");
    assert!(matches!(err, TdbError::OutOfBounds { len: 2048, size: 1024 }));
    assert_eq!(reader.len(), 1024);
    assert!(reader.has_mapping());
    assert_eq!(reader.stats().snapshot().resyncs, 0);
}

#[test]
fn remap_waits_for_direct_borrows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pinned.tdb");

    let writer = create_store(&path).expect("create");
    writer.expand(512).expect("grow");
    let reader = Store::builder().open(&path).expect("open");

    let pinned = reader.read_borrow(0, 64, false).expect("borrow");
    assert!(pinned.is_direct());
    writer.expand(512).expect("grow");

    // the speculative direct path backs off, the buffered path refuses to remap
    assert!(reader.direct(600, 8, false).is_none());
    assert!(matches!(
        reader.bounds_check(1024, false),
        Err(TdbError::BorrowsOutstanding(1))
    ));
    assert_eq!(reader.len(), 512);

    drop(pinned);
    reader.bounds_check(1024, false).expect("resync");
    assert_eq!(reader.len(), 1024);
}

#[test]
fn unmapped_handles_share_growth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plain.tdb");

    let writer = Store::builder().no_mmap(true).create(&path).expect("create");
    let reader = Store::builder().no_mmap(true).open(&path).expect("open");
    assert!(reader.is_empty());

    writer.expand(64).expect("grow");
    writer.write(0, b"tdb").expect("write");

    assert_eq!(reader.alloc_read(0, 3).expect("read"), b"tdb");
    assert_eq!(reader.len(), 64);
    assert!(!reader.has_mapping());
}

#[test]
fn resync_inside_exclusive_section_keeps_the_lock() {
    use fs2::FileExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("held.tdb");
    let lock_path = dir.path().join("held.lock");
    let lock = Arc::new(FileExpansionLock::open(&lock_path).expect("lock"));

    let store = Store::builder()
        .expansion_lock(lock.clone())
        .create(&path)
        .expect("create");
    store.expand(64).expect("grow");

    let other = std::fs::File::open(&lock_path).expect("second handle");
    {
        let _excl = ExpansionGuard::acquire(store.expansion_lock(), LockMode::Exclusive)
            .expect("exclusive");
        assert!(FileExt::try_lock_exclusive(&other).is_err());

        // has anyone else grown it? the check takes the lock shared underneath
        assert!(store.bounds_check(128, true).is_err());
        assert!(FileExt::try_lock_exclusive(&other).is_err());
        assert_eq!(lock.held(), Some(LockMode::Exclusive));

        store.expand(64).expect("grow under the lock");
    }
    assert_eq!(lock.held(), None);
    FileExt::try_lock_exclusive(&other).expect("released after the section");
    FileExt::unlock(&other).expect("unlock");
    assert_eq!(store.len(), 128);
}
