//! Shortcuts for the common ways of opening a store.
//!
//! Each one uses the builder defaults: host byte order, the `log` facade,
//! no expansion lock. Use [`Store::builder`] for anything else.

use std::path::Path;

use crate::errors::Result;
use crate::mmap::Store;

/// Create (or truncate) a file-backed store.
///
/// # Errors
///
/// Returns errors from `StoreBuilder::create`.
pub fn create_store<P: AsRef<Path>>(path: P) -> Result<Store> {
    Store::builder().create(path)
}

/// Open an existing file-backed store for reading and writing.
///
/// # Errors
///
/// Returns errors from `StoreBuilder::open`.
pub fn open_store<P: AsRef<Path>>(path: P) -> Result<Store> {
    Store::builder().open(path)
}

/// Open an existing file-backed store read-only.
///
/// # Errors
///
/// Returns errors from `StoreBuilder::open`.
pub fn open_store_ro<P: AsRef<Path>>(path: P) -> Result<Store> {
    Store::builder().read_only(true).open(path)
}

/// Open a memory-only store of `size` zero bytes.
///
/// # Errors
///
/// Returns errors from `StoreBuilder::memory`.
pub fn memory_store(size: u64) -> Result<Store> {
    Store::builder().memory(size)
}
