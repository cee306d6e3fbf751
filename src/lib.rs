//! # tdb-io: the I/O core of an embedded key/value store
//!
//! This crate sits between the record-level structures of a file-backed
//! key/value database (hash index, free lists, transaction log) and the bytes
//! on disk. It owns the memory mapping, grows the store safely, converts
//! structural words between byte orders and hands out zero-copy or shadow
//! borrows of byte ranges.
//!
//! ## Features
//!
//! - **Zero-copy borrows**: direct leases into the mapping when possible,
//!   heap shadows when not, chosen per request
//! - **Resynchronizing bounds checks**: a store grown by another writer is
//!   noticed and remapped transparently
//! - **Non-sparse growth**: new file space is written, not just reserved
//! - **Byte-order portability**: 8-byte structural words swapped on the way
//!   in and out when the store's order differs from the host's
//! - **Pluggable backend**: the primitive operations sit behind [`IoMethods`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use tdb_io::memory_store;
//!
//! let store = memory_store(0)?;
//! store.expand(4096)?;
//!
//! let mut view = store.write_borrow(100, 8, false)?;
//! view.copy_from_slice(b"tdb-io!!");
//! view.commit()?;
//!
//! assert_eq!(&store.read_borrow(100, 8, false)?[..], b"tdb-io!!");
//! # Ok::<(), tdb_io::TdbError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: error types and latched error codes
//! - [`raw`]: byte-exact positioned and sequential transfer
//! - [`convert`]: byte-order conversion
//! - [`mmap`]: the [`Store`] handle and its mapping
//! - [`access`]: borrowed regions
//! - [`expand`]: growth and zero fill
//! - [`methods`]: the capability interface
//! - [`config`]: the store builder
//! - [`manager`]: convenience constructors
//! - [`lock`]: the expansion lock collaborator
//! - [`logging`]: per-handle diagnostic sinks
//! - [`stats`]: I/O counters

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]

pub mod access;
mod bounds;
pub mod config;
pub mod convert;
pub mod errors;
pub mod expand;
pub mod lock;
pub mod logging;
pub mod manager;
pub mod methods;
pub mod mmap;
pub mod raw;
mod scan;
pub mod stats;
pub mod utils;

pub use access::{DirectRegion, ReadView, WriteView};
pub use config::StoreBuilder;
pub use convert::{swap_words, ByteOrder};
pub use errors::{ErrorCode, Result, TdbError};
pub use expand::FILL_BYTE;
pub use lock::{ExpansionGuard, ExpansionLock, FileExpansionLock, LockMode, NoLock};
pub use logging::{LogCrateSink, LogSink, NullSink, Severity};
pub use manager::{create_store, memory_store, open_store, open_store_ro};
pub use methods::{IoMethods, MappedIo};
pub use mmap::Store;
pub use stats::{IoStats, StatsSnapshot};
