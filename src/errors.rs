//! Crate-specific error types for tdb-io.

use std::io;
use thiserror::Error;

/// Result alias for tdb-io operations.
pub type Result<T> = std::result::Result<T, TdbError>;

/// Coarse error class latched on a [`Store`](crate::Store) after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Read, write, size query or extend failure, or a store too small.
    Io,
    /// A shadow buffer or memory-only growth could not be allocated.
    OutOfMemory,
    /// A write was attempted on a read-only handle.
    ReadOnly,
    /// The request conflicts with outstanding direct borrows.
    Invalid,
}

/// Error type covering transfer, bounds, allocation and borrow failures.
#[derive(Debug, Error)]
pub enum TdbError {
    /// Wrapper for `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file is smaller than required, even after resynchronizing.
    #[error("length {len} beyond end of store at {size}")]
    OutOfBounds {
        /// Required length.
        len: u64,
        /// Authoritative store size.
        size: u64,
    },

    /// A memory-only store was accessed beyond its allocated buffer.
    #[error("length {len} beyond internal buffer size {size}")]
    BeyondMemory {
        /// Required length.
        len: u64,
        /// Allocated size.
        size: u64,
    },

    /// `offset + len` does not fit in the address space.
    #[error("range overflows: offset={offset}, len={len}")]
    RangeOverflow {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
    },

    /// Heap allocation failed.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(u64),

    /// Write attempted on a read-only store.
    #[error("store is read-only")]
    ReadOnly,

    /// A remap was needed while direct borrows were still live.
    #[error("cannot remap with {0} direct borrows outstanding")]
    BorrowsOutstanding(usize),

    /// The range overlaps a live direct borrow in a conflicting mode.
    #[error("range overlaps a live direct borrow: offset={offset}, len={len}")]
    Aliased {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
    },
}

impl TdbError {
    /// The latched error class for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            TdbError::Io(_)
            | TdbError::OutOfBounds { .. }
            | TdbError::BeyondMemory { .. }
            | TdbError::RangeOverflow { .. } => ErrorCode::Io,
            TdbError::OutOfMemory(_) => ErrorCode::OutOfMemory,
            TdbError::ReadOnly => ErrorCode::ReadOnly,
            TdbError::BorrowsOutstanding(_) | TdbError::Aliased { .. } => ErrorCode::Invalid,
        }
    }
}
