//! Utility helpers for safe range calculations.

use crate::errors::{Result, TdbError};

/// Size of every structural field on disk: offsets, lengths and header words.
pub const WORD: u64 = 8;

/// Chunk size used when streaming fill or zero bytes through the write path.
pub(crate) const FILL_CHUNK: usize = 8192;

/// Compute `offset + len`, failing instead of wrapping.
///
/// # Errors
///
/// Returns `TdbError::RangeOverflow` if the sum overflows.
pub fn range_end(offset: u64, len: u64) -> Result<u64> {
    offset
        .checked_add(len)
        .ok_or(TdbError::RangeOverflow { offset, len })
}

/// Compute a byte slice range `start..end` as `usize` values.
///
/// # Errors
///
/// Returns `TdbError::RangeOverflow` if the range does not fit in `usize`.
pub fn slice_range(offset: u64, len: u64) -> Result<(usize, usize)> {
    let end = range_end(offset, len)?;
    let overflow = || TdbError::RangeOverflow { offset, len };
    let start = usize::try_from(offset).map_err(|_| overflow())?;
    let end = usize::try_from(end).map_err(|_| overflow())?;
    Ok((start, end))
}

/// Whether `[a_start, a_end)` and `[b_start, b_end)` share at least one byte.
#[must_use]
pub(crate) fn overlaps(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_end_rejects_overflow() {
        assert_eq!(range_end(10, 6).expect("sum"), 16);
        assert!(matches!(
            range_end(u64::MAX, 1),
            Err(TdbError::RangeOverflow { offset: u64::MAX, len: 1 })
        ));
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(0, 8, 7, 9));
        assert!(!overlaps(0, 8, 8, 16));
        assert!(!overlaps(0, 0, 0, 8));
        assert!(overlaps(4, 12, 0, 16));
    }
}
