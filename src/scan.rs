//! Linear scans over runs of 8-byte slots.
//!
//! Zero versus non-zero does not depend on byte order, so the runs are
//! borrowed unconverted.

use crate::errors::{Result, TdbError};
use crate::mmap::Store;
use crate::utils::{range_end, WORD};

fn slot_run(base: u64, first: u64, count: u64) -> Result<(u64, u64)> {
    let overflow = || TdbError::RangeOverflow {
        offset: base,
        len: count,
    };
    let off = first
        .checked_mul(WORD)
        .ok_or_else(overflow)
        .and_then(|rel| range_end(base, rel))?;
    let len = count.checked_mul(WORD).ok_or_else(overflow)?;
    Ok((off, len))
}

impl Store {
    /// Index of the first non-zero slot among slots `start..end` of the array
    /// at `base`, or `end` if all are zero.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Store::read_borrow`].
    pub fn find_nonzero_off(&self, base: u64, start: u64, end: u64) -> Result<u64> {
        if start >= end {
            return Ok(end);
        }
        let (off, len) = slot_run(base, start, end - start)?;
        let run = self.read_borrow(off, len, false)?;
        let hit = run
            .chunks_exact(WORD as usize)
            .position(|slot| slot.iter().any(|&b| b != 0));
        Ok(hit.map_or(end, |i| start + i as u64))
    }

    /// Index of the first zero slot among the `num` slots at `off`, or `num`
    /// if none is zero.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Store::read_borrow`].
    pub fn find_zero_off(&self, off: u64, num: u64) -> Result<u64> {
        if num == 0 {
            return Ok(0);
        }
        let (off, len) = slot_run(off, 0, num)?;
        let run = self.read_borrow(off, len, false)?;
        let hit = run
            .chunks_exact(WORD as usize)
            .position(|slot| slot.iter().all(|&b| b == 0));
        Ok(hit.map_or(num, |i| i as u64))
    }
}
