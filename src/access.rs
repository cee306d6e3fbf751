//! Borrowed regions: zero-copy leases on the mapping, or heap shadows.
//!
//! A borrow is classified once, when it is created, and the classification
//! travels with the view. Direct views hold a lease in the store's ledger;
//! the lease blocks remapping and conflicting access until the view is
//! dropped or committed. Shadow views own a private copy and only touch the
//! store again on commit.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use crate::errors::{Result, TdbError};
use crate::logging::Severity;
use crate::mmap::Store;
use crate::utils::{overlaps, range_end, slice_range, WORD};

struct Lease {
    ticket: u64,
    start: u64,
    end: u64,
    write: bool,
}

/// Ledger of live direct borrows.
#[derive(Default)]
pub(crate) struct Leases {
    live: Vec<Lease>,
    next: u64,
}

impl Leases {
    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether `[start, end)` clashes with a live lease. Writers clash with
    /// everything; readers only with writers.
    pub(crate) fn conflicts(&self, start: u64, end: u64, write: bool) -> bool {
        self.live
            .iter()
            .any(|l| (write || l.write) && overlaps(start, end, l.start, l.end))
    }

    fn acquire(&mut self, start: u64, end: u64, write: bool) -> Option<u64> {
        if self.conflicts(start, end, write) {
            return None;
        }
        let ticket = self.next;
        self.next = self.next.wrapping_add(1);
        self.live.push(Lease {
            ticket,
            start,
            end,
            write,
        });
        Some(ticket)
    }

    fn release(&mut self, ticket: u64) {
        if let Some(i) = self.live.iter().position(|l| l.ticket == ticket) {
            self.live.swap_remove(i);
        }
    }
}

/// A leased window straight into the store's mapping.
///
/// Dropping it returns the lease. While it is alive the store will not remap.
pub struct DirectRegion<'a> {
    store: &'a Store,
    ptr: NonNull<u8>,
    len: usize,
    ticket: u64,
    write: bool,
}

impl DirectRegion<'_> {
    /// Length of the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the lease allows mutation.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.write
    }

    /// The mapped bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the lease pins the mapping (no remap while live) and no
        // writer lease overlaps a reader or another writer.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The mapped bytes, mutably. `None` for read leases.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.write {
            return None;
        }
        // SAFETY: as above, and a write lease overlaps no other lease; write
        // leases are only issued over writable views.
        Some(unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) })
    }
}

impl Drop for DirectRegion<'_> {
    fn drop(&mut self) {
        self.store.state.lock().leases.release(self.ticket);
    }
}

struct Shadow {
    buf: Vec<u8>,
    off: u64,
    convert: bool,
}

enum Region<'a> {
    Direct(DirectRegion<'a>),
    Shadow(Shadow),
}

impl Region<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Region::Direct(d) => d.as_slice(),
            Region::Shadow(s) => &s.buf,
        }
    }
}

/// Read access to `[offset, offset + len)`.
pub struct ReadView<'a> {
    region: Region<'a>,
}

impl ReadView<'_> {
    /// Whether the bytes come straight from the mapping.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self.region, Region::Direct(_))
    }

    /// Give the view back. Same as dropping it.
    pub fn release(self) {}
}

impl std::fmt::Debug for ReadView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadView")
            .field("direct", &self.is_direct())
            .field("len", &self.region.bytes().len())
            .finish()
    }
}

impl Deref for ReadView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.region.bytes()
    }
}

/// Write access to `[offset, offset + len)`. Changes land on
/// [`commit`](WriteView::commit); dropping a shadow view discards them.
pub struct WriteView<'a> {
    store: &'a Store,
    region: Region<'a>,
}

impl WriteView<'_> {
    /// Whether mutations go straight into the mapping.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self.region, Region::Direct(_))
    }

    /// Discard the view without writing anything back.
    pub fn release(self) {}

    /// Publish the view's bytes and give it back.
    ///
    /// Direct views have already landed; shadows are re-converted if they
    /// were borrowed with conversion and written back to their origin.
    ///
    /// # Errors
    ///
    /// Returns the error from writing the shadow back.
    pub fn commit(self) -> Result<()> {
        let WriteView { store, region } = self;
        match region {
            Region::Direct(lease) => drop(lease),
            Region::Shadow(Shadow { mut buf, off, convert }) => {
                if convert {
                    store.convert(&mut buf);
                }
                store.write(off, &buf)?;
            }
        }
        store.stats.add_commit();
        Ok(())
    }
}

impl Deref for WriteView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.region.bytes()
    }
}

impl DerefMut for WriteView<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.region {
            // write_borrow only keeps writable leases
            Region::Direct(d) => d.as_mut_slice().unwrap_or_default(),
            Region::Shadow(s) => &mut s.buf,
        }
    }
}

impl Store {
    /// Lease `[off, off + len)` of the current view, growing into a resynced
    /// mapping if needed. `None` when there is no suitable view, the range is
    /// out of reach, or it clashes with a live lease.
    pub(crate) fn lease_direct(&self, off: u64, len: u64, write: bool) -> Option<DirectRegion<'_>> {
        let end = range_end(off, len).ok()?;
        if !self.state.lock().has_view() {
            return None;
        }
        self.check_bounds(end, true).ok()?;

        let mut st = self.state.lock();
        if end > st.size {
            return None;
        }
        let (start, _) = slice_range(off, len).ok()?;
        let base = st.base(write)?;
        let ticket = st.leases.acquire(off, end, write)?;
        // SAFETY: start + len <= size, the extent of the view behind `base`.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(start)) };
        Some(DirectRegion {
            store: self,
            ptr,
            len: len as usize,
            ticket,
            write,
        })
    }

    /// Borrow `[off, off + len)` for reading.
    ///
    /// Served from the mapping when possible and the store does not convert;
    /// otherwise read into a shadow buffer, converted if `convert` is set.
    ///
    /// # Errors
    ///
    /// Returns allocation, bounds and read failures.
    pub fn read_borrow(&self, off: u64, len: u64, convert: bool) -> Result<ReadView<'_>> {
        if !self.converts() {
            if let Some(lease) = self.direct(off, len, false) {
                self.stats.add_direct();
                return Ok(ReadView {
                    region: Region::Direct(lease),
                });
            }
        }
        let mut buf = self.alloc_read(off, len)?;
        if convert {
            self.convert(&mut buf);
        }
        self.stats.add_shadow();
        Ok(ReadView {
            region: Region::Shadow(Shadow { buf, off, convert }),
        })
    }

    /// Borrow `[off, off + len)` for writing. Finish with
    /// [`WriteView::commit`] or discard with [`WriteView::release`].
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly` on read-only stores, plus allocation,
    /// bounds and read failures.
    pub fn write_borrow(&self, off: u64, len: u64, convert: bool) -> Result<WriteView<'_>> {
        if self.flags.read_only {
            return Err(self.read_only_violation("write_borrow"));
        }
        if !self.converts() {
            if let Some(lease) = self.direct(off, len, true).filter(DirectRegion::is_writable) {
                self.stats.add_direct();
                return Ok(WriteView {
                    store: self,
                    region: Region::Direct(lease),
                });
            }
        }
        let mut buf = self.alloc_read(off, len)?;
        if convert {
            self.convert(&mut buf);
        }
        self.stats.add_shadow();
        Ok(WriteView {
            store: self,
            region: Region::Shadow(Shadow { buf, off, convert }),
        })
    }

    /// Read `len` bytes at `off` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::OutOfMemory` if the buffer cannot be allocated,
    /// plus bounds and read failures.
    pub fn alloc_read(&self, off: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = self.alloc(len, Severity::Error, "alloc_read")?;
        self.read(off, &mut buf)?;
        Ok(buf)
    }

    fn alloc(&self, len: u64, severity: Severity, what: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let reserved = usize::try_from(len)
            .ok()
            .filter(|&n| buf.try_reserve_exact(n).is_ok());
        let Some(n) = reserved else {
            let err = self.record(TdbError::OutOfMemory(len));
            self.log(severity, format_args!("{what}: allocation of {len} bytes failed"));
            return Err(err);
        };
        buf.resize(n, 0);
        Ok(buf)
    }

    /// Read `buf.len()` bytes at `off` and convert them to host order.
    ///
    /// # Errors
    ///
    /// Returns bounds and read failures.
    pub fn read_convert(&self, off: u64, buf: &mut [u8]) -> Result<()> {
        self.read(off, buf)?;
        self.convert(buf);
        Ok(())
    }

    /// Write `data` at `off`, converted to on-disk order on the way. `data`
    /// itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::OutOfMemory` if the conversion buffer cannot be
    /// allocated, plus the errors of [`Store::write`].
    pub fn write_convert(&self, off: u64, data: &[u8]) -> Result<()> {
        if !self.converts() {
            return self.write(off, data);
        }
        let mut conv = self.alloc(data.len() as u64, Severity::Fatal, "write_convert")?;
        conv.copy_from_slice(data);
        self.convert(&mut conv);
        self.write(off, &conv)
    }

    /// Read the 8-byte structural word at `off`, in host order.
    ///
    /// # Errors
    ///
    /// Returns bounds and read failures.
    pub fn read_off(&self, off: u64) -> Result<u64> {
        let mut word = [0u8; WORD as usize];
        if !self.converts() {
            if let Some(lease) = self.direct(off, WORD, false) {
                word.copy_from_slice(lease.as_slice());
                return Ok(u64::from_ne_bytes(word));
            }
        }
        self.read_convert(off, &mut word)?;
        Ok(u64::from_ne_bytes(word))
    }

    /// Store `val` as the 8-byte structural word at `off`.
    ///
    /// # Errors
    ///
    /// Returns `TdbError::ReadOnly` on read-only stores, plus the errors of
    /// [`Store::write_convert`].
    pub fn write_off(&self, off: u64, val: u64) -> Result<()> {
        if self.flags.read_only {
            return Err(self.read_only_violation("write_off"));
        }
        if !self.converts() {
            if let Some(mut lease) = self.direct(off, WORD, true) {
                if let Some(dst) = lease.as_mut_slice() {
                    dst.copy_from_slice(&val.to_ne_bytes());
                    return Ok(());
                }
            }
        }
        self.write_convert(off, &val.to_ne_bytes())
    }
}
