//! Byte-order handling for 8-byte structural words.

use crate::mmap::Store;

/// Byte order a store records its structural words in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// The byte order of the running host.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The byte order that is not the host's.
    #[must_use]
    pub const fn foreign() -> Self {
        match Self::native() {
            ByteOrder::Big => ByteOrder::Little,
            ByteOrder::Little => ByteOrder::Big,
        }
    }

    /// Whether words in this order must be swapped to be read on this host.
    #[must_use]
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// Reverse the bytes of every complete 8-byte word in `buf`, in place.
///
/// A trailing partial word is left alone. Applying this twice restores the input.
pub fn swap_words(buf: &mut [u8]) {
    for word in buf.chunks_exact_mut(8) {
        word.reverse();
    }
}

impl Store {
    /// Swap `buf` between host and on-disk order if they differ; otherwise
    /// leave it alone. Only meant for structural words, never payloads.
    pub fn convert(&self, buf: &mut [u8]) {
        if self.converts() {
            swap_words(buf);
        }
    }
}
