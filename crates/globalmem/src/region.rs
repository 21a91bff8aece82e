//! Fixed-capacity byte storage backing one device instance.
//!
//! # Threading / data races
//! Every handle bound to the same index shares one [`Region`] with no lock in between, so
//! concurrent readers, writers and clears may interleave at byte granularity. Bytes are stored as
//! [`AtomicU8`] and accessed with `Relaxed` loads/stores: interleaving is observable, but it is never
//! a Rust data race and no access can land outside `[0, capacity)`.

use std::ops::Range;
use std::sync::atomic::{AtomicU8, Ordering};

pub struct Region {
    storage: Box<[AtomicU8]>,
}

impl Region {
    /// Allocates a zero-filled region of exactly `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Byte range a transfer of up to `requested` bytes starting at `offset` may touch.
    ///
    /// Returns `None` once `offset` is past the end. The range is clamped to the region, so
    /// `offset == capacity` yields an empty range.
    pub(crate) fn span(&self, offset: usize, requested: usize) -> Option<Range<usize>> {
        let remaining = self.capacity().checked_sub(offset)?;
        Some(offset..offset + requested.min(remaining))
    }

    /// Copies `range` out of the region into `dst[..range.len()]`.
    pub(crate) fn load(&self, range: Range<usize>, dst: &mut [u8]) {
        let src = &self.storage[range];
        for (slot, byte) in dst.iter_mut().zip(src) {
            *slot = byte.load(Ordering::Relaxed);
        }
    }

    /// Copies `src[..range.len()]` into `range` of the region.
    pub(crate) fn store(&self, range: Range<usize>, src: &[u8]) {
        let dst = &self.storage[range];
        for (slot, byte) in dst.iter().zip(src.iter().copied()) {
            slot.store(byte, Ordering::Relaxed);
        }
    }

    /// Zeroes every byte.
    pub(crate) fn clear(&self) {
        for byte in self.storage.iter() {
            byte.store(0, Ordering::Relaxed);
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.capacity()];
        self.load(0..self.capacity(), &mut out);
        out
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
