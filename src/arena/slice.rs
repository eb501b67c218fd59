use core::{marker::PhantomData, ptr::NonNull};

use crate::base::ALIGN;

use super::{Arena, StableArena};

/// A [`StableArena`] over a borrowed buffer.
///
/// The start of the buffer is skipped up to the first [`ALIGN`]-aligned byte.
/// The arena then grows forward through the buffer until it runs out.
#[derive(Debug)]
pub struct SliceArena<'a> {
    base: NonNull<u8>,
    len: usize,
    capacity: usize,
    _phantom: PhantomData<&'a mut [u8]>,
}

// SAFETY: this is equivalent to holding the `&'a mut [u8]`
unsafe impl Send for SliceArena<'_> {}

impl<'a> SliceArena<'a> {
    /// Create an empty arena which can grow to cover (most of) `memory`.
    pub fn new(memory: &'a mut [u8]) -> Self {
        let skip = memory.as_ptr().align_offset(ALIGN).min(memory.len());
        let memory = &mut memory[skip..];
        let capacity = memory.len();

        Self {
            base: NonNull::from(memory).cast(),
            len: 0,
            capacity,
            _phantom: PhantomData,
        }
    }

    /// How many bytes the arena can grow to.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Arena for SliceArena<'_> {
    fn bytes(&self) -> &[u8] {
        // SAFETY: `base..base + capacity` is uniquely borrowed for `'a`
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: `base..base + capacity` is uniquely borrowed for `'a`
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn extend(&mut self, increment: usize) -> Option<usize> {
        let old_len = self.len;
        let new_len = old_len.checked_add(increment)?;

        if new_len > self.capacity {
            log::debug!(
                "slice arena of {} bytes can't grow by {}, capacity is {}",
                old_len,
                increment,
                self.capacity
            );
            return None;
        }

        self.len = new_len;
        Some(old_len)
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}

// SAFETY: the buffer is borrowed for the arena's lifetime and doesn't move,
// and `base` was aligned to `ALIGN` on construction
unsafe impl StableArena for SliceArena<'_> {
    fn base_ptr(&self) -> NonNull<u8> {
        self.base
    }
}
