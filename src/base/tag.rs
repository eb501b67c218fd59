//! A `Tag` is the boundary word at both ends of every block.
//!
//! Block sizes are always a multiple of [`ALIGN`](super::ALIGN), so the low
//! bits of the size are free to carry the allocated flag.

use crate::ptr_utils::{read_word, write_word};

use super::ALIGN;

/// Header/footer word of a block.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Tag(pub usize);

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("is_allocated", &self.is_allocated())
            .finish()
    }
}

impl Tag {
    pub const ALLOCATED_FLAG: usize = 1 << 0;

    const SIZE_MASK: usize = !(ALIGN - 1);

    /// The epilogue's header: zero-sized and allocated.
    pub const EPILOGUE: Tag = Tag(Self::ALLOCATED_FLAG);

    #[inline]
    pub const fn new(size: usize, is_allocated: bool) -> Self {
        debug_assert!(size & !Self::SIZE_MASK == 0);

        if is_allocated {
            Self(size | Self::ALLOCATED_FLAG)
        } else {
            Self(size)
        }
    }

    #[inline]
    pub const fn size(self) -> usize {
        self.0 & Self::SIZE_MASK
    }

    #[inline]
    pub const fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_FLAG != 0
    }

    #[inline]
    pub fn read(bytes: &[u8], offset: usize) -> Self {
        Self(read_word(bytes, offset))
    }

    #[inline]
    pub fn write(self, bytes: &mut [u8], offset: usize) {
        write_word(bytes, offset, self.0)
    }
}
