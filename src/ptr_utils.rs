//! Generic utilities for offset handling and in-band word access.

use core::ptr::NonNull;

pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

/// Aligns `offset` up to the next `align_mask + 1`.
///
/// `align_mask` must be a power of two minus one.
#[inline]
pub const fn align_up_by(offset: usize, align_mask: usize) -> usize {
    debug_assert!((align_mask + 1).is_power_of_two());

    (offset + align_mask) & !align_mask
}

/// Aligns `offset` down to `align_mask + 1`.
///
/// `align_mask` must be a power of two minus one.
#[inline]
pub const fn align_down_by(offset: usize, align_mask: usize) -> usize {
    debug_assert!((align_mask + 1).is_power_of_two());

    offset & !align_mask
}

#[inline]
pub const fn is_aligned_to(offset: usize, align: usize) -> bool {
    offset & (align - 1) == 0
}

/// Reads the native-endian word at `offset`.
///
/// Panics if the word is not entirely within `bytes`.
#[inline]
pub fn read_word(bytes: &[u8], offset: usize) -> usize {
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(&bytes[offset..offset + WORD_SIZE]);
    usize::from_ne_bytes(word)
}

/// Writes `value` as a native-endian word at `offset`.
///
/// Panics if the word is not entirely within `bytes`.
#[inline]
pub fn write_word(bytes: &mut [u8], offset: usize, value: usize) {
    bytes[offset..offset + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

#[inline]
pub fn nonnull_slice_from_raw_parts(ptr: NonNull<u8>, len: usize) -> NonNull<[u8]> {
    // SAFETY: `ptr` is non-null, so the slice pointer is too
    unsafe { NonNull::new_unchecked(core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) }
}
