//! Index-based intrusive doubly-linked free lists.
//!
//! A free block's first two payload words hold the arena offsets of the
//! previous and next free block in the same bin. [`NIL`] marks the end of a
//! list in either direction; no payload ever sits at offset zero.
//!
//! This data structure does no validation. Unlinking a block that isn't in the
//! given list corrupts that list.

use crate::ptr_utils::{read_word, write_word, WORD_SIZE};

/// The null link.
pub const NIL: usize = 0;

const PREV_OFFSET: usize = 0;
const NEXT_OFFSET: usize = WORD_SIZE;

#[inline]
pub fn prev_of(bytes: &[u8], block: usize) -> usize {
    read_word(bytes, block + PREV_OFFSET)
}

#[inline]
pub fn next_of(bytes: &[u8], block: usize) -> usize {
    read_word(bytes, block + NEXT_OFFSET)
}

#[inline]
fn set_prev(bytes: &mut [u8], block: usize, prev: usize) {
    write_word(bytes, block + PREV_OFFSET, prev)
}

#[inline]
fn set_next(bytes: &mut [u8], block: usize, next: usize) {
    write_word(bytes, block + NEXT_OFFSET, next)
}

/// Pushes `block` onto the front of the list headed by `head`.
#[inline]
pub fn push_front(bytes: &mut [u8], head: &mut usize, block: usize) {
    debug_assert_ne!(block, NIL);

    if *head != NIL {
        set_prev(bytes, *head, block);
    }

    set_prev(bytes, block, NIL);
    set_next(bytes, block, *head);
    *head = block;
}

/// Splices `block` out of the list headed by `head`.
#[inline]
pub fn unlink(bytes: &mut [u8], head: &mut usize, block: usize) {
    let prev = prev_of(bytes, block);
    let next = next_of(bytes, block);

    match (prev, next) {
        // the only block in the list
        (NIL, NIL) => {
            debug_assert_eq!(*head, block);
            *head = NIL;
        }
        // the head of the list
        (NIL, next) => {
            debug_assert_eq!(*head, block);
            set_prev(bytes, next, NIL);
            *head = next;
        }
        // the tail of the list
        (prev, NIL) => set_next(bytes, prev, NIL),
        (prev, next) => {
            set_next(bytes, prev, next);
            set_prev(bytes, next, prev);
        }
    }
}

/// Creates an iterator over the list starting at `head`.
#[inline]
pub fn iter(bytes: &[u8], head: usize) -> Iter<'_> {
    Iter { bytes, current: head }
}

/// An iterator over the offsets of the blocks in a free list.
///
/// This `struct` is created by [`iter`].
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a> {
    bytes: &'a [u8],
    current: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }

        let block = self.current;
        self.current = next_of(self.bytes, block);
        Some(block)
    }
}
