//! The memory a [`Heap`](crate::Heap) carves its blocks from.
//!
//! An [`Arena`] is a byte range that only ever grows at its end. The heap
//! addresses everything in it by offset, so an arena is free to move its
//! contents when it grows, unless it also implements [`StableArena`].

use core::{ops::Range, ptr::NonNull};

mod slice;
mod vec;

#[cfg(all(unix, feature = "system-backed"))]
mod os_backed;

pub use slice::SliceArena;
pub use vec::VecArena;

#[cfg(all(unix, feature = "system-backed"))]
pub use os_backed::MmapArena;

/// A growable, append-only byte range.
///
/// # Requirements
/// - [`Arena::extend`] grows the arena by exactly `increment` bytes and returns
///     the previous length, or returns `None` and leaves the arena unchanged.
/// - Existing contents are preserved by [`Arena::extend`]. The new bytes may hold anything.
/// - [`Arena::bytes`] and [`Arena::bytes_mut`] cover the whole arena, starting at offset zero.
pub trait Arena {
    /// The current contents of the arena.
    fn bytes(&self) -> &[u8];

    /// The current contents of the arena.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Grow the arena by `increment` bytes, returning the offset of the old end.
    fn extend(&mut self, increment: usize) -> Option<usize>;

    /// Shrink the arena back to zero bytes.
    fn reset(&mut self);

    /// The offsets currently covered by the arena.
    fn bounds(&self) -> Range<usize> {
        0..self.bytes().len()
    }
}

/// An [`Arena`] whose memory never moves, and can therefore be handed out by address.
///
/// # Safety
/// [`StableArena::base_ptr`] must always return the same pointer, which must be
/// aligned to [`ALIGN`](crate::base::ALIGN) and valid for reads and writes of
/// every offset ever within [`Arena::bounds`], until the arena is dropped.
/// Growing or resetting the arena must not invalidate this memory.
pub unsafe trait StableArena: Arena {
    /// The address of offset zero.
    fn base_ptr(&self) -> NonNull<u8>;
}
