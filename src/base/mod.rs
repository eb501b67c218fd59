//! The core allocation mechanism: the [`Heap`] type and its block layout.
//!
//! # Block layout
//!
//! Every block starts with a header word and ends with a footer word, both holding
//! the block's [`Tag`](tag::Tag). A block is identified by the offset of its payload,
//! which sits right after the header and is aligned to [`ALIGN`].
//!
//! ```text
//!   header     payload ...                                  footer
//! | size|a | prev free | next free | ...                   | size|a |
//!          ^ block offset
//! ```
//!
//! Free blocks hold their free-list links in the first two payload words.
//! An allocated prologue block at the start of the arena and a zero-sized allocated
//! epilogue header at its end bound every neighbour lookup.

use alloc::vec::Vec;
use core::{fmt::Debug, marker::PhantomData, num::NonZeroUsize};

use crate::arena::Arena;
use crate::ptr_utils::{self, WORD_SIZE};

use binning::{Binning, DefaultBinning};
use config::Config;
use tag::Tag;

pub mod binning;
pub mod config;
mod check;
mod free_list;
mod tag;

#[cfg(feature = "counters")]
mod counters;
#[cfg(feature = "counters")]
pub use counters::Counters;

pub use check::Violation;

/// The alignment of every payload, and the granularity of every block size.
pub const ALIGN: usize = WORD_SIZE * 2;
/// The size of a block's header, and of its footer.
pub const TAG_SIZE: usize = WORD_SIZE;
/// The bytes of a block that are not payload.
pub const OVERHEAD: usize = TAG_SIZE * 2;
/// The smallest block that can be free: two tags and two list links.
pub const MIN_BLOCK_SIZE: usize = WORD_SIZE * 4;

const PROLOGUE: usize = WORD_SIZE * 2;
const PROLOGUE_SIZE: usize = OVERHEAD;
/// Padding word, prologue header and footer, epilogue header.
const INITIAL_ARENA_SIZE: usize = WORD_SIZE * 4;

#[inline]
const fn header_of(block: usize) -> usize {
    block - TAG_SIZE
}
#[inline]
const fn footer_of(block: usize, size: usize) -> usize {
    block + size - OVERHEAD
}
#[inline]
const fn footer_of_prev(block: usize) -> usize {
    block - OVERHEAD
}

#[inline]
fn write_tags(bytes: &mut [u8], block: usize, size: usize, is_allocated: bool) {
    let tag = Tag::new(size, is_allocated);
    tag.write(bytes, header_of(block));
    tag.write(bytes, footer_of(block, size));
}

/// The block size needed to hold `size` bytes of payload, or `None` on overflow.
#[inline]
pub(crate) fn required_block_size(size: usize) -> Option<usize> {
    let padded = size.checked_add(OVERHEAD + ALIGN - 1)?;
    Some(ptr_utils::align_down_by(padded, ALIGN - 1).max(MIN_BLOCK_SIZE))
}

/// The arena offset of a block's payload.
///
/// Offset zero is never a payload, so `Option<BlockPtr>` fills the role of a nullable pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockPtr(NonZeroUsize);

impl BlockPtr {
    /// Returns `None` if `offset` is zero.
    #[inline]
    pub const fn new(offset: usize) -> Option<Self> {
        match NonZeroUsize::new(offset) {
            Some(offset) => Some(Self(offset)),
            None => None,
        }
    }

    /// The offset of the payload from the start of the arena.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0.get()
    }
}

impl core::fmt::Display for BlockPtr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.offset())
    }
}

/// [`Heap::init`] couldn't get the arena to hold the sentinel blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaExhausted;

impl core::fmt::Display for ArenaExhausted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("the arena could not be extended")
    }
}

/// The core allocator type.
///
/// A [`Heap`] tiles an [`Arena`] with boundary-tagged blocks and keeps the free
/// ones in segregated, doubly-linked free lists. Allocation takes the best of a
/// bounded number of candidates from the first list that has a fitting block,
/// and grows the arena when none does.
///
/// [`Heap`] has no interior mutability. Use [`HeapCell`](crate::cell::HeapCell) to
/// allocate through the [`Allocator`](allocator_api2::alloc::Allocator) API.
///
/// # Generic Parameters
/// - The arena is where the memory comes from and how it grows.
///     See [`VecArena`](crate::arena::VecArena), [`SliceArena`](crate::arena::SliceArena).
/// - The binning implementation determines how free blocks are sorted into free lists.
///     The default implementation is [`DefaultBinning`].
pub struct Heap<A: Arena, B: Binning = DefaultBinning> {
    /// Allocation statistics for this heap.
    #[cfg(feature = "counters")]
    counters: Counters,

    arena: A,
    config: Config,
    /// Free-list heads, [`free_list::NIL`] if empty.
    bins: Vec<usize>,
    is_initialized: bool,
    _phantom: PhantomData<fn(B) -> B>,
}

impl<A: Arena + Debug, B: Binning> Debug for Heap<A, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut debug_struct = f.debug_struct("Heap");

        debug_struct
            .field("arena", &self.arena)
            .field("config", &self.config)
            .field("bins", &self.bins)
            .field("is_initialized", &self.is_initialized);

        #[cfg(feature = "counters")]
        {
            debug_struct.field("counters", &self.counters);
        }

        debug_struct.finish()
    }
}

impl<A: Arena, B: Binning> Heap<A, B> {
    /// Create a heap over `arena` with the default [`Config`].
    ///
    /// Nothing can be allocated until [`Heap::init`] succeeds.
    pub const fn new(arena: A) -> Self {
        Self::with_config(arena, Config::DEFAULT)
    }

    /// Create a heap over `arena` with a custom allocation policy.
    pub const fn with_config(arena: A, config: Config) -> Self {
        Self {
            #[cfg(feature = "counters")]
            counters: Counters::new(),
            arena,
            config,
            bins: Vec::new(),
            is_initialized: false,
            _phantom: PhantomData,
        }
    }

    /// The arena this heap manages.
    pub fn arena(&self) -> &A {
        &self.arena
    }

    /// Take back the arena.
    pub fn into_arena(self) -> A {
        self.arena
    }

    /// The allocation policy in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether [`Heap::init`] has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Reset the arena and set up the prologue and epilogue.
    ///
    /// Any previous allocations are forgotten. On failure, the heap is left
    /// uninitialized and every allocation returns `None`.
    pub fn init(&mut self) -> Result<(), ArenaExhausted> {
        self.is_initialized = false;
        self.arena.reset();
        self.bins.clear();

        #[cfg(feature = "counters")]
        {
            self.counters = Counters::new();
        }

        let Some(base) = self.arena.extend(INITIAL_ARENA_SIZE) else {
            log::debug!("Heap::init() failed, arena exhausted");
            return Err(ArenaExhausted);
        };
        debug_assert_eq!(base, 0);

        let bytes = self.arena.bytes_mut();
        ptr_utils::write_word(bytes, 0, 0);
        write_tags(bytes, PROLOGUE, PROLOGUE_SIZE, true);
        Tag::EPILOGUE.write(bytes, header_of(INITIAL_ARENA_SIZE));

        self.bins.resize(B::BIN_COUNT, free_list::NIL);
        self.is_initialized = true;

        #[cfg(feature = "counters")]
        self.counters.account_extend(INITIAL_ARENA_SIZE);

        log::debug!("Heap::init() with {} bins, {:?}", B::BIN_COUNT, self.config);

        self.scan_for_errors();
        Ok(())
    }

    /// Allocate a block with at least `size` bytes of payload.
    ///
    /// Returns `None` if `size` is zero, if the heap isn't initialized, or if the
    /// arena can't grow enough. The heap is unchanged in the latter case.
    pub fn allocate(&mut self, size: usize) -> Option<BlockPtr> {
        if size == 0 || !self.is_initialized {
            return None;
        }

        let block_size = required_block_size(size)?;

        let block = match self.find_fit(block_size) {
            Some(block) => block,
            None => self.extend_heap(block_size)?,
        };

        let size = self.place(block, block_size);

        #[cfg(feature = "counters")]
        self.counters.account_alloc(size);

        let ptr = BlockPtr::new(block);
        log::trace!("Heap::allocate({block_size}) -> {block:#x}, block size {size}");

        self.scan_for_errors();
        ptr
    }

    /// Free the block at `ptr`. Does nothing if `ptr` is `None`.
    ///
    /// `ptr` must be a live allocation of this heap. If it isn't, the heap may be
    /// corrupted or this may panic, but memory safety is not at stake.
    pub fn free(&mut self, ptr: Option<BlockPtr>) {
        let Some(ptr) = ptr else { return };
        let block = ptr.offset();
        let size = self.block_size(block);

        debug_assert!(Tag::read(self.arena.bytes(), header_of(block)).is_allocated());
        log::trace!("Heap::free({block:#x}), block size {size}");

        #[cfg(feature = "counters")]
        self.counters.account_free(size);

        write_tags(self.arena.bytes_mut(), block, size, false);
        self.coalesce(block, size);

        self.scan_for_errors();
    }

    /// Change the payload size of the block at `ptr` to at least `new_size`.
    ///
    /// - If `ptr` is `None`, this is [`Heap::allocate`].
    /// - If `new_size` is zero, this is [`Heap::free`] and returns `None`.
    /// - If the block is large enough, or can be grown where it is, `ptr` is returned.
    /// - Otherwise the contents are moved to a new block, and the old one is freed.
    ///
    /// Returns `None` if the contents needed moving but allocation failed.
    /// The original block is untouched in this case.
    pub fn resize(&mut self, ptr: Option<BlockPtr>, new_size: usize) -> Option<BlockPtr> {
        let Some(ptr) = ptr else { return self.allocate(new_size) };

        if new_size == 0 {
            self.free(Some(ptr));
            return None;
        }

        let block = ptr.offset();
        let size = self.block_size(block);
        let block_size = required_block_size(new_size)?;

        if block_size <= size {
            log::trace!("Heap::resize({block:#x}, {new_size}) shrinks in place");
            self.shrink_in_place(block, size, block_size);
            self.scan_for_errors();
            return Some(ptr);
        }

        if self.grow_in_place(block, size, block_size) {
            log::trace!("Heap::resize({block:#x}, {new_size}) grows in place");
            self.scan_for_errors();
            return Some(ptr);
        }

        let new_ptr = self.allocate(new_size)?;
        let copy_len = (size - OVERHEAD).min(new_size);
        self.arena.bytes_mut().copy_within(block..block + copy_len, new_ptr.offset());
        self.free(Some(ptr));

        log::trace!("Heap::resize({block:#x}, {new_size}) moved to {new_ptr}");
        Some(new_ptr)
    }

    /// The number of payload bytes available in the block at `ptr`.
    ///
    /// This is at least the size it was allocated or last resized with.
    pub fn usable_size(&self, ptr: BlockPtr) -> usize {
        self.block_size(ptr.offset()) - OVERHEAD
    }

    /// The payload of the block at `ptr`.
    pub fn payload(&self, ptr: BlockPtr) -> &[u8] {
        let block = ptr.offset();
        let capacity = self.usable_size(ptr);
        &self.arena.bytes()[block..block + capacity]
    }

    /// The payload of the block at `ptr`.
    pub fn payload_mut(&mut self, ptr: BlockPtr) -> &mut [u8] {
        let block = ptr.offset();
        let capacity = self.usable_size(ptr);
        &mut self.arena.bytes_mut()[block..block + capacity]
    }

    /// Iterate over the free lists, yielding the bin, offset, and size of each free block.
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, BlockPtr, usize)> + '_ {
        let bytes = self.arena.bytes();

        self.bins.iter().enumerate().flat_map(move |(bin, &head)| {
            free_list::iter(bytes, head).filter_map(move |block| {
                let size = Tag::read(bytes, header_of(block)).size();
                Some((bin, BlockPtr::new(block)?, size))
            })
        })
    }

    #[inline]
    fn block_size(&self, block: usize) -> usize {
        Tag::read(self.arena.bytes(), header_of(block)).size()
    }

    /// Registers a free block into the free lists.
    #[inline]
    fn link(&mut self, block: usize, size: usize) {
        let bin = B::size_to_bin(size);
        free_list::push_front(self.arena.bytes_mut(), &mut self.bins[bin], block);

        #[cfg(feature = "counters")]
        self.counters.account_link(size);
    }

    /// De-registers a free block from the free lists.
    #[inline]
    fn unlink(&mut self, block: usize, size: usize) {
        let bin = B::size_to_bin(size);
        free_list::unlink(self.arena.bytes_mut(), &mut self.bins[bin], block);

        #[cfg(feature = "counters")]
        self.counters.account_unlink(size);
    }

    /// Find a free block of at least `block_size` bytes.
    ///
    /// Bins are tried in increasing order from the bin of `block_size`. The first bin
    /// with a large enough block among its first `search_limit` entries gives up the
    /// smallest of those.
    fn find_fit(&self, block_size: usize) -> Option<usize> {
        let bytes = self.arena.bytes();
        let search_limit = self.config.search_limit();

        for bin in B::size_to_bin(block_size)..B::BIN_COUNT {
            let mut best: Option<(usize, usize)> = None;

            for block in free_list::iter(bytes, self.bins[bin]).take(search_limit) {
                let size = Tag::read(bytes, header_of(block)).size();

                if size >= block_size && best.map_or(true, |(_, best_size)| size < best_size) {
                    best = Some((block, size));

                    if size == block_size {
                        break;
                    }
                }
            }

            if let Some((block, size)) = best {
                log::trace!("found {block:#x} of size {size} in bin {bin} for {block_size}");
                return Some(block);
            }
        }

        None
    }

    /// Take the free `block` for an allocation of `block_size` bytes,
    /// returning the size of the allocated block.
    ///
    /// A remainder big enough to be a block is split off and freed.
    fn place(&mut self, block: usize, block_size: usize) -> usize {
        let size = self.block_size(block);
        debug_assert!(size >= block_size);

        self.unlink(block, size);

        let remainder = size - block_size;
        if remainder >= MIN_BLOCK_SIZE {
            let bytes = self.arena.bytes_mut();
            write_tags(bytes, block, block_size, true);
            write_tags(bytes, block + block_size, remainder, false);

            // the block after the remainder can't be free, no need to coalesce
            self.link(block + block_size, remainder);

            log::trace!("placed {block:#x}, split off {remainder} bytes");
            block_size
        } else {
            write_tags(self.arena.bytes_mut(), block, size, true);
            size
        }
    }

    /// Merge the free `block` with its free neighbours and file the result.
    ///
    /// `block` must already be tagged free, but not yet be in a free list.
    fn coalesce(&mut self, block: usize, size: usize) -> (usize, usize) {
        let bytes = self.arena.bytes();
        let prev_tag = Tag::read(bytes, footer_of_prev(block));
        let next_tag = Tag::read(bytes, header_of(block + size));

        let (base, merged_size) = match (prev_tag.is_allocated(), next_tag.is_allocated()) {
            (true, true) => {
                log::trace!("coalesce({block:#x}): no free neighbours");
                (block, size)
            }
            (true, false) => {
                log::trace!("coalesce({block:#x}): merging with next");
                self.unlink(block + size, next_tag.size());
                (block, size + next_tag.size())
            }
            (false, true) => {
                log::trace!("coalesce({block:#x}): merging with prev");
                let prev = block - prev_tag.size();
                self.unlink(prev, prev_tag.size());
                (prev, prev_tag.size() + size)
            }
            (false, false) => {
                log::trace!("coalesce({block:#x}): merging with prev and next");
                let prev = block - prev_tag.size();
                self.unlink(prev, prev_tag.size());
                self.unlink(block + size, next_tag.size());
                (prev, prev_tag.size() + size + next_tag.size())
            }
        };

        write_tags(self.arena.bytes_mut(), base, merged_size, false);
        self.link(base, merged_size);

        (base, merged_size)
    }

    /// Grow the arena to fit a block of `block_size` bytes,
    /// returning the free block at the end of the arena.
    fn extend_heap(&mut self, block_size: usize) -> Option<usize> {
        let increment = self.config.extension_size(block_size)?;
        let old_end = self.arena.extend(increment)?;

        log::debug!("extended arena by {increment} bytes at {old_end:#x}");

        #[cfg(feature = "counters")]
        self.counters.account_extend(increment);

        // the new block's header overwrites the old epilogue
        let bytes = self.arena.bytes_mut();
        write_tags(bytes, old_end, increment, false);
        Tag::EPILOGUE.write(bytes, header_of(old_end + increment));

        let (block, size) = self.coalesce(old_end, increment);
        debug_assert!(size >= block_size);
        Some(block)
    }

    /// Release the tail of an allocated block beyond `block_size`, if it's big enough.
    fn shrink_in_place(&mut self, block: usize, size: usize, block_size: usize) {
        let surplus = size - block_size;
        if surplus < MIN_BLOCK_SIZE {
            return;
        }

        let bytes = self.arena.bytes_mut();
        write_tags(bytes, block, block_size, true);
        write_tags(bytes, block + block_size, surplus, false);
        self.coalesce(block + block_size, surplus);

        #[cfg(feature = "counters")]
        self.counters.account_resize_in_place(size, block_size);
    }

    /// Try to grow the allocated `block` to `block_size` without moving it.
    ///
    /// This absorbs a free block that follows, and extends the arena if the
    /// block (or the free block that follows) ends the arena.
    fn grow_in_place(&mut self, block: usize, size: usize, block_size: usize) -> bool {
        let next = block + size;
        let next_tag = Tag::read(self.arena.bytes(), header_of(next));

        let (available, after) = if next_tag.is_allocated() {
            (size, next)
        } else {
            (size + next_tag.size(), next + next_tag.size())
        };

        let new_size = if available >= block_size {
            if !next_tag.is_allocated() {
                self.unlink(next, next_tag.size());
            }

            let surplus = available - block_size;
            if surplus >= MIN_BLOCK_SIZE {
                let bytes = self.arena.bytes_mut();
                write_tags(bytes, block, block_size, true);
                write_tags(bytes, block + block_size, surplus, false);
                self.link(block + block_size, surplus);
                block_size
            } else {
                write_tags(self.arena.bytes_mut(), block, available, true);
                available
            }
        } else {
            if Tag::read(self.arena.bytes(), header_of(after)) != Tag::EPILOGUE {
                return false;
            }

            let increment = block_size - available;
            let Some(old_end) = self.arena.extend(increment) else {
                return false;
            };
            debug_assert_eq!(old_end, after);

            log::debug!("extended arena by {increment} bytes at {old_end:#x} to grow {block:#x}");

            #[cfg(feature = "counters")]
            self.counters.account_extend(increment);

            if !next_tag.is_allocated() {
                self.unlink(next, next_tag.size());
            }

            let bytes = self.arena.bytes_mut();
            write_tags(bytes, block, block_size, true);
            Tag::EPILOGUE.write(bytes, header_of(block + block_size));
            block_size
        };

        log::trace!("grew {block:#x} from {size} to {new_size} bytes");

        #[cfg(feature = "counters")]
        self.counters.account_resize_in_place(size, new_size);

        true
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::arena::VecArena;
    use crate::test_utils::{init_logging, new_heap};

    use super::*;

    #[test]
    fn block_size_arithmetic() {
        assert_eq!(required_block_size(1), Some(MIN_BLOCK_SIZE));
        assert_eq!(required_block_size(ALIGN), Some(MIN_BLOCK_SIZE));
        assert_eq!(required_block_size(ALIGN + 1), Some(MIN_BLOCK_SIZE + ALIGN));
        let expected = ptr_utils::align_up_by(100 + OVERHEAD, ALIGN - 1);
        assert_eq!(required_block_size(100), Some(expected));
        assert_eq!(required_block_size(usize::MAX), None);
        assert_eq!(required_block_size(usize::MAX - OVERHEAD), None);
    }

    #[test]
    fn uninitialized_heap_refuses() {
        let mut heap: Heap<VecArena> = Heap::new(VecArena::default());

        assert!(!heap.is_initialized());
        assert_eq!(heap.allocate(8), None);
        assert_eq!(heap.resize(None, 8), None);
        assert!(!heap.is_consistent());
    }

    #[test]
    fn init_fails_on_tiny_arena() {
        let mut heap: Heap<VecArena> = Heap::new(VecArena::with_limit(INITIAL_ARENA_SIZE - 1));
        assert_eq!(heap.init(), Err(ArenaExhausted));
        assert!(!heap.is_initialized());
        assert_eq!(heap.allocate(1), None);
    }

    #[test]
    fn init_writes_sentinels() {
        let heap = new_heap::<DefaultBinning>();
        let bytes = heap.arena().bytes();

        assert_eq!(bytes.len(), INITIAL_ARENA_SIZE);
        assert_eq!(Tag::read(bytes, header_of(PROLOGUE)), Tag::new(PROLOGUE_SIZE, true));
        let prologue_footer = footer_of(PROLOGUE, PROLOGUE_SIZE);
        assert_eq!(Tag::read(bytes, prologue_footer), Tag::new(PROLOGUE_SIZE, true));
        assert_eq!(Tag::read(bytes, header_of(INITIAL_ARENA_SIZE)), Tag::EPILOGUE);
        assert_eq!(heap.free_blocks().count(), 0);
    }

    #[test]
    fn reinit_forgets_everything() {
        let mut heap = new_heap::<DefaultBinning>();
        heap.allocate(1000).unwrap();
        heap.allocate(10).unwrap();

        heap.init().unwrap();
        assert_eq!(heap.arena().bytes().len(), INITIAL_ARENA_SIZE);
        assert_eq!(heap.free_blocks().count(), 0);
        assert!(heap.is_consistent());
    }

    #[test]
    fn null_resize_allocates_and_frees_round_trip() {
        fn null_resize_allocates_and_frees_round_trip_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.resize(None, 300).unwrap();
            assert!(heap.usable_size(a) >= 300);
            heap.payload_mut(a)[..300].fill(0x5A);
            assert!(heap.is_consistent());

            heap.free(Some(a));
            let arena_len = heap.arena().bytes().len();

            let b = heap.allocate(300).unwrap();
            assert_eq!(b, a);
            assert_eq!(heap.arena().bytes().len(), arena_len);

            heap.free(Some(b));
            assert_eq!(heap.free_blocks().count(), 1);
        }

        for_many_configurations!(null_resize_allocates_and_frees_round_trip_inner);
    }

    #[test]
    fn zero_size() {
        fn zero_size_inner<B: Binning>() {
            let mut heap = new_heap::<B>();
            assert_eq!(heap.allocate(0), None);
            assert_eq!(heap.arena().bytes().len(), INITIAL_ARENA_SIZE);

            let a = heap.allocate(10);
            assert!(a.is_some());
            assert_eq!(heap.resize(a, 0), None);
            assert_eq!(heap.free_blocks().count(), 1);

            heap.free(None);
            assert!(heap.is_consistent());
        }

        for_many_configurations!(zero_size_inner);
    }

    #[test]
    fn alignment_and_capacity() {
        fn alignment_and_capacity_inner<B: Binning>() {
            let mut heap = new_heap::<B>();
            let mut ptrs = std::vec::Vec::new();

            for size in 1..300 {
                let ptr = heap.allocate(size).unwrap();
                assert!(ptr_utils::is_aligned_to(ptr.offset(), ALIGN));
                assert!(heap.usable_size(ptr) >= size);

                heap.payload_mut(ptr)[..size].fill(size as u8);
                ptrs.push((ptr, size));
            }

            for &(ptr, size) in &ptrs {
                assert!(heap.payload(ptr)[..size].iter().all(|&b| b == size as u8));
            }

            for (ptr, _) in ptrs {
                heap.free(Some(ptr));
            }

            assert_eq!(heap.free_blocks().count(), 1);
        }

        for_many_configurations!(alignment_and_capacity_inner);
    }

    #[test]
    fn freed_block_is_reused() {
        fn freed_block_is_reused_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(100).unwrap();
            let b = heap.allocate(200).unwrap();
            heap.free(Some(a));

            let arena_len = heap.arena().bytes().len();
            let c = heap.allocate(50).unwrap();

            assert_eq!(c, a);
            assert_eq!(heap.arena().bytes().len(), arena_len);
            assert_ne!(c, b);
        }

        for_many_configurations!(freed_block_is_reused_inner);
    }

    #[test]
    fn adjacent_frees_coalesce() {
        fn adjacent_frees_coalesce_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(16).unwrap();
            let b = heap.allocate(16).unwrap();
            assert_eq!(b.offset(), a.offset() + heap.usable_size(a) + OVERHEAD);

            heap.free(Some(a));
            heap.free(Some(b));

            let free: std::vec::Vec<_> = heap.free_blocks().collect();
            assert_eq!(free.len(), 1);

            let (_, ptr, size) = free[0];
            assert_eq!(ptr, a);
            assert_eq!(size, heap.arena().bytes().len() - INITIAL_ARENA_SIZE);
        }

        for_many_configurations!(adjacent_frees_coalesce_inner);
    }

    #[test]
    fn coalesce_all_four_cases() {
        fn coalesce_all_four_cases_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let blocks: std::vec::Vec<_> = (0..7).map(|_| heap.allocate(40).unwrap()).collect();
            let guard = heap.allocate(40).unwrap();
            let sizes: std::vec::Vec<_> =
                blocks.iter().map(|&b| heap.usable_size(b) + OVERHEAD).collect();

            // neither neighbour free
            heap.free(Some(blocks[1]));
            // next free
            heap.free(Some(blocks[0]));

            heap.free(Some(blocks[3]));
            // prev free
            heap.free(Some(blocks[4]));

            heap.free(Some(blocks[6]));
            // both free
            heap.free(Some(blocks[5]));

            let mut free: std::vec::Vec<_> =
                heap.free_blocks().map(|(_, ptr, size)| (ptr, size)).collect();
            free.sort();

            let mut expected = std::vec![
                (blocks[0], sizes[0] + sizes[1]),
                (blocks[3], sizes[3] + sizes[4] + sizes[5] + sizes[6]),
            ];

            // the remainder of the last extension, if any, is after the guard
            free.retain(|&(ptr, _)| ptr < guard);
            expected.sort();
            assert_eq!(free, expected);
        }

        for_many_configurations!(coalesce_all_four_cases_inner);
    }

    #[test]
    fn extension_coalesces_with_free_tail() {
        fn extension_coalesces_with_free_tail_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(24).unwrap();
            let b = heap.allocate(24).unwrap();
            heap.free(Some(b));

            let tail = heap.free_blocks().map(|(_, _, size)| size).sum::<usize>();
            assert!(tail > 0);

            // too big for the free tail, so the arena grows under it
            let c = heap.allocate(tail + 64).unwrap();
            assert_eq!(c, b);
            assert_ne!(c, a);
        }

        for_many_configurations!(extension_coalesces_with_free_tail_inner);
    }

    #[test]
    fn best_fit_within_a_bin() {
        // extend by exactly what's needed so blocks sit back to back
        let config = Config::new().with_min_extension(0).with_extension_granularity(0);
        let mut heap: Heap<VecArena> = Heap::with_config(VecArena::default(), config);
        heap.init().unwrap();

        // three block sizes in bin 1, separated by guards
        let small = heap.allocate(MIN_BLOCK_SIZE * 2 + ALIGN - OVERHEAD).unwrap();
        let _g0 = heap.allocate(1).unwrap();
        let mid = heap.allocate(MIN_BLOCK_SIZE * 3 - OVERHEAD).unwrap();
        let _g1 = heap.allocate(1).unwrap();
        let big = heap.allocate(MIN_BLOCK_SIZE * 3 + ALIGN - OVERHEAD).unwrap();
        let _g2 = heap.allocate(1).unwrap();

        heap.free(Some(small));
        heap.free(Some(mid));
        heap.free(Some(big));

        let bins: std::vec::Vec<_> = heap.free_blocks().map(|(bin, _, _)| bin).collect();
        assert_eq!(bins, [1, 1, 1]);

        // `big` heads the list, but `small` fits best
        assert_eq!(heap.allocate(MIN_BLOCK_SIZE * 2 - OVERHEAD), Some(small));

        // with a search limit of one, the head of the list is taken
        let mut heap: Heap<VecArena> =
            Heap::with_config(VecArena::default(), config.with_search_limit(1));
        heap.init().unwrap();

        let small = heap.allocate(MIN_BLOCK_SIZE * 2 + ALIGN - OVERHEAD).unwrap();
        let _g0 = heap.allocate(1).unwrap();
        let big = heap.allocate(MIN_BLOCK_SIZE * 3 + ALIGN - OVERHEAD).unwrap();
        let _g1 = heap.allocate(1).unwrap();

        heap.free(Some(small));
        heap.free(Some(big));

        assert_eq!(heap.allocate(MIN_BLOCK_SIZE * 2 - OVERHEAD), Some(big));
    }

    #[test]
    fn resize_shrink_is_pointer_stable() {
        fn resize_shrink_is_pointer_stable_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(500).unwrap();
            let _b = heap.allocate(10).unwrap();
            heap.payload_mut(a)[..50].copy_from_slice(&[7; 50]);

            let a2 = heap.resize(Some(a), 50).unwrap();
            assert_eq!(a2, a);
            assert_eq!(&heap.payload(a)[..50], &[7; 50]);

            // the surplus went back to the free lists
            assert!(heap.usable_size(a) < 500);
            assert!(heap.free_blocks().any(|(_, ptr, _)| ptr.offset() > a.offset()));

            let a3 = heap.resize(Some(a), heap.usable_size(a)).unwrap();
            assert_eq!(a3, a);
        }

        for_many_configurations!(resize_shrink_is_pointer_stable_inner);
    }

    #[test]
    fn resize_grows_at_tail_without_moving() {
        fn resize_grows_at_tail_without_moving_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let _a = heap.allocate(64).unwrap();
            let p = heap.allocate(8).unwrap();
            heap.payload_mut(p)[..8].copy_from_slice(b"segalloc");

            let mut size = 8;
            for _ in 0..200 {
                size += 37;
                assert_eq!(heap.resize(Some(p), size), Some(p));
                assert!(heap.usable_size(p) >= size);
            }

            assert_eq!(&heap.payload(p)[..8], b"segalloc");
        }

        for_many_configurations!(resize_grows_at_tail_without_moving_inner);
    }

    #[test]
    fn resize_absorbs_next_free_block() {
        fn resize_absorbs_next_free_block_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(32).unwrap();
            let b = heap.allocate(256).unwrap();
            let _c = heap.allocate(32).unwrap();
            heap.free(Some(b));

            let len = heap.arena().bytes().len();
            assert_eq!(heap.resize(Some(a), 200), Some(a));
            assert_eq!(heap.arena().bytes().len(), len);
        }

        for_many_configurations!(resize_absorbs_next_free_block_inner);
    }

    #[test]
    fn resize_moves_and_copies() {
        fn resize_moves_and_copies_inner<B: Binning>() {
            let mut heap = new_heap::<B>();

            let a = heap.allocate(40).unwrap();
            let _b = heap.allocate(40).unwrap();
            let capacity = heap.usable_size(a);

            for (i, byte) in heap.payload_mut(a).iter_mut().enumerate() {
                *byte = i as u8;
            }

            let moved = heap.resize(Some(a), 1000).unwrap();
            assert_ne!(moved, a);
            assert!(heap.payload(moved)[..capacity].iter().enumerate().all(|(i, &b)| b == i as u8));

            // the old block was freed
            assert!(heap.free_blocks().any(|(_, ptr, _)| ptr == a));
        }

        for_many_configurations!(resize_moves_and_copies_inner);
    }

    #[test]
    fn out_of_memory_leaves_heap_intact() {
        fn out_of_memory_leaves_heap_intact_inner<B: Binning>() {
            let mut heap: Heap<VecArena, B> = Heap::new(VecArena::with_limit(4096));
            heap.init().unwrap();

            let a = heap.allocate(100).unwrap();
            let _b = heap.allocate(100).unwrap();
            heap.payload_mut(a)[..100].fill(0xAA);

            let len = heap.arena().bytes().len();
            assert_eq!(heap.allocate(5000), None);
            assert_eq!(heap.allocate(usize::MAX - 4), None);
            assert_eq!(heap.arena().bytes().len(), len);

            assert_eq!(heap.resize(Some(a), 5000), None);
            assert_eq!(heap.resize(Some(a), usize::MAX), None);
            assert!(heap.payload(a)[..100].iter().all(|&b| b == 0xAA));
            assert!(heap.is_consistent());

            heap.free(Some(a));
            assert!(heap.is_consistent());
        }

        for_many_configurations!(out_of_memory_leaves_heap_intact_inner);
    }

    #[derive(Debug, Clone)]
    enum Action {
        Allocate(usize),
        Free(usize),
        Resize(usize, usize),
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (1usize..2000).prop_map(Action::Allocate),
            any::<usize>().prop_map(Action::Free),
            (any::<usize>(), 0usize..3000).prop_map(|(i, s)| Action::Resize(i, s)),
        ]
    }

    fn fill(heap: &mut Heap<VecArena>, ptr: BlockPtr, size: usize, seed: u8) {
        for (i, byte) in heap.payload_mut(ptr)[..size].iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
    }

    fn verify(heap: &Heap<VecArena>, ptr: BlockPtr, size: usize, seed: u8) {
        for (i, &byte) in heap.payload(ptr)[..size].iter().enumerate() {
            assert_eq!(byte, seed.wrapping_add(i as u8), "{ptr} corrupted at {i}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn random_actions_keep_invariants(actions in proptest::collection::vec(action(), 1..300)) {
            init_logging();

            let mut heap: Heap<VecArena> = Heap::new(VecArena::with_limit(1 << 20));
            heap.init().unwrap();

            let mut live: std::vec::Vec<(BlockPtr, usize, u8)> = std::vec::Vec::new();

            for (seed, action) in actions.into_iter().enumerate() {
                let seed = seed as u8;

                match action {
                    Action::Allocate(size) => {
                        if let Some(ptr) = heap.allocate(size) {
                            prop_assert!(heap.usable_size(ptr) >= size);
                            fill(&mut heap, ptr, size, seed);
                            live.push((ptr, size, seed));
                        }
                    }
                    Action::Free(i) => {
                        if !live.is_empty() {
                            let (ptr, size, seed) = live.swap_remove(i % live.len());
                            verify(&heap, ptr, size, seed);
                            heap.free(Some(ptr));
                        }
                    }
                    Action::Resize(i, new_size) => {
                        if !live.is_empty() {
                            let i = i % live.len();
                            let (ptr, size, seed) = live[i];
                            let capacity = heap.usable_size(ptr);
                            verify(&heap, ptr, size, seed);

                            match heap.resize(Some(ptr), new_size) {
                                Some(new_ptr) => {
                                    verify(&heap, new_ptr, size.min(new_size), seed);
                                    if new_size <= capacity {
                                        prop_assert_eq!(new_ptr, ptr);
                                    }
                                    fill(&mut heap, new_ptr, new_size, seed);
                                    live[i] = (new_ptr, new_size, seed);
                                }
                                None if new_size == 0 => {
                                    live.swap_remove(i);
                                }
                                None => verify(&heap, ptr, size, seed),
                            }
                        }
                    }
                }

                prop_assert_eq!(heap.check(), Ok(()));
            }

            for (ptr, size, seed) in live {
                verify(&heap, ptr, size, seed);
                heap.free(Some(ptr));
            }

            prop_assert!(heap.free_blocks().count() <= 1);
        }
    }
}
