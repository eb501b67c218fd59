//! [`HeapCell`] allows using a [`Heap`] as a Rust allocator
//! within a single thread.
//!
//! See [`HeapCell`].

use core::{alloc::Layout, cell::RefCell, ptr::NonNull};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::arena::StableArena;
use crate::base::{binning::Binning, ArenaExhausted, BlockPtr, Heap, Violation, ALIGN};
use crate::ptr_utils::nonnull_slice_from_raw_parts;
use crate::DefaultBinning;

use alloc::vec::Vec;

/// [`HeapCell`] implements [`Allocator`] over a [`Heap`] without locking,
/// but is [`!Sync`](Sync).
///
/// Allocations with an alignment above [`ALIGN`] are refused.
///
/// # Example
/// ```rust
/// # #![cfg_attr(feature = "nightly", feature(allocator_api))]
/// use allocator_api2::vec::Vec;
/// use segalloc::{HeapCell, SliceArena};
///
/// let mut memory = [0u8; 4096];
/// let heap: HeapCell<SliceArena> = HeapCell::with_arena(SliceArena::new(&mut memory)).unwrap();
///
/// let mut my_vec = Vec::<u32, _>::with_capacity_in(42, &heap);
/// my_vec.push(123);
/// ```
#[derive(Debug)]
pub struct HeapCell<A: StableArena, B: Binning = DefaultBinning> {
    heap: RefCell<Heap<A, B>>,
}

impl<A: StableArena, B: Binning> HeapCell<A, B> {
    /// Wrap `heap`, which should be initialized for allocations to succeed.
    #[inline]
    pub const fn new(heap: Heap<A, B>) -> Self {
        Self { heap: RefCell::new(heap) }
    }

    /// Create and initialize a heap over `arena`.
    pub fn with_arena(arena: A) -> Result<Self, ArenaExhausted> {
        let mut heap = Heap::new(arena);
        heap.init()?;
        Ok(Self::new(heap))
    }

    /// Returns a mutable reference to the inner [`Heap`].
    #[inline]
    pub fn get_mut(&mut self) -> &mut Heap<A, B> {
        self.heap.get_mut()
    }

    /// Consumes the [`HeapCell`], returning the inner [`Heap`].
    #[inline]
    pub fn into_inner(self) -> Heap<A, B> {
        self.heap.into_inner()
    }

    /// See [`Heap::check`].
    pub fn check(&self) -> Result<(), Vec<Violation>> {
        self.heap.borrow().check()
    }

    /// Obtain a clone of the inner allocation statistics.
    #[cfg(feature = "counters")]
    pub fn counters(&self) -> crate::base::Counters {
        *self.heap.borrow().counters()
    }

    fn to_slice(heap: &Heap<A, B>, ptr: BlockPtr) -> NonNull<[u8]> {
        // SAFETY: live blocks are within the arena, which `base_ptr` is valid for
        let addr = unsafe { heap.arena().base_ptr().as_ptr().add(ptr.offset()) };
        // SAFETY: `base_ptr` is non-null and the offset doesn't wrap
        let addr = unsafe { NonNull::new_unchecked(addr) };
        nonnull_slice_from_raw_parts(addr, heap.usable_size(ptr))
    }

    fn to_block(heap: &Heap<A, B>, ptr: NonNull<u8>) -> Option<BlockPtr> {
        let base = heap.arena().base_ptr().as_ptr() as usize;
        BlockPtr::new((ptr.as_ptr() as usize).wrapping_sub(base))
    }
}

#[inline]
fn dangling(layout: Layout) -> NonNull<[u8]> {
    // SAFETY: alignments are never zero
    let addr = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
    nonnull_slice_from_raw_parts(addr, 0)
}

unsafe impl<A: StableArena, B: Binning> Allocator for HeapCell<A, B> {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        if layout.align() > ALIGN {
            return Err(AllocError);
        }

        let mut heap = self.heap.borrow_mut();
        let ptr = heap.allocate(layout.size()).ok_or(AllocError)?;
        Ok(Self::to_slice(&heap, ptr))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let mut heap = self.heap.borrow_mut();
            let block = Self::to_block(&heap, ptr);
            heap.free(block);
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }

        if new_layout.align() > ALIGN {
            return Err(AllocError);
        }

        let mut heap = self.heap.borrow_mut();
        let block = Self::to_block(&heap, ptr);
        let new_block = heap.resize(block, new_layout.size()).ok_or(AllocError)?;
        Ok(Self::to_slice(&heap, new_block))
    }

    unsafe fn grow_zeroed(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        let new_slice = self.grow(ptr, old_layout, new_layout)?;

        // SAFETY: the returned slice is valid for writes, and at least `old_layout.size()` long
        unsafe {
            let tail = new_slice.as_ptr().cast::<u8>().add(old_layout.size());
            tail.write_bytes(0, new_slice.len() - old_layout.size());
        }

        Ok(new_slice)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<[u8]>, AllocError> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            // SAFETY: guaranteed by caller
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(dangling(new_layout));
        }

        if new_layout.align() > ALIGN {
            return Err(AllocError);
        }

        let mut heap = self.heap.borrow_mut();
        let block = Self::to_block(&heap, ptr);
        let new_block = heap.resize(block, new_layout.size()).ok_or(AllocError)?;
        Ok(Self::to_slice(&heap, new_block))
    }
}
