//! Track allocation statistics for [`Heap`](super::Heap).

use super::{Arena, Binning, Heap};

/// Allocation statistics of a [`Heap`](super::Heap).
///
/// Byte counts are whole block sizes, boundary tags included.
///
/// # Example
///
/// ```
/// # use segalloc::{Heap, VecArena};
/// let mut heap: Heap<VecArena> = Heap::new(VecArena::default());
/// heap.init().unwrap();
/// heap.allocate(100);
///
/// let counters = heap.counters();
/// assert_eq!(counters.allocation_count, 1);
/// eprintln!("{}", counters);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Number of live allocations.
    pub allocation_count: usize,
    /// Total number of allocations.
    pub total_allocation_count: u64,

    /// Sum of the sizes of live allocated blocks.
    pub allocated_bytes: usize,
    /// Sum of the sizes of all allocated blocks.
    ///
    /// Bytes kept by an in-place resize are not recounted.
    pub total_allocated_bytes: u64,

    /// Sum of the sizes of free blocks.
    pub available_bytes: usize,
    /// Number of free blocks.
    pub fragment_count: usize,

    /// Length of the arena.
    pub arena_bytes: usize,
}

impl Counters {
    #[inline]
    pub(crate) const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_allocation_count: 0,
            allocated_bytes: 0,
            total_allocated_bytes: 0,
            available_bytes: 0,
            fragment_count: 0,
            arena_bytes: 0,
        }
    }

    /// Returns the number of arena bytes in neither allocated nor free blocks.
    ///
    /// This is the padding and sentinels at either end of the arena.
    #[inline]
    pub const fn overhead_bytes(&self) -> usize {
        self.arena_bytes - self.available_bytes - self.allocated_bytes
    }

    /// Returns the total number of allocated bytes that have been freed.
    #[inline]
    pub const fn total_freed_bytes(&self) -> u64 {
        self.total_allocated_bytes - self.allocated_bytes as u64
    }

    #[inline]
    pub(crate) fn account_link(&mut self, size: usize) {
        self.available_bytes += size;
        self.fragment_count += 1;
    }

    #[inline]
    pub(crate) fn account_unlink(&mut self, size: usize) {
        self.available_bytes -= size;
        self.fragment_count -= 1;
    }

    #[inline]
    pub(crate) fn account_alloc(&mut self, size: usize) {
        self.allocation_count += 1;
        self.allocated_bytes += size;

        self.total_allocation_count += 1;
        self.total_allocated_bytes += size as u64;
    }

    #[inline]
    pub(crate) fn account_free(&mut self, size: usize) {
        self.allocation_count -= 1;
        self.allocated_bytes -= size;
    }

    #[inline]
    pub(crate) fn account_resize_in_place(&mut self, old_size: usize, new_size: usize) {
        if new_size >= old_size {
            self.allocated_bytes += new_size - old_size;
            self.total_allocated_bytes += (new_size - old_size) as u64;
        } else {
            self.allocated_bytes -= old_size - new_size;
            self.total_allocated_bytes -= (old_size - new_size) as u64;
        }
    }

    #[inline]
    pub(crate) fn account_extend(&mut self, increment: usize) {
        self.arena_bytes += increment;
    }
}

impl core::fmt::Display for Counters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            r#"Stat                 | Current Total       | Accumulative Total
---------------------|---------------------|--------------------
# of Allocations     | {:>19} | {:>19}
# of Allocated Bytes | {:>19} | {:>19}
# of Available Bytes | {:>19} |                 N/A
# of Overhead Bytes  | {:>19} |                 N/A
# of Arena Bytes     | {:>19} |                 N/A
# of Fragments       | {:>19} |                 N/A"#,
            self.allocation_count,
            self.total_allocation_count,
            self.allocated_bytes,
            self.total_allocated_bytes,
            self.available_bytes,
            self.overhead_bytes(),
            self.arena_bytes,
            self.fragment_count,
        )
    }
}

impl<A: Arena, B: Binning> Heap<A, B> {
    /// Obtain a reference to the allocation statistics.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
