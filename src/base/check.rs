//! The consistency checker.
//!
//! [`Heap::check`] walks the arena block by block, then walks every free list,
//! and reports each broken invariant it comes across.

use alloc::vec::Vec;

use crate::ptr_utils::is_aligned_to;

use super::{
    footer_of, free_list, header_of, Arena, Binning, Heap, Tag, ALIGN, INITIAL_ARENA_SIZE,
    MIN_BLOCK_SIZE, PROLOGUE, PROLOGUE_SIZE, TAG_SIZE,
};

/// A broken heap invariant, found by [`Heap::check`].
///
/// Offsets are of block payloads unless stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Violation {
    /// [`Heap::init`] hasn't succeeded.
    Uninitialized,
    /// The prologue or epilogue at this offset is damaged.
    BadSentinel { offset: usize },
    /// A block's offset or size isn't a multiple of [`ALIGN`], or the size is too small.
    Misaligned { block: usize, size: usize },
    /// A block runs past the end of the arena.
    OutOfBounds { block: usize, size: usize },
    /// A block's header and footer disagree.
    TagMismatch { block: usize, header: usize, footer: usize },
    /// Two neighbouring blocks are both free.
    AdjacentFree { block: usize, next: usize },
    /// The blocks and sentinels don't add up to the arena's length.
    CoverageMismatch { covered: usize, arena: usize },
    /// A free block is in no free list.
    FreeNotListed { block: usize },
    /// A free list holds a block that isn't free.
    ListedNotFree { block: usize, bin: usize },
    /// A block is in the free lists more than once.
    ListedTwice { block: usize },
    /// A block is in a different free list than its size maps to.
    WrongBin { block: usize, bin: usize, expected: usize },
    /// A free list link points outside the heap, or its back link is wrong.
    BadLink { block: usize, bin: usize },
    /// A free list doesn't terminate.
    ListCycle { bin: usize },
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Violation::Uninitialized => write!(f, "heap is not initialized"),
            Violation::BadSentinel { offset } => write!(f, "damaged sentinel at {:#x}", offset),
            Violation::Misaligned { block, size } => {
                write!(f, "block {:#x} of size {} is misaligned", block, size)
            }
            Violation::OutOfBounds { block, size } => {
                write!(f, "block {:#x} of size {} exceeds the arena", block, size)
            }
            Violation::TagMismatch { block, header, footer } => write!(
                f,
                "block {:#x} has header {:#x} but footer {:#x}",
                block, header, footer
            ),
            Violation::AdjacentFree { block, next } => {
                write!(f, "free blocks {:#x} and {:#x} are adjacent", block, next)
            }
            Violation::CoverageMismatch { covered, arena } => {
                write!(f, "blocks cover {} bytes of a {} byte arena", covered, arena)
            }
            Violation::FreeNotListed { block } => {
                write!(f, "free block {:#x} is not in any free list", block)
            }
            Violation::ListedNotFree { block, bin } => {
                write!(f, "block {:#x} in bin {} is not free", block, bin)
            }
            Violation::ListedTwice { block } => {
                write!(f, "block {:#x} is in the free lists more than once", block)
            }
            Violation::WrongBin { block, bin, expected } => {
                write!(f, "block {:#x} is in bin {} instead of bin {}", block, bin, expected)
            }
            Violation::BadLink { block, bin } => {
                write!(f, "bad free list link at {:#x} in bin {}", block, bin)
            }
            Violation::ListCycle { bin } => write!(f, "free list of bin {} does not end", bin),
        }
    }
}

impl<A: Arena, B: Binning> Heap<A, B> {
    /// Walk the heap and the free lists, verifying every invariant.
    ///
    /// This is a diagnostic, and takes time linear in the size of the arena.
    pub fn check(&self) -> Result<(), Vec<Violation>> {
        if !self.is_initialized {
            return Err(alloc::vec![Violation::Uninitialized]);
        }

        let bytes = self.arena.bytes();
        let arena_end = self.arena.bounds().end;
        let mut violations = Vec::new();

        if arena_end < INITIAL_ARENA_SIZE {
            return Err(alloc::vec![Violation::CoverageMismatch {
                covered: INITIAL_ARENA_SIZE,
                arena: arena_end
            }]);
        }

        let prologue = Tag::new(PROLOGUE_SIZE, true);
        if Tag::read(bytes, header_of(PROLOGUE)) != prologue
            || Tag::read(bytes, footer_of(PROLOGUE, PROLOGUE_SIZE)) != prologue
        {
            violations.push(Violation::BadSentinel { offset: PROLOGUE });
        }

        // free blocks in address order
        let mut free_blocks = Vec::new();

        let mut block = PROLOGUE + PROLOGUE_SIZE;
        let mut prev_free = false;

        loop {
            if header_of(block) + TAG_SIZE > arena_end {
                violations.push(Violation::OutOfBounds { block, size: 0 });
                break;
            }

            let header = Tag::read(bytes, header_of(block));
            let size = header.size();

            if size == 0 {
                if header != Tag::EPILOGUE {
                    violations.push(Violation::BadSentinel { offset: block });
                }
                if block != arena_end {
                    violations.push(Violation::CoverageMismatch {
                        covered: block,
                        arena: arena_end,
                    });
                }
                break;
            }

            let is_aligned = is_aligned_to(block, ALIGN) && is_aligned_to(size, ALIGN);
            if !is_aligned || size < MIN_BLOCK_SIZE {
                violations.push(Violation::Misaligned { block, size });
                break;
            }

            if block.checked_add(size).map_or(true, |end| end > arena_end) {
                violations.push(Violation::OutOfBounds { block, size });
                break;
            }

            let footer = Tag::read(bytes, footer_of(block, size));
            if footer != header {
                violations.push(Violation::TagMismatch {
                    block,
                    header: header.0,
                    footer: footer.0,
                });
            }

            let is_free = !header.is_allocated();
            if is_free {
                if prev_free {
                    let prev = free_blocks.last().copied().unwrap_or(block);
                    violations.push(Violation::AdjacentFree { block: prev, next: block });
                }
                free_blocks.push(block);
            }

            prev_free = is_free;
            block += size;
        }

        let mut listed = Vec::new();
        let max_steps = arena_end / MIN_BLOCK_SIZE + 1;

        for (bin, &head) in self.bins.iter().enumerate() {
            let mut prev = free_list::NIL;
            let mut current = head;
            let mut steps = 0;

            while current != free_list::NIL {
                steps += 1;
                if steps > max_steps {
                    violations.push(Violation::ListCycle { bin });
                    break;
                }

                let in_heap = is_aligned_to(current, ALIGN)
                    && current >= PROLOGUE + PROLOGUE_SIZE
                    && current.checked_add(ALIGN).map_or(false, |end| end <= arena_end);

                if !in_heap || free_list::prev_of(bytes, current) != prev {
                    violations.push(Violation::BadLink { block: current, bin });
                    break;
                }

                if free_blocks.binary_search(&current).is_err() {
                    violations.push(Violation::ListedNotFree { block: current, bin });
                } else {
                    let expected = B::size_to_bin(Tag::read(bytes, header_of(current)).size());
                    if expected != bin {
                        violations.push(Violation::WrongBin { block: current, bin, expected });
                    }
                }

                listed.push(current);
                prev = current;
                current = free_list::next_of(bytes, current);
            }
        }

        listed.sort_unstable();
        for pair in listed.windows(2) {
            if pair[0] == pair[1] {
                violations.push(Violation::ListedTwice { block: pair[0] });
            }
        }

        for &block in &free_blocks {
            if listed.binary_search(&block).is_err() {
                violations.push(Violation::FreeNotListed { block });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Returns whether [`Heap::check`] finds nothing wrong.
    pub fn is_consistent(&self) -> bool {
        self.check().is_ok()
    }

    #[cfg(not(any(test, feature = "error-scanning")))]
    #[inline]
    pub(super) fn scan_for_errors(&self) {}

    /// Panics on the first broken invariant.
    #[cfg(any(test, feature = "error-scanning"))]
    pub(super) fn scan_for_errors(&self) {
        if let Err(violations) = self.check() {
            panic!("heap is inconsistent: {}", violations[0]);
        }
    }
}
