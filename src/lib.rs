//! A segregated-fit, boundary-tag allocator over a single growable arena.
//!
//! A [`Heap`] carves variable-sized blocks out of an [`Arena`], a byte range that
//! only grows at its end. Blocks are identified by their offset into the arena,
//! so the heap never needs raw pointers to do its job. Free blocks are kept in
//! size-class free lists and merged with their free neighbours as soon as they're freed.
//!
//! - [`Heap`] is the allocator itself: `init`, `allocate`, `free`, `resize`, `check`.
//! - [`VecArena`], [`SliceArena`], and `MmapArena` (with the `system-backed`
//!     feature) are ready-made arenas.
//! - [`HeapCell`] implements [`Allocator`](allocator_api2::alloc::Allocator)
//!     over any [`StableArena`].
//!
//! # Example
//!
//! ```rust
//! use segalloc::{Heap, VecArena};
//!
//! let mut heap: Heap<VecArena> = Heap::new(VecArena::default());
//! heap.init().unwrap();
//!
//! let a = heap.allocate(100).unwrap();
//! heap.payload_mut(a)[..5].copy_from_slice(b"hello");
//!
//! let a = heap.resize(Some(a), 400).unwrap();
//! assert_eq!(&heap.payload(a)[..5], b"hello");
//!
//! heap.free(Some(a));
//! assert!(heap.is_consistent());
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "nightly", feature(allocator_api))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
#[macro_use]
mod test_utils;
pub(crate) mod ptr_utils;

pub mod arena;
pub mod base;
pub mod cell;

pub use arena::{Arena, SliceArena, StableArena, VecArena};
pub use base::binning::{Binning, DefaultBinning, LinearThenExponentialBinning};
pub use base::config::Config;
pub use base::{ArenaExhausted, BlockPtr, Heap, Violation};
pub use cell::HeapCell;

#[cfg(all(unix, feature = "system-backed"))]
pub use arena::MmapArena;

#[cfg(feature = "counters")]
pub use base::Counters;
