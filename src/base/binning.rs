//! [`Heap`](super::Heap)'s segregated free lists are indexed by the
//! [`Binning`] implementation used.
//!
//! [`DefaultBinning`] files blocks by the binary logarithm of their size in
//! units of [`MIN_BLOCK_SIZE`], which keeps every bin within a factor of two.
//! [`LinearThenExponentialBinning`] spends a handful of bins on exact small
//! sizes first, which is friendlier to workloads dominated by tiny requests.

use super::{ALIGN, MIN_BLOCK_SIZE};

/// Implementors describe how block sizes map onto free lists.
///
/// # Requirements
/// - [`Binning::size_to_bin`] must return values below [`Binning::BIN_COUNT`].
/// - [`Binning::size_to_bin`] must be monotonically non-decreasing in `size`.
///     The fit search starts at the bin of the requested size and only ever
///     moves to higher bins, so a larger block in a lower bin would never be found.
/// - The mapping must be deterministic. A block is looked up in the bin
///     it was filed under by recomputing this function from its size.
pub trait Binning {
    /// The number of free lists [`Heap`](super::Heap) sets up.
    const BIN_COUNT: usize;

    /// Given the `size` of a free block, return which bin it belongs to.
    ///
    /// `size` is always a multiple of [`ALIGN`] and at least [`MIN_BLOCK_SIZE`]
    /// when filing blocks, but requested sizes are passed through here too.
    fn size_to_bin(size: usize) -> usize;
}

/// The default [`Binning`] implementation.
///
/// Bin `i` holds sizes in `MIN_BLOCK_SIZE << i .. MIN_BLOCK_SIZE << (i + 1)`,
/// with the last of its 30 bins holding everything larger.
#[derive(Debug, Clone, Copy)]
pub struct DefaultBinning;

impl Binning for DefaultBinning {
    const BIN_COUNT: usize = 30;

    #[inline]
    fn size_to_bin(size: usize) -> usize {
        exponential_binning::<30>(size)
    }
}

/// A [`Binning`] with a bin per [`ALIGN`] step for the smallest sizes,
/// then power-of-two bins.
#[derive(Debug, Clone, Copy)]
pub struct LinearThenExponentialBinning;

impl Binning for LinearThenExponentialBinning {
    const BIN_COUNT: usize = 32;

    #[inline]
    fn size_to_bin(size: usize) -> usize {
        linear_then_exponential_binning::<8, 32>(size)
    }
}

/// `floor(log2(size / MIN_BLOCK_SIZE))`, clamped to `0..BIN_COUNT`.
#[inline]
pub const fn exponential_binning<const BIN_COUNT: usize>(size: usize) -> usize {
    let units = size / MIN_BLOCK_SIZE;

    if units <= 1 {
        return 0;
    }

    let bin = units.ilog2() as usize;
    if bin < BIN_COUNT {
        bin
    } else {
        BIN_COUNT - 1
    }
}

/// `LIN_BINS` bins of one [`ALIGN`] step each starting at [`MIN_BLOCK_SIZE`],
/// followed by power-of-two bins, clamped to `0..BIN_COUNT`.
#[inline]
pub const fn linear_then_exponential_binning<const LIN_BINS: usize, const BIN_COUNT: usize>(
    size: usize,
) -> usize {
    let linear_limit = MIN_BLOCK_SIZE + LIN_BINS * ALIGN;

    let bin = if size < linear_limit {
        size.saturating_sub(MIN_BLOCK_SIZE) / ALIGN
    } else {
        LIN_BINS + (size / linear_limit).ilog2() as usize
    };

    if bin < BIN_COUNT {
        bin
    } else {
        BIN_COUNT - 1
    }
}
