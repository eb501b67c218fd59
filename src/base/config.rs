//! Tunables for [`Heap`](super::Heap).

use crate::ptr_utils::align_up_by;

use super::ALIGN;

/// Tunable parameters of the allocation policy.
///
/// Values are normalized when used: sizes round up to [`ALIGN`] and a
/// `search_limit` of zero behaves as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How many candidates are examined per free list before the best one
    /// found so far is taken.
    pub search_limit: usize,
    /// The smallest amount the arena is grown by when no free block fits.
    pub min_extension: usize,
    /// Arena extensions are rounded up to a multiple of this.
    pub extension_granularity: usize,
}

impl Config {
    /// Search 100 candidates per bin, grow by at least 128 bytes in 32 byte steps.
    pub const DEFAULT: Self =
        Self { search_limit: 100, min_extension: 128, extension_granularity: 32 };

    /// Same as [`Config::DEFAULT`].
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Replaces [`Config::search_limit`].
    pub const fn with_search_limit(mut self, search_limit: usize) -> Self {
        self.search_limit = search_limit;
        self
    }

    /// Replaces [`Config::min_extension`].
    pub const fn with_min_extension(mut self, min_extension: usize) -> Self {
        self.min_extension = min_extension;
        self
    }

    /// Replaces [`Config::extension_granularity`].
    pub const fn with_extension_granularity(mut self, extension_granularity: usize) -> Self {
        self.extension_granularity = extension_granularity;
        self
    }

    #[inline]
    pub(crate) fn search_limit(&self) -> usize {
        self.search_limit.max(1)
    }

    /// How far to grow the arena to make room for a block of `block_size`.
    ///
    /// Returns `None` on overflow.
    pub(crate) fn extension_size(&self, block_size: usize) -> Option<usize> {
        let granularity =
            align_up_by(self.extension_granularity.clamp(ALIGN, usize::MAX / 2), ALIGN - 1);
        let wanted = block_size.max(self.min_extension);

        let rounded = wanted.checked_add(granularity - 1)? / granularity * granularity;
        debug_assert!(rounded % ALIGN == 0);
        Some(rounded)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
