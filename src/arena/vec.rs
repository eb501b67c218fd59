use alloc::vec::Vec;

use super::Arena;

/// An [`Arena`] backed by a [`Vec`], limited to a fixed number of bytes.
///
/// Extending past the limit fails, which is how out-of-memory is simulated
/// in a heap of known maximum size.
#[derive(Debug, Clone)]
pub struct VecArena {
    bytes: Vec<u8>,
    limit: usize,
}

impl VecArena {
    /// The limit used by [`VecArena::default`], 20 MiB.
    pub const DEFAULT_LIMIT: usize = 20 << 20;

    /// Create an empty arena that will grow to at most `limit` bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self { bytes: Vec::new(), limit }
    }

    /// The maximum length of this arena.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for VecArena {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

impl Arena for VecArena {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn extend(&mut self, increment: usize) -> Option<usize> {
        let old_len = self.bytes.len();
        let new_len = old_len.checked_add(increment).filter(|&len| len <= self.limit);

        let Some(new_len) = new_len else {
            log::debug!(
                "vec arena of {} bytes can't grow by {}, limit is {}",
                old_len,
                increment,
                self.limit
            );
            return None;
        };

        self.bytes.try_reserve(increment).ok()?;
        self.bytes.resize(new_len, 0);
        Some(old_len)
    }

    fn reset(&mut self) {
        self.bytes.clear();
    }
}
