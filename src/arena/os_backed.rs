use core::ptr::NonNull;

use crate::ptr_utils;

use super::{Arena, StableArena};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// A [`StableArena`] in a reserved range of virtual memory.
///
/// The whole range is reserved up front with no access rights. Extending the
/// arena commits whole pages as it goes. Everything is unmapped on drop.
#[derive(Debug)]
pub struct MmapArena {
    base: NonNull<u8>,
    reserved: usize,
    committed: usize,
    len: usize,
    page_size: usize,
}

// SAFETY: the mapping is owned exclusively by this struct
unsafe impl Send for MmapArena {}

impl MmapArena {
    /// Reserve at least `capacity` bytes of address space.
    ///
    /// Returns `None` if the reservation fails.
    pub fn reserve(capacity: usize) -> Option<Self> {
        let page_size = page_size();
        let reserved = capacity.max(1).checked_add(page_size - 1)? & !(page_size - 1);

        // SAFETY: an anonymous private mapping doesn't alias anything
        let base = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                reserved,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            log::debug!("failed to reserve {} bytes", reserved);
            return None;
        }

        log::debug!("reserved {} bytes at {:p}", reserved, base);

        Some(Self {
            base: NonNull::new(base.cast())?,
            reserved,
            committed: 0,
            len: 0,
            page_size,
        })
    }

    /// The number of bytes of address space held by this arena.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// The number of bytes that are currently backed by readable and writable pages.
    pub fn committed(&self) -> usize {
        self.committed
    }

    fn commit_up_to(&mut self, len: usize) -> Option<()> {
        let target = ptr_utils::align_up_by(len, self.page_size - 1).min(self.reserved);

        // SAFETY: `committed..target` lies within the reservation
        let result = unsafe {
            libc::mprotect(
                self.base.as_ptr().add(self.committed).cast(),
                target - self.committed,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };

        if result != 0 {
            log::debug!("failed to commit {} bytes", target - self.committed);
            return None;
        }

        self.committed = target;
        Some(())
    }
}

impl Drop for MmapArena {
    fn drop(&mut self) {
        // SAFETY: `base..base + reserved` was mapped by `reserve`
        let result = unsafe { libc::munmap(self.base.as_ptr().cast(), self.reserved) };
        debug_assert_eq!(result, 0);
    }
}

impl Arena for MmapArena {
    fn bytes(&self) -> &[u8] {
        // SAFETY: `base..base + len` is committed and owned by `self`
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: `base..base + len` is committed and owned by `self`
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn extend(&mut self, increment: usize) -> Option<usize> {
        let old_len = self.len;
        let new_len = old_len.checked_add(increment).filter(|&len| len <= self.reserved)?;

        if new_len > self.committed {
            self.commit_up_to(new_len)?;
        }

        self.len = new_len;
        Some(old_len)
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}

// SAFETY: the mapping is never moved or unmapped before drop, and is page-aligned
unsafe impl StableArena for MmapArena {
    fn base_ptr(&self) -> NonNull<u8> {
        self.base
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    match usize::try_from(size) {
        Ok(size) if size.is_power_of_two() => size,
        _ => FALLBACK_PAGE_SIZE,
    }
}
