//! Pluggable suballocation strategy for one arena range
//!
//! An arena owns exactly one suballocator scoped to `[0, size)` in
//! arena-local offsets. The strategy is fixed behind this narrow trait;
//! the shipped implementation is a first-fit free list with coalescing.

use rustc_hash::FxHashMap;

/// Suballocation strategy over a contiguous `[0, size)` range.
///
/// Offsets are arena-local; the arena layer translates them to the
/// device's global address space.
pub trait SubAllocator {
    /// Carve an aligned block, returning its local offset, or None when
    /// the range cannot satisfy the request
    fn allocate(&mut self, align: u64, size: u64) -> Option<u64>;

    /// Release the block at `offset`, returning its size.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not the start of an outstanding block
    /// (freeing a never-allocated address is a caller bug).
    fn free(&mut self, offset: u64) -> u64;

    /// Total bytes currently allocated (padding excluded)
    fn bytes_in_use(&self) -> u64;
}

/// One contiguous free range, tracked by local offset
#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    offset: u64,
    size: u64,
}

/// First-fit free-list suballocator with neighbor coalescing.
///
/// Free blocks are kept sorted by offset; allocation scans for the first
/// block whose aligned interior fits the request and splits off the
/// unused front and back. Alignment padding is returned to the free
/// list immediately, so `bytes_in_use` counts requested bytes exactly.
pub struct FreeListAllocator {
    size: u64,
    /// Free ranges, sorted by offset, never adjacent
    free: Vec<FreeBlock>,
    /// Outstanding blocks: offset -> size
    allocated: FxHashMap<u64, u64>,
    in_use: u64,
}

impl FreeListAllocator {
    /// Create a suballocator over `[0, size)`
    pub fn new(size: u64) -> Self {
        assert!(size > 0, "suballocator over an empty range");
        Self {
            size,
            free: vec![FreeBlock { offset: 0, size }],
            allocated: FxHashMap::default(),
            in_use: 0,
        }
    }

    /// Size of the managed range
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl SubAllocator for FreeListAllocator {
    fn allocate(&mut self, align: u64, size: u64) -> Option<u64> {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(size > 0, "zero-sized allocation");

        for i in 0..self.free.len() {
            let block = self.free[i];
            let aligned = block.offset.next_multiple_of(align);
            let Some(end) = aligned.checked_add(size) else {
                continue;
            };
            if end > block.offset + block.size {
                continue;
            }

            // Split off the unused front and back of the block
            self.free.remove(i);
            let mut insert_at = i;
            if aligned > block.offset {
                self.free.insert(
                    insert_at,
                    FreeBlock {
                        offset: block.offset,
                        size: aligned - block.offset,
                    },
                );
                insert_at += 1;
            }
            let block_end = block.offset + block.size;
            if end < block_end {
                self.free.insert(
                    insert_at,
                    FreeBlock {
                        offset: end,
                        size: block_end - end,
                    },
                );
            }

            self.allocated.insert(aligned, size);
            self.in_use += size;
            return Some(aligned);
        }
        None
    }

    fn free(&mut self, offset: u64) -> u64 {
        let size = self
            .allocated
            .remove(&offset)
            .unwrap_or_else(|| panic!("freeing offset {} which was never allocated", offset));
        self.in_use -= size;

        // Insert in offset order, then coalesce with both neighbors
        let at = self
            .free
            .partition_point(|b| b.offset < offset);
        self.free.insert(at, FreeBlock { offset, size });

        if at + 1 < self.free.len()
            && self.free[at].offset + self.free[at].size == self.free[at + 1].offset
        {
            self.free[at].size += self.free[at + 1].size;
            self.free.remove(at + 1);
        }
        if at > 0 && self.free[at - 1].offset + self.free[at - 1].size == self.free[at].offset {
            self.free[at - 1].size += self.free[at].size;
            self.free.remove(at);
        }
        size
    }

    fn bytes_in_use(&self) -> u64 {
        self.in_use
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "suballocator_tests.rs"]
mod tests;
