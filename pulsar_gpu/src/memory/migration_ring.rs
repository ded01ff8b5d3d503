//! Transient staging ring over an arena-backed range
//!
//! Short-lived data (vertex runs, texture upload staging, small uniform
//! updates) is bumped into a fixed ring of device-visible memory instead
//! of getting a real arena allocation. The device consumes the ring in
//! the order the issuer filled it, so one fence clock guards the whole
//! range: each freed region posts a guard timestamp, and an allocation
//! that would wrap into not-yet-consumed bytes blocks on the oldest
//! guard until the device's read position moves past the conflict.
//!
//! Cursors are virtual (monotonic byte counts); physical positions are
//! `cursor % size`. The live region is `[head, tail)` with
//! `tail - head <= size` as the occupancy invariant.

use std::collections::VecDeque;
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::fence::FenceClock;
use crate::memory::{Allocation, ArenaId, ArenaSet};

/// One staged range handed out by the ring.
///
/// `device_offset` is device-global (ring base + ring-local offset), so
/// consumers can reference the staged bytes from device commands
/// directly; `ptr` is the issuer's view for filling them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSlice {
    pub device_offset: u64,
    pub ptr: NonNull<u8>,
    pub size: u64,
}

/// An outstanding (not yet freed) ring range
#[derive(Debug, Clone, Copy)]
struct RingSpan {
    offset: u64,
    size: u64,
    /// Virtual tail position right after this span (pads included)
    end_v: u64,
}

/// Bump allocator with wraparound over one arena allocation, guarded by
/// a dedicated fence clock.
pub struct MigrationRing {
    arena: ArenaId,
    backing: Allocation,
    base: NonNull<u8>,
    device_base: u64,
    size: u64,
    /// Virtual cursor of the oldest unreclaimed byte
    head_v: u64,
    /// Virtual cursor where the next allocation starts
    tail_v: u64,
    /// Allocated spans awaiting `free`, oldest first
    live: VecDeque<RingSpan>,
    /// Freed spans whose guard fence has not been confirmed, oldest
    /// first: (guard timestamp, virtual position reclaimed once passed)
    pending: VecDeque<(u32, u64)>,
    clock: FenceClock,
}

impl MigrationRing {
    /// Carve a ring of `size` bytes out of `arena`, guarded by `clock`.
    ///
    /// `align` is the alignment of the ring base itself; per-allocation
    /// alignments are relative to it, so pass the largest alignment the
    /// staged data will ask for.
    pub fn new(
        arenas: &mut ArenaSet,
        arena: ArenaId,
        align: u64,
        size: u64,
        clock: FenceClock,
    ) -> Result<Self> {
        assert!(size > 0, "creating an empty ring");
        let backing = arenas.allocate(arena, align, size)?;
        Ok(Self::over(arenas, arena, backing, size, clock))
    }

    /// Wrap an already-carved backing allocation as a ring.
    ///
    /// Lets callers sequence the fallible steps (backing allocation,
    /// guard slot acquisition) themselves before committing either.
    pub fn over(
        arenas: &ArenaSet,
        arena: ArenaId,
        backing: Allocation,
        size: u64,
        clock: FenceClock,
    ) -> Self {
        assert!(!backing.is_none(), "ring over the sentinel allocation");
        assert!(size > 0, "creating an empty ring");
        let base = arenas.address_of(arena, backing);
        Self {
            arena,
            backing,
            base,
            device_base: backing.offset,
            size,
            head_v: 0,
            tail_v: 0,
            live: VecDeque::new(),
            pending: VecDeque::new(),
            clock,
        }
    }

    // ===== ALLOCATION =====

    /// Bump an aligned range off the tail, wrapping to the start when
    /// the end of the ring is crossed.
    ///
    /// Blocks (polling the guard fence) when the range would overlap
    /// bytes the device has not been confirmed done with.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the request can never fit - larger
    /// than the ring, or conflicting with live spans that have no guard
    /// fence pending. [`Error::Timeout`] propagates from a bounded
    /// guard wait.
    pub fn alloc(&mut self, align: u64, size: u64) -> Result<RingSlice> {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(size > 0, "zero-sized ring allocation");
        if size > self.size {
            return Err(Error::OutOfMemory);
        }

        // Reclaim whatever the device is already known to be done with
        self.reclaim_passed();

        let pos = self.tail_v % self.size;
        let mut advance = pos.next_multiple_of(align) - pos;
        if pos + advance + size > self.size {
            // Wrap: skip the bytes to the end; position 0 satisfies any
            // power-of-two alignment of the ring base
            advance = self.size - pos;
        }
        let start_v = self.tail_v + advance;
        let new_tail = start_v + size;

        // Block until the candidate range no longer overlaps the
        // unconsumed region
        while new_tail - self.head_v > self.size {
            self.reclaim_oldest_blocking()?;
        }

        self.tail_v = new_tail;
        let offset = start_v % self.size;
        self.live.push_back(RingSpan {
            offset,
            size,
            end_v: new_tail,
        });
        // SAFETY: offset + size <= self.size by construction above
        let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)) };
        Ok(RingSlice {
            device_offset: self.device_base + offset,
            ptr,
            size,
        })
    }

    /// Stage a `Pod` slice through the ring: allocate and copy in
    pub fn stage<T: Pod>(&mut self, data: &[T], align: u64) -> Result<RingSlice> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let slice = self.alloc(align, bytes.len() as u64)?;
        // SAFETY: the slice was just carved with exactly bytes.len() bytes
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), slice.ptr.as_ptr(), bytes.len());
        }
        Ok(slice)
    }

    // ===== RETIREMENT =====

    /// Mark `[device_offset, device_offset + size)` as done on the
    /// issuing side: posts the guard fence that advances the device's
    /// reported read position past the range once it executes.
    ///
    /// Space is not reclaimed synchronously; the next `alloc` that wraps
    /// into the range waits on the guard.
    ///
    /// # Panics
    ///
    /// Ring regions retire in allocation order; freeing anything but the
    /// oldest outstanding range is a caller bug.
    pub fn free(&mut self, device_offset: u64, size: u64) -> Result<()> {
        let span = self
            .live
            .pop_front()
            .expect("ring free with no outstanding allocations");
        let local = device_offset
            .checked_sub(self.device_base)
            .expect("freed offset below the ring base");
        assert!(
            span.offset == local && span.size == size,
            "ring regions retire in allocation order (expected {:#x}+{}, got {:#x}+{})",
            self.device_base + span.offset,
            span.size,
            device_offset,
            size
        );

        let grant = self.clock.create_timestamp(1)?;
        self.clock.post(grant.first);
        if grant.epoch_turned {
            // The turnover drained the device: every older guard has
            // passed, so their positions are reclaimable right now
            while let Some((_, end_v)) = self.pending.pop_front() {
                self.head_v = end_v;
            }
        }
        self.pending.push_back((grant.first, span.end_v));
        Ok(())
    }

    /// Checkpoint reset (start of frame): forget all spans and guards,
    /// rewind both cursors
    pub fn reset(&mut self) {
        self.head_v = 0;
        self.tail_v = 0;
        self.live.clear();
        self.pending.clear();
    }

    /// Release the ring's backing storage, handing the guard clock back
    pub fn destroy(self, arenas: &mut ArenaSet) -> FenceClock {
        arenas.free(self.arena, self.backing);
        self.clock
    }

    // ===== RECLAIM =====

    /// Pop every guard the device has already been confirmed past
    fn reclaim_passed(&mut self) {
        while let Some(&(timestamp, end_v)) = self.pending.front() {
            if !self.clock.passed(timestamp) {
                break;
            }
            self.head_v = end_v;
            self.pending.pop_front();
        }
    }

    /// Block on the oldest guard fence, then reclaim its span
    fn reclaim_oldest_blocking(&mut self) -> Result<()> {
        match self.pending.front().copied() {
            Some((timestamp, end_v)) => {
                self.clock.wait(timestamp)?;
                self.head_v = end_v;
                self.pending.pop_front();
                Ok(())
            }
            // Nothing in flight: the conflicting bytes belong to spans
            // that were never freed, so no amount of waiting helps
            None => Err(Error::OutOfMemory),
        }
    }

    // ===== OBSERVERS =====

    /// Ring capacity in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes between the reclaim cursor and the allocation cursor
    pub fn bytes_in_flight(&self) -> u64 {
        self.tail_v - self.head_v
    }

    /// Device-global offset of the ring base
    pub fn device_base(&self) -> u64 {
        self.device_base
    }

    /// The guard clock (tests signal its slot to play the device)
    pub fn guard(&self) -> &FenceClock {
        &self.clock
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "migration_ring_tests.rs"]
mod tests;
