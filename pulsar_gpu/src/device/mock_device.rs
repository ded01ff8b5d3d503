/// Mock device for unit tests (no hardware required)
///
/// The mock plays both collaborator roles the core consumes: a command
/// sink that records appended semaphore writes, and a raw allocator over
/// plain host memory. Tests drive the "device side" by hand - either by
/// signaling semaphore slots directly, or by using an auto-executing
/// sink that applies every write at flush time (a device that is
/// infinitely fast but still only sees flushed commands).

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::device::{AddressTranslator, CommandSink, RawAllocator, RawRegion};
use crate::error::{Error, Result};
use crate::fence::SemaphoreSlot;
use crate::memory::MemoryLocation;

// ============================================================================
// Mock command sink
// ============================================================================

/// Records semaphore-write commands; optionally executes them on flush
pub struct MockSink {
    /// Appended but not yet flushed
    pub staged: Vec<(SemaphoreSlot, u32)>,
    /// Flushed but not yet executed by the "device"
    pub flushed: Vec<(SemaphoreSlot, u32)>,
    /// Number of flush calls observed
    pub flush_count: usize,
    /// Execute writes at flush time (instantly-fast device)
    pub auto_execute: bool,
}

impl MockSink {
    /// Record-only sink; tests execute commands explicitly
    pub fn new() -> Self {
        Self {
            staged: Vec::new(),
            flushed: Vec::new(),
            flush_count: 0,
            auto_execute: false,
        }
    }

    /// Sink that applies every semaphore write as soon as it is flushed
    pub fn auto() -> Self {
        Self {
            auto_execute: true,
            ..Self::new()
        }
    }

    /// Execute all flushed commands, in order (manual device step)
    pub fn execute_flushed(&mut self) {
        for (slot, value) in self.flushed.drain(..) {
            slot.signal(value);
        }
    }
}

impl CommandSink for MockSink {
    fn write_semaphore(&mut self, slot: &SemaphoreSlot, value: u32) {
        self.staged.push((slot.clone(), value));
    }

    fn flush(&mut self) {
        self.flush_count += 1;
        let batch: Vec<_> = self.staged.drain(..).collect();
        if self.auto_execute {
            for (slot, value) in batch {
                slot.signal(value);
            }
        } else {
            self.flushed.extend(batch);
        }
    }
}

/// Wrap a sink the way the core expects to share it
pub fn shared_sink(sink: MockSink) -> Arc<Mutex<MockSink>> {
    Arc::new(Mutex::new(sink))
}

// ============================================================================
// Mock raw allocator
// ============================================================================

/// Raw allocator over plain host memory, tracking outstanding regions
pub struct MockMemory {
    active: Mutex<usize>,
}

impl MockMemory {
    pub fn new() -> Self {
        Self { active: Mutex::new(0) }
    }

    /// Number of regions allocated and not yet freed
    pub fn active_regions(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

impl RawAllocator for MockMemory {
    fn allocate(&self, location: MemoryLocation, align: u64, size: u64) -> Result<RawRegion> {
        let layout = Layout::from_size_align(size as usize, align as usize)
            .map_err(|_| Error::OutOfMemory)?;
        // SAFETY: layout validated above, size is non-zero in every caller
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(Error::OutOfMemory)?;
        *self.active.lock().unwrap() += 1;
        Ok(RawRegion {
            ptr,
            size,
            align,
            location,
        })
    }

    fn free(&self, region: RawRegion) {
        let layout = Layout::from_size_align(region.size as usize, region.align as usize)
            .expect("region layout was validated at allocation");
        // SAFETY: region came from allocate() with the same layout
        unsafe { dealloc(region.ptr.as_ptr(), layout) };
        *self.active.lock().unwrap() -= 1;
    }
}

// ============================================================================
// Mock address translator
// ============================================================================

/// Hands each region a fresh window in a fake device address space,
/// starting away from zero so offset 0 stays the sentinel
pub struct MockTranslator {
    next: Mutex<u64>,
}

/// First device-global offset the mock translator hands out
pub const MOCK_DEVICE_BASE: u64 = 0x1000_0000;

impl MockTranslator {
    pub fn new() -> Self {
        Self { next: Mutex::new(MOCK_DEVICE_BASE) }
    }
}

impl AddressTranslator for MockTranslator {
    fn device_offset(&self, region: &RawRegion) -> u64 {
        let mut next = self.next.lock().unwrap();
        let base = next.next_multiple_of(region.align.max(1));
        *next = base + region.size;
        base
    }
}
