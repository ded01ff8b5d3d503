/// SimMemory / SimTranslator - host-memory implementations of the
/// platform memory interfaces

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Mutex;

use pulsar_gpu::driver_err;
use pulsar_gpu::pulsar::device::{AddressTranslator, RawAllocator, RawRegion};
use pulsar_gpu::pulsar::memory::MemoryLocation;
use pulsar_gpu::pulsar::{Error, Result};

/// Raw allocator backed by the host heap.
///
/// Both location tags come from the same heap; the simulated "device
/// memory" is just host memory the fake device address space maps.
/// Outstanding regions are counted so teardown tests can prove nothing
/// leaked.
pub struct SimMemory {
    active: Mutex<usize>,
}

impl SimMemory {
    pub fn new() -> Self {
        Self { active: Mutex::new(0) }
    }

    /// Regions allocated and not yet freed
    pub fn active_regions(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

impl Default for SimMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl RawAllocator for SimMemory {
    fn allocate(&self, location: MemoryLocation, align: u64, size: u64) -> Result<RawRegion> {
        let layout = Layout::from_size_align(size as usize, align as usize)
            .map_err(|e| driver_err!("pulsar::sim", "bad region layout: {}", e))?;
        // SAFETY: layout is validated and non-zero sized
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
        // SAFETY: region came from allocate() with this exact layout
        unsafe { dealloc(region.ptr.as_ptr(), layout) };
        *self.active.lock().unwrap() -= 1;
    }
}

/// Device-global offset the translator's first window starts at
pub const SIM_DEVICE_BASE: u64 = 0x2000_0000;

/// Assigns each region a fresh window in the simulated device address
/// space.
///
/// Windows never start at 0 (offset 0 is the core's "no allocation"
/// sentinel) and never overlap, so global offsets uniquely identify
/// regions the way a real aperture map would.
pub struct SimTranslator {
    next: Mutex<u64>,
}

impl SimTranslator {
    pub fn new() -> Self {
        Self { next: Mutex::new(SIM_DEVICE_BASE) }
    }
}

impl Default for SimTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressTranslator for SimTranslator {
    fn device_offset(&self, region: &RawRegion) -> u64 {
        let mut next = self.next.lock().unwrap();
        let base = next.next_multiple_of(region.align.max(1));
        *next = base + region.size;
        base
    }
}
