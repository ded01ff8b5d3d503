//! Arena pools over raw host/device memory
//!
//! An arena wraps one contiguous raw region with a suballocator and a
//! device-global base offset. Allocations carry offsets in the device's
//! global address space, so any consumer can build a transfer descriptor
//! or fetch command from an `Allocation` alone; the arena is only needed
//! to reverse the mapping for host-side access, or to free.

use std::ptr::NonNull;
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::device::{AddressTranslator, RawAllocator, RawRegion};
use crate::error::{Error, Result};
use crate::memory::suballocator::{FreeListAllocator, SubAllocator};

/// Which memory pool a region or allocation lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Issuer-side system memory the device can read across the bus
    Host,
    /// Device-local memory
    Device,
}

new_key_type! {
    /// Stable key for an arena in an [`ArenaSet`]
    pub struct ArenaId;
}

/// One arena allocation.
///
/// `offset` is device-global, not arena-relative. `owns_memory`
/// distinguishes a real allocation (responsible for freeing) from an
/// alias of a sub-range inside someone else's allocation; freeing an
/// alias is a no-op.
///
/// The zero value ([`Allocation::NONE`]) is the "no allocation"
/// sentinel; arenas are never based at device offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub location: MemoryLocation,
    pub offset: u64,
    pub owns_memory: bool,
}

impl Allocation {
    /// The "no allocation" sentinel
    pub const NONE: Allocation = Allocation {
        location: MemoryLocation::Host,
        offset: 0,
        owns_memory: false,
    };

    /// Whether this is the sentinel
    pub fn is_none(&self) -> bool {
        self.offset == 0
    }

    /// Alias a sub-range `bytes` into this allocation (for bound ranges
    /// inside a larger buffer). The alias never owns memory.
    pub fn sub_range(&self, bytes: u64) -> Allocation {
        assert!(!self.is_none(), "sub-range of the sentinel allocation");
        Allocation {
            location: self.location,
            offset: self.offset + bytes,
            owns_memory: false,
        }
    }
}

/// One memory pool: raw region + device base offset + suballocator
struct Arena {
    location: MemoryLocation,
    base: NonNull<u8>,
    base_offset: u64,
    size: u64,
    suballocator: Box<dyn SubAllocator>,
    region: Option<RawRegion>,
}

/// Registry of arenas over an injected raw allocator and address
/// translator.
///
/// The default device pool is created once at startup (see
/// `DriverContext`); additional arenas may be created and destroyed
/// explicitly.
pub struct ArenaSet {
    raw: Arc<dyn RawAllocator>,
    translator: Arc<dyn AddressTranslator>,
    arenas: SlotMap<ArenaId, Arena>,
}

impl ArenaSet {
    /// Create an empty registry over the platform's raw allocator and
    /// translator
    pub fn new(raw: Arc<dyn RawAllocator>, translator: Arc<dyn AddressTranslator>) -> Self {
        Self {
            raw,
            translator,
            arenas: SlotMap::with_key(),
        }
    }

    // ===== ARENA LIFECYCLE =====

    /// Create an arena: one contiguous raw region wrapped with a
    /// first-fit suballocator.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the raw allocator cannot provide the
    /// region.
    pub fn create_arena(
        &mut self,
        location: MemoryLocation,
        align: u64,
        size: u64,
    ) -> Result<ArenaId> {
        self.create_arena_with(location, align, size, |size| {
            Box::new(FreeListAllocator::new(size))
        })
    }

    /// Create an arena with a caller-chosen suballocation strategy
    pub fn create_arena_with(
        &mut self,
        location: MemoryLocation,
        align: u64,
        size: u64,
        make_suballocator: impl FnOnce(u64) -> Box<dyn SubAllocator>,
    ) -> Result<ArenaId> {
        assert!(size > 0, "creating an empty arena");
        let region = self.raw.allocate(location, align, size)?;
        let base_offset = self.translator.device_offset(&region);
        // Offset 0 is the Allocation::NONE sentinel
        debug_assert!(base_offset != 0, "arena based at the sentinel offset");

        let id = self.arenas.insert(Arena {
            location,
            base: region.ptr,
            base_offset,
            size,
            suballocator: make_suballocator(size),
            region: Some(region),
        });
        crate::driver_info!(
            "pulsar::ArenaSet",
            "arena created: {:?}, {} bytes at device offset {:#x}",
            location,
            size,
            base_offset
        );
        Ok(id)
    }

    /// Tear down an arena and release its backing region.
    ///
    /// Outstanding allocations from the arena are a caller bug; they are
    /// surfaced loudly rather than silently invalidated.
    pub fn destroy_arena(&mut self, id: ArenaId) {
        let mut arena = self
            .arenas
            .remove(id)
            .expect("destroy_arena on unknown arena");
        let outstanding = arena.suballocator.bytes_in_use();
        if outstanding > 0 {
            crate::driver_warn!(
                "pulsar::ArenaSet",
                "arena destroyed with {} bytes still allocated",
                outstanding
            );
            debug_assert!(false, "arena destroyed with outstanding allocations");
        }
        if let Some(region) = arena.region.take() {
            self.raw.free(region);
        }
    }

    // ===== ALLOCATION =====

    /// Carve an allocation out of an arena.
    ///
    /// The returned offset is device-global:
    /// `arena.base_offset + local`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the arena cannot satisfy the request.
    pub fn allocate(&mut self, id: ArenaId, align: u64, size: u64) -> Result<Allocation> {
        let arena = self.arenas.get_mut(id).expect("allocate on unknown arena");
        let local = arena
            .suballocator
            .allocate(align, size)
            .ok_or(Error::OutOfMemory)?;
        Ok(Allocation {
            location: arena.location,
            offset: arena.base_offset + local,
            owns_memory: true,
        })
    }

    /// Return an allocation to its arena.
    ///
    /// Freeing the sentinel or a non-owning alias is a no-op. Freeing an
    /// offset the arena never handed out panics (contract violation).
    pub fn free(&mut self, id: ArenaId, allocation: Allocation) {
        if allocation.is_none() || !allocation.owns_memory {
            return;
        }
        let arena = self.arenas.get_mut(id).expect("free on unknown arena");
        let local = arena.local_offset(allocation);
        arena.suballocator.free(local);
    }

    /// Host-visible pointer for an allocation, for issuer-side
    /// reads/writes
    pub fn address_of(&self, id: ArenaId, allocation: Allocation) -> NonNull<u8> {
        let arena = self.arenas.get(id).expect("address_of on unknown arena");
        let local = arena.local_offset(allocation);
        // SAFETY: local_offset asserted the offset lies within the region
        unsafe { NonNull::new_unchecked(arena.base.as_ptr().add(local as usize)) }
    }

    // ===== OBSERVERS =====

    /// Device-global base offset of an arena
    pub fn base_offset(&self, id: ArenaId) -> u64 {
        self.arenas.get(id).expect("unknown arena").base_offset
    }

    /// Location tag of an arena
    pub fn location(&self, id: ArenaId) -> MemoryLocation {
        self.arenas.get(id).expect("unknown arena").location
    }

    /// Size in bytes of an arena
    pub fn size(&self, id: ArenaId) -> u64 {
        self.arenas.get(id).expect("unknown arena").size
    }

    /// Bytes currently allocated from an arena
    pub fn bytes_in_use(&self, id: ArenaId) -> u64 {
        self.arenas
            .get(id)
            .expect("unknown arena")
            .suballocator
            .bytes_in_use()
    }

    /// Number of arenas in the registry
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Whether the registry holds no arenas
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }
}

impl Arena {
    /// Invert the global-offset arithmetic, asserting containment
    fn local_offset(&self, allocation: Allocation) -> u64 {
        assert_eq!(
            allocation.location, self.location,
            "allocation location does not match its arena"
        );
        assert!(
            allocation.offset >= self.base_offset
                && allocation.offset < self.base_offset + self.size,
            "allocation offset {:#x} outside arena [{:#x}, {:#x})",
            allocation.offset,
            self.base_offset,
            self.base_offset + self.size
        );
        allocation.offset - self.base_offset
    }
}

impl Drop for ArenaSet {
    fn drop(&mut self) {
        // Return every remaining region to the raw allocator
        for (_, mut arena) in self.arenas.drain() {
            if let Some(region) = arena.region.take() {
                self.raw.free(region);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "arena_tests.rs"]
mod tests;
