/// Raw memory interfaces consumed from the platform layer

use std::ptr::NonNull;
use crate::error::Result;
use crate::memory::MemoryLocation;

/// One contiguous region obtained from the platform's raw allocator.
///
/// The region is host-mapped (`ptr` is valid for `size` bytes on the
/// issuing side) regardless of its location tag; for `Device` regions the
/// pointer is the issuer's view of the aperture.
#[derive(Debug)]
pub struct RawRegion {
    /// Host-visible base pointer
    pub ptr: NonNull<u8>,
    /// Region size in bytes
    pub size: u64,
    /// Alignment the region was requested with
    pub align: u64,
    /// Which memory pool the region came from
    pub location: MemoryLocation,
}

/// Platform allocator for physically/virtually contiguous regions.
///
/// An arena obtains its whole backing range from this once at creation
/// and returns it on destruction; individual allocations never reach the
/// raw allocator.
pub trait RawAllocator {
    /// Obtain a contiguous region for the given location tag
    fn allocate(&self, location: MemoryLocation, align: u64, size: u64) -> Result<RawRegion>;

    /// Release a region previously returned by `allocate`.
    ///
    /// Releasing a region that did not come from this allocator is a
    /// caller bug.
    fn free(&self, region: RawRegion);
}

/// Maps a raw region's host address into the device's global address
/// space.
///
/// Allocations carry offsets in this global space so consumers can build
/// device commands without knowing which arena produced them.
pub trait AddressTranslator {
    /// Device-global offset of the region's base address
    fn device_offset(&self, region: &RawRegion) -> u64;
}
