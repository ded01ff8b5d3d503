//! Top-level wiring of the driver core
//!
//! A `DriverContext` ties the subsystems together: the arena registry
//! over the platform's raw allocator, the semaphore pool, and the main
//! fence clock over the command sink. There is no global current
//! context; callers hold the context explicitly and thread its parts
//! through every call that needs them.

use std::sync::{Arc, Mutex};

use crate::device::{AddressTranslator, CommandSink, RawAllocator};
use crate::error::Result;
use crate::fence::{FenceClock, FenceConfig, SemaphorePool};
use crate::memory::{ArenaId, ArenaSet, MemoryLocation, MigrationRing};

/// Startup configuration for the driver core.
///
/// Supplied once at initialization; nothing here is re-read later.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Location of the default arena every nameless allocation ends up
    /// in
    pub default_arena_location: MemoryLocation,
    /// Alignment of the default arena's backing region
    pub default_arena_align: u64,
    /// Size of the default arena in bytes
    pub default_arena_size: u64,
    /// How many hardware semaphore slots the pool models
    pub semaphore_slots: usize,
    /// Fence polling/timeout behavior, shared by every clock the
    /// context creates
    pub fence: FenceConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_arena_location: MemoryLocation::Device,
            default_arena_align: 4096,
            default_arena_size: 4 << 20,
            semaphore_slots: 8,
            fence: FenceConfig::default(),
        }
    }
}

/// The assembled driver core: arenas, semaphores, and the main fence
/// clock.
pub struct DriverContext {
    /// Arena registry over the injected raw allocator
    pub arenas: ArenaSet,
    /// Fixed pool of hardware semaphore slots
    pub semaphores: SemaphorePool,
    /// Main submission clock
    pub clock: FenceClock,
    default_arena: ArenaId,
    sink: Arc<Mutex<dyn CommandSink>>,
    fence_config: FenceConfig,
}

impl DriverContext {
    /// Build the core over the platform collaborators, creating the
    /// default arena and the main clock.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::OutOfMemory`] if the default arena's
    /// region cannot be obtained.
    pub fn new(
        config: DriverConfig,
        raw: Arc<dyn RawAllocator>,
        translator: Arc<dyn AddressTranslator>,
        sink: Arc<Mutex<dyn CommandSink>>,
    ) -> Result<Self> {
        let mut arenas = ArenaSet::new(raw, translator);
        let default_arena = arenas.create_arena(
            config.default_arena_location,
            config.default_arena_align,
            config.default_arena_size,
        )?;
        let mut semaphores = SemaphorePool::new(config.semaphore_slots);
        let clock = FenceClock::new(semaphores.acquire()?, sink.clone(), config.fence.clone());
        crate::driver_info!(
            "pulsar::DriverContext",
            "core initialized: {:?} default arena, {} semaphore slots",
            config.default_arena_location,
            config.semaphore_slots
        );
        Ok(Self {
            arenas,
            semaphores,
            clock,
            default_arena,
            sink,
            fence_config: config.fence,
        })
    }

    /// The arena created at startup
    pub fn default_arena(&self) -> ArenaId {
        self.default_arena
    }

    /// Submit boundary: make every appended command visible to the
    /// device
    pub fn flush(&self) {
        self.sink.lock().unwrap().flush();
    }

    /// Carve a migration ring out of the default arena with its own
    /// guard clock.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::OutOfMemory`] if the backing does not fit,
    /// [`crate::error::Error::SemaphoresExhausted`] if no slot is free
    /// for the guard. Neither failure leaks the other reservation.
    pub fn create_ring(&mut self, align: u64, size: u64) -> Result<MigrationRing> {
        let backing = self.arenas.allocate(self.default_arena, align, size)?;
        let slot = match self.semaphores.acquire() {
            Ok(slot) => slot,
            Err(e) => {
                self.arenas.free(self.default_arena, backing);
                return Err(e);
            }
        };
        let clock = FenceClock::new(slot, self.sink.clone(), self.fence_config.clone());
        Ok(MigrationRing::over(
            &self.arenas,
            self.default_arena,
            backing,
            size,
            clock,
        ))
    }

    /// Tear down a ring, returning its backing bytes and guard slot
    pub fn destroy_ring(&mut self, ring: MigrationRing) {
        let clock = ring.destroy(&mut self.arenas);
        self.semaphores.release(clock.into_slot());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
