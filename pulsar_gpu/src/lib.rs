/*!
# Pulsar GPU driver core

Resource-lifetime and memory-allocation core for a GPU command-stream
driver: integer names for GPU-visible objects, arena suballocation of
host- and device-resident memory, fence timestamps tracking an
asynchronously-scheduled device through the command stream, and the
delete/orphan/detach protocol that keeps the single-threaded issuer from
freeing storage the device is still reading.

## Architecture

- **HandleTable**: recycled integer names for every object kind
- **ArenaSet / SubAllocator**: pooled memory, allocations addressed in
  device-global space
- **FenceClock / SemaphorePool**: monotonic 31-bit timestamps confirmed
  through shared semaphore words the device writes
- **ResourceRegistry**: per-type lifecycle controller (destroy, orphan,
  detach)
- **MigrationRing**: wrapping bump allocator for transient staging data

The platform side (raw memory, address translation, command encoding) is
consumed through the traits in [`device`]; `pulsar_gpu_device_sim`
provides a software device for tests and bring-up.
*/

// Internal modules
pub mod error;
pub mod log;
pub mod utils;
pub mod handle;
pub mod device;
pub mod fence;
pub mod memory;
pub mod resource;
mod context;

// Main pulsar namespace module
pub mod pulsar {
    // Error types
    pub use crate::error::{Error, Result};

    // Context wiring
    pub use crate::context::{DriverConfig, DriverContext};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
    }

    // Handle sub-module
    pub mod handle {
        pub use crate::handle::*;
    }

    // Device interface sub-module
    pub mod device {
        pub use crate::device::{AddressTranslator, CommandSink, RawAllocator, RawRegion};
    }

    // Fence sub-module
    pub mod fence {
        pub use crate::fence::*;
    }

    // Memory sub-module
    pub mod memory {
        pub use crate::memory::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }
}
