/// Device module - interfaces the core consumes from its collaborators
///
/// The core never talks to hardware directly: it is handed a raw memory
/// allocator, an address translator, and a command sink at construction
/// time. `pulsar_gpu_device_sim` provides a software implementation; the
/// mock device here covers unit tests.

// Module declarations
pub mod raw_memory;
pub mod command_sink;

// Re-exports
pub use raw_memory::*;
pub use command_sink::*;

// Mock device for tests (no hardware required)
#[cfg(test)]
pub mod mock_device;
