/*!
# Pulsar GPU - Simulated Device Backend

Software implementation of the platform interfaces the Pulsar core
consumes: a raw allocator over host memory, an address translator with a
fake device address space, and a command sink feeding a worker thread
that plays the asynchronously-scheduled device.

The simulated device only sees flushed commands, executes them in order
after a configurable latency, and writes semaphore slots exactly the way
real hardware would - which is what makes it useful for exercising the
fence, orphan, and ring-wrap paths end to end without a GPU.
*/

// Simulation modules
mod sim_memory;
mod sim_device;

pub use sim_memory::{SimMemory, SimTranslator};
pub use sim_device::{SimDevice, SimDeviceConfig, SimCommandSink};
