/// Fence module - timestamps tracking device progress through the
/// command stream

pub mod semaphore_pool;
pub mod fence_clock;

pub use semaphore_pool::*;
pub use fence_clock::*;
