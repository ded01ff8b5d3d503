/// Memory module - arena suballocation and transient staging

pub mod suballocator;
pub mod arena;
pub mod migration_ring;

pub use suballocator::*;
pub use arena::*;
pub use migration_ring::*;
