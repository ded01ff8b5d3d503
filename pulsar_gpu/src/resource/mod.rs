/// Resource module - lifecycle of named, fence-tracked objects

pub mod resource;
pub mod registry;

pub use resource::*;
pub use registry::*;
