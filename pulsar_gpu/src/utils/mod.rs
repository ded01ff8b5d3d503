/// Small self-contained utilities shared across the driver core

pub mod bit_set;

pub use bit_set::*;
