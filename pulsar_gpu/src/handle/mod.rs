/// Handle module - generational integer names for GPU-visible objects

pub mod handle_table;

pub use handle_table::*;
