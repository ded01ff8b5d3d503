//! Error types for the Pulsar driver core
//!
//! Capacity exhaustion and timeouts are ordinary, recoverable `Err` values
//! that propagate to the caller. Contract violations (using a handle in the
//! wrong state, freeing a never-allocated block, posting timestamp 0) are
//! programming errors and panic instead of returning an error.

use std::fmt;

/// Result type for Pulsar driver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pulsar driver errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The handle table has no names left to issue
    NamesExhausted,

    /// An arena or ring cannot satisfy the allocation request
    OutOfMemory,

    /// The hardware semaphore pool has no free slots
    SemaphoresExhausted,

    /// A bounded wait elapsed before the device caught up
    Timeout,

    /// Backend failure (raw allocator, command sink, device)
    DeviceError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NamesExhausted => write!(f, "Handle table exhausted"),
            Error::OutOfMemory => write!(f, "Out of device memory"),
            Error::SemaphoresExhausted => write!(f, "Semaphore pool exhausted"),
            Error::Timeout => write!(f, "Timed out waiting for the device"),
            Error::DeviceError(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Build a [`Error::DeviceError`] and log it at ERROR severity
///
/// # Example
///
/// ```ignore
/// return Err(driver_err!("pulsar::sim", "command queue closed"));
/// ```
#[macro_export]
macro_rules! driver_err {
    ($source:expr, $($arg:tt)*) => {{
        $crate::driver_error!($source, $($arg)*);
        $crate::error::Error::DeviceError(format!($($arg)*))
    }};
}

/// Log an ERROR and return early with [`Error::DeviceError`]
#[macro_export]
macro_rules! driver_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::driver_err!($source, $($arg)*))
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
