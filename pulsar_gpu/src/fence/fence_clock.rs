//! Monotonic timestamp clock over one semaphore slot
//!
//! The issuing side numbers its submissions with a monotonic 31-bit
//! sequence. Posting a timestamp appends a semaphore-write command to the
//! stream; when the device executes it, the value lands in the shared
//! slot and the issuer can observe that everything numbered at or below
//! it has completed.
//!
//! Timestamp 0 is reserved as the "nothing pending" sentinel and is never
//! granted, posted, or waited on. The sequence wraps at the configured
//! maximum (2^31 - 1 by default, leaving one bit free for flags packed
//! next to timestamps in resource headers): wrapping is a hard
//! synchronization point - the clock waits for the device to confirm the
//! old high-water mark, resets numbering to 1, and reports the epoch turn
//! so resource code can drop stamps from the old numbering epoch.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::device::CommandSink;
use crate::error::{Error, Result};
use crate::fence::SemaphoreSlot;

/// Largest value the 31-bit timestamp sequence can reach
pub const MAX_TIMESTAMP: u32 = 0x7fff_ffff;

/// Fence behavior knobs.
///
/// Poll interval and timeout are configuration rather than compiled-in
/// constants; `wait_timeout = None` blocks indefinitely.
#[derive(Debug, Clone)]
pub struct FenceConfig {
    /// Sequence value that forces an epoch turnover when exceeded
    pub max_timestamp: u32,
    /// Sleep between semaphore polls while waiting
    pub poll_interval: Duration,
    /// Bound on a single wait; None waits forever
    pub wait_timeout: Option<Duration>,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            max_timestamp: MAX_TIMESTAMP,
            poll_interval: Duration::from_micros(100),
            wait_timeout: None,
        }
    }
}

/// Result of a timestamp grant.
///
/// `epoch_turned` tells the caller the numbering epoch was reset while
/// granting: every timestamp cached from before the grant is stale and
/// must be treated as already passed (resource code zeroes its stamps).
#[derive(Debug, Clone, Copy)]
pub struct TimestampGrant {
    /// First of the granted values; a grant of `n` covers
    /// `first..first + n`
    pub first: u32,
    /// Whether the numbering epoch was reset to grant these values
    pub epoch_turned: bool,
}

/// Issuing-side fence clock.
///
/// State machine per issuing context: `Idle(last=0) -> Issuing(n) ->
/// Posted(n) -> Idle(last=n)`. Granted values must be posted in order
/// before the next grant; the clock asserts this, catching out-of-order
/// fence use at the call site that commits it.
pub struct FenceClock {
    slot: SemaphoreSlot,
    sink: Arc<Mutex<dyn CommandSink>>,
    config: FenceConfig,
    /// Next value to grant
    next_timestamp: u32,
    /// Highest value actually posted
    last_timestamp: u32,
    /// Most recently observed device-reported value
    cached_timestamp: u32,
}

impl FenceClock {
    /// Create a clock over a freshly acquired (zeroed) semaphore slot
    pub fn new(
        slot: SemaphoreSlot,
        sink: Arc<Mutex<dyn CommandSink>>,
        config: FenceConfig,
    ) -> Self {
        assert!(
            config.max_timestamp >= 1 && config.max_timestamp <= MAX_TIMESTAMP,
            "max_timestamp must stay within the 31-bit sequence"
        );
        Self {
            slot,
            sink,
            config,
            next_timestamp: 1,
            last_timestamp: 0,
            cached_timestamp: 0,
        }
    }

    // ===== GRANTING =====

    /// Allocate the next `n` sequence values, returning the first.
    ///
    /// If the grant would run past the configured maximum, the clock
    /// first blocks until the device confirms passing the previous
    /// high-water mark, then restarts the sequence at 1 and reports
    /// `epoch_turned` (see [`TimestampGrant`]).
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the epoch-turnover wait is bounded and
    /// elapses.
    ///
    /// # Panics
    ///
    /// Panics if a previously granted value was never posted (fences
    /// must be issued and posted in order), or if `n` is 0 or can never
    /// fit in an epoch.
    pub fn create_timestamp(&mut self, n: u32) -> Result<TimestampGrant> {
        assert!(n >= 1, "granting zero timestamps");
        assert!(
            n <= self.config.max_timestamp,
            "grant of {} timestamps can never fit an epoch of {}",
            n,
            self.config.max_timestamp
        );
        assert_eq!(
            self.next_timestamp,
            self.last_timestamp + 1,
            "timestamp {} was granted but never posted",
            self.next_timestamp - 1
        );

        let mut epoch_turned = false;
        if self.next_timestamp + (n - 1) > self.config.max_timestamp {
            self.turn_epoch()?;
            epoch_turned = true;
        }

        let first = self.next_timestamp;
        self.next_timestamp += n;
        Ok(TimestampGrant { first, epoch_turned })
    }

    /// Hard synchronization point: drain the device, restart numbering.
    fn turn_epoch(&mut self) -> Result<()> {
        crate::driver_debug!(
            "pulsar::FenceClock",
            "timestamp epoch turnover, draining device at {}",
            self.last_timestamp
        );
        if self.last_timestamp != 0 {
            self.wait(self.last_timestamp)?;
        }
        // The device is idle here, so the issuer may reset the shared word
        self.slot.reset();
        self.next_timestamp = 1;
        self.last_timestamp = 0;
        self.cached_timestamp = 0;
        Ok(())
    }

    // ===== POSTING =====

    /// Append the command that writes `value` into the semaphore slot
    /// once the device reaches this point in the stream.
    ///
    /// # Panics
    ///
    /// Panics on the reserved value 0, on a value that was never
    /// granted, or on out-of-order posting.
    pub fn post(&mut self, value: u32) {
        assert!(value != 0, "timestamp 0 is the reserved 'nothing pending' sentinel");
        assert!(
            value == self.last_timestamp + 1 && value < self.next_timestamp,
            "timestamp {} posted out of order (last posted {}, next grant {})",
            value,
            self.last_timestamp,
            self.next_timestamp
        );
        self.sink.lock().unwrap().write_semaphore(&self.slot, value);
        self.last_timestamp = value;
    }

    // ===== OBSERVING =====

    /// Whether the device has confirmed passing `value`.
    ///
    /// Re-reads the shared slot only while the cached view is below
    /// `value`; once a threshold is known satisfied no further device
    /// reads happen for it.
    ///
    /// # Panics
    ///
    /// Panics on the reserved value 0.
    pub fn passed(&mut self, value: u32) -> bool {
        assert!(value != 0, "timestamp 0 is the reserved 'nothing pending' sentinel");
        if self.cached_timestamp < value {
            let observed = self.slot.read();
            // The issuer-side view never goes backwards
            if observed > self.cached_timestamp {
                self.cached_timestamp = observed;
            }
        }
        self.cached_timestamp >= value
    }

    /// Block until the device confirms passing `value`.
    ///
    /// Flushes the command stream first (the fence-writing command must
    /// be visible to the device), then polls the slot at the configured
    /// interval.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when a bounded wait elapses; the caller
    /// decides whether that is fatal.
    ///
    /// # Panics
    ///
    /// Panics on the reserved value 0, or on a value that was never
    /// posted (that wait could not ever finish).
    pub fn wait(&mut self, value: u32) -> Result<()> {
        assert!(value != 0, "timestamp 0 is the reserved 'nothing pending' sentinel");
        assert!(
            value <= self.last_timestamp,
            "waiting on timestamp {} which was never posted (last posted {})",
            value,
            self.last_timestamp
        );
        self.sink.lock().unwrap().flush();

        let start = Instant::now();
        loop {
            if self.passed(value) {
                return Ok(());
            }
            if let Some(timeout) = self.config.wait_timeout {
                if start.elapsed() >= timeout {
                    return Err(Error::Timeout);
                }
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    // ===== ACCESSORS =====

    /// Highest value posted so far (0 when nothing is pending)
    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    /// Next value a grant would return
    pub fn next_timestamp(&self) -> u32 {
        self.next_timestamp
    }

    /// Most recently observed device progress
    pub fn cached_timestamp(&self) -> u32 {
        self.cached_timestamp
    }

    /// The shared slot backing this clock (device backends and tests
    /// signal through clones of it)
    pub fn slot(&self) -> &SemaphoreSlot {
        &self.slot
    }

    /// Tear down the clock, returning its slot to the caller for release
    pub fn into_slot(self) -> SemaphoreSlot {
        self.slot
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "fence_clock_tests.rs"]
mod tests;
