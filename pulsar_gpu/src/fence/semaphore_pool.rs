//! Hardware semaphore slots shared between the issuer and the device
//!
//! A slot is one 32-bit word of shared memory: the device writes it when
//! command execution reaches a fence, the issuer reads it to learn how
//! far the device has progressed. These words are the only memory both
//! sides touch, so they are the one place the core uses atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use crate::error::{Error, Result};

/// One shared semaphore word.
///
/// Clones alias the same word; the device side holds clones inside
/// queued commands and writes through [`SemaphoreSlot::signal`], the
/// issuer only reads.
#[derive(Debug, Clone)]
pub struct SemaphoreSlot {
    index: usize,
    word: Arc<AtomicU32>,
}

impl SemaphoreSlot {
    /// Issuer-side read of the device's last reported value
    pub fn read(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    /// Device-side write.
    ///
    /// Called by the device backend (or by tests playing the device) when
    /// execution reaches the fence command carrying this slot.
    pub fn signal(&self, value: u32) {
        self.word.store(value, Ordering::Release);
    }

    /// Index of this slot within its pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Issuer-side reset, only valid while the device is known idle
    /// (epoch turnover, pool release)
    pub(crate) fn reset(&self) {
        self.word.store(0, Ordering::Release);
    }
}

/// Fixed pool of hardware semaphore slots.
///
/// Live fences each own one slot; the pool size models the fixed number
/// of slots the hardware exposes.
pub struct SemaphorePool {
    words: Vec<Arc<AtomicU32>>,
    free: Vec<usize>,
}

impl SemaphorePool {
    /// Create a pool of `count` zeroed slots
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "semaphore pool needs at least one slot");
        Self {
            words: (0..count).map(|_| Arc::new(AtomicU32::new(0))).collect(),
            free: (0..count).rev().collect(),
        }
    }

    /// Acquire a free slot.
    ///
    /// # Errors
    ///
    /// [`Error::SemaphoresExhausted`] when every slot is in use.
    pub fn acquire(&mut self) -> Result<SemaphoreSlot> {
        let index = self.free.pop().ok_or(Error::SemaphoresExhausted)?;
        Ok(SemaphoreSlot {
            index,
            word: self.words[index].clone(),
        })
    }

    /// Return a slot to the pool, zeroing its word.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not belong to this pool or is already
    /// free.
    pub fn release(&mut self, slot: SemaphoreSlot) {
        assert!(
            slot.index < self.words.len()
                && Arc::ptr_eq(&slot.word, &self.words[slot.index]),
            "released a semaphore slot from a different pool"
        );
        assert!(
            !self.free.contains(&slot.index),
            "semaphore slot {} released twice",
            slot.index
        );
        slot.reset();
        self.free.push(slot.index);
    }

    /// Number of slots currently free
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Total number of slots in the pool
    pub fn capacity(&self) -> usize {
        self.words.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "semaphore_pool_tests.rs"]
mod tests;
