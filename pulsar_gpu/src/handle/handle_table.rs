//! Generational name allocator for GPU-visible objects
//!
//! Every object kind the driver exposes (buffers, textures, programs,
//! queries, ...) is named by an integer handle drawn from `[1, capacity)`;
//! 0 is reserved as "no object". A handle moves through
//! `Free -> Named -> Live -> Free`, with `detach` as the escape hatch that
//! retires a name while the object it named stays alive elsewhere.
//!
//! Retired names go through a FIFO queue before reissue, so a name value
//! is not handed out again while stale copies of it are likely still in
//! flight.

use std::collections::VecDeque;
use crate::error::{Error, Result};
use crate::utils::BitSet;

/// Integer name for a table-managed object.
///
/// `Handle::NONE` (0) is the reserved "no object" value and is never
/// issued by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// The reserved "no object" handle
    pub const NONE: Handle = Handle(0);

    /// Raw integer value of the name
    pub fn index(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved "no object" handle
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Table of named object slots with recycled integer names.
///
/// Owns two growable bit sets (`named`, `live`) consulted by the O(1)
/// membership queries, a sparse slot array of constructed objects, and
/// the retirement queue of recycled names.
///
/// State contract: operating on a handle that is not in the state an
/// operation requires is a programming error and panics; callers are
/// expected to have checked `is_name`/`is_object` first. Capacity
/// exhaustion, by contrast, is an ordinary recoverable error.
pub struct HandleTable<T> {
    /// Set while a handle is Named or Live
    named: BitSet,
    /// Set only while a handle is Live (slot constructed)
    live: BitSet,
    /// Sparse slot storage, indexed directly by handle value
    slots: Vec<Option<T>>,
    /// Retired names awaiting reissue, oldest first
    retired: VecDeque<u32>,
    /// Next never-issued name
    next: u32,
    /// One past the highest issuable name
    capacity: u32,
}

impl<T> HandleTable<T> {
    /// Create a table issuing names in `[1, capacity)`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2` (no issuable names).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 2, "handle table needs at least one issuable name");
        Self {
            named: BitSet::new(),
            live: BitSet::new(),
            slots: Vec::new(),
            retired: VecDeque::new(),
            next: 1,
            capacity,
        }
    }

    /// Create a table with no practical name cap
    pub fn unbounded() -> Self {
        Self::new(u32::MAX)
    }

    // ===== NAME ALLOCATION =====

    /// Reserve a name, transitioning it Free -> Named.
    ///
    /// Recycles the oldest retired name first, then falls back to the
    /// next never-issued integer.
    ///
    /// # Errors
    ///
    /// [`Error::NamesExhausted`] when every name below capacity is Named,
    /// Live, or has never been retired.
    pub fn create_name(&mut self) -> Result<Handle> {
        let value = match self.retired.pop_front() {
            Some(recycled) => recycled,
            None => {
                if self.next >= self.capacity {
                    return Err(Error::NamesExhausted);
                }
                let fresh = self.next;
                self.next += 1;
                fresh
            }
        };
        self.named.insert(value);
        Ok(Handle(value))
    }

    /// Reserve `n` names at once.
    ///
    /// All-or-nothing: fails without reserving anything if fewer than `n`
    /// names are available.
    pub fn create_names(&mut self, n: u32) -> Result<Vec<Handle>> {
        let available = (self.capacity - self.next) as u64 + self.retired.len() as u64;
        if available < n as u64 {
            return Err(Error::NamesExhausted);
        }
        Ok((0..n)
            .map(|_| self.create_name().expect("availability checked above"))
            .collect())
    }

    // ===== OBJECT CONSTRUCTION =====

    /// Attach a constructed object to a Named handle (Named -> Live).
    ///
    /// Growing the slot storage preserves previously constructed slots.
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Named, or already has an object.
    pub fn create_object(&mut self, h: Handle, value: T) {
        assert!(
            self.is_name(h),
            "create_object on handle {} which is not a name",
            h.index()
        );
        assert!(
            !self.is_object(h),
            "create_object on handle {} which already has an object",
            h.index()
        );
        let index = h.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
        self.live.insert(h.index());
    }

    // ===== MEMBERSHIP QUERIES =====

    /// Whether `h` is Named or Live.
    ///
    /// Consults the bit set only; safe on arbitrary untrusted integers.
    pub fn is_name(&self, h: Handle) -> bool {
        self.named.contains(h.index())
    }

    /// Whether `h` is Live (has a constructed object).
    ///
    /// Consults the bit set only; safe on arbitrary untrusted integers.
    pub fn is_object(&self, h: Handle) -> bool {
        self.live.contains(h.index())
    }

    // ===== SLOT ACCESS =====

    /// Access the object attached to a Live handle.
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Live. Callers holding untrusted handles use
    /// [`HandleTable::get`] instead.
    pub fn at(&mut self, h: Handle) -> &mut T {
        assert!(
            self.is_object(h),
            "handle {} used where a live object was required",
            h.index()
        );
        self.slots[h.index() as usize]
            .as_mut()
            .expect("live bit set without a constructed slot")
    }

    /// Checked lookup for untrusted handles
    pub fn get(&self, h: Handle) -> Option<&T> {
        if !self.is_object(h) {
            return None;
        }
        self.slots[h.index() as usize].as_ref()
    }

    // ===== RETIREMENT =====

    /// Destroy `h`: drop its object (if Live), clear its bits, and retire
    /// the name for reuse.
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Named or Live.
    pub fn destroy(&mut self, h: Handle) {
        assert!(
            self.is_name(h),
            "destroy on handle {} which is not a name",
            h.index()
        );
        let index = h.index() as usize;
        if self.is_object(h) {
            self.slots[index] = None;
            self.live.remove(h.index());
        }
        self.named.remove(h.index());
        self.retired.push_back(h.index());
    }

    /// Retire the name of a Live handle without destroying its object,
    /// returning the still-alive value to the caller.
    ///
    /// Used when the object must keep living (it is referenced elsewhere)
    /// after its name is surrendered.
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Live.
    pub fn detach(&mut self, h: Handle) -> T {
        assert!(
            self.is_object(h),
            "detach on handle {} which has no object",
            h.index()
        );
        let value = self.slots[h.index() as usize]
            .take()
            .expect("live bit set without a constructed slot");
        self.live.remove(h.index());
        self.named.remove(h.index());
        self.retired.push_back(h.index());
        value
    }

    // ===== OBSERVERS =====

    /// Number of currently Named or Live handles
    pub fn len(&self) -> u32 {
        self.named.len()
    }

    /// Whether no handles are Named or Live
    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    /// Highest name ever issued + 1
    pub fn high_water_mark(&self) -> u32 {
        self.next
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "handle_table_tests.rs"]
mod tests;
