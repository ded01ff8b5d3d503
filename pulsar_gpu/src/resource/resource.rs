//! Common shape shared by every GPU-visible object type

use slotmap::new_key_type;

use crate::fence::MAX_TIMESTAMP;
use crate::handle::Handle;
use crate::memory::{Allocation, ArenaId};

new_key_type! {
    /// Stable key into a registry's resource store.
    ///
    /// Keys outlive names: a detached or orphaned resource keeps its key
    /// until destruction even though its handle was retired.
    pub struct ResourceKey;
}

/// Header + payload of one GPU-visible object.
///
/// The deleted flag and the last-used timestamp live in separate fields
/// with an explicit range check (the timestamp stays within 31 bits)
/// rather than sharing a packed machine word.
pub struct Resource<T> {
    /// Name while the resource is reachable by name; NONE once detached
    /// or orphaned
    pub(crate) handle: Handle,
    /// Counted references held by embedding containers
    pub(crate) ref_count: u32,
    /// Set once the owner asked for deletion
    pub(crate) deleted: bool,
    /// Timestamp of the newest submitted batch referencing this
    /// resource; 0 = not pending on the device
    pub(crate) last_used: u32,
    /// Storage, if any; the sentinel for purely procedural objects
    pub(crate) allocation: Allocation,
    /// Arena the storage came from
    pub(crate) arena: Option<ArenaId>,
    /// Type-specific object state
    pub(crate) payload: T,
}

impl<T> Resource<T> {
    pub(crate) fn new(
        handle: Handle,
        payload: T,
        allocation: Allocation,
        arena: Option<ArenaId>,
    ) -> Self {
        Self {
            handle,
            ref_count: 0,
            deleted: false,
            last_used: 0,
            allocation,
            arena,
            payload,
        }
    }

    /// Record a new last-used timestamp.
    ///
    /// # Panics
    ///
    /// Panics if the timestamp regresses (submissions stamp in issue
    /// order) or leaves the 31-bit range.
    pub(crate) fn set_last_used(&mut self, timestamp: u32) {
        assert!(
            timestamp <= MAX_TIMESTAMP,
            "timestamp {} outside the 31-bit sequence",
            timestamp
        );
        assert!(
            timestamp >= self.last_used,
            "resource stamp went backwards ({} after {})",
            timestamp,
            self.last_used
        );
        self.last_used = timestamp;
    }

    // ===== ACCESSORS =====

    /// The resource's name, or NONE once detached/orphaned
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Counted references currently held by containers
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Whether deletion was requested
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Newest submitted timestamp referencing this resource (0 = idle)
    pub fn last_used(&self) -> u32 {
        self.last_used
    }

    /// The resource's storage (possibly the sentinel)
    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    /// Arena the storage came from
    pub fn arena(&self) -> Option<ArenaId> {
        self.arena
    }

    /// Type-specific state
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Type-specific state, mutably
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}
