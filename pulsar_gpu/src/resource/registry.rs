//! Per-type resource registry with the delete/orphan/detach protocol
//!
//! The registry owns every resource of one object type. Names live in a
//! [`HandleTable`] mapping handle -> [`ResourceKey`]; the objects
//! themselves live in a slotmap so they can outlive their names. On
//! deletion the registry decides, from the reference count and the fence
//! clock, whether an object dies now, loses its name but waits for the
//! device (orphan), or loses its name but survives through the
//! references a container still holds (detach).
//!
//! All fence and arena state is threaded through explicitly; the
//! registry never reaches for globals.

use std::collections::VecDeque;

use slotmap::SlotMap;

use crate::error::Result;
use crate::fence::FenceClock;
use crate::handle::{Handle, HandleTable};
use crate::memory::{Allocation, ArenaId, ArenaSet};
use crate::resource::{Resource, ResourceKey};

/// What a delete request did to the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Destroyed immediately: destructor ran, storage freed, name
    /// retired
    Destroyed,
    /// Name retired now; storage parked until the device passes the
    /// resource's last-used timestamp
    Orphaned,
    /// Name retired now; object lives on through counted references and
    /// re-enters the delete protocol when the last one drops
    Detached,
}

/// Registry of one GPU-visible object type.
pub struct ResourceRegistry<T> {
    /// Name -> object key; names recycle through the table's FIFO
    names: HandleTable<ResourceKey>,
    /// Object storage, stable across name retirement
    resources: SlotMap<ResourceKey, Resource<T>>,
    /// Nameless, unreferenced objects waiting out the device:
    /// (guard timestamp, object), oldest first
    orphans: VecDeque<(u32, ResourceKey)>,
}

impl<T> ResourceRegistry<T> {
    /// Registry issuing names in `[1, capacity)`
    pub fn new(capacity: u32) -> Self {
        Self {
            names: HandleTable::new(capacity),
            resources: SlotMap::with_key(),
            orphans: VecDeque::new(),
        }
    }

    // ===== NAMING =====

    /// Reserve a name (Free -> Named)
    pub fn create_name(&mut self) -> Result<Handle> {
        self.names.create_name()
    }

    /// Reserve `n` names at once
    pub fn create_names(&mut self, n: u32) -> Result<Vec<Handle>> {
        self.names.create_names(n)
    }

    /// Whether `h` is a reserved or live name (untrusted-safe)
    pub fn is_name(&self, h: Handle) -> bool {
        self.names.is_name(h)
    }

    /// Whether `h` names a constructed object (untrusted-safe)
    pub fn is_object(&self, h: Handle) -> bool {
        self.names.is_object(h)
    }

    // ===== CONSTRUCTION =====

    /// Attach an object to a Named handle (Named -> Live).
    ///
    /// # Panics
    ///
    /// Panics if `h` is not a bare Named handle.
    pub fn create_object(
        &mut self,
        h: Handle,
        payload: T,
        allocation: Allocation,
        arena: Option<ArenaId>,
    ) -> ResourceKey {
        let key = self
            .resources
            .insert(Resource::new(h, payload, allocation, arena));
        self.names.create_object(h, key);
        key
    }

    // ===== ACCESS =====

    /// Key of a live handle's object.
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Live.
    pub fn key_of(&mut self, h: Handle) -> ResourceKey {
        *self.names.at(h)
    }

    /// Checked payload lookup for untrusted handles
    pub fn get(&self, h: Handle) -> Option<&T> {
        let key = *self.names.get(h)?;
        Some(&self.resources[key].payload)
    }

    /// Full resource header+payload by key (named or not)
    pub fn resource(&self, key: ResourceKey) -> &Resource<T> {
        self.resources.get(key).expect("stale resource key")
    }

    /// Full resource header+payload by key, mutably
    pub fn resource_mut(&mut self, key: ResourceKey) -> &mut Resource<T> {
        self.resources.get_mut(key).expect("stale resource key")
    }

    // ===== FENCE STAMPS =====

    /// Record that a newly issued batch references `h`.
    ///
    /// Timestamps must come from the clock this registry is used with,
    /// via [`ResourceRegistry::next_timestamp`], so epoch turnovers
    /// invalidate stamps coherently.
    pub fn stamp(&mut self, h: Handle, timestamp: u32) {
        let key = *self.names.at(h);
        self.resources[key].set_last_used(timestamp);
    }

    /// Grant `n` timestamps from `clock`, handling an epoch turnover:
    /// when the numbering restarts, every orphan is confirmed done (the
    /// turnover drained the device) and every cached stamp is zeroed so
    /// no comparison ever crosses the epoch reset.
    pub fn next_timestamp(
        &mut self,
        n: u32,
        clock: &mut FenceClock,
        arenas: &mut ArenaSet,
    ) -> Result<u32> {
        let grant = clock.create_timestamp(n)?;
        if grant.epoch_turned {
            while let Some((_, key)) = self.orphans.pop_front() {
                self.destroy_resource(key, arenas);
            }
            for (_, resource) in self.resources.iter_mut() {
                resource.last_used = 0;
            }
        }
        Ok(grant.first)
    }

    // ===== COUNTED REFERENCES =====

    /// Take a counted reference for embedding the object in a container
    pub fn add_ref(&mut self, key: ResourceKey) {
        let resource = self.resources.get_mut(key).expect("stale resource key");
        resource.ref_count += 1;
    }

    /// Drop a counted reference. When the last reference leaves a
    /// deleted resource, the delete protocol is re-applied (the
    /// reference count is now necessarily 0).
    ///
    /// # Panics
    ///
    /// Panics on an unref without a matching ref.
    pub fn unref(
        &mut self,
        key: ResourceKey,
        clock: &mut FenceClock,
        arenas: &mut ArenaSet,
    ) -> Option<DeleteOutcome> {
        let resource = self.resources.get_mut(key).expect("stale resource key");
        assert!(resource.ref_count > 0, "unref without a matching ref");
        resource.ref_count -= 1;
        if resource.ref_count > 0 || !resource.deleted {
            return None;
        }

        let last_used = resource.last_used;
        if last_used != 0 && !clock.passed(last_used) {
            self.orphans.push_back((last_used, key));
            Some(DeleteOutcome::Orphaned)
        } else {
            self.destroy_resource(key, arenas);
            Some(DeleteOutcome::Destroyed)
        }
    }

    // ===== DELETION =====

    /// Delete `h`, consulting the clock for whether the device is still
    /// using the resource. Also reaps any orphans the device has since
    /// finished with.
    pub fn maybe_delete(
        &mut self,
        h: Handle,
        clock: &mut FenceClock,
        arenas: &mut ArenaSet,
    ) -> DeleteOutcome {
        self.collect(clock, arenas);
        let key = *self.names.at(h);
        let last_used = self.resources[key].last_used;
        let in_use = last_used != 0 && !clock.passed(last_used);
        self.maybe_delete_or_orphan(h, in_use, arenas)
    }

    /// Delete `h` with the in-use decision supplied by the caller.
    ///
    /// | ref_count | in_use | action    |
    /// |-----------|--------|-----------|
    /// | 0         | false  | destroy   |
    /// | 0         | true   | orphan    |
    /// | >0        | either | detach    |
    ///
    /// # Panics
    ///
    /// Panics if `h` is not Live, or on a second delete of the same
    /// object.
    pub fn maybe_delete_or_orphan(
        &mut self,
        h: Handle,
        in_use: bool,
        arenas: &mut ArenaSet,
    ) -> DeleteOutcome {
        let key = *self.names.at(h);
        let resource = &mut self.resources[key];
        assert!(!resource.deleted, "object {} deleted twice", h.index());
        resource.deleted = true;
        resource.handle = Handle::NONE;
        let ref_count = resource.ref_count;
        let last_used = resource.last_used;

        if ref_count > 0 {
            let _ = self.names.detach(h);
            DeleteOutcome::Detached
        } else if in_use {
            assert!(last_used != 0, "orphaning an object the device never saw");
            let _ = self.names.detach(h);
            self.orphans.push_back((last_used, key));
            DeleteOutcome::Orphaned
        } else {
            self.names.destroy(h);
            self.destroy_resource(key, arenas);
            DeleteOutcome::Destroyed
        }
    }

    /// Destroy every orphan whose guard timestamp the device has passed;
    /// returns how many died.
    ///
    /// Delete paths call this opportunistically; an epoch turnover
    /// drains the orphanage wholesale.
    pub fn collect(&mut self, clock: &mut FenceClock, arenas: &mut ArenaSet) -> usize {
        let mut reaped = 0;
        let mut keep = VecDeque::new();
        while let Some((timestamp, key)) = self.orphans.pop_front() {
            if clock.passed(timestamp) {
                self.destroy_resource(key, arenas);
                reaped += 1;
            } else {
                keep.push_back((timestamp, key));
            }
        }
        self.orphans = keep;
        reaped
    }

    /// Replace the resource's storage in place.
    ///
    /// If the device may still be reading the old storage this blocks on
    /// the fence before releasing it - an intentional simplicity-over-
    /// throughput trade-off for the re-specification path.
    // TODO: orphan the old allocation and swap in the replacement
    // without stalling, instead of waiting here.
    pub fn respecify(
        &mut self,
        h: Handle,
        new_allocation: Allocation,
        new_arena: Option<ArenaId>,
        clock: &mut FenceClock,
        arenas: &mut ArenaSet,
    ) -> Result<()> {
        let key = *self.names.at(h);
        let last_used = self.resources[key].last_used;
        if last_used != 0 && !clock.passed(last_used) {
            clock.wait(last_used)?;
        }

        let resource = &mut self.resources[key];
        resource.last_used = 0;
        let old_allocation = resource.allocation;
        let old_arena = resource.arena;
        resource.allocation = new_allocation;
        resource.arena = new_arena;

        if let Some(arena) = old_arena {
            arenas.free(arena, old_allocation);
        }
        Ok(())
    }

    /// Drop a resource and free its owned storage
    fn destroy_resource(&mut self, key: ResourceKey, arenas: &mut ArenaSet) {
        let resource = self.resources.remove(key).expect("stale resource key");
        if let Some(arena) = resource.arena {
            arenas.free(arena, resource.allocation);
        }
        // resource.payload drops here
    }

    // ===== OBSERVERS =====

    /// Objects alive in any state (named, detached, orphaned)
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Orphans still waiting on the device
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Names currently reserved or live
    pub fn name_count(&self) -> u32 {
        self.names.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
