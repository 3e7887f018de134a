//! The slot array and its probe scheme.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use crate::error::MapError;
use crate::slot::{self, Slot};

/// A power-of-two array of slots with linear probing. One table is active
/// at a time; a resize builds a fresh one and swaps the map's pointer.
pub(crate) struct Table<K, V> {
    slots: Box<[Slot<K, V>]>,
    mask: usize,
}

impl<K, V> Table<K, V> {
    /// Allocate a table of `capacity` EMPTY slots.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::new());
        }
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        }
    }

    /// Fallible variant of [`new`], surfacing allocator failure instead of
    /// aborting.
    ///
    /// [`new`]: Table::new
    pub(crate) fn try_new(capacity: usize) -> Result<Self, MapError> {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| MapError::AllocationFailed { capacity })?;
        for _ in 0..capacity {
            slots.push(Slot::new());
        }
        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        })
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// First probe index for a hash.
    #[inline(always)]
    pub(crate) fn home(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    /// Successor in the probe cycle.
    #[inline(always)]
    pub(crate) fn next(&self, index: usize) -> usize {
        (index + 1) & self.mask
    }

    #[inline(always)]
    pub(crate) fn slot(&self, index: usize) -> &Slot<K, V> {
        // SAFETY: every index reaching here went through home()/next(),
        // which mask into bounds.
        unsafe { self.slots.get_unchecked(index) }
    }

    /// Insert during a rebuild. The table is not yet published, so plain
    /// stores suffice and no tombstones exist: the first EMPTY slot on the
    /// probe cycle is free. The caller guarantees a free slot exists
    /// (count stays below capacity).
    pub(crate) fn rebuild_insert(&mut self, hash: u64, key: K, value: *mut V) {
        let mut index = (hash as usize) & self.mask;
        loop {
            let slot = &mut self.slots[index];
            if slot.state(Ordering::Relaxed) == slot::EMPTY {
                slot.install(hash, key, value);
                return;
            }
            index = (index + 1) & self.mask;
        }
    }
}
