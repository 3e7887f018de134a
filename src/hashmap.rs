//! Concurrent open-addressing hash map with per-slot atomic states.
//!
//! # Architecture
//!
//! - **Slots**: a power-of-two array; each slot tags its lifecycle in an
//!   atomic cell and holds the value behind an atomic pointer.
//! - **Probing**: linear, `(hash + i) & mask`, terminating at EMPTY or a
//!   key match; tombstones and unpublished writes are probed through.
//! - **Concurrency**: fresh inserts claim slots with an EMPTY -> WRITING
//!   CAS; overwrite and removal linearize on a value-pointer swap. The
//!   shared/exclusive latch serializes resizing against everything else.

use alloc::boxed::Box;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;
use foldhash::fast::FixedState;

use crate::error::MapError;
use crate::latch::{ExclusiveGuard, Latch};
use crate::retired::RetiredList;
use crate::slot;
use crate::table::Table;

/// Default capacity for the convenience constructors.
const DEFAULT_CAPACITY: usize = 64;

/// Outcome of one probe pass over the active table.
enum Attempt<V> {
    /// A fresh entry was published; the load-factor check is pending.
    Fresh,
    /// An existing entry was overwritten; carries the previous value.
    Replaced(V),
    /// The key was already present and left untouched (if-absent mode).
    Exists(V),
    /// A full probe cycle found neither EMPTY nor a match; the table is
    /// saturated with tombstones and needs a rebuild. Hands the (possibly
    /// re-boxed) value back for the retry.
    Exhausted(*mut V),
}

/// A concurrent hash map with per-slot atomic states and a latched resize.
///
/// Lookups, inserts and removals run under the latch in shared mode and
/// never block each other; a resize takes the latch exclusively, rebuilds
/// a doubled table single-threaded and republishes it. Values are returned
/// by clone, so `V: Clone` (cheap handles like `Arc<T>` work well).
pub struct HashMap<K, V, S = FixedState> {
    table: AtomicPtr<Table<K, V>>,
    count: AtomicUsize,
    latch: Latch,
    retired: RetiredList<V>,
    hasher: S,
}

// SAFETY: the map owns its keys and values; moving the map moves them.
unsafe impl<K: Send, V: Send, S: Send> Send for HashMap<K, V, S> {}
// SAFETY: shared-reference operations insert owned K/V from any thread and
// hand out clones, so both must be Send + Sync.
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for HashMap<K, V, S> {}

#[cfg(feature = "std")]
impl<K, V> HashMap<K, V, FixedState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty map with the default capacity and hasher.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty map with at least `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FixedState::default())
    }
}

#[cfg(feature = "std")]
impl<K, V> Default for HashMap<K, V, FixedState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Creates an empty map with the default capacity and a custom hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Creates an empty map with at least `capacity` slots and a custom
    /// hasher. Capacity is rounded up to a power of two.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self::from_table(Table::new(capacity), hasher)
    }

    /// Fallible constructor: surfaces allocator failure instead of
    /// aborting. Capacity is rounded up to a power of two.
    pub fn try_with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self, MapError> {
        let capacity = capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(MapError::CapacityOverflow)?;
        Ok(Self::from_table(Table::try_new(capacity)?, hasher))
    }

    fn from_table(table: Table<K, V>, hasher: S) -> Self {
        Self {
            table: AtomicPtr::new(Box::into_raw(Box::new(table))),
            count: AtomicUsize::new(0),
            latch: Latch::new(),
            retired: RetiredList::new(),
            hasher,
        }
    }

    /// Number of live entries. Advisory under concurrent mutation.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Whether the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current slot count of the active table: a power of two that only
    /// grows. Advisory under concurrent mutation.
    pub fn capacity(&self) -> usize {
        let _shared = self.latch.shared();
        // SAFETY: the shared latch keeps the active table alive.
        unsafe { &*self.table.load(Ordering::Acquire) }.capacity()
    }

    /// Looks up a key and returns a clone of its value.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let _shared = self.latch.shared();
        // SAFETY: the shared latch keeps the active table alive.
        let table = unsafe { &*self.table.load(Ordering::Acquire) };

        let mut index = table.home(hash);
        for _ in 0..table.capacity() {
            let slot = table.slot(index);
            match slot.state(Ordering::Acquire) {
                slot::EMPTY => return None,
                slot::OCCUPIED => {
                    // SAFETY: acquire load of OCCUPIED pairs with the
                    // publishing release store.
                    if unsafe { slot.hash() } == hash && unsafe { slot.key_ref() }.borrow() == key {
                        let value = slot.value_ptr(Ordering::Acquire);
                        if !value.is_null() {
                            // SAFETY: a non-null value stays alive at
                            // least until the next exclusive section, and
                            // we hold the latch in shared mode.
                            return Some(unsafe { (*value).clone() });
                        }
                        // A removal already emptied this slot; its
                        // tombstone tag may lag. Probe on.
                    }
                }
                // WRITING is an unpublished insert, DELETED a tombstone;
                // neither terminates the probe.
                _ => {}
            }
            index = table.next(index);
        }
        None
    }

    /// Whether the map currently holds `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair, returning the previous value if the key
    /// was present.
    ///
    /// Fails only when a needed table rebuild cannot allocate. Existing
    /// entries are untouched by the failure and the caller may retry.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>, MapError> {
        self.insert_impl(key, value, false)
    }

    /// Inserts only if the key is absent; returns the existing value
    /// otherwise, leaving it untouched.
    pub fn insert_if_absent(&self, key: K, value: V) -> Result<Option<V>, MapError> {
        self.insert_impl(key, value, true)
    }

    fn insert_impl(&self, key: K, value: V, only_if_absent: bool) -> Result<Option<V>, MapError> {
        let hash = self.hasher.hash_one(&key);
        let mut value_ptr = Box::into_raw(Box::new(value));

        loop {
            let shared = self.latch.shared();
            let table_ptr = self.table.load(Ordering::Acquire);
            // SAFETY: the shared latch keeps the active table alive.
            let table = unsafe { &*table_ptr };
            let capacity = table.capacity();

            match self.probe_insert(table, hash, &key, value_ptr, only_if_absent) {
                Attempt::Fresh => {
                    let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
                    drop(shared);
                    if 4 * count > 3 * capacity {
                        self.resize(table_ptr, false)?;
                    }
                    return Ok(None);
                }
                Attempt::Replaced(previous) => return Ok(Some(previous)),
                Attempt::Exists(existing) => {
                    drop(shared);
                    // The if-absent path never swaps, so our box is still
                    // the one allocated above and uniquely ours.
                    unsafe { drop(Box::from_raw(value_ptr)) };
                    return Ok(Some(existing));
                }
                Attempt::Exhausted(returned) => {
                    value_ptr = returned;
                    drop(shared);
                    if let Err(err) = self.resize(table_ptr, true) {
                        unsafe { drop(Box::from_raw(value_ptr)) };
                        return Err(err);
                    }
                }
            }
        }
    }

    /// One probe pass over `table` under the shared latch.
    fn probe_insert(
        &self,
        table: &Table<K, V>,
        hash: u64,
        key: &K,
        mut value_ptr: *mut V,
        only_if_absent: bool,
    ) -> Attempt<V> {
        let backoff = Backoff::new();
        let mut index = table.home(hash);
        let mut steps = 0;

        while steps < table.capacity() {
            let slot = table.slot(index);
            match slot.state(Ordering::Acquire) {
                slot::EMPTY => {
                    if slot.try_claim() {
                        // SAFETY: we own the WRITING claim.
                        unsafe { slot.publish(hash, key.clone(), value_ptr) };
                        return Attempt::Fresh;
                    }
                    // Lost the claim race; re-examine this slot.
                    continue;
                }
                slot::WRITING => {
                    // An unpublished insert may be this same key. Wait out
                    // the winner's two stores, then re-examine, so a
                    // duplicate can never land further down the cycle.
                    backoff.snooze();
                    continue;
                }
                slot::OCCUPIED => {
                    // SAFETY: acquire load of OCCUPIED pairs with the
                    // publishing release store.
                    if unsafe { slot.hash() } == hash && unsafe { slot.key_ref() } == key {
                        if only_if_absent {
                            let existing = slot.value_ptr(Ordering::Acquire);
                            if !existing.is_null() {
                                // SAFETY: alive until the next exclusive
                                // section; we hold the shared latch.
                                return Attempt::Exists(unsafe { (*existing).clone() });
                            }
                            // Removal in flight: fall through and probe on.
                        } else {
                            let displaced = slot.swap_value(value_ptr);
                            if displaced.is_null() {
                                // A concurrent removal linearized first;
                                // our box landed in its tombstone and will
                                // be reclaimed with it. Re-box a copy and
                                // continue as a fresh insert.
                                // SAFETY: the tombstoned box stays alive
                                // until the next exclusive section.
                                let copy = unsafe { (*value_ptr).clone() };
                                value_ptr = Box::into_raw(Box::new(copy));
                            } else {
                                // SAFETY: displaced stays alive until the
                                // next exclusive section.
                                let previous = unsafe { (*displaced).clone() };
                                self.retired.retire(displaced);
                                return Attempt::Replaced(previous);
                            }
                        }
                    }
                }
                // DELETED: tombstones are traversed, never reused.
                _ => {}
            }
            index = table.next(index);
            steps += 1;
        }
        Attempt::Exhausted(value_ptr)
    }

    /// Removes a key, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let _shared = self.latch.shared();
        // SAFETY: the shared latch keeps the active table alive.
        let table = unsafe { &*self.table.load(Ordering::Acquire) };

        let mut index = table.home(hash);
        for _ in 0..table.capacity() {
            let slot = table.slot(index);
            match slot.state(Ordering::Acquire) {
                slot::EMPTY => return None,
                slot::OCCUPIED => {
                    // SAFETY: acquire load of OCCUPIED pairs with the
                    // publishing release store.
                    if unsafe { slot.hash() } == hash && unsafe { slot.key_ref() }.borrow() == key {
                        let displaced = slot.swap_value(ptr::null_mut());
                        if !displaced.is_null() {
                            slot.mark_deleted();
                            self.count.fetch_sub(1, Ordering::Relaxed);
                            // SAFETY: displaced stays alive until the next
                            // exclusive section.
                            let removed = unsafe { (*displaced).clone() };
                            self.retired.retire(displaced);
                            return Some(removed);
                        }
                        // Another remover won this slot; probe on.
                    }
                }
                _ => {}
            }
            index = table.next(index);
        }
        None
    }

    /// Drops every entry, keeping the current capacity.
    pub fn clear(&self) {
        let _exclusive = self.latch.exclusive();
        // SAFETY: exclusive access; the table cannot change under us.
        let table = unsafe { &*self.table.load(Ordering::Acquire) };
        for index in 0..table.capacity() {
            let slot = table.slot(index);
            match slot.state(Ordering::Relaxed) {
                slot::OCCUPIED | slot::DELETED => {
                    // SAFETY: exclusive access and a settled payload tag.
                    unsafe { slot.reset() };
                }
                _ => {}
            }
        }
        self.count.store(0, Ordering::Relaxed);
        // SAFETY: we hold the latch exclusively.
        unsafe { self.retired.drain() };
    }

    /// Returns a snapshot iterator over `(key, value)` clones.
    ///
    /// The iterator holds the resize latch exclusively: concurrent
    /// operations block until it is dropped, and calling any map operation
    /// from the same thread while it lives will deadlock.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        let guard = self.latch.exclusive();
        // SAFETY: we hold the latch exclusively.
        unsafe { self.retired.drain() };
        Iter {
            map: self,
            index: 0,
            _guard: guard,
        }
    }

    /// Returns a snapshot iterator over cloned keys.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Rebuild the table under the exclusive latch.
    ///
    /// `forced` rebuilds even without load-factor pressure (tombstone
    /// saturation), but only if the table the caller probed is still the
    /// active one; a load-factor resize instead re-checks the threshold,
    /// since another inserter may already have grown the map.
    fn resize(&self, observed: *mut Table<K, V>, forced: bool) -> Result<(), MapError> {
        let _exclusive = self.latch.exclusive();

        let table_ptr = self.table.load(Ordering::Acquire);
        if forced && !ptr::eq(table_ptr, observed) {
            return Ok(());
        }
        // SAFETY: exclusive access; the table cannot change under us.
        let table = unsafe { &*table_ptr };
        let capacity = table.capacity();
        let count = self.count.load(Ordering::Relaxed);

        let mut new_capacity = capacity;
        while 4 * count > 3 * new_capacity {
            new_capacity = new_capacity
                .checked_mul(2)
                .ok_or(MapError::CapacityOverflow)?;
        }
        if !forced && new_capacity == capacity {
            return Ok(());
        }

        let mut fresh = Table::try_new(new_capacity)?;
        for index in 0..capacity {
            let slot = table.slot(index);
            match slot.state(Ordering::Relaxed) {
                slot::OCCUPIED => {
                    // SAFETY: exclusive access and an OCCUPIED tag.
                    let (hash, key, value) = unsafe { slot.take() };
                    fresh.rebuild_insert(hash, key, value);
                }
                slot::DELETED => {
                    // SAFETY: exclusive access and a settled payload tag.
                    unsafe { slot.reset() };
                }
                _ => {}
            }
        }

        self.table
            .store(Box::into_raw(Box::new(fresh)), Ordering::Release);
        // SAFETY: the old table is unpublished and drained of live
        // entries; no shared holder can still reference it.
        unsafe { drop(Box::from_raw(table_ptr)) };
        // SAFETY: we hold the latch exclusively.
        unsafe { self.retired.drain() };
        Ok(())
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        let table = *self.table.get_mut();
        // SAFETY: &mut self; the table pointer is uniquely ours and every
        // settled slot frees its own payload.
        unsafe { drop(Box::from_raw(table)) };
    }
}

/// Snapshot iterator returned by [`HashMap::iter`].
///
/// Holds the resize latch exclusively for its lifetime, excluding every
/// concurrent map operation.
pub struct Iter<'a, K, V, S = FixedState> {
    map: &'a HashMap<K, V, S>,
    index: usize,
    _guard: ExclusiveGuard<'a>,
}

impl<K, V, S> Iterator for Iter<'_, K, V, S>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        // SAFETY: the exclusive guard keeps the table pointer stable.
        let table = unsafe { &*self.map.table.load(Ordering::Acquire) };
        while self.index < table.capacity() {
            let slot = table.slot(self.index);
            self.index += 1;
            if slot.state(Ordering::Relaxed) == slot::OCCUPIED {
                let value = slot.value_ptr(Ordering::Relaxed);
                // SAFETY: under the exclusive latch no writer is active,
                // so OCCUPIED implies a published key and non-null value.
                let key = unsafe { slot.key_ref() }.clone();
                let value = unsafe { (*value).clone() };
                return Some((key, value));
            }
        }
        None
    }
}
