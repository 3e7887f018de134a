//! The slot state machine.
//!
//! A slot's lifecycle tag lives in an `AtomicU8` and moves strictly
//! forward: `EMPTY -> WRITING -> OCCUPIED -> DELETED`. The payload (cached
//! hash, inline key, boxed value behind an atomic pointer) is only written
//! inside the `WRITING` window, where the claiming thread has exclusive
//! access, and becomes readable once the tag is stored as `OCCUPIED` with
//! release ordering. A published key is never mutated again; the value
//! pointer is replaced by atomic swaps.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

/// Never occupied. Probe sequences terminate here on lookup.
pub(crate) const EMPTY: u8 = 0;
/// Claimed by a writer that has not yet published its payload.
pub(crate) const WRITING: u8 = 1;
/// Holds a live entry.
pub(crate) const OCCUPIED: u8 = 2;
/// Tombstone. Probing continues through it; never reused until a rebuild.
pub(crate) const DELETED: u8 = 3;

/// One bucket of the table.
///
/// `hash` and `key` are plain cells: they are written exactly once, inside
/// the `WRITING` window, and every read is gated by an acquire load of the
/// tag that pairs with the publishing release store. The value pointer is
/// atomic because overwrites and removals replace it after publication.
pub(crate) struct Slot<K, V> {
    state: AtomicU8,
    hash: UnsafeCell<u64>,
    key: UnsafeCell<MaybeUninit<K>>,
    value: AtomicPtr<V>,
}

// SAFETY: the state machine guarantees that the plain cells are written
// only by the thread holding the WRITING claim (or by a caller with
// exclusive access to the whole table), and read only after an acquire
// load observed a post-publish tag. Cross-thread hand-off of K and V is
// part of normal operation, hence the Send + Sync bounds on both.
unsafe impl<K: Send, V: Send> Send for Slot<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Slot<K, V> {}

impl<K, V> Slot<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            hash: UnsafeCell::new(0),
            key: UnsafeCell::new(MaybeUninit::uninit()),
            value: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn state(&self, order: Ordering) -> u8 {
        self.state.load(order)
    }

    /// Claim an EMPTY slot for writing. On failure the slot is left
    /// untouched and the caller re-examines its current state.
    #[inline]
    pub(crate) fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Publish a fresh entry in a slot claimed via [`try_claim`].
    ///
    /// # Safety
    ///
    /// The caller must be the thread that moved this slot to `WRITING` and
    /// must not have published yet.
    ///
    /// [`try_claim`]: Slot::try_claim
    pub(crate) unsafe fn publish(&self, hash: u64, key: K, value: *mut V) {
        unsafe {
            *self.hash.get() = hash;
            (*self.key.get()).write(key);
        }
        self.value.store(value, Ordering::Release);
        self.state.store(OCCUPIED, Ordering::Release);
    }

    /// Cached hash of the stored key.
    ///
    /// # Safety
    ///
    /// The caller must have observed the tag as `OCCUPIED` or `DELETED`
    /// with acquire ordering.
    #[inline]
    pub(crate) unsafe fn hash(&self) -> u64 {
        unsafe { *self.hash.get() }
    }

    /// Reference to the stored key.
    ///
    /// # Safety
    ///
    /// The caller must have observed the tag as `OCCUPIED` or `DELETED`
    /// with acquire ordering. The reference stays valid until the table is
    /// torn down under exclusive access.
    #[inline]
    pub(crate) unsafe fn key_ref(&self) -> &K {
        unsafe { (*self.key.get()).assume_init_ref() }
    }

    #[inline]
    pub(crate) fn value_ptr(&self, order: Ordering) -> *mut V {
        self.value.load(order)
    }

    /// Replace the value pointer, returning the displaced one. This is the
    /// linearization point of both overwrite and removal: a null result
    /// means a concurrent removal already emptied the slot.
    #[inline]
    pub(crate) fn swap_value(&self, new: *mut V) -> *mut V {
        self.value.swap(new, Ordering::AcqRel)
    }

    /// Trail the removal swap with the tombstone tag. Called only by the
    /// remover whose [`swap_value`] returned non-null.
    ///
    /// [`swap_value`]: Slot::swap_value
    #[inline]
    pub(crate) fn mark_deleted(&self) {
        self.state.store(DELETED, Ordering::Release);
    }

    /// Move the payload out during a rebuild, leaving the slot EMPTY.
    ///
    /// # Safety
    ///
    /// Requires exclusive access to the table (resize latch held
    /// exclusively) and the tag read as `OCCUPIED`.
    pub(crate) unsafe fn take(&self) -> (u64, K, *mut V) {
        let hash = unsafe { *self.hash.get() };
        let key = unsafe { (*self.key.get()).assume_init_read() };
        let value = self.value.swap(ptr::null_mut(), Ordering::Relaxed);
        debug_assert!(!value.is_null());
        self.state.store(EMPTY, Ordering::Relaxed);
        (hash, key, value)
    }

    /// Drop the payload in place and return the slot to EMPTY. Used for
    /// tombstone teardown and `clear`.
    ///
    /// # Safety
    ///
    /// Requires exclusive access to the table and the tag read as
    /// `OCCUPIED` or `DELETED`.
    pub(crate) unsafe fn reset(&self) {
        unsafe { (*self.key.get()).assume_init_drop() };
        let value = self.value.swap(ptr::null_mut(), Ordering::Relaxed);
        if !value.is_null() {
            unsafe { drop(Box::from_raw(value)) };
        }
        self.state.store(EMPTY, Ordering::Relaxed);
    }

    /// Single-threaded insert into a table nobody else can see yet.
    pub(crate) fn install(&mut self, hash: u64, key: K, value: *mut V) {
        *self.hash.get_mut() = hash;
        self.key.get_mut().write(key);
        *self.value.get_mut() = value;
        *self.state.get_mut() = OCCUPIED;
    }
}

impl<K, V> Drop for Slot<K, V> {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state == OCCUPIED || state == DELETED {
            // SAFETY: both tags guarantee the key was published and never
            // moved out (take() resets the tag to EMPTY).
            unsafe { self.key.get_mut().assume_init_drop() };
            let value = *self.value.get_mut();
            if !value.is_null() {
                // SAFETY: a non-null pointer in a settled slot is the
                // uniquely-owned box installed by publish or a later swap.
                unsafe { drop(Box::from_raw(value)) };
            }
        }
    }
}
