//! Deferred reclamation for displaced values.
//!
//! A value box swapped out of a slot under the shared latch may still be
//! read by a concurrent shared holder, so it cannot be freed in place.
//! Displacers push it onto this lock-free list; the list is drained under
//! the exclusive latch (resize, clear, iterator construction) or when the
//! map is dropped, at which point no shared holder can remain.

use alloc::boxed::Box;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

struct Retired<V> {
    value: *mut V,
    next: *mut Retired<V>,
}

pub(crate) struct RetiredList<V> {
    head: AtomicPtr<Retired<V>>,
}

// SAFETY: the list only hands values across threads for destruction.
unsafe impl<V: Send> Send for RetiredList<V> {}
unsafe impl<V: Send> Sync for RetiredList<V> {}

impl<V> RetiredList<V> {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Park a displaced value box for later destruction.
    pub(crate) fn retire(&self, value: *mut V) {
        let node = Box::into_raw(Box::new(Retired {
            value,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: node is not yet shared; plain write is fine.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Drop every parked value.
    ///
    /// # Safety
    ///
    /// No shared-latch holder may be active: the caller holds the latch
    /// exclusively or owns the map.
    pub(crate) unsafe fn drain(&self) {
        let mut node = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        while !node.is_null() {
            // SAFETY: nodes and their values are uniquely owned once
            // unlinked from the head.
            let retired = unsafe { Box::from_raw(node) };
            unsafe { drop(Box::from_raw(retired.value)) };
            node = retired.next;
        }
    }
}

impl<V> Drop for RetiredList<V> {
    fn drop(&mut self) {
        // SAFETY: &mut self means no other holder exists.
        unsafe { self.drain() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn drain_drops_everything_once() {
        let list = RetiredList::new();
        for _ in 0..10 {
            list.retire(Box::into_raw(Box::new(Counted)));
        }
        unsafe { list.drain() };
        assert_eq!(DROPS.load(Ordering::Relaxed), 10);

        list.retire(Box::into_raw(Box::new(Counted)));
        drop(list);
        assert_eq!(DROPS.load(Ordering::Relaxed), 11);
    }
}
