//! Thread-local ergonomics over the raw optimistic queued latch: a
//! [`lock_api`] mutex whose queue nodes live in a per-thread slab, and
//! [`VersionedCell`] for version-validated payload reads.

use std::cell::Cell;
use std::ptr;

use lock_api::{GuardNoSend, RawMutex};
use raw_optiq::{OptiqLock, WaitNode};

mod cell;

pub use cell::{RetryPolicy, VersionedCell};

/// How many queued locks one thread may hold at once. Lock coupling over a
/// tree rarely needs more than the tree height, so a small fixed block per
/// thread suffices.
const NODE_SLOTS: usize = 8;

struct NodeSlab {
    nodes: [WaitNode; NODE_SLOTS],
    owners: [Cell<*const ()>; NODE_SLOTS],
}

impl NodeSlab {
    const fn new() -> Self {
        NodeSlab {
            nodes: [const { WaitNode::new() }; NODE_SLOTS],
            owners: [const { Cell::new(ptr::null()) }; NODE_SLOTS],
        }
    }

    fn claim(&self, lock_id: *const ()) -> usize {
        for (slot, owner) in self.owners.iter().enumerate() {
            if owner.get().is_null() {
                owner.set(lock_id);
                return slot;
            }
        }
        panic!("a thread may hold at most {NODE_SLOTS} queued locks at once");
    }

    fn find(&self, lock_id: *const ()) -> Option<usize> {
        self.owners.iter().position(|owner| owner.get() == lock_id)
    }

    fn free(&self, slot: usize) {
        self.owners[slot].set(ptr::null());
    }

    fn node(&self, slot: usize) -> &WaitNode {
        &self.nodes[slot]
    }
}

std::thread_local! {
    static SLAB: NodeSlab = const { NodeSlab::new() };
}

/// Raw mutex face of [`OptiqLock`] for `lock_api`, with queue nodes drawn
/// from the calling thread's slab. Released slots are found again by the
/// owning lock's address, so locks taken by one thread may be released in
/// any order (lock coupling).
pub struct RawOptiq(OptiqLock);

unsafe impl RawMutex for RawOptiq {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawOptiq = RawOptiq(OptiqLock::new());

    // The queue node stays on the acquiring thread, so the guard must too.
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let lock_id = self as *const Self as *const ();
        SLAB.with(|slab| {
            let slot = slab.claim(lock_id);
            // SAFETY: slab storage is address-stable for the thread's
            // lifetime and the slot stays claimed until `unlock` pairs the
            // release on this same thread (the guard cannot be sent away).
            unsafe { self.0.write_acquire(slab.node(slot)) }
        })
    }

    fn try_lock(&self) -> bool {
        let snapshot = self.0.read_begin();
        if !snapshot.is_stable() {
            return false;
        }
        let lock_id = self as *const Self as *const ();
        SLAB.with(|slab| {
            let slot = slab.claim(lock_id);
            // SAFETY: as in `lock`; on failure the slot is returned unused.
            if unsafe { self.0.try_write_acquire(slab.node(slot), snapshot) } {
                true
            } else {
                slab.free(slot);
                false
            }
        })
    }

    unsafe fn unlock(&self) {
        let lock_id = self as *const Self as *const ();
        SLAB.with(|slab| match slab.find(lock_id) {
            Some(slot) => {
                // SAFETY: the slot was claimed by `lock` on this thread for
                // this lock, so the node is the one the acquire used.
                unsafe { self.0.write_release(slab.node(slot)) };
                slab.free(slot);
            }
            None => panic!("unlocking logic error detected"),
        })
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.0.is_locked()
    }
}

pub type OptiqMutex<T> = lock_api::Mutex<RawOptiq, T>;
pub type OptiqMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawOptiq, T>;

#[cfg(test)]
mod test {
    use std::thread;

    use rayon::prelude::*;

    use super::*;

    #[test]
    fn guarded_counter() {
        let mutex = OptiqMutex::new(0u64);
        thread::scope(|scope| {
            for _ in 0..8 {
                let mutex = &mutex;
                scope.spawn(move || {
                    for _ in 0..100 {
                        *mutex.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(*mutex.lock(), 800);
    }

    #[test]
    fn par_iter_stress() {
        let mutex = OptiqMutex::new(0u64);
        (0..10_000u64).into_par_iter().for_each(|_| {
            *mutex.lock() += 1;
        });
        assert_eq!(*mutex.lock(), 10_000);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = OptiqMutex::new(());
        let guard = mutex.lock();
        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(mutex.try_lock().is_none());
            });
        });
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn coupling_releases_out_of_order() {
        // Parent-then-child acquisition with the parent released first, as
        // tree descent does; slot lookup must pick the right node.
        let parent = OptiqMutex::new(1u64);
        let child = OptiqMutex::new(2u64);
        thread::scope(|scope| {
            for _ in 0..4 {
                let parent = &parent;
                let child = &child;
                scope.spawn(move || {
                    for _ in 0..100 {
                        let p = parent.lock();
                        let c = child.lock();
                        drop(p);
                        drop(c);
                    }
                });
            }
        });
        assert_eq!(*parent.lock(), 1);
        assert_eq!(*child.lock(), 2);
    }
}
