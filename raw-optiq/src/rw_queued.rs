// Fair queued reader/writer latch after Mellor-Crummey and Scott,
// "Scalable reader-writer synchronization for shared-memory
// multiprocessors" (PPoPP '91): one FIFO queue for both classes, a
// next-writer word, and a count of active readers.

use core::marker::PhantomPinned;
use core::ptr;
use core::sync::atomic::{fence, AtomicPtr, AtomicU32, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot_core::SpinWait;

const CLASS_READER: u64 = 0;
const CLASS_WRITER: u64 = 1;

// State word: blocked flag in the low half, successor class in the high
// half. Blocked only ever transitions 1 -> 0 after publication, so it is
// cleared with a fetch_and; the successor class transitions None -> X at
// most once per acquisition, so it is set with a fetch_or.
const BLOCKED: u64 = 1;
const SUCC_NONE: u64 = 0;
const SUCC_READER: u64 = 1 << 32;
const SUCC_WRITER: u64 = 2 << 32;
const SUCC_MASK: u64 = !(u32::MAX as u64);

/// Wait record for [`McsRwLock`], one per in-flight acquisition of either
/// class. Same ownership rules as [`WaitNode`](crate::WaitNode): caller
/// storage, address-stable from lock to unlock.
#[derive(Default)]
pub struct RwWaitNode {
    next: CachePadded<AtomicPtr<RwWaitNode>>,
    class: CachePadded<AtomicU64>,
    state: CachePadded<AtomicU64>,
    #[cfg(debug_assertions)]
    owner: AtomicPtr<()>,
    _pinned: PhantomPinned,
}

impl RwWaitNode {
    pub const fn new() -> Self {
        RwWaitNode {
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            class: CachePadded::new(AtomicU64::new(CLASS_READER)),
            state: CachePadded::new(AtomicU64::new(0)),
            #[cfg(debug_assertions)]
            owner: AtomicPtr::new(ptr::null_mut()),
            _pinned: PhantomPinned,
        }
    }

    fn enqueue_as(&self, class: u64) {
        self.class.store(class, Ordering::SeqCst);
        self.state.store(BLOCKED | SUCC_NONE, Ordering::SeqCst);
        self.next.store(ptr::null_mut(), Ordering::SeqCst);
    }

    fn set_next(&self, next: *mut RwWaitNode) {
        self.next.store(next, Ordering::SeqCst);
    }

    fn next(&self) -> *mut RwWaitNode {
        self.next.load(Ordering::Acquire)
    }

    fn class(&self) -> u64 {
        self.class.load(Ordering::Acquire)
    }

    fn blocked(&self) -> bool {
        self.state.load(Ordering::Acquire) & BLOCKED != 0
    }

    fn unblock(&self) {
        self.state.fetch_and(!BLOCKED, Ordering::SeqCst);
    }

    fn succ_class(&self) -> u64 {
        self.state.load(Ordering::Acquire) & SUCC_MASK
    }

    fn mark_succ(&self, succ: u64) {
        self.state.fetch_or(succ, Ordering::SeqCst);
    }

    fn try_mark_succ_reader(&self) -> bool {
        self.state
            .compare_exchange(
                BLOCKED | SUCC_NONE,
                BLOCKED | SUCC_READER,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    #[cfg(debug_assertions)]
    fn set_owner(&self, lock: *const ()) {
        self.owner.store(lock as *mut (), Ordering::Relaxed);
    }

    #[cfg(debug_assertions)]
    fn assert_owner(&self, lock: *const ()) {
        assert!(
            self.owner.load(Ordering::Relaxed) == lock as *mut (),
            "rw wait node released against a lock it was not acquired on"
        );
    }
}

/// Fair queued reader/writer latch.
///
/// Readers overlap; writers are exclusive; both classes are served in a
/// single FIFO order, so neither starves the other. Every waiter spins on
/// its own node.
#[derive(Default)]
pub struct McsRwLock {
    tail: CachePadded<AtomicPtr<RwWaitNode>>,
    next_writer: CachePadded<AtomicPtr<RwWaitNode>>,
    reader_count: CachePadded<AtomicU32>,
}

impl McsRwLock {
    pub const fn new() -> Self {
        McsRwLock {
            tail: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            next_writer: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            reader_count: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// # Safety
    ///
    /// `node` must stay valid and address-stable until the matching
    /// [`write_unlock`](Self::write_unlock), called exactly once.
    pub unsafe fn write_lock(&self, node: &RwWaitNode) {
        #[cfg(debug_assertions)]
        node.set_owner(self as *const Self as *const ());

        node.enqueue_as(CLASS_WRITER);
        let self_ptr = node as *const RwWaitNode as *mut RwWaitNode;
        let prev = self.tail.swap(self_ptr, Ordering::SeqCst);

        if prev.is_null() {
            // Empty queue: contend only with in-flight readers.
            self.next_writer.swap(self_ptr, Ordering::SeqCst);
            if self.reader_count.load(Ordering::Acquire) == 0
                && self.next_writer.swap(ptr::null_mut(), Ordering::SeqCst) == self_ptr
            {
                node.unblock();
                return;
            }
        } else {
            (*prev).mark_succ(SUCC_WRITER);
            fence(Ordering::SeqCst);
            (*prev).set_next(self_ptr);
        }

        let mut spin = SpinWait::new();
        while node.blocked() {
            spin.spin();
        }
    }

    /// # Safety
    ///
    /// `node` must be the node passed to the matching
    /// [`write_lock`](Self::write_lock) on this lock.
    pub unsafe fn write_unlock(&self, node: &RwWaitNode) {
        #[cfg(debug_assertions)]
        node.assert_owner(self as *const Self as *const ());

        let self_ptr = node as *const RwWaitNode as *mut RwWaitNode;
        let mut succ = node.next();
        if succ.is_null() {
            if self
                .tail
                .compare_exchange(self_ptr, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
            let mut spin = SpinWait::new();
            loop {
                succ = node.next();
                if !succ.is_null() {
                    break;
                }
                spin.spin();
            }
        }

        if (*succ).class() == CLASS_READER {
            self.reader_count.fetch_add(1, Ordering::SeqCst);
        }
        (*succ).unblock();
    }

    /// # Safety
    ///
    /// `node` must stay valid and address-stable until the matching
    /// [`read_unlock`](Self::read_unlock), called exactly once.
    pub unsafe fn read_lock(&self, node: &RwWaitNode) {
        #[cfg(debug_assertions)]
        node.set_owner(self as *const Self as *const ());

        node.enqueue_as(CLASS_READER);
        let self_ptr = node as *const RwWaitNode as *mut RwWaitNode;
        let prev = self.tail.swap(self_ptr, Ordering::SeqCst);

        if prev.is_null() {
            self.reader_count.fetch_add(1, Ordering::SeqCst);
            node.unblock();
        } else if (*prev).class() == CLASS_WRITER || (*prev).try_mark_succ_reader() {
            // Predecessor is a writer, or a still-blocked reader that will
            // chain our wakeup: wait our turn.
            (*prev).set_next(self_ptr);
            let mut spin = SpinWait::new();
            while node.blocked() {
                spin.spin();
            }
        } else {
            // Predecessor is an active reader; read alongside it.
            self.reader_count.fetch_add(1, Ordering::SeqCst);
            (*prev).set_next(self_ptr);
            node.unblock();
        }

        if node.succ_class() == SUCC_READER {
            let mut succ = node.next();
            let mut spin = SpinWait::new();
            while succ.is_null() {
                spin.spin();
                succ = node.next();
            }
            self.reader_count.fetch_add(1, Ordering::SeqCst);
            (*succ).unblock();
        }
    }

    /// # Safety
    ///
    /// `node` must be the node passed to the matching
    /// [`read_lock`](Self::read_lock) on this lock.
    pub unsafe fn read_unlock(&self, node: &RwWaitNode) {
        #[cfg(debug_assertions)]
        node.assert_owner(self as *const Self as *const ());

        let self_ptr = node as *const RwWaitNode as *mut RwWaitNode;
        let mut succ = node.next();
        let mut detached = false;
        if succ.is_null() {
            if self
                .tail
                .compare_exchange(self_ptr, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                detached = true;
            } else {
                let mut spin = SpinWait::new();
                loop {
                    succ = node.next();
                    if !succ.is_null() {
                        break;
                    }
                    spin.spin();
                }
            }
        }

        if !detached && node.succ_class() == SUCC_WRITER {
            self.next_writer.swap(succ, Ordering::SeqCst);
        }

        // Last reader out hands over to the pending writer, rechecking the
        // count because new readers may have slipped in.
        if self.reader_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            let writer = self.next_writer.load(Ordering::Acquire);
            if !writer.is_null()
                && self.reader_count.load(Ordering::Acquire) == 0
                && self
                    .next_writer
                    .compare_exchange(writer, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                (*writer).unblock();
            }
        }
    }
}
