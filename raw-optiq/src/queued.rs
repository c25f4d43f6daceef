use core::marker::PhantomPinned;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot_core::SpinWait;

use crate::version::{is_version, Version, HELD_BIT, PENDING, VERSION_STRIDE};

/// Debug-build sentinel stored into the grant word after release, so a
/// second release of the same node trips an assertion instead of silently
/// corrupting the queue.
#[cfg(debug_assertions)]
const RELEASED: u64 = u64::MAX;

/// A writer's wait record, one per in-flight acquisition.
///
/// The node lives in the acquiring thread's frame (or any other storage the
/// caller keeps stable) and is linked into the lock's queue by address, so
/// it must not move between `write_acquire` and `write_release`; hence
/// [`PhantomPinned`]. `next` is written at most once per acquisition, only
/// by the thread that enqueues behind this node; `grant` is polled only by
/// this node's owner, which bounds coherence traffic to the owner's own
/// cache lines while waiting.
#[derive(Default)]
pub struct WaitNode {
    next: CachePadded<AtomicPtr<WaitNode>>,
    grant: CachePadded<AtomicU64>,
    #[cfg(debug_assertions)]
    owner: AtomicPtr<()>,
    _pinned: PhantomPinned,
}

impl WaitNode {
    pub const fn new() -> Self {
        WaitNode {
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            grant: CachePadded::new(AtomicU64::new(PENDING)),
            #[cfg(debug_assertions)]
            owner: AtomicPtr::new(ptr::null_mut()),
            _pinned: PhantomPinned,
        }
    }

    fn reset(&self) {
        self.next.store(ptr::null_mut(), Ordering::Release);
        self.grant.store(PENDING, Ordering::Release);
    }

    fn set_next(&self, next: *mut WaitNode) {
        self.next.store(next, Ordering::Release);
    }

    fn next(&self) -> *mut WaitNode {
        self.next.load(Ordering::Acquire)
    }

    fn set_grant(&self, grant: u64) {
        self.grant.store(grant, Ordering::Release);
    }

    fn grant(&self) -> u64 {
        self.grant.load(Ordering::Acquire)
    }

    #[cfg(debug_assertions)]
    fn set_owner(&self, lock: *const ()) {
        self.owner.store(lock as *mut (), Ordering::Relaxed);
    }

    #[cfg(debug_assertions)]
    fn check_release(&self, lock: *const ()) {
        assert!(
            self.owner.load(Ordering::Relaxed) == lock as *mut (),
            "wait node released against a lock it was not acquired on"
        );
        let grant = self.grant();
        assert!(grant != PENDING, "releasing a wait node that was never granted");
        assert!(grant != RELEASED, "wait node released twice");
    }

    #[inline]
    fn mark_released(&self) {
        #[cfg(debug_assertions)]
        self.grant.store(RELEASED, Ordering::Release);
    }
}

/// Optimistic queue-based latch.
///
/// The single word is both the reader-visible version and the writer queue
/// tail:
///
/// ```text
/// |-63-|------------62..0------------|
/// |tag |  version     (tag clear)    |
/// |tag |  tail WaitNode  (tag set)   |
/// ```
///
/// Readers only ever load the word; writers serialize through a FIFO queue
/// of [`WaitNode`]s. While any writer holds or waits, the word carries the
/// tagged tail and readers fail validation. The version a writer publishes
/// travels through the queue: a writer granted from a free lock at version
/// `v` carries `v + 1`, a writer granted by its predecessor carries the
/// predecessor's grant `+ 1`, and the last writer to leave installs its
/// grant back into the word.
#[derive(Default)]
pub struct OptiqLock {
    word: AtomicU64,
}

impl OptiqLock {
    pub const fn new() -> Self {
        OptiqLock {
            word: AtomicU64::new(0),
        }
    }

    fn tail_word(node: &WaitNode) -> u64 {
        let addr = node as *const WaitNode as usize as u64;
        debug_assert!(is_version(addr), "wait node address collides with the tag bit");
        addr | HELD_BIT
    }

    fn tail_node(word: u64) -> *mut WaitNode {
        debug_assert!(!is_version(word));
        (word & !HELD_BIT) as usize as *mut WaitNode
    }

    /// Snapshot the current word. Never blocks; the snapshot may be
    /// unstable, in which case validation will fail and the caller retries
    /// (or falls back to acquiring as a writer).
    #[inline]
    pub fn read_begin(&self) -> Version {
        Version(self.word.load(Ordering::Acquire))
    }

    /// True iff `snapshot` is stable and no writer has held the lock since
    /// it was taken. On success, everything read between `read_begin` and
    /// this call is a consistent view of the protected state.
    #[inline]
    pub fn read_validate(&self, snapshot: Version) -> bool {
        snapshot.is_stable() && self.word.load(Ordering::Acquire) == snapshot.0
    }

    pub fn is_locked(&self) -> bool {
        !is_version(self.word.load(Ordering::Acquire))
    }

    /// Acquire exclusive access, joining the writer queue.
    ///
    /// Blocks by polling `node`'s own grant word until the predecessor (if
    /// any) hands over. Grants are strictly FIFO in enqueue order.
    ///
    /// # Safety
    ///
    /// `node` must stay valid and address-stable until the matching
    /// [`write_release`](Self::write_release), which must be called exactly
    /// once with the same node. One node serves one acquisition at a time.
    pub unsafe fn write_acquire(&self, node: &WaitNode) {
        node.reset();
        #[cfg(debug_assertions)]
        node.set_owner(self as *const Self as *const ());

        let prev = self.word.swap(Self::tail_word(node), Ordering::AcqRel);
        if is_version(prev) {
            // Uncontended: the word held a version, we own the lock.
            node.set_grant(prev + VERSION_STRIDE);
            return;
        }

        let pred = Self::tail_node(prev);
        (*pred).set_next(node as *const WaitNode as *mut WaitNode);

        let mut spin = SpinWait::new();
        while node.grant() == PENDING {
            spin.spin();
        }
    }

    /// Try to acquire without waiting, from a validated snapshot. Returns
    /// false if the snapshot is stale or another writer moved first; the
    /// node is then unused and may be reused, but must not be released.
    ///
    /// # Safety
    ///
    /// As for [`write_acquire`](Self::write_acquire), on success.
    pub unsafe fn try_write_acquire(&self, node: &WaitNode, snapshot: Version) -> bool {
        if !self.read_validate(snapshot) {
            return false;
        }

        node.reset();
        #[cfg(debug_assertions)]
        node.set_owner(self as *const Self as *const ());
        node.set_grant(snapshot.0 + VERSION_STRIDE);

        self.word
            .compare_exchange(
                snapshot.0,
                Self::tail_word(node),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Release exclusive access, publishing the new version.
    ///
    /// If a successor is queued (or mid-enqueue, the crux: the tail already
    /// moved but the predecessor link is not visible yet), it is granted
    /// exactly once; otherwise the word reverts to a plain version and
    /// readers can validate again.
    ///
    /// # Safety
    ///
    /// `node` must be the node passed to the matching
    /// [`write_acquire`](Self::write_acquire) on this lock, released once.
    pub unsafe fn write_release(&self, node: &WaitNode) {
        #[cfg(debug_assertions)]
        node.check_release(self as *const Self as *const ());

        let version = node.grant();
        let mut succ = node.next();
        if succ.is_null() {
            if self
                .word
                .compare_exchange(
                    Self::tail_word(node),
                    version,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                node.mark_released();
                return;
            }

            // A successor swapped the tail but has not linked itself yet;
            // its store to our `next` becomes visible shortly.
            let mut spin = SpinWait::new();
            loop {
                succ = node.next();
                if !succ.is_null() {
                    break;
                }
                spin.spin();
            }
        }

        (*succ).set_grant(version + VERSION_STRIDE);
        node.mark_released();
    }
}
