use std::sync::PoisonError;

use raw_optiq::{McsRwLock, OptSpinLock, OptiqLock, RwWaitNode, WaitNode};
use seqlock::SeqLock;
use tls_optiq::OptiqMutex;

/// One latch discipline as the workload sees it: a version read that may
/// fail validation, and an exclusive acquire/release that cannot. Both
/// wrap the simulated critical section so every discipline pays the same
/// in-latch cost.
pub trait BenchLatch: Default + Send + Sync + 'static {
    const NAME: &'static str;

    /// Runs `critical` under the discipline's read path; returns whether
    /// the read counts as validated.
    fn version_read(&self, critical: impl FnOnce()) -> bool;

    fn acquire_release(&self, critical: impl FnOnce());
}

/// Optimistic queued lock: lock-free validated reads, FIFO-queued writers.
#[derive(Default)]
pub struct QueuedOptLatch(OptiqLock);

impl BenchLatch for QueuedOptLatch {
    const NAME: &'static str = "queued optimistic";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let snapshot = self.0.read_begin();
        if !snapshot.is_stable() {
            // A writer is in flight; fail without paying the read cost.
            return false;
        }
        critical();
        self.0.read_validate(snapshot)
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let node = WaitNode::new();
        // SAFETY: the node lives in this frame across the whole span and
        // the release pairs the acquire.
        unsafe {
            self.0.write_acquire(&node);
            critical();
            self.0.write_release(&node);
        }
    }
}

/// Centralized optimistic lock: same read path, CAS-racing writers.
#[derive(Default)]
pub struct CentralOptLatch(OptSpinLock);

impl BenchLatch for CentralOptLatch {
    const NAME: &'static str = "central optimistic";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let snapshot = self.0.read_begin();
        if !snapshot.is_stable() {
            return false;
        }
        critical();
        self.0.read_validate(snapshot)
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        self.0.write_acquire();
        critical();
        self.0.write_release();
    }
}

/// Fair queued reader/writer lock: reads block instead of validating, so
/// they always succeed.
#[derive(Default)]
pub struct QueuedRwLatch(McsRwLock);

impl BenchLatch for QueuedRwLatch {
    const NAME: &'static str = "queued rw";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let node = RwWaitNode::new();
        // SAFETY: as for the writer path; read and unlock pair on this node.
        unsafe {
            self.0.read_lock(&node);
            critical();
            self.0.read_unlock(&node);
        }
        true
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let node = RwWaitNode::new();
        // SAFETY: the node lives in this frame across the whole span.
        unsafe {
            self.0.write_lock(&node);
            critical();
            self.0.write_unlock(&node);
        }
    }
}

/// The system reader/writer lock.
#[derive(Default)]
pub struct SysRwLatch(std::sync::RwLock<()>);

impl BenchLatch for SysRwLatch {
    const NAME: &'static str = "std rw";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let _guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        critical();
        true
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let _guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        critical();
    }
}

/// `parking_lot`'s reader/writer lock.
#[derive(Default)]
pub struct ParkingRwLatch(parking_lot::RwLock<()>);

impl BenchLatch for ParkingRwLatch {
    const NAME: &'static str = "parking_lot rw";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let _guard = self.0.read();
        critical();
        true
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let _guard = self.0.write();
        critical();
    }
}

/// Sequence lock; its read path retries internally until consistent.
pub struct SeqLockLatch(SeqLock<u64>);

impl Default for SeqLockLatch {
    fn default() -> Self {
        SeqLockLatch(SeqLock::new(0))
    }
}

impl BenchLatch for SeqLockLatch {
    const NAME: &'static str = "seqlock";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let value = self.0.read();
        critical();
        std::hint::black_box(value);
        true
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let mut guard = self.0.lock_write();
        *guard = guard.wrapping_add(1);
        critical();
    }
}

/// The queued lock behind its `lock_api` mutex face: exclusive for both
/// operation kinds, so reads measure pure handoff cost.
#[derive(Default)]
pub struct QueuedMutexLatch(OptiqMutex<()>);

impl BenchLatch for QueuedMutexLatch {
    const NAME: &'static str = "queued mutex";

    fn version_read(&self, critical: impl FnOnce()) -> bool {
        let _guard = self.0.lock();
        critical();
        true
    }

    fn acquire_release(&self, critical: impl FnOnce()) {
        let _guard = self.0.lock();
        critical();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn exercise<L: BenchLatch>() {
        let latch = L::default();
        latch.acquire_release(|| {});
        assert!(latch.version_read(|| {}), "{} read failed uncontended", L::NAME);
    }

    #[test]
    fn every_discipline_round_trips() {
        exercise::<QueuedOptLatch>();
        exercise::<CentralOptLatch>();
        exercise::<QueuedRwLatch>();
        exercise::<SysRwLatch>();
        exercise::<ParkingRwLatch>();
        exercise::<SeqLockLatch>();
        exercise::<QueuedMutexLatch>();
    }

    #[test]
    fn optimistic_read_fails_under_a_writer() {
        let latch = QueuedOptLatch::default();
        let node = WaitNode::new();
        unsafe {
            latch.0.write_acquire(&node);
            assert!(!latch.version_read(|| {}));
            latch.0.write_release(&node);
        }
        assert!(latch.version_read(|| {}));
    }
}
