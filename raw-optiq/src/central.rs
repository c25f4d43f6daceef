use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot_core::SpinWait;

use crate::version::{is_version, Version, HELD_BIT, VERSION_STRIDE};

/// Adding this to a held word clears the tag and advances the version by
/// one stride in a single fetch-add.
const NEXT_UNLOCKED: u64 = VERSION_STRIDE.wrapping_sub(HELD_BIT);

/// Centralized optimistic latch.
///
/// Same word encoding and reader protocol as
/// [`OptiqLock`](crate::OptiqLock), but writers race a CAS on the shared
/// word instead of queuing, with [`SpinWait`]'s backoff absorbing the
/// contention. The baseline the queued discipline is measured against.
#[derive(Default)]
pub struct OptSpinLock {
    word: AtomicU64,
}

impl OptSpinLock {
    pub const fn new() -> Self {
        OptSpinLock {
            word: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn read_begin(&self) -> Version {
        Version(self.word.load(Ordering::Acquire))
    }

    #[inline]
    pub fn read_validate(&self, snapshot: Version) -> bool {
        snapshot.is_stable() && self.word.load(Ordering::Acquire) == snapshot.0
    }

    pub fn is_locked(&self) -> bool {
        !is_version(self.word.load(Ordering::Acquire))
    }

    /// Spin until the word is a version and the tag CAS lands. Returns the
    /// version the lock was acquired at.
    pub fn write_acquire(&self) -> Version {
        let mut spin = SpinWait::new();
        loop {
            let word = self.word.load(Ordering::Acquire);
            if is_version(word)
                && self
                    .word
                    .compare_exchange_weak(word, word | HELD_BIT, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return Version(word);
            }
            spin.spin();
        }
    }

    /// Single-shot upgrade from a validated snapshot.
    pub fn try_write_acquire(&self, snapshot: Version) -> bool {
        if !self.read_validate(snapshot) {
            return false;
        }
        self.word
            .compare_exchange(
                snapshot.0,
                snapshot.0 | HELD_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn write_release(&self) {
        debug_assert!(self.is_locked(), "releasing a lock no writer holds");
        self.word.fetch_add(NEXT_UNLOCKED, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn lock_round_trip_bumps_version() {
        let lock = OptSpinLock::new();
        let v0 = lock.write_acquire();
        assert_eq!(v0.value(), 0);
        assert!(lock.is_locked());
        assert!(!lock.read_begin().is_stable());
        lock.write_release();
        assert!(!lock.is_locked());
        assert_eq!(lock.read_begin().value(), 1);
    }

    #[test]
    fn snapshot_survives_only_quiet_periods() {
        let lock = OptSpinLock::new();
        let snapshot = lock.read_begin();
        assert!(lock.read_validate(snapshot));
        lock.write_acquire();
        assert!(!lock.read_validate(snapshot));
        lock.write_release();
        assert!(!lock.read_validate(snapshot));
        assert!(lock.read_validate(lock.read_begin()));
    }

    #[test]
    fn try_write_acquire_respects_staleness() {
        let lock = OptSpinLock::new();
        let snapshot = lock.read_begin();
        assert!(lock.try_write_acquire(snapshot));
        assert!(!lock.try_write_acquire(snapshot));
        lock.write_release();
        assert!(!lock.try_write_acquire(snapshot));
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = OptSpinLock::new();
        let counter = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..16 {
                let lock = &lock;
                let counter = &counter;
                scope.spawn(move || {
                    for _ in 0..50 {
                        lock.write_acquire();
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                        lock.write_release();
                    }
                });
            }
        });
        assert_eq!(counter.load(Ordering::Relaxed), 800);
        assert_eq!(lock.read_begin().value(), 800);
    }
}
