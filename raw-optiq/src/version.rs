/// Tag bit of the lock word. Clear: the word is a version. Set: the word
/// carries the queue tail (or, for the centralized lock, just the tag) and
/// the protected state may be mid-write.
pub(crate) const HELD_BIT: u64 = 1 << 63;

/// How far the version advances per completed write.
pub(crate) const VERSION_STRIDE: u64 = 1;

/// Grant-word value of a queued writer that has not been granted yet.
/// Granted versions are always nonzero: the lock starts at version 0 and
/// every grant carries `predecessor version + VERSION_STRIDE`.
pub(crate) const PENDING: u64 = 0;

pub(crate) fn is_version(word: u64) -> bool {
    word & HELD_BIT == 0
}

/// A snapshot of a lock word, as returned by `read_begin`.
///
/// A snapshot is *stable* if it was taken while no writer held or queued on
/// the lock; only stable snapshots can ever validate. Taking a snapshot
/// never blocks, so an unstable one is an ordinary outcome that the caller
/// retries.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Version(pub(crate) u64);

impl Version {
    #[inline]
    pub fn is_stable(self) -> bool {
        is_version(self.0)
    }

    /// Raw word bits. Only meaningful as a counter when the snapshot is
    /// stable; two stable snapshots of the same lock compare `<` in write
    /// order.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}
