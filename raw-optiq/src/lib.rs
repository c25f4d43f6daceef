//! Raw optimistic queue-based latches.
//!
//! The lock word of the optimistic latches doubles as a version counter:
//! readers snapshot it, run their critical section without blocking, and
//! validate afterwards; writers either queue behind the tagged tail pointer
//! ([`OptiqLock`]) or CAS the version directly ([`OptSpinLock`]). The queue
//! nodes are caller-owned and need a stable address for the whole
//! acquire..release span, so the raw acquire/release APIs are `unsafe`.
#![no_std]

mod central;
mod queued;
mod rw_queued;
mod version;

pub use central::OptSpinLock;
pub use queued::{OptiqLock, WaitNode};
pub use rw_queued::{McsRwLock, RwWaitNode};
pub use version::Version;
