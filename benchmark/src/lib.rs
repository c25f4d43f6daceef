//! Latch microbenchmark: drives a configurable mix of validated version
//! reads and exclusive acquire/release pairs against an array of latches,
//! one discipline at a time, and reports per-thread throughput in a fixed
//! comma-separated text block an external analysis layer parses.

pub mod config;
pub mod dist;
pub mod driver;
pub mod latch;
pub mod report;
