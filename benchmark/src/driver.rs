use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::BenchConfig;
use crate::dist::IndexSampler;
use crate::latch::BenchLatch;

/// Per-thread tallies for one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadCounts {
    pub operations: u64,
    pub successes: u64,
    pub reads: u64,
    pub read_successes: u64,
}

/// Everything a run produced, handed back to the caller; the driver keeps
/// no state between runs.
#[derive(Debug)]
pub struct RunReport {
    /// Wall-clock denominator for the per-second figures.
    pub seconds: f64,
    pub per_thread: Vec<ThreadCounts>,
}

impl RunReport {
    pub fn totals(&self) -> ThreadCounts {
        let mut total = ThreadCounts::default();
        for counts in &self.per_thread {
            total.operations += counts.operations;
            total.successes += counts.successes;
            total.reads += counts.reads;
            total.read_successes += counts.read_successes;
        }
        total
    }
}

/// Calibrated busy work: a dependent add per unit that the optimizer must
/// keep.
#[inline]
pub fn busy_work(units: u64) {
    let mut x = 0u64;
    for _ in 0..units {
        x = hint::black_box(x + 1);
    }
}

/// Run the configured workload against one latch discipline.
///
/// Workers are spawned, pinned, and held at a start barrier so nobody runs
/// ahead; the run then lasts `seconds` of wall clock, or until each worker
/// burns its share of the `ops` budget.
pub fn run_workload<L: BenchLatch>(cfg: &BenchConfig) -> RunReport {
    let latches: Vec<CachePadded<L>> = (0..cfg.array_size)
        .map(|_| CachePadded::new(L::default()))
        .collect();
    let ready = AtomicU32::new(0);
    let start = AtomicBool::new(false);
    let stop = AtomicBool::new(false);
    let op_budget = cfg.ops.map(|total| (total / u64::from(cfg.threads)).max(1));

    let mut per_thread = Vec::with_capacity(cfg.threads as usize);
    let mut elapsed = Duration::ZERO;

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(cfg.threads as usize);
        for thread_id in 0..cfg.threads {
            let latches = &latches;
            let ready = &ready;
            let start = &start;
            let stop = &stop;
            workers.push(scope.spawn(move || {
                pin_to_cpu(thread_id);
                ready.fetch_add(1, Ordering::AcqRel);
                while !start.load(Ordering::Acquire) {
                    hint::spin_loop();
                }
                worker_loop(cfg, thread_id, latches, stop, op_budget)
            }));
        }

        while ready.load(Ordering::Acquire) != cfg.threads {
            hint::spin_loop();
        }
        let begin = Instant::now();
        start.store(true, Ordering::Release);

        if op_budget.is_none() {
            thread::sleep(Duration::from_secs(cfg.seconds));
            stop.store(true, Ordering::Release);
        }

        for worker in workers {
            per_thread.push(worker.join().expect("a worker thread panicked"));
        }
        elapsed = begin.elapsed();
    });

    let seconds = if op_budget.is_none() {
        cfg.seconds as f64
    } else {
        elapsed.as_secs_f64()
    };
    RunReport { seconds, per_thread }
}

fn worker_loop<L: BenchLatch>(
    cfg: &BenchConfig,
    thread_id: u32,
    latches: &[CachePadded<L>],
    stop: &AtomicBool,
    op_budget: Option<u64>,
) -> ThreadCounts {
    let mut rng = SmallRng::seed_from_u64(u64::from(thread_id));
    let sampler = IndexSampler::new(cfg, thread_id);
    let mut counts = ThreadCounts::default();

    while !stop.load(Ordering::Relaxed) {
        if let Some(budget) = op_budget {
            if counts.operations >= budget {
                break;
            }
        }

        let roll = rng.gen_range(0..100u64);
        let latch = &latches[sampler.sample(&mut rng)];
        let succeeded = if roll < cfg.ver_read_pct {
            counts.reads += 1;
            let validated = latch.version_read(|| busy_work(cfg.cs_cycles));
            if validated {
                counts.read_successes += 1;
            }
            validated
        } else {
            latch.acquire_release(|| busy_work(cfg.cs_cycles));
            true
        };

        busy_work(cfg.ps_cycles);

        counts.operations += 1;
        if succeeded {
            counts.successes += 1;
        }
    }
    counts
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(thread_id: u32) {
    // Advisory; an over-subscribed or cgroup-restricted host just runs
    // unpinned.
    unsafe {
        let cpus = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
        if cpus <= 0 {
            return;
        }
        let cpu = thread_id as usize % cpus as usize;
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            tracing::warn!(thread_id, cpu, "failed to pin worker thread");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cpu(_thread_id: u32) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DistKind;
    use crate::latch::{CentralOptLatch, QueuedOptLatch, QueuedRwLatch, SeqLockLatch};

    fn smoke_config() -> BenchConfig {
        BenchConfig {
            threads: 2,
            ops: Some(2_000),
            array_size: 4,
            dist: DistKind::Uniform,
            cs_cycles: 10,
            ps_cycles: 10,
            ..BenchConfig::default()
        }
    }

    fn smoke<L: BenchLatch>() {
        let cfg = smoke_config();
        let report = run_workload::<L>(&cfg);
        assert_eq!(report.per_thread.len(), 2);
        for counts in &report.per_thread {
            assert!(counts.operations > 0);
            assert!(counts.operations >= counts.successes);
            assert!(counts.reads >= counts.read_successes);
            assert!(counts.successes >= counts.operations - counts.reads);
        }
        let totals = report.totals();
        assert_eq!(
            totals.operations,
            report.per_thread.iter().map(|c| c.operations).sum::<u64>()
        );
        assert!(report.seconds > 0.0);
    }

    #[test]
    fn queued_workload_smoke() {
        smoke::<QueuedOptLatch>();
    }

    #[test]
    fn central_workload_smoke() {
        smoke::<CentralOptLatch>();
    }

    #[test]
    fn queued_rw_workload_smoke() {
        smoke::<QueuedRwLatch>();
    }

    #[test]
    fn seqlock_workload_smoke() {
        smoke::<SeqLockLatch>();
    }

    #[test]
    fn op_budget_bounds_the_run() {
        let cfg = BenchConfig {
            seconds: 3_600,
            ..smoke_config()
        };
        let report = run_workload::<QueuedOptLatch>(&cfg);
        // Each worker stops at its share of the budget.
        for counts in &report.per_thread {
            assert_eq!(counts.operations, 1_000);
        }
    }
}
