use clap::Parser;
use tracing_subscriber::EnvFilter;

use optiq_benchmark::config::{BenchConfig, DistKind};
use optiq_benchmark::driver::{run_workload, RunReport};
use optiq_benchmark::latch::{
    BenchLatch, CentralOptLatch, ParkingRwLatch, QueuedMutexLatch, QueuedOptLatch, QueuedRwLatch,
    SeqLockLatch, SysRwLatch,
};
use optiq_benchmark::report::write_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LatchKind {
    /// Optimistic queued lock.
    Queued,
    /// Centralized optimistic lock.
    Central,
    /// Fair queued reader/writer lock.
    QueuedRw,
    /// std::sync::RwLock.
    StdRw,
    /// parking_lot::RwLock.
    ParkingRw,
    /// Sequence lock.
    Seqlock,
    /// Queued lock as a plain mutex.
    QueuedMutex,
}

#[derive(Parser, Debug)]
#[command(
    name = "optiq-benchmark",
    about = "Latch microbenchmark: validated version reads vs exclusive acquire/release"
)]
struct Cli {
    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    threads: u32,

    /// Number of seconds to run the benchmark.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Stop after this many operations in total instead of after a duration.
    #[arg(long)]
    ops: Option<u64>,

    /// Number of latches in the benchmark.
    #[arg(long, default_value_t = 128)]
    array_size: usize,

    /// Version read percentage.
    #[arg(long, default_value_t = 80)]
    ver_read_pct: u64,

    /// Latch acquire/release percentage.
    #[arg(long, default_value_t = 20)]
    acq_rel_pct: u64,

    /// Latch array index distribution.
    #[arg(long, value_enum, default_value_t = DistKind::Fixed)]
    dist: DistKind,

    /// Zipf exponent for the zipfian distribution.
    #[arg(long, default_value_t = 0.99)]
    zipf_exponent: f64,

    /// Critical section busy-work units.
    #[arg(long, default_value_t = 1_000)]
    cs_cycles: u64,

    /// Parallel section busy-work units.
    #[arg(long, default_value_t = 200_000)]
    ps_cycles: u64,

    /// Latch discipline under test.
    #[arg(long, value_enum, default_value_t = LatchKind::Queued)]
    latch: LatchKind,
}

fn run(kind: LatchKind, cfg: &BenchConfig) -> RunReport {
    match kind {
        LatchKind::Queued => announce_and_run::<QueuedOptLatch>(cfg),
        LatchKind::Central => announce_and_run::<CentralOptLatch>(cfg),
        LatchKind::QueuedRw => announce_and_run::<QueuedRwLatch>(cfg),
        LatchKind::StdRw => announce_and_run::<SysRwLatch>(cfg),
        LatchKind::ParkingRw => announce_and_run::<ParkingRwLatch>(cfg),
        LatchKind::Seqlock => announce_and_run::<SeqLockLatch>(cfg),
        LatchKind::QueuedMutex => announce_and_run::<QueuedMutexLatch>(cfg),
    }
}

fn announce_and_run<L: BenchLatch>(cfg: &BenchConfig) -> RunReport {
    tracing::info!(
        latch = L::NAME,
        threads = cfg.threads,
        seconds = cfg.seconds,
        ops = cfg.ops,
        array_size = cfg.array_size,
        ver_read_pct = cfg.ver_read_pct,
        acq_rel_pct = cfg.acq_rel_pct,
        dist = ?cfg.dist,
        cs_cycles = cfg.cs_cycles,
        ps_cycles = cfg.ps_cycles,
        "starting run"
    );
    run_workload::<L>(cfg)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = BenchConfig {
        threads: cli.threads,
        seconds: cli.seconds,
        ops: cli.ops,
        array_size: cli.array_size,
        ver_read_pct: cli.ver_read_pct,
        acq_rel_pct: cli.acq_rel_pct,
        dist: cli.dist,
        zipf_exponent: cli.zipf_exponent,
        cs_cycles: cli.cs_cycles,
        ps_cycles: cli.ps_cycles,
    };
    if let Err(err) = cfg.validate() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let report = run(cli.latch, &cfg);
    write_report(std::io::stdout().lock(), &report).expect("failed to write the report");
}
