use std::io::{self, Write};

use crate::driver::{RunReport, ThreadCounts};

// One line per thread plus the "All" aggregate, every value a per-second
// double with three decimals. External tooling parses this block with a
// fixed five-field regex, so the shape must not drift.

fn write_line<W: Write>(out: &mut W, label: &str, counts: &ThreadCounts, seconds: f64) -> io::Result<()> {
    writeln!(
        out,
        "{},{:.3},{:.3},{:.3},{:.3}",
        label,
        counts.operations as f64 / seconds,
        counts.successes as f64 / seconds,
        counts.reads as f64 / seconds,
        counts.read_successes as f64 / seconds,
    )
}

pub fn write_report<W: Write>(mut out: W, report: &RunReport) -> io::Result<()> {
    writeln!(out, "=====================")?;
    writeln!(out, "Thread,Operations/s,Successes/s: ")?;
    for (thread_id, counts) in report.per_thread.iter().enumerate() {
        write_line(&mut out, &thread_id.to_string(), counts, report.seconds)?;
    }
    writeln!(out, "---------------------")?;
    write_line(&mut out, "All", &report.totals(), report.seconds)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn report_block_is_stable() {
        let report = RunReport {
            seconds: 2.0,
            per_thread: vec![
                ThreadCounts {
                    operations: 10,
                    successes: 8,
                    reads: 6,
                    read_successes: 5,
                },
                ThreadCounts {
                    operations: 4,
                    successes: 4,
                    reads: 0,
                    read_successes: 0,
                },
            ],
        };
        let mut out = Vec::new();
        write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "=====================\n\
             Thread,Operations/s,Successes/s: \n\
             0,5.000,4.000,3.000,2.500\n\
             1,2.000,2.000,0.000,0.000\n\
             ---------------------\n\
             All,7.000,6.000,3.000,2.500\n"
        );
    }

    #[test]
    fn aggregate_line_sums_threads() {
        let report = RunReport {
            seconds: 1.0,
            per_thread: vec![
                ThreadCounts {
                    operations: 3,
                    successes: 2,
                    reads: 1,
                    read_successes: 1,
                },
                ThreadCounts {
                    operations: 7,
                    successes: 6,
                    reads: 5,
                    read_successes: 4,
                },
            ],
        };
        let totals = report.totals();
        assert_eq!(totals.operations, 10);
        assert_eq!(totals.successes, 8);
        assert_eq!(totals.reads, 6);
        assert_eq!(totals.read_successes, 5);
    }
}
