use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("operation mix must sum to 100, got {0}")]
    UnbalancedMix(u64),
    #[error("at least one worker thread is required")]
    NoThreads,
    #[error("the latch array must hold at least one latch")]
    EmptyArray,
    #[error("run duration must be at least one second")]
    ZeroDuration,
    #[error("zipf exponent must be positive and finite, got {0}")]
    BadZipfExponent(f64),
}

/// How worker threads pick a latch index per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DistKind {
    /// Every thread hammers its own slot: contention is thread count vs
    /// array size, with no randomness.
    Fixed,
    /// Uniform over the array.
    Uniform,
    /// Zipf-skewed over the array; hot slots concentrate contention.
    Zipfian,
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub threads: u32,
    /// Run duration; ignored when `ops` caps the run instead.
    pub seconds: u64,
    /// Total operation budget, split evenly across threads.
    pub ops: Option<u64>,
    /// Contention-domain size: number of independent latches.
    pub array_size: usize,
    pub ver_read_pct: u64,
    pub acq_rel_pct: u64,
    pub dist: DistKind,
    pub zipf_exponent: f64,
    /// Busy-work units spent holding (or optimistically reading) a latch.
    pub cs_cycles: u64,
    /// Busy-work units between operations, outside any latch.
    pub ps_cycles: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            threads: 1,
            seconds: 10,
            ops: None,
            array_size: 128,
            ver_read_pct: 80,
            acq_rel_pct: 20,
            dist: DistKind::Fixed,
            zipf_exponent: 0.99,
            cs_cycles: 1_000,
            ps_cycles: 200_000,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ver_read_pct + self.acq_rel_pct != 100 {
            return Err(ConfigError::UnbalancedMix(
                self.ver_read_pct + self.acq_rel_pct,
            ));
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.array_size == 0 {
            return Err(ConfigError::EmptyArray);
        }
        if self.ops.is_none() && self.seconds == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        if self.dist == DistKind::Zipfian
            && !(self.zipf_exponent.is_finite() && self.zipf_exponent > 0.0)
        {
            return Err(ConfigError::BadZipfExponent(self.zipf_exponent));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(BenchConfig::default().validate(), Ok(()));
    }

    #[test]
    fn mix_must_sum_to_100() {
        let cfg = BenchConfig {
            ver_read_pct: 70,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::UnbalancedMix(90)));
    }

    #[test]
    fn zero_threads_rejected() {
        let cfg = BenchConfig {
            threads: 0,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoThreads));
    }

    #[test]
    fn empty_array_rejected() {
        let cfg = BenchConfig {
            array_size: 0,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyArray));
    }

    #[test]
    fn zero_seconds_allowed_only_with_op_budget() {
        let cfg = BenchConfig {
            seconds: 0,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroDuration));
        let cfg = BenchConfig {
            seconds: 0,
            ops: Some(1_000),
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn zipf_exponent_checked_only_for_zipfian() {
        let cfg = BenchConfig {
            zipf_exponent: -1.0,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
        let cfg = BenchConfig {
            dist: DistKind::Zipfian,
            zipf_exponent: -1.0,
            ..BenchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::BadZipfExponent(-1.0)));
    }
}
