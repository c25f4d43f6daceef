use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, Zipf};

use crate::config::{BenchConfig, DistKind};

/// Per-thread latch-index sampler. Built once per worker so the zipf
/// tables are not recomputed per operation.
pub enum IndexSampler {
    Fixed(usize),
    Uniform(usize),
    Zipfian(Zipf<f64>),
}

impl IndexSampler {
    pub fn new(cfg: &BenchConfig, thread_id: u32) -> Self {
        match cfg.dist {
            DistKind::Fixed => IndexSampler::Fixed(thread_id as usize % cfg.array_size),
            DistKind::Uniform => IndexSampler::Uniform(cfg.array_size),
            DistKind::Zipfian => IndexSampler::Zipfian(
                Zipf::new(cfg.array_size as u64, cfg.zipf_exponent)
                    .expect("exponent was validated with the config"),
            ),
        }
    }

    pub fn sample(&self, rng: &mut SmallRng) -> usize {
        match self {
            IndexSampler::Fixed(index) => *index,
            IndexSampler::Uniform(size) => rng.gen_range(0..*size),
            // Zipf samples ranks in 1..=n.
            IndexSampler::Zipfian(zipf) => zipf.sample(rng) as usize - 1,
        }
    }
}

#[cfg(test)]
mod test {
    use rand::SeedableRng;

    use super::*;
    use crate::config::BenchConfig;

    fn config(dist: DistKind, array_size: usize) -> BenchConfig {
        BenchConfig {
            dist,
            array_size,
            ..BenchConfig::default()
        }
    }

    #[test]
    fn fixed_maps_thread_to_slot() {
        let cfg = config(DistKind::Fixed, 4);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(IndexSampler::new(&cfg, 1).sample(&mut rng), 1);
        assert_eq!(IndexSampler::new(&cfg, 6).sample(&mut rng), 2);
    }

    #[test]
    fn uniform_stays_in_bounds_and_spreads() {
        let cfg = config(DistKind::Uniform, 16);
        let sampler = IndexSampler::new(&cfg, 0);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = [false; 16];
        for _ in 0..2_000 {
            let index = sampler.sample(&mut rng);
            assert!(index < 16);
            seen[index] = true;
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn zipfian_stays_in_bounds_and_skews_low() {
        let cfg = BenchConfig {
            zipf_exponent: 1.2,
            ..config(DistKind::Zipfian, 32)
        };
        let sampler = IndexSampler::new(&cfg, 0);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut head = 0u32;
        const SAMPLES: u32 = 4_000;
        for _ in 0..SAMPLES {
            let index = sampler.sample(&mut rng);
            assert!(index < 32);
            if index < 4 {
                head += 1;
            }
        }
        // The first few ranks should dominate a skewed draw.
        assert!(head > SAMPLES / 2, "only {head}/{SAMPLES} samples hit the head");
    }
}
