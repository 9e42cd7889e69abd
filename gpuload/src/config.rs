use gpuload_types::{Backend, Shape};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const DEFAULT_ROWS: usize = 500_000;
pub const DEFAULT_DIMS: usize = 50;
pub const DEFAULT_VERIFY_SAMPLES: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct BenchConfig {
    pub shape: Shape,
    /// Seed for data generation; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Backends to enumerate, in this order.
    pub backends: Vec<Backend>,
    /// Rows recomputed on the host per device, 0 disables the check.
    pub verify_samples: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            shape: Shape::new(DEFAULT_ROWS, DEFAULT_DIMS),
            seed: None,
            backends: Backend::ALL.to_vec(),
            verify_samples: DEFAULT_VERIFY_SAMPLES,
        }
    }
}

impl BenchConfig {
    /// The single random source for a run.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn defaults_match_the_reference_workload() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.shape, Shape::new(500_000, 50));
        assert_eq!(cfg.seed, None);
        assert_eq!(cfg.backends, vec![Backend::Cpu, Backend::Wgpu, Backend::Cuda]);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let cfg = BenchConfig {
            seed: Some(7),
            ..Default::default()
        };
        let a: Vec<u32> = cfg.rng().sample_iter(rand::distributions::Standard).take(8).collect();
        let b: Vec<u32> = cfg.rng().sample_iter(rand::distributions::Standard).take(8).collect();
        assert_eq!(a, b);
    }
}
