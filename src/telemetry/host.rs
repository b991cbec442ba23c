use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::telemetry::{HostMetrics, MetricSource};

/// (mean, standard deviation) for cpu, jitter, memory.
type Profile = [(f64, f64); 3];

const HEALTHY: Profile = [(15.0, 0.5), (5.0, 0.2), (20.0, 0.5)];
const UNDER_ATTACK: Profile = [(85.0, 10.0), (120.0, 30.0), (60.0, 5.0)];

/// Gaussian host simulator: a quiet router at rest, CPU spike / jitter chaos /
/// memory leak while the trigger is active.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    rng: StdRng,
}

impl SimulatedHost {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn draw(&mut self, (mean, std_dev): (f64, f64)) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * z
    }
}

impl MetricSource for SimulatedHost {
    fn sample(&mut self, under_attack: bool) -> HostMetrics {
        let profile = if under_attack { UNDER_ATTACK } else { HEALTHY };
        HostMetrics {
            cpu: self.draw(profile[0]),
            jitter: self.draw(profile[1]),
            memory: self.draw(profile[2]),
        }
    }
}
