use anyhow::ensure;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rdcore::prelude::Sample;

/// Simulated transmit-to-receive loopback used to calibrate without hardware.
#[derive(Debug, Clone)]
pub struct Loopback {
    pub delay_samples: usize,
    pub attenuation: f32,
    pub noise: f32,
    pub seed: u64,
}

impl Loopback {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            delay_samples,
            attenuation: 0.5,
            noise: 0.01,
            seed: 0,
        }
    }

    /// Receive buffer of `capture_len` samples holding the delayed, attenuated transmit burst.
    pub fn capture(&self, transmit: &[Sample], capture_len: usize) -> anyhow::Result<Vec<Sample>> {
        ensure!(
            self.delay_samples + transmit.len() <= capture_len,
            "capture of {} samples cannot hold a {}-sample burst delayed by {}",
            capture_len,
            transmit.len(),
            self.delay_samples
        );
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut received: Vec<Sample> = (0..capture_len)
            .map(|_| {
                if self.noise > 0.0 {
                    Sample::new(
                        rng.gen_range(-self.noise..self.noise),
                        rng.gen_range(-self.noise..self.noise),
                    )
                } else {
                    Sample::new(0.0, 0.0)
                }
            })
            .collect();
        for (slot, s) in received[self.delay_samples..].iter_mut().zip(transmit) {
            *slot += *s * self.attenuation;
        }
        Ok(received)
    }
}
