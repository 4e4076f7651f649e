use crate::interface::AxisSet;
use crate::prelude::{RadarConfig, SPEED_OF_LIGHT};

/// Range and velocity labels for the image, derived from configuration only.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCalculator {
    sample_rate: f64,
    prf: f64,
    wavelength: f64,
    pulses: usize,
    range_bins: usize,
    filter_len: usize,
    delay_samples: i64,
}

impl AxisCalculator {
    /// `delay_samples` is the calibrated hardware loop delay; zero when uncalibrated.
    pub fn new(config: &RadarConfig, filter_len: usize, delay_samples: i64) -> Self {
        Self {
            sample_rate: config.sample_rate,
            prf: config.prf,
            wavelength: config.wavelength(),
            pulses: config.pulses_per_cpi,
            range_bins: config.range_bins_per_pulse(),
            filter_len,
            delay_samples,
        }
    }

    /// Rows of the range-compressed map, `range_bins + filter_len - 1`.
    pub fn range_rows(&self) -> usize {
        (self.range_bins + self.filter_len).saturating_sub(1)
    }

    /// Bin offset of true range zero: filter group delay plus hardware delay.
    pub fn zero_range_offset(&self) -> i64 {
        self.filter_len as i64 + self.delay_samples
    }

    pub fn range_resolution(&self) -> f64 {
        SPEED_OF_LIGHT / 2.0 / self.sample_rate
    }

    /// Entry `k` is `(c/2) (k - N_filter - delay) / fs`.
    pub fn range_axis(&self) -> Vec<f64> {
        let offset = self.zero_range_offset();
        (0..self.range_rows())
            .map(|k| (k as i64 - offset) as f64 * self.range_resolution())
            .collect()
    }

    /// Largest unambiguous radial speed, `lambda * PRF / 4`.
    pub fn max_velocity(&self) -> f64 {
        self.wavelength * self.prf / 4.0
    }

    /// Entry `j` is `(lambda/2) PRF (j/N - 1/2)`, zero at `j = N/2`.
    pub fn velocity_axis(&self) -> Vec<f64> {
        let n = self.pulses as f64;
        let scale = self.wavelength / 2.0 * self.prf;
        (0..self.pulses)
            .map(|j| scale * (j as f64 - n / 2.0) / n)
            .collect()
    }

    pub fn axes(&self) -> AxisSet {
        AxisSet {
            range_m: self.range_axis(),
            velocity_mps: self.velocity_axis(),
        }
    }
}
