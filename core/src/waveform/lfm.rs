//! Linear frequency-modulated pulse.

use super::Waveform;
use crate::prelude::{ProcessingError, ProcessingResult, Sample};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFmWaveform {
    /// Swept bandwidth (Hz), centred on baseband DC.
    pub bandwidth: f64,
    /// Pulse duration (s).
    pub pulse_width: f64,
    pub sample_rate: f64,
    pub prf: f64,
}

impl LinearFmWaveform {
    pub fn new(
        bandwidth: f64,
        pulse_width: f64,
        sample_rate: f64,
        prf: f64,
    ) -> ProcessingResult<Self> {
        let waveform = Self {
            bandwidth,
            pulse_width,
            sample_rate,
            prf,
        };
        if waveform.pulse_samples() == 0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "pulse width {:.3e} s holds no samples at {:.3e} Hz",
                pulse_width, sample_rate
            )));
        }
        if waveform.pulse_samples() > waveform.pri_samples() {
            return Err(ProcessingError::InvalidConfig(
                "pulse is longer than the pulse repetition interval".into(),
            ));
        }
        Ok(waveform)
    }

    pub fn pulse_samples(&self) -> usize {
        (self.pulse_width * self.sample_rate).round() as usize
    }
}

impl Waveform for LinearFmWaveform {
    fn pri_samples(&self) -> usize {
        (self.sample_rate / self.prf).floor() as usize
    }

    /// One baseband chirp sweeping `-B/2..B/2` over the pulse width.
    fn pulse(&self) -> Vec<Sample> {
        let n = self.pulse_samples();
        let chirp_rate = self.bandwidth / self.pulse_width;
        (0..n)
            .map(|i| {
                let t = i as f64 / self.sample_rate - self.pulse_width / 2.0;
                let phase = PI * chirp_rate * t * t;
                Sample::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pulse_has_unit_envelope_and_expected_length() {
        let waveform = LinearFmWaveform::new(5e6, 10e-6, 10e6, 10e3).unwrap();
        let pulse = waveform.pulse();
        assert_eq!(pulse.len(), 100);
        for sample in &pulse {
            assert_relative_eq!(sample.norm(), 1.0, epsilon = 1e-5);
        }
        assert_eq!(waveform.step().len(), 1000);
    }

    #[test]
    fn matched_filter_is_reversed_conjugate() {
        let waveform = LinearFmWaveform::new(5e6, 2e-6, 10e6, 10e3).unwrap();
        let pulse = waveform.pulse();
        let filter = waveform.matched_filter();
        assert_eq!(filter[0], pulse[pulse.len() - 1].conj());
    }

    #[test]
    fn rejects_pulse_longer_than_pri() {
        assert!(LinearFmWaveform::new(1e6, 1e-3, 1e6, 10e3).is_err());
        assert!(LinearFmWaveform::new(1e6, 1e-9, 1e6, 10e3).is_err());
    }
}
