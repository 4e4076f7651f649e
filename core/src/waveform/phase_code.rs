//! Phase-coded pulses: Barker, Frank and P4 chip sequences.
//!
//! Each chip holds a constant phase for `chip_width` seconds, so the pulse
//! has a unit envelope and `length * samples_per_chip` samples.

use super::Waveform;
use crate::prelude::{ProcessingError, ProcessingResult, Sample};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

static BARKER2: [i8; 2] = [1, -1];
static BARKER3: [i8; 3] = [1, 1, -1];
static BARKER4: [i8; 4] = [1, 1, -1, 1];
static BARKER5: [i8; 5] = [1, 1, 1, -1, 1];
static BARKER7: [i8; 7] = [1, 1, 1, -1, -1, 1, -1];
static BARKER11: [i8; 11] = [1, 1, 1, -1, -1, -1, 1, -1, -1, 1, -1];
static BARKER13: [i8; 13] = [1, 1, 1, 1, 1, -1, -1, 1, 1, -1, 1, -1, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCodeKind {
    /// Binary code; lengths 2, 3, 4, 5, 7, 11 and 13 only.
    Barker,
    /// Polyphase code; the length must be a perfect square.
    Frank,
    P4,
}

impl PhaseCodeKind {
    /// Chip phases in radians, wrapped to `[-pi, pi)`.
    pub fn phases(self, length: usize) -> ProcessingResult<Vec<f64>> {
        if length == 0 {
            return Err(ProcessingError::InvalidConfig(
                "phase code length must be positive".into(),
            ));
        }
        let phases: Vec<f64> = match self {
            PhaseCodeKind::Barker => barker(length)?
                .iter()
                .map(|&chip| if chip > 0 { 0.0 } else { PI })
                .collect(),
            PhaseCodeKind::Frank => {
                let order = (length as f64).sqrt().round() as usize;
                if order * order != length {
                    return Err(ProcessingError::InvalidConfig(format!(
                        "Frank code length {} is not a perfect square",
                        length
                    )));
                }
                (0..length)
                    .map(|i| {
                        let (n, k) = (i / order, i % order);
                        (2.0 * PI / order as f64 * (n * k) as f64) % (2.0 * PI)
                    })
                    .collect()
            }
            PhaseCodeKind::P4 => {
                let m_total = length as f64;
                (0..length)
                    .map(|m| {
                        let m = m as f64;
                        PI / m_total * m * (m - m_total)
                    })
                    .collect()
            }
        };
        Ok(phases.into_iter().map(wrap_to_pi).collect())
    }
}

fn barker(length: usize) -> ProcessingResult<&'static [i8]> {
    let code: &'static [i8] = match length {
        2 => &BARKER2,
        3 => &BARKER3,
        4 => &BARKER4,
        5 => &BARKER5,
        7 => &BARKER7,
        11 => &BARKER11,
        13 => &BARKER13,
        _ => {
            return Err(ProcessingError::InvalidConfig(format!(
                "no Barker code of length {}",
                length
            )))
        }
    };
    Ok(code)
}

fn wrap_to_pi(phase: f64) -> f64 {
    (phase + PI).rem_euclid(2.0 * PI) - PI
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCodeWaveform {
    pub kind: PhaseCodeKind,
    /// Chip duration (s).
    pub chip_width: f64,
    pub sample_rate: f64,
    pub prf: f64,
    phases: Vec<f64>,
}

impl PhaseCodeWaveform {
    pub fn new(
        kind: PhaseCodeKind,
        length: usize,
        chip_width: f64,
        sample_rate: f64,
        prf: f64,
    ) -> ProcessingResult<Self> {
        let waveform = Self {
            kind,
            chip_width,
            sample_rate,
            prf,
            phases: kind.phases(length)?,
        };
        if waveform.samples_per_chip() == 0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "chip width {:.3e} s holds no samples at {:.3e} Hz",
                chip_width, sample_rate
            )));
        }
        if waveform.pulse_samples() > waveform.pri_samples() {
            return Err(ProcessingError::InvalidConfig(
                "pulse is longer than the pulse repetition interval".into(),
            ));
        }
        Ok(waveform)
    }

    pub fn code_length(&self) -> usize {
        self.phases.len()
    }

    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    pub fn samples_per_chip(&self) -> usize {
        (self.chip_width * self.sample_rate).round() as usize
    }

    pub fn pulse_samples(&self) -> usize {
        self.code_length() * self.samples_per_chip()
    }
}

impl Waveform for PhaseCodeWaveform {
    fn pri_samples(&self) -> usize {
        (self.sample_rate / self.prf).floor() as usize
    }

    fn pulse(&self) -> Vec<Sample> {
        let per_chip = self.samples_per_chip();
        self.phases
            .iter()
            .flat_map(|&phase| {
                let chip = Sample::new(phase.cos() as f32, phase.sin() as f32);
                std::iter::repeat(chip).take(per_chip)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::convolution::convolve_full;
    use approx::assert_relative_eq;

    #[test]
    fn barker13_compresses_to_peak_with_unit_sidelobes() {
        let waveform = PhaseCodeWaveform::new(PhaseCodeKind::Barker, 13, 1e-6, 1e6, 1e3).unwrap();
        let pulse = waveform.pulse();
        assert_eq!(pulse.len(), 13);

        let response = convolve_full(&pulse, &waveform.matched_filter());
        assert_eq!(response.len(), 25);
        assert_relative_eq!(response[12].norm(), 13.0, epsilon = 1e-4);
        for (lag, value) in response.iter().enumerate().filter(|(lag, _)| *lag != 12) {
            assert!(value.norm() <= 1.0 + 1e-4, "sidelobe {} at lag {}", value.norm(), lag);
        }
    }

    #[test]
    fn chips_are_held_for_their_width() {
        let waveform = PhaseCodeWaveform::new(PhaseCodeKind::Barker, 7, 4e-6, 1e6, 1e3).unwrap();
        let pulse = waveform.pulse();
        assert_eq!(waveform.samples_per_chip(), 4);
        assert_eq!(pulse.len(), 28);
        assert_eq!(pulse[0], pulse[3]);
        assert_relative_eq!(pulse[12].re, -1.0, epsilon = 1e-6);
        assert_eq!(waveform.step().len(), 1000);

        let response = convolve_full(&pulse, &waveform.matched_filter());
        let (peak_lag, _) = response
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .unwrap();
        assert_eq!(peak_lag, pulse.len() - 1);
        assert_relative_eq!(response[peak_lag].norm(), 28.0, epsilon = 1e-3);
    }

    #[test]
    fn frank_code_matches_its_phase_table() {
        let phases = PhaseCodeKind::Frank.phases(4).unwrap();
        let expected = [0.0, 0.0, 0.0, -PI];
        for (got, want) in phases.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
        assert!(PhaseCodeKind::Frank.phases(5).is_err());
    }

    #[test]
    fn p4_phases_are_wrapped_and_peak_at_alignment() {
        let waveform = PhaseCodeWaveform::new(PhaseCodeKind::P4, 16, 1e-6, 1e6, 1e3).unwrap();
        assert!(waveform
            .phases()
            .iter()
            .all(|phase| (-PI..PI).contains(phase)));
        assert_relative_eq!(waveform.phases()[1], PI / 16.0 * -15.0, epsilon = 1e-9);

        let response = convolve_full(&waveform.pulse(), &waveform.matched_filter());
        assert_relative_eq!(response[15].norm(), 16.0, epsilon = 1e-3);
        assert!(response
            .iter()
            .enumerate()
            .all(|(lag, v)| lag == 15 || v.norm() < 16.0 - 1.0));
    }

    #[test]
    fn rejects_unknown_lengths_and_long_pulses() {
        assert!(PhaseCodeWaveform::new(PhaseCodeKind::Barker, 6, 1e-6, 1e6, 1e3).is_err());
        assert!(PhaseCodeWaveform::new(PhaseCodeKind::P4, 0, 1e-6, 1e6, 1e3).is_err());
        assert!(PhaseCodeWaveform::new(PhaseCodeKind::Barker, 13, 1e-9, 1e6, 1e3).is_err());
        assert!(PhaseCodeWaveform::new(PhaseCodeKind::Barker, 13, 100e-6, 1e6, 1e3).is_err());
    }
}
