//! Transmit waveforms used as the matched-filter and calibration reference.

pub mod lfm;
pub mod phase_code;

pub use lfm::LinearFmWaveform;
pub use phase_code::{PhaseCodeKind, PhaseCodeWaveform};

use crate::prelude::Sample;
use rustfft::num_traits::Zero;

/// A pulsed waveform sampled at a fixed rate.
pub trait Waveform {
    /// Samples in one pulse repetition interval.
    fn pri_samples(&self) -> usize;

    /// The baseband transmit pulse.
    fn pulse(&self) -> Vec<Sample>;

    /// The pulse followed by receive-window zeros, one full PRI long.
    fn step(&self) -> Vec<Sample> {
        let mut samples = self.pulse();
        samples.resize(self.pri_samples(), Sample::zero());
        samples
    }

    /// Time-reversed complex conjugate of the pulse.
    fn matched_filter(&self) -> Vec<Sample> {
        matched_filter_kernel(&self.pulse())
    }
}

/// Matched-filter kernel for an arbitrary transmit pulse.
pub fn matched_filter_kernel(pulse: &[Sample]) -> Vec<Sample> {
    pulse.iter().rev().map(|s| s.conj()).collect()
}
