//! Pulse-compression and Doppler processing for SDR range-Doppler radar.
//!
//! A continuous complex sample stream is framed into coherent processing
//! intervals, matched-filtered per pulse, Doppler-transformed across pulses
//! and normalized into a dynamic-range-limited dB image with range and
//! velocity axes. The `calibration` module measures the hardware loop delay
//! that registers range zero.

pub mod calibration;
pub mod interface;
pub mod io;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;
pub mod waveform;

pub use prelude::{ProcessingError, ProcessingResult, ProcessingStage, RadarConfig, Sample};
