//! Loop-delay measurement and the calibration file read at startup.

pub mod delay;
pub mod record;

pub use delay::{DelayCalibrator, DelayEstimate, DEFAULT_MIN_PEAK_TO_NOISE_DB};
pub use record::{CalibrationPolicy, CalibrationRecord, CalibrationStore, HardwareKey};
