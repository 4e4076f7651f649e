use crate::calibration::record::{CalibrationRecord, CalibrationStore, HardwareKey};
use crate::math::convolution::FftConvolver;
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingError, ProcessingResult, Sample};
use crate::telemetry::log::LogManager;
use crate::waveform::matched_filter_kernel;
use chrono::Utc;
use std::path::Path;

/// Default confidence required of the correlation peak over the off-peak level.
pub const DEFAULT_MIN_PEAK_TO_NOISE_DB: f32 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayEstimate {
    pub delay_samples: i64,
    /// Index of the peak in the full cross-correlation.
    pub peak_index: usize,
    pub peak_magnitude: f32,
    /// Mean correlation magnitude more than one pulse length from the peak.
    pub noise_floor: f32,
    /// Infinite when nothing lies outside the peak's support or it is all zero.
    pub peak_to_noise_db: f32,
}

/// Measures the transmit/receive loop delay from a loopback capture.
///
/// The received samples are cross-correlated against the known transmit
/// pulse; the lag of the largest correlation magnitude is the delay.
pub struct DelayCalibrator {
    matched: Vec<Sample>,
    min_peak_to_noise_db: f32,
    logger: LogManager,
}

impl DelayCalibrator {
    pub fn new(reference: &[Sample]) -> ProcessingResult<Self> {
        if reference.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "calibration reference waveform is empty".into(),
            ));
        }
        Ok(Self {
            matched: matched_filter_kernel(reference),
            min_peak_to_noise_db: DEFAULT_MIN_PEAK_TO_NOISE_DB,
            logger: LogManager::new("calibration"),
        })
    }

    pub fn with_threshold(mut self, min_peak_to_noise_db: f32) -> Self {
        self.min_peak_to_noise_db = min_peak_to_noise_db;
        self
    }

    pub fn estimate(&self, received: &[Sample]) -> ProcessingResult<DelayEstimate> {
        let pulse_len = self.matched.len();
        if received.len() < pulse_len {
            return Err(ProcessingError::InsufficientSamples {
                required: pulse_len,
                available: received.len(),
            });
        }
        let correlation = FftConvolver::new(&self.matched, received.len()).convolve(received);
        let no_peak = |peak_to_noise_db| ProcessingError::NoCorrelationPeak {
            peak_to_noise_db,
            threshold_db: self.min_peak_to_noise_db,
        };

        let (peak_index, peak_magnitude) = StatsHelper::argmax_magnitude(&correlation)
            .filter(|(_, peak)| *peak > 0.0)
            .ok_or_else(|| no_peak(f32::NEG_INFINITY))?;

        // The pulse's own response spans peak_index +/- (L - 1); only lags
        // beyond it measure the floor.
        let support_start = peak_index.saturating_sub(pulse_len - 1);
        let support_end = (peak_index + pulse_len).min(correlation.len());
        let off_peak: Vec<Sample> = correlation[..support_start]
            .iter()
            .chain(&correlation[support_end..])
            .copied()
            .collect();
        let noise_floor = StatsHelper::mean_magnitude(&off_peak);
        let peak_to_noise_db = if noise_floor > 0.0 {
            StatsHelper::amplitude_db(peak_magnitude / noise_floor)
        } else {
            f32::INFINITY
        };
        if !(peak_to_noise_db >= self.min_peak_to_noise_db) {
            return Err(no_peak(peak_to_noise_db));
        }

        let estimate = DelayEstimate {
            delay_samples: peak_index as i64 - (pulse_len as i64 - 1),
            peak_index,
            peak_magnitude,
            noise_floor,
            peak_to_noise_db,
        };
        self.logger.record(&format!(
            "loop delay {} samples ({:.1} dB over the correlation floor)",
            estimate.delay_samples, estimate.peak_to_noise_db
        ));
        Ok(estimate)
    }

    /// Estimates the delay and builds the record for `key` without persisting it.
    pub fn measure(
        &self,
        received: &[Sample],
        key: &HardwareKey,
        master_clock_rate: Option<f64>,
    ) -> ProcessingResult<CalibrationRecord> {
        let estimate = self.estimate(received)?;
        Ok(CalibrationRecord {
            carrier_freq: key.carrier_freq,
            sample_rate: key.sample_rate,
            master_clock_rate,
            delay_samples: estimate.delay_samples,
            peak_to_noise_db: Some(estimate.peak_to_noise_db).filter(|db| db.is_finite()),
            timestamp: Utc::now(),
        })
    }

    /// Measures the delay and merges the result into the store at `store_path`.
    /// Nothing is written unless the estimate succeeds.
    pub fn calibrate(
        &self,
        received: &[Sample],
        key: &HardwareKey,
        master_clock_rate: Option<f64>,
        store_path: &Path,
    ) -> ProcessingResult<CalibrationRecord> {
        let record = self.measure(received, key, master_clock_rate)?;
        let mut store = CalibrationStore::load_or_default(store_path)?;
        store.upsert(&key.radio, record.clone());
        store.save(store_path)?;
        self.logger.record(&format!(
            "stored calibration for '{}' in {}",
            key.radio,
            store_path.display()
        ));
        Ok(record)
    }
}
