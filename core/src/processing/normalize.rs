use crate::interface::{RangeDopplerImage, RangeDopplerMatrix};
use crate::prelude::{ComplexMatrix, ProcessingError, ProcessingResult, ProcessingStage};
use crate::telemetry::log::LogManager;
use ndarray::Array2;

/// Converts a complex range-Doppler map into a peak-referenced dB image.
pub struct MapNormalizer {
    floor_db: f32,
    logger: LogManager,
}

impl MapNormalizer {
    pub fn new(floor_db: f32) -> ProcessingResult<Self> {
        if !(floor_db < 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "dynamic range floor must be negative, got {} dB",
                floor_db
            )));
        }
        Ok(Self {
            floor_db,
            logger: LogManager::new("normalizer"),
        })
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Largest magnitude in the map; a zero (or non-finite) peak is degenerate.
    pub fn peak_magnitude(data: &ComplexMatrix) -> ProcessingResult<f32> {
        let peak = data.iter().fold(0.0f32, |acc, v| acc.max(v.norm()));
        if peak > 0.0 && peak.is_finite() {
            Ok(peak)
        } else {
            Err(ProcessingError::DegenerateFrame)
        }
    }

    /// `20 log10(|x| / peak)` clamped below at the floor. Degenerate frames
    /// come back as an all-floor image with `degenerate` set.
    pub fn normalize(&self, map: &RangeDopplerMatrix) -> RangeDopplerImage {
        let floor = self.floor_db;
        match Self::peak_magnitude(map.data()) {
            Ok(peak) => {
                let db = map
                    .data()
                    .map(|v| (20.0 * (v.norm() / peak).log10()).max(floor));
                RangeDopplerImage {
                    db,
                    floor_db: floor,
                    peak_magnitude: peak,
                    degenerate: false,
                }
            }
            Err(err) => {
                self.logger.warn(&format!(
                    "CPI {}: {}, substituting the {} dB floor",
                    map.info().sequence,
                    err,
                    floor
                ));
                RangeDopplerImage {
                    db: Array2::from_elem(map.data().dim(), floor),
                    floor_db: floor,
                    peak_magnitude: 0.0,
                    degenerate: true,
                }
            }
        }
    }
}

impl ProcessingStage for MapNormalizer {
    type Input = RangeDopplerMatrix;
    type Output = RangeDopplerImage;

    fn execute(&self, input: RangeDopplerMatrix) -> ProcessingResult<RangeDopplerImage> {
        Ok(self.normalize(&input))
    }
}
