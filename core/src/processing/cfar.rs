use crate::interface::{AxisSet, DetectionRecord, RangeDopplerMatrix};
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::telemetry::log::LogManager;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Cell-averaging CFAR window, sized per axis as `[range, doppler]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfarConfig {
    pub guard_cells: [usize; 2],
    pub training_cells: [usize; 2],
    /// Design probability of false alarm.
    pub pfa: f64,
}

impl Default for CfarConfig {
    fn default() -> Self {
        Self {
            guard_cells: [2, 2],
            training_cells: [8, 4],
            pfa: 1e-6,
        }
    }
}

/// 2-D cell-averaging CFAR over the power of a range-Doppler map.
///
/// The Doppler axis wraps; range cells whose window would leave the map are
/// not tested.
pub struct CfarDetector {
    config: CfarConfig,
    training_count: usize,
    alpha: f64,
    logger: LogManager,
}

impl CfarDetector {
    pub fn new(config: CfarConfig) -> ProcessingResult<Self> {
        if !(config.pfa > 0.0 && config.pfa < 1.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "probability of false alarm must be in (0, 1), got {}",
                config.pfa
            )));
        }
        let outer = (2 * (config.guard_cells[0] + config.training_cells[0]) + 1)
            * (2 * (config.guard_cells[1] + config.training_cells[1]) + 1);
        let inner = (2 * config.guard_cells[0] + 1) * (2 * config.guard_cells[1] + 1);
        let training_count = outer - inner;
        if training_count == 0 {
            return Err(ProcessingError::InvalidConfig(
                "CFAR window has no training cells".into(),
            ));
        }
        let n = training_count as f64;
        let alpha = n * (config.pfa.powf(-1.0 / n) - 1.0);
        Ok(Self {
            config,
            training_count,
            alpha,
            logger: LogManager::new("cfar"),
        })
    }

    /// Threshold multiplier applied to the training-cell mean.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fails when the Doppler window would wrap onto itself in `doppler_bins` columns.
    pub fn check_doppler_bins(&self, doppler_bins: usize) -> ProcessingResult<()> {
        let width = 2 * (self.config.guard_cells[1] + self.config.training_cells[1]) + 1;
        if width > doppler_bins {
            return Err(ProcessingError::InvalidConfig(format!(
                "CFAR Doppler window of {} cells exceeds {} Doppler bins",
                width, doppler_bins
            )));
        }
        Ok(())
    }

    pub fn detect(
        &self,
        map: &RangeDopplerMatrix,
        axes: &AxisSet,
    ) -> ProcessingResult<Vec<DetectionRecord>> {
        let (rows, cols) = map.data().dim();
        let half_range = self.config.guard_cells[0] + self.config.training_cells[0];
        let half_doppler = self.config.guard_cells[1] + self.config.training_cells[1];
        self.check_doppler_bins(cols)?;
        if axes.range_m.len() != rows || axes.velocity_mps.len() != cols {
            return Err(ProcessingError::InvalidInput(
                "axis lengths do not match the map".into(),
            ));
        }
        if rows < 2 * half_range + 1 {
            return Ok(Vec::new());
        }

        let power = map.data().map(|v| f64::from(v.norm_sqr()));
        let table = integral_image(&power, half_doppler);
        let sum = |r0: usize, r1: usize, c0: usize, c1: usize| {
            table[[r1, c1]] - table[[r0, c1]] - table[[r1, c0]] + table[[r0, c0]]
        };

        let (gr, gd) = (self.config.guard_cells[0], self.config.guard_cells[1]);
        let mut detections = Vec::new();
        for r in half_range..rows - half_range {
            for d in 0..cols {
                // Padded column of cell `d` is `d + half_doppler`.
                let c = d + half_doppler;
                let outer = sum(r - half_range, r + half_range + 1, d, d + 2 * half_doppler + 1);
                let inner = sum(r - gr, r + gr + 1, c - gd, c + gd + 1);
                let noise = (outer - inner) / self.training_count as f64;
                let cell = power[[r, d]];
                if noise > 0.0 && cell > self.alpha * noise {
                    detections.push(DetectionRecord::new(
                        map.info().sequence,
                        r,
                        d,
                        axes.range_m[r],
                        axes.velocity_mps[d],
                        (10.0 * (cell / noise).log10()) as f32,
                    ));
                }
            }
        }

        self.logger.detail(&format!(
            "CPI {}: {} detections",
            map.info().sequence,
            detections.len()
        ));
        Ok(detections)
    }
}

/// Summed-area table of `power` with the Doppler axis wrapped by `pad` columns each side.
fn integral_image(power: &Array2<f64>, pad: usize) -> Array2<f64> {
    let (rows, cols) = power.dim();
    let width = cols + 2 * pad;
    let mut table = Array2::<f64>::zeros((rows + 1, width + 1));
    for r in 0..rows {
        let mut running = 0.0;
        for c in 0..width {
            let src = (c as isize - pad as isize).rem_euclid(cols as isize) as usize;
            running += power[[r, src]];
            table[[r + 1, c + 1]] = table[[r, c + 1]] + running;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::CpiInfo;
    use crate::prelude::Sample;

    fn axes(rows: usize, cols: usize) -> AxisSet {
        AxisSet {
            range_m: (0..rows).map(|r| r as f64 * 15.0).collect(),
            velocity_mps: (0..cols).map(|c| c as f64 - cols as f64 / 2.0).collect(),
        }
    }

    #[test]
    fn strong_cell_is_detected_and_neighbours_are_not() {
        let mut data = Array2::from_elem((40, 16), Sample::new(1.0, 0.0));
        data[[20, 1]] = Sample::new(10.0, 0.0);
        let map = RangeDopplerMatrix::from_array(data, CpiInfo::default());

        let detector = CfarDetector::new(CfarConfig {
            guard_cells: [1, 1],
            training_cells: [2, 2],
            pfa: 1e-6,
        })
        .unwrap();
        let detections = detector.detect(&map, &axes(40, 16)).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].range_bin, 20);
        assert_eq!(detections[0].doppler_bin, 1);
        assert_eq!(detections[0].range_m, 300.0);
        assert!((detections[0].snr_db - 20.0).abs() < 1e-3);
    }

    #[test]
    fn flat_noise_produces_no_detections() {
        let data = Array2::from_elem((30, 8), Sample::new(0.5, 0.5));
        let map = RangeDopplerMatrix::from_array(data, CpiInfo::default());
        let detector = CfarDetector::new(CfarConfig {
            guard_cells: [1, 1],
            training_cells: [2, 1],
            pfa: 1e-3,
        })
        .unwrap();
        assert!(detector.detect(&map, &axes(30, 8)).unwrap().is_empty());
    }

    #[test]
    fn alpha_follows_training_count() {
        let detector = CfarDetector::new(CfarConfig {
            guard_cells: [0, 0],
            training_cells: [1, 0],
            pfa: 0.25,
        })
        .unwrap();
        // Two training cells: 2 * (0.25^(-1/2) - 1) = 2.
        assert!((detector.alpha() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_window_without_training_cells() {
        let config = CfarConfig {
            guard_cells: [1, 1],
            training_cells: [0, 0],
            pfa: 1e-3,
        };
        assert!(CfarDetector::new(config).is_err());
    }

    #[test]
    fn doppler_window_must_fit_the_cpi() {
        let detector = CfarDetector::new(CfarConfig::default()).unwrap();
        assert!(detector.check_doppler_bins(13).is_ok());
        assert!(matches!(
            detector.check_doppler_bins(8),
            Err(ProcessingError::InvalidConfig(_))
        ));

        let map = RangeDopplerMatrix::from_array(
            Array2::from_elem((40, 8), Sample::new(1.0, 0.0)),
            CpiInfo::default(),
        );
        assert!(detector.detect(&map, &axes(40, 8)).is_err());
    }
}
