use crate::interface::{RangeCompressedMatrix, RangeDopplerMatrix};
use crate::math::fft::{fftshift, ifftshift, FftHelper};
use crate::prelude::{ComplexMatrix, ProcessingError, ProcessingResult, ProcessingStage, Sample};
use crate::telemetry::log::LogManager;
use ndarray::Zip;

/// Per-range-bin DFT across the pulses of a CPI, recentred on zero Doppler.
pub struct DopplerTransform {
    fft: FftHelper,
    logger: LogManager,
}

impl DopplerTransform {
    pub fn new(pulses_per_cpi: usize) -> ProcessingResult<Self> {
        if pulses_per_cpi == 0 {
            return Err(ProcessingError::InvalidConfig(
                "Doppler transform needs at least one pulse".into(),
            ));
        }
        Ok(Self {
            fft: FftHelper::new(pulses_per_cpi),
            logger: LogManager::new("doppler"),
        })
    }

    pub fn doppler_bins(&self) -> usize {
        self.fft.len()
    }

    fn check_width(&self, cols: usize) -> ProcessingResult<()> {
        if cols != self.fft.len() {
            return Err(ProcessingError::InvalidInput(format!(
                "expected {} pulses per CPI, got {}",
                self.fft.len(),
                cols
            )));
        }
        Ok(())
    }

    fn transform_rows<F>(&self, data: &mut ComplexMatrix, op: F)
    where
        F: Fn(&mut Vec<Sample>) + Sync + Send,
    {
        Zip::from(data.rows_mut()).par_for_each(|mut row| {
            let mut buffer = row.to_vec();
            op(&mut buffer);
            for (dst, value) in row.iter_mut().zip(buffer) {
                *dst = value;
            }
        });
    }

    /// Undoes the recentring and applies the normalized inverse DFT, giving
    /// back the range-compressed matrix up to rounding.
    pub fn inverse(&self, map: RangeDopplerMatrix) -> ProcessingResult<RangeCompressedMatrix> {
        self.check_width(map.cols())?;
        let info = map.info();
        let mut data = map.into_inner();
        self.transform_rows(&mut data, |row| {
            ifftshift(row);
            self.fft.inverse(row);
        });
        Ok(RangeCompressedMatrix::from_array(data, info))
    }
}

impl ProcessingStage for DopplerTransform {
    type Input = RangeCompressedMatrix;
    type Output = RangeDopplerMatrix;

    fn execute(&self, input: RangeCompressedMatrix) -> ProcessingResult<RangeDopplerMatrix> {
        self.check_width(input.cols())?;
        let info = input.info();
        let mut data = input.into_inner();
        self.transform_rows(&mut data, |row| {
            self.fft.forward(row);
            fftshift(row);
        });

        self.logger.detail(&format!(
            "CPI {}: {} range bins x {} Doppler bins",
            info.sequence,
            data.nrows(),
            data.ncols()
        ));
        Ok(RangeDopplerMatrix::from_array(data, info))
    }
}
