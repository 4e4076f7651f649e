use crate::prelude::{ComplexMatrix, ProcessingError, ProcessingResult, Sample};
use ndarray::{Array2, ShapeBuilder};
use serde::{Deserialize, Serialize};

/// Position of a CPI within the sample stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpiInfo {
    /// Zero-based index of the frame in framing order.
    pub sequence: u64,
    /// Absolute index of the frame's first sample in the stream.
    pub start_sample: u64,
}

macro_rules! impl_matrix_accessors {
    ($name: ident) => {
        impl $name {
            pub fn from_array(data: ComplexMatrix, info: CpiInfo) -> Self {
                Self { data, info }
            }

            pub fn data(&self) -> &ComplexMatrix {
                &self.data
            }

            pub fn into_inner(self) -> ComplexMatrix {
                self.data
            }

            pub fn info(&self) -> CpiInfo {
                self.info
            }

            pub fn rows(&self) -> usize {
                self.data.nrows()
            }

            pub fn cols(&self) -> usize {
                self.data.ncols()
            }
        }
    };
}

/// One CPI of raw samples: rows are range bins (fast time), columns pulses.
#[derive(Debug, Clone)]
pub struct PulseMatrix {
    data: ComplexMatrix,
    info: CpiInfo,
}

/// Matched-filter output: `range_bins + kernel_len - 1` rows, one column per pulse.
#[derive(Debug, Clone)]
pub struct RangeCompressedMatrix {
    data: ComplexMatrix,
    info: CpiInfo,
}

/// Doppler-processed map: same rows as the compressed matrix, columns are
/// Doppler bins with zero Doppler at `cols / 2`.
#[derive(Debug, Clone)]
pub struct RangeDopplerMatrix {
    data: ComplexMatrix,
    info: CpiInfo,
}

impl_matrix_accessors!(PulseMatrix);
impl_matrix_accessors!(RangeCompressedMatrix);
impl_matrix_accessors!(RangeDopplerMatrix);

impl PulseMatrix {
    /// Reshapes pulse-major samples, each pulse a contiguous run of `range_bins`.
    pub fn from_column_major(
        range_bins: usize,
        pulses: usize,
        samples: Vec<Sample>,
        info: CpiInfo,
    ) -> ProcessingResult<Self> {
        let data = column_major(range_bins, pulses, samples)?;
        Ok(Self { data, info })
    }

    pub fn range_bins(&self) -> usize {
        self.rows()
    }

    pub fn pulses(&self) -> usize {
        self.cols()
    }
}

impl RangeDopplerMatrix {
    pub fn doppler_bins(&self) -> usize {
        self.cols()
    }

    /// Flattens the map in column-major order, the layout used on disk.
    pub fn to_column_major(&self) -> Vec<Sample> {
        self.data.t().iter().copied().collect()
    }
}

fn column_major(rows: usize, cols: usize, samples: Vec<Sample>) -> ProcessingResult<ComplexMatrix> {
    if samples.len() != rows * cols {
        return Err(ProcessingError::InvalidInput(format!(
            "{} samples cannot fill a {}x{} matrix",
            samples.len(),
            rows,
            cols
        )));
    }
    Array2::from_shape_vec((rows, cols).f(), samples)
        .map_err(|err| ProcessingError::InvalidInput(err.to_string()))
}
