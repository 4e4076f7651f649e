pub mod detection;
pub mod frame;
pub mod matrix;

pub use detection::DetectionRecord;
pub use frame::{AxisSet, RangeDopplerFrame, RangeDopplerImage};
pub use matrix::{CpiInfo, PulseMatrix, RangeCompressedMatrix, RangeDopplerMatrix};
