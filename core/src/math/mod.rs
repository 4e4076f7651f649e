pub mod convolution;
pub mod fft;
pub mod stats;

pub use convolution::{convolve_full, FftConvolver};
pub use fft::{fftshift, ifftshift, FftHelper};
pub use stats::StatsHelper;
