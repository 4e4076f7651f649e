use ndarray::Array2;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Propagation speed used for every range and wavelength computation (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Complex baseband sample as delivered by the radio (interleaved f32 I/Q).
pub type Sample = Complex32;

/// Dense complex matrix shared by every pipeline stage.
pub type ComplexMatrix = Array2<Sample>;

/// How the matched filter evaluates its linear convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvolutionStrategy {
    /// Multiply-accumulate in the time domain.
    Direct,
    /// Zero-padded FFT, pointwise product, inverse FFT.
    Fft,
    /// Direct for short kernels, FFT otherwise.
    Auto,
}

impl Default for ConvolutionStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

/// Process-wide radar configuration, fixed at startup and handed to every
/// component constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Complex sample rate (Hz).
    pub sample_rate: f64,
    /// RF carrier frequency (Hz).
    pub carrier_freq: f64,
    /// Pulse repetition frequency (Hz).
    pub prf: f64,
    pub pulses_per_cpi: usize,
    /// Display floor in dB relative to the frame peak, must be negative.
    pub dynamic_range_db: f32,
    /// Pulses to advance between frames; `None` means non-overlapping CPIs.
    pub stride_pulses: Option<usize>,
    /// Frames the downstream consumer may leave pending before the oldest is dropped.
    pub queue_depth: usize,
    /// Longest wait for buffered samples before framing gives up.
    pub frame_timeout_ms: u64,
    pub convolution: ConvolutionStrategy,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            sample_rate: 50e6,
            carrier_freq: 5e9,
            prf: 10e3,
            pulses_per_cpi: 512,
            dynamic_range_db: -80.0,
            stride_pulses: None,
            queue_depth: 1,
            frame_timeout_ms: 1_000,
            convolution: ConvolutionStrategy::Auto,
        }
    }
}

impl RadarConfig {
    pub fn validate(&self) -> ProcessingResult<()> {
        if !(self.sample_rate > 0.0) || !(self.carrier_freq > 0.0) || !(self.prf > 0.0) {
            return Err(ProcessingError::InvalidConfig(
                "sample rate, carrier frequency and PRF must be positive".into(),
            ));
        }
        if self.pulses_per_cpi == 0 {
            return Err(ProcessingError::InvalidConfig(
                "a CPI needs at least one pulse".into(),
            ));
        }
        if self.range_bins_per_pulse() == 0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "PRI of {:.3e} s is shorter than one sample at {:.3e} Hz",
                1.0 / self.prf,
                self.sample_rate
            )));
        }
        if !(self.dynamic_range_db < 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "dynamic range floor must be negative, got {} dB",
                self.dynamic_range_db
            )));
        }
        if !(1..=2).contains(&self.queue_depth) {
            return Err(ProcessingError::InvalidConfig(format!(
                "queue depth must be 1 or 2, got {}",
                self.queue_depth
            )));
        }
        match self.stride_pulses {
            Some(0) => Err(ProcessingError::InvalidConfig(
                "frame stride must be at least one pulse".into(),
            )),
            Some(stride) if stride > self.pulses_per_cpi => {
                Err(ProcessingError::InvalidConfig(format!(
                    "frame stride {} exceeds the CPI length {}",
                    stride, self.pulses_per_cpi
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn pri(&self) -> f64 {
        1.0 / self.prf
    }

    /// Samples in one pulse repetition interval, `floor(PRI * sample_rate)`.
    pub fn range_bins_per_pulse(&self) -> usize {
        (self.sample_rate / self.prf).floor() as usize
    }

    pub fn samples_per_cpi(&self) -> usize {
        self.range_bins_per_pulse() * self.pulses_per_cpi
    }

    pub fn stride_samples(&self) -> usize {
        self.stride_pulses.unwrap_or(self.pulses_per_cpi) * self.range_bins_per_pulse()
    }

    pub fn wavelength(&self) -> f64 {
        SPEED_OF_LIGHT / self.carrier_freq
    }
}

/// Common error type for the processing core.
#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    #[error("insufficient samples: a CPI needs {required}, only {available} available")]
    InsufficientSamples { required: usize, available: usize },
    #[error("degenerate frame: peak magnitude is zero")]
    DegenerateFrame,
    #[error(
        "no correlation peak: peak-to-noise {peak_to_noise_db:.1} dB is below {threshold_db:.1} dB"
    )]
    NoCorrelationPeak {
        peak_to_noise_db: f32,
        threshold_db: f32,
    },
    #[error("calibration mismatch: {0}")]
    ConfigMismatch(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// A fixed pipeline stage: consumes one value and produces the next.
///
/// Stages are configured once in their constructors and never mutated
/// afterwards, so a single instance can be shared across worker threads.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn execute(&self, input: Self::Input) -> ProcessingResult<Self::Output>;
}
