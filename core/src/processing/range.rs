use crate::interface::{PulseMatrix, RangeCompressedMatrix};
use crate::math::convolution::{convolve_full, FftConvolver};
use crate::prelude::{
    ComplexMatrix, ConvolutionStrategy, ProcessingError, ProcessingResult, ProcessingStage, Sample,
};
use crate::telemetry::log::LogManager;
use crate::waveform::matched_filter_kernel;
use ndarray::{ShapeBuilder, Zip};

/// Kernels longer than this use fast convolution under `ConvolutionStrategy::Auto`.
const AUTO_FFT_KERNEL_LEN: usize = 64;

enum Engine {
    Direct,
    Fft(FftConvolver),
}

/// Pulse compression: full linear convolution of every pulse with a fixed kernel.
pub struct MatchedFilter {
    kernel: Vec<Sample>,
    range_bins: usize,
    engine: Engine,
    logger: LogManager,
}

impl MatchedFilter {
    /// Uses `kernel` as given (already the reversed conjugate of the pulse).
    pub fn new(
        kernel: Vec<Sample>,
        range_bins: usize,
        strategy: ConvolutionStrategy,
    ) -> ProcessingResult<Self> {
        if kernel.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "matched filter kernel is empty".into(),
            ));
        }
        if range_bins == 0 {
            return Err(ProcessingError::InvalidConfig(
                "pulses must hold at least one range bin".into(),
            ));
        }
        let use_fft = match strategy {
            ConvolutionStrategy::Direct => false,
            ConvolutionStrategy::Fft => true,
            ConvolutionStrategy::Auto => kernel.len() > AUTO_FFT_KERNEL_LEN,
        };
        let engine = if use_fft {
            Engine::Fft(FftConvolver::new(&kernel, range_bins))
        } else {
            Engine::Direct
        };
        Ok(Self {
            kernel,
            range_bins,
            engine,
            logger: LogManager::new("matched-filter"),
        })
    }

    /// Builds the kernel from a transmit pulse by reversing and conjugating it.
    pub fn from_transmit_pulse(
        pulse: &[Sample],
        range_bins: usize,
        strategy: ConvolutionStrategy,
    ) -> ProcessingResult<Self> {
        Self::new(matched_filter_kernel(pulse), range_bins, strategy)
    }

    pub fn kernel_len(&self) -> usize {
        self.kernel.len()
    }

    pub fn output_rows(&self) -> usize {
        self.range_bins + self.kernel.len() - 1
    }

    fn compress_pulse(&self, pulse: &[Sample]) -> Vec<Sample> {
        match &self.engine {
            Engine::Direct => convolve_full(pulse, &self.kernel),
            Engine::Fft(convolver) => convolver.convolve(pulse),
        }
    }
}

impl ProcessingStage for MatchedFilter {
    type Input = PulseMatrix;
    type Output = RangeCompressedMatrix;

    fn execute(&self, input: PulseMatrix) -> ProcessingResult<RangeCompressedMatrix> {
        if input.range_bins() != self.range_bins {
            return Err(ProcessingError::InvalidInput(format!(
                "expected {} range bins per pulse, got {}",
                self.range_bins,
                input.range_bins()
            )));
        }

        let pulses = input.pulses();
        let mut compressed = ComplexMatrix::zeros((self.output_rows(), pulses).f());
        Zip::from(compressed.columns_mut())
            .and(input.data().columns())
            .par_for_each(|mut out, pulse| {
                let pulse = pulse.to_vec();
                for (dst, value) in out.iter_mut().zip(self.compress_pulse(&pulse)) {
                    *dst = value;
                }
            });

        self.logger.detail(&format!(
            "CPI {}: compressed {} pulses to {} range bins",
            input.info().sequence,
            pulses,
            self.output_rows()
        ));
        Ok(RangeCompressedMatrix::from_array(compressed, input.info()))
    }
}
