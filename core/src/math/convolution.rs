use crate::math::fft::FftHelper;
use num_complex::Complex32;
use rustfft::num_traits::Zero;

/// Full linear convolution by direct multiply-accumulate.
///
/// Output length is `input.len() + kernel.len() - 1`; empty operands give an
/// empty result.
pub fn convolve_full(input: &[Complex32], kernel: &[Complex32]) -> Vec<Complex32> {
    if input.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    let mut output = vec![Complex32::zero(); input.len() + kernel.len() - 1];
    for (i, &x) in input.iter().enumerate() {
        if x.is_zero() {
            continue;
        }
        for (j, &h) in kernel.iter().enumerate() {
            output[i + j] += x * h;
        }
    }
    output
}

/// Fast linear convolution against a fixed kernel for a fixed input length.
///
/// The transform length is exactly `input_len + kernel_len - 1`, so there is
/// no circular wraparound and the result matches [`convolve_full`] up to
/// rounding.
#[derive(Clone)]
pub struct FftConvolver {
    fft: FftHelper,
    kernel_spectrum: Vec<Complex32>,
    input_len: usize,
}

impl FftConvolver {
    pub fn new(kernel: &[Complex32], input_len: usize) -> Self {
        let size = (input_len + kernel.len())
            .saturating_sub(1)
            .max(kernel.len())
            .max(1);
        let fft = FftHelper::new(size);
        let mut kernel_spectrum = vec![Complex32::zero(); size];
        kernel_spectrum[..kernel.len()].copy_from_slice(kernel);
        fft.forward(&mut kernel_spectrum);
        Self {
            fft,
            kernel_spectrum,
            input_len,
        }
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn output_len(&self) -> usize {
        self.fft.len()
    }

    /// Convolves one input vector into `output`, which must hold `output_len()` samples.
    pub fn convolve_into(&self, input: &[Complex32], output: &mut [Complex32]) {
        debug_assert_eq!(input.len(), self.input_len);
        debug_assert_eq!(output.len(), self.fft.len());
        output[..input.len()].copy_from_slice(input);
        output[input.len()..].fill(Complex32::zero());
        self.fft.forward(output);
        output
            .iter_mut()
            .zip(self.kernel_spectrum.iter())
            .for_each(|(o, k)| *o *= k);
        self.fft.inverse(output);
    }

    pub fn convolve(&self, input: &[Complex32]) -> Vec<Complex32> {
        let mut output = vec![Complex32::zero(); self.fft.len()];
        self.convolve_into(input, &mut output);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_signal(rng: &mut StdRng, len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    #[test]
    fn direct_convolution_has_full_length() {
        let input = vec![Complex32::new(1.0, 0.0); 6];
        let kernel = vec![Complex32::new(1.0, 0.0); 3];
        let output = convolve_full(&input, &kernel);
        assert_eq!(output.len(), 8);
        let real: Vec<f32> = output.iter().map(|v| v.re).collect();
        assert_eq!(real, vec![1.0, 2.0, 3.0, 3.0, 3.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn fft_convolution_matches_direct() {
        let mut rng = StdRng::seed_from_u64(7);
        let input = random_signal(&mut rng, 37);
        let kernel = random_signal(&mut rng, 11);

        let direct = convolve_full(&input, &kernel);
        let convolver = FftConvolver::new(&kernel, input.len());
        assert_eq!(convolver.input_len(), 37);
        assert_eq!(convolver.output_len(), 47);
        let fast = convolver.convolve(&input);

        assert_eq!(fast.len(), direct.len());
        for (a, b) in fast.iter().zip(direct.iter()) {
            assert!((a - b).norm() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn empty_operands_give_empty_output() {
        assert!(convolve_full(&[], &[Complex32::new(1.0, 0.0)]).is_empty());
    }
}
