use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps a forward/inverse pair from the `rustfft` planner.
///
/// Plans are immutable and `Sync`, so one helper can serve every worker
/// thread in a parallel row or column loop.
#[derive(Clone)]
pub struct FftHelper {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Unnormalized forward DFT, in place. `buffer.len()` must equal `len()`.
    pub fn forward(&self, buffer: &mut [Complex32]) {
        self.forward.process(buffer);
    }

    /// Inverse DFT scaled by `1/N`, so `inverse(forward(x)) == x`.
    pub fn inverse(&self, buffer: &mut [Complex32]) {
        self.inverse.process(buffer);
        let scale = 1.0 / self.size as f32;
        buffer.iter_mut().for_each(|v| *v *= scale);
    }
}

/// Moves the zero-frequency bin to index `N/2`.
pub fn fftshift<T>(buffer: &mut [T]) {
    let half = buffer.len() / 2;
    buffer.rotate_right(half);
}

/// Undoes [`fftshift`] for both even and odd lengths.
pub fn ifftshift<T>(buffer: &mut [T]) {
    let half = buffer.len() / 2;
    buffer.rotate_left(half);
}
