use num_complex::Complex32;

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean_magnitude(samples: &[Complex32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|v| v.norm()).sum::<f32>() / samples.len() as f32
    }

    /// Index and magnitude of the largest-magnitude sample; first wins on ties.
    pub fn argmax_magnitude(samples: &[Complex32]) -> Option<(usize, f32)> {
        samples
            .iter()
            .map(|v| v.norm())
            .enumerate()
            .fold(None, |best, (idx, mag)| match best {
                Some((_, best_mag)) if best_mag >= mag => best,
                _ => Some((idx, mag)),
            })
    }

    /// Amplitude ratio in decibels.
    pub fn amplitude_db(ratio: f32) -> f32 {
        20.0 * ratio.log10()
    }
}
