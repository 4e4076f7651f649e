use anyhow::{ensure, Context};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rdcore::prelude::{RadarConfig, Sample, SPEED_OF_LIGHT};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A point scatterer moving at constant radial velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub range_m: f64,
    /// Positive when closing.
    pub velocity_mps: f64,
    #[serde(default = "unit_amplitude")]
    pub amplitude: f32,
}

fn unit_amplitude() -> f32 {
    1.0
}

/// Configuration for rendering a synthetic receive stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub targets: Vec<TargetConfig>,
    /// Peak amplitude of the uniform I/Q noise.
    pub noise: f32,
    pub seed: u64,
    /// Simulated hardware loop delay added to every echo.
    pub hardware_delay_samples: usize,
    pub cpis: usize,
    pub description: Option<String>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            targets: vec![TargetConfig {
                range_m: 1_500.0,
                velocity_mps: 10.0,
                amplitude: 1.0,
            }],
            noise: 0.01,
            seed: 0,
            hardware_delay_samples: 0,
            cpis: 4,
            description: None,
        }
    }
}

/// Renders `cpis` CPIs of echoes of `pulse` from every target, plus noise.
pub fn render_scene(
    scene: &SceneConfig,
    radar: &RadarConfig,
    pulse: &[Sample],
) -> anyhow::Result<Vec<Sample>> {
    let pri = radar.range_bins_per_pulse();
    let pulses = radar
        .pulses_per_cpi
        .checked_mul(scene.cpis)
        .context("overflow computing pulse count for scene")?;
    let total = pri
        .checked_mul(pulses)
        .context("overflow computing sample count for scene")?;
    ensure!(total > 0, "scene renders no samples");

    let mut samples = vec![Sample::new(0.0, 0.0); total];
    for target in &scene.targets {
        let echo_delay = (2.0 * target.range_m / SPEED_OF_LIGHT * radar.sample_rate).round();
        ensure!(echo_delay >= 0.0, "target range {} m is negative", target.range_m);
        let delay = scene.hardware_delay_samples + echo_delay as usize;
        let doppler_hz = 2.0 * target.velocity_mps / radar.wavelength();
        for p in 0..pulses {
            let phase = 2.0 * PI * doppler_hz * p as f64 / radar.prf;
            let rotation = Sample::from_polar(target.amplitude, phase as f32);
            let start = p * pri + delay;
            for (offset, s) in pulse.iter().enumerate() {
                match samples.get_mut(start + offset) {
                    Some(slot) => *slot += *s * rotation,
                    None => break,
                }
            }
        }
    }

    if scene.noise > 0.0 {
        let mut rng = StdRng::seed_from_u64(scene.seed);
        for s in samples.iter_mut() {
            *s += Sample::new(
                rng.gen_range(-scene.noise..scene.noise),
                rng.gen_range(-scene.noise..scene.noise),
            );
        }
    }
    log::info!(
        "rendered {} targets over {} pulses ({} samples)",
        scene.targets.len(),
        pulses,
        total
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdcore::processing::{FramerConfig, Pipeline, SampleFramer};
    use rdcore::waveform::{LinearFmWaveform, Waveform};

    fn radar() -> RadarConfig {
        RadarConfig {
            sample_rate: 1e6,
            carrier_freq: 1e9,
            prf: 1e3,
            pulses_per_cpi: 16,
            ..Default::default()
        }
    }

    #[test]
    fn scene_has_expected_length() {
        let radar = radar();
        let pulse = vec![Sample::new(1.0, 0.0); 4];
        let scene = SceneConfig {
            cpis: 3,
            ..Default::default()
        };
        let samples = render_scene(&scene, &radar, &pulse).unwrap();
        assert_eq!(samples.len(), 3 * radar.samples_per_cpi());
    }

    #[test]
    fn processed_scene_peaks_at_target_range_and_velocity() {
        let radar = radar();
        let waveform = LinearFmWaveform::new(5e5, 20e-6, radar.sample_rate, radar.prf).unwrap();
        let pipeline = Pipeline::new(&radar, waveform.matched_filter(), 0).unwrap();
        let axes = pipeline.axes().clone();
        // A quarter of the unambiguous Doppler span lands on an exact bin.
        let velocity = radar.wavelength() * radar.prf / 8.0;
        let scene = SceneConfig {
            targets: vec![TargetConfig {
                range_m: 30_000.0,
                velocity_mps: velocity,
                amplitude: 1.0,
            }],
            noise: 0.0,
            cpis: 1,
            ..Default::default()
        };
        let samples = render_scene(&scene, &radar, &waveform.pulse()).unwrap();
        let pulses = SampleFramer::frame_slice(&FramerConfig::from_radar(&radar), &samples, 0).unwrap();
        let frame = pipeline.process(pulses).unwrap().frame;

        let ((row, col), _) = frame
            .image
            .db
            .indexed_iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        let resolution = SPEED_OF_LIGHT / 2.0 / radar.sample_rate;
        assert!((axes.range_m[row] - 30_000.0).abs() <= 1.5 * resolution);
        assert!((axes.velocity_mps[col] - velocity).abs() < 1e-6);
    }

    #[test]
    fn noise_is_reproducible_for_a_seed() {
        let radar = radar();
        let pulse = vec![Sample::new(1.0, 0.0); 4];
        let scene = SceneConfig {
            noise: 0.1,
            seed: 42,
            cpis: 1,
            ..Default::default()
        };
        let a = render_scene(&scene, &radar, &pulse).unwrap();
        let b = render_scene(&scene, &radar, &pulse).unwrap();
        assert_eq!(a, b);
    }
}
