use crate::generator::profile::SceneConfig;
use anyhow::Context;
use rdcore::calibration::{CalibrationPolicy, HardwareKey};
use rdcore::io::read_complex64;
use rdcore::prelude::{RadarConfig, Sample};
use rdcore::processing::CfarConfig;
use rdcore::waveform::{LinearFmWaveform, PhaseCodeKind, PhaseCodeWaveform, Waveform};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pulse synthesized when no reference file is given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaveformConfig {
    Lfm {
        bandwidth: f64,
        pulse_width: f64,
    },
    PhaseCode {
        code: PhaseCodeKind,
        length: usize,
        /// Chip duration (s).
        chip_width: f64,
    },
}

impl Default for WaveformConfig {
    fn default() -> Self {
        WaveformConfig::Lfm {
            bandwidth: 20e6,
            pulse_width: 10e-6,
        }
    }
}

impl WaveformConfig {
    pub fn build(&self, sample_rate: f64, prf: f64) -> anyhow::Result<Box<dyn Waveform>> {
        let waveform: Box<dyn Waveform> = match *self {
            WaveformConfig::Lfm {
                bandwidth,
                pulse_width,
            } => Box::new(
                LinearFmWaveform::new(bandwidth, pulse_width, sample_rate, prf)
                    .context("building LFM waveform")?,
            ),
            WaveformConfig::PhaseCode {
                code,
                length,
                chip_width,
            } => Box::new(
                PhaseCodeWaveform::new(code, length, chip_width, sample_rate, prf)
                    .with_context(|| format!("building {:?} phase code of length {}", code, length))?,
            ),
        };
        Ok(waveform)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    #[serde(flatten)]
    pub radar: RadarConfig,
    /// Raw complex64 receive capture.
    pub capture: Option<PathBuf>,
    /// Bytes skipped at the start of the capture to land on a pulse boundary.
    pub capture_offset_bytes: u64,
    /// Raw complex64 transmit pulse; `waveform` is synthesized otherwise.
    pub reference: Option<PathBuf>,
    pub waveform: WaveformConfig,
    pub calibration: Option<PathBuf>,
    pub radio: String,
    pub master_clock_rate: Option<f64>,
    pub calibration_policy: CalibrationPolicy,
    /// Recorded range-Doppler frames (complex64, column-major).
    pub output: Option<PathBuf>,
    pub cfar: Option<CfarConfig>,
    pub scene: Option<SceneConfig>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            radar: RadarConfig::default(),
            capture: None,
            capture_offset_bytes: 0,
            reference: None,
            waveform: WaveformConfig::default(),
            calibration: None,
            radio: "default".into(),
            master_clock_rate: None,
            calibration_policy: CalibrationPolicy::Warn,
            output: None,
            cfar: None,
            scene: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .radar
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn hardware_key(&self) -> HardwareKey {
        HardwareKey::new(
            self.radio.clone(),
            self.radar.carrier_freq,
            self.radar.sample_rate,
        )
    }

    /// Transmit pulse synthesized from `waveform` at `sample_rate`.
    pub fn synthesized_pulse(&self, sample_rate: f64) -> anyhow::Result<Vec<Sample>> {
        Ok(self.waveform.build(sample_rate, self.radar.prf)?.pulse())
    }

    /// The transmit pulse: the reference file when configured, else the synthesized waveform.
    pub fn transmit_pulse(&self) -> anyhow::Result<Vec<Sample>> {
        match &self.reference {
            Some(path) => {
                let pulse = read_complex64(path, 0, None)
                    .with_context(|| format!("reading reference waveform {}", path.display()))?;
                anyhow::ensure!(!pulse.is_empty(), "reference waveform {} is empty", path.display());
                Ok(pulse)
            }
            None => self.synthesized_pulse(self.radar.sample_rate),
        }
    }
}
