use crate::generator::profile::render_scene;
use crate::generator::template::Loopback;
use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use rdcore::calibration::{CalibrationRecord, CalibrationStore, DelayCalibrator, HardwareKey};
use rdcore::interface::RangeDopplerFrame;
use rdcore::io::{read_complex64, sample_channel, FileSampleSource, FrameRecorder, SampleStream};
use rdcore::processing::{CfarDetector, FramerConfig, Pipeline, PipelineSummary, SampleFramer};
use std::path::Path;
use std::thread::JoinHandle;

/// Chunks buffered between file playback and the framer.
const PLAYBACK_CHUNKS: usize = 8;

pub struct WorkflowResult {
    pub frames_received: usize,
    pub delay_samples: i64,
    pub summary: PipelineSummary,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Loop delay for the configured hardware, resolved through the calibration policy.
    pub fn delay_samples(&self) -> anyhow::Result<i64> {
        let store = match &self.config.calibration {
            Some(path) => CalibrationStore::load_or_default(path)
                .with_context(|| format!("reading calibration file {}", path.display()))?,
            None => CalibrationStore::default(),
        };
        let delay = store
            .resolve_delay(&self.config.hardware_key(), self.config.calibration_policy)
            .context("resolving calibration for the configured hardware")?;
        Ok(delay)
    }

    pub fn build_pipeline(&self, delay_samples: i64) -> anyhow::Result<Pipeline> {
        let pulse = self.config.transmit_pulse()?;
        let mut pipeline = Pipeline::from_transmit_pulse(&self.config.radar, &pulse, delay_samples)
            .context("building processing pipeline")?;
        if let Some(cfar) = &self.config.cfar {
            let detector = CfarDetector::new(cfar.clone()).context("configuring CFAR detector")?;
            pipeline = pipeline
                .with_cfar(detector)
                .context("fitting CFAR window to the CPI")?;
        }
        Ok(pipeline)
    }

    fn open_source(
        &self,
    ) -> anyhow::Result<(SampleStream, Option<JoinHandle<rdcore::ProcessingResult<u64>>>)> {
        if let Some(path) = &self.config.capture {
            anyhow::ensure!(path.exists(), "capture file {} not found", path.display());
            let (writer, stream) = sample_channel(PLAYBACK_CHUNKS);
            let playback =
                FileSampleSource::new(path.clone(), self.config.capture_offset_bytes).spawn(writer);
            return Ok((stream, Some(playback)));
        }
        if let Some(scene) = &self.config.scene {
            let pulse = self.config.transmit_pulse()?;
            let samples = render_scene(scene, &self.config.radar, &pulse)?;
            return Ok((SampleStream::from_samples(samples), None));
        }
        bail!("workflow names neither a capture file nor a synthetic scene")
    }

    /// Streams the configured source through the pipeline, handing every
    /// delivered frame to `sink` in order.
    pub fn execute<F>(&self, mut sink: F) -> anyhow::Result<WorkflowResult>
    where
        F: FnMut(&RangeDopplerFrame),
    {
        let delay_samples = self.delay_samples()?;
        let pipeline = self.build_pipeline(delay_samples)?;
        let (stream, playback) = self.open_source()?;
        let framer = SampleFramer::new(FramerConfig::from_radar(&self.config.radar), stream)
            .context("configuring sample framer")?;
        let recorder = match &self.config.output {
            Some(path) => Some(
                FrameRecorder::create(path)
                    .with_context(|| format!("creating frame recording {}", path.display()))?,
            ),
            None => None,
        };

        let (handle, mut frames) = pipeline.spawn(framer, recorder);
        let mut frames_received = 0;
        while let Some(frame) = frames.next_blocking() {
            frames_received += 1;
            sink(frame.as_ref());
        }
        let summary = handle.join().context("processing stream")?;

        if let Some(playback) = playback {
            match playback.join() {
                Ok(result) => {
                    let delivered = result.context("playing back capture file")?;
                    log::info!("capture playback delivered {} samples", delivered);
                }
                Err(_) => bail!("capture playback thread panicked"),
            }
        }

        Ok(WorkflowResult {
            frames_received,
            delay_samples,
            summary,
        })
    }

    /// Measures the loop delay at each of `rates` (the configured sample rate
    /// when empty) and stores one record per rate.
    ///
    /// Without `capture` the transmit pulse is looped back through a simulated
    /// channel delayed by `simulated_delay` samples. A capture or reference
    /// file is only meaningful at a single rate.
    pub fn calibrate(
        &self,
        capture: Option<&Path>,
        simulated_delay: usize,
        rates: &[f64],
    ) -> anyhow::Result<Vec<CalibrationRecord>> {
        let store_path = self
            .config
            .calibration
            .as_deref()
            .context("workflow has no calibration file path")?;
        let rates = if rates.is_empty() {
            vec![self.config.radar.sample_rate]
        } else {
            rates.to_vec()
        };
        if rates.len() > 1 {
            anyhow::ensure!(
                capture.is_none() && self.config.reference.is_none(),
                "a capture or reference file cannot be swept over {} sample rates",
                rates.len()
            );
        }

        let mut store = CalibrationStore::load_or_default(store_path)
            .with_context(|| format!("reading calibration file {}", store_path.display()))?;
        let mut records = Vec::with_capacity(rates.len());
        for rate in rates {
            let mut radar = self.config.radar.clone();
            radar.sample_rate = rate;
            radar
                .validate()
                .with_context(|| format!("sample rate {:.6e} S/s", rate))?;
            let pulse = match self.config.reference {
                Some(_) => self.config.transmit_pulse()?,
                None => self.config.synthesized_pulse(rate)?,
            };
            let received = match capture {
                Some(path) => read_complex64(path, self.config.capture_offset_bytes, None)
                    .with_context(|| format!("reading loopback capture {}", path.display()))?,
                None => {
                    let capture_len = radar.range_bins_per_pulse().max(pulse.len());
                    Loopback::new(simulated_delay).capture(&pulse, capture_len + simulated_delay)?
                }
            };
            let key = HardwareKey::new(self.config.radio.clone(), radar.carrier_freq, rate);
            let record = DelayCalibrator::new(&pulse)
                .context("building delay calibrator")?
                .measure(&received, &key, self.config.master_clock_rate)
                .with_context(|| format!("delay calibration failed at {:.6e} S/s", rate))?;
            log::info!(
                "loop delay {} samples at {:.6e} S/s",
                record.delay_samples,
                rate
            );
            store.upsert(&key.radio, record.clone());
            records.push(record);
        }
        store
            .save(store_path)
            .with_context(|| format!("writing calibration file {}", store_path.display()))?;
        Ok(records)
    }
}
