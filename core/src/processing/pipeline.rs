use crate::interface::{AxisSet, PulseMatrix, RangeDopplerFrame, RangeDopplerMatrix};
use crate::io::recorder::{FrameRecorder, RecordingManifest};
use crate::prelude::{ProcessingError, ProcessingResult, ProcessingStage, RadarConfig, Sample};
use crate::processing::axes::AxisCalculator;
use crate::processing::cfar::CfarDetector;
use crate::processing::doppler::DopplerTransform;
use crate::processing::framer::SampleFramer;
use crate::processing::normalize::MapNormalizer;
use crate::processing::range::MatchedFilter;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::waveform::matched_filter_kernel;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast::{self, error::RecvError};

/// Output of one CPI: the complex map for recording and the display frame.
#[derive(Debug, Clone)]
pub struct ProcessedCpi {
    pub map: RangeDopplerMatrix,
    pub frame: RangeDopplerFrame,
}

/// The fixed linear chain matched filter -> Doppler -> normalizer (-> CFAR).
pub struct Pipeline {
    matched_filter: MatchedFilter,
    doppler: DopplerTransform,
    normalizer: MapNormalizer,
    cfar: Option<CfarDetector>,
    axes: AxisSet,
    queue_depth: usize,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl Pipeline {
    /// `kernel` is the matched filter as applied; `delay_samples` is the
    /// calibrated loop delay used for the range axis.
    pub fn new(config: &RadarConfig, kernel: Vec<Sample>, delay_samples: i64) -> ProcessingResult<Self> {
        config.validate()?;
        let axes = AxisCalculator::new(config, kernel.len(), delay_samples).axes();
        let matched_filter =
            MatchedFilter::new(kernel, config.range_bins_per_pulse(), config.convolution)?;
        Ok(Self {
            matched_filter,
            doppler: DopplerTransform::new(config.pulses_per_cpi)?,
            normalizer: MapNormalizer::new(config.dynamic_range_db)?,
            cfar: None,
            axes,
            queue_depth: config.queue_depth,
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("pipeline"),
        })
    }

    /// Same as [`Pipeline::new`] with the kernel derived from the transmit pulse.
    pub fn from_transmit_pulse(
        config: &RadarConfig,
        pulse: &[Sample],
        delay_samples: i64,
    ) -> ProcessingResult<Self> {
        Self::new(config, matched_filter_kernel(pulse), delay_samples)
    }

    /// Adds CFAR detection; the detector's Doppler window must fit the CPI.
    pub fn with_cfar(mut self, detector: CfarDetector) -> ProcessingResult<Self> {
        detector.check_doppler_bins(self.doppler.doppler_bins())?;
        self.cfar = Some(detector);
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn axes(&self) -> &AxisSet {
        &self.axes
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    /// Runs one CPI through every stage on the calling thread.
    pub fn process(&self, pulses: PulseMatrix) -> ProcessingResult<ProcessedCpi> {
        let info = pulses.info();
        let compressed = self.matched_filter.execute(pulses)?;
        let map = self.doppler.execute(compressed)?;
        let image = self.normalizer.normalize(&map);
        if image.degenerate {
            self.metrics.record_degenerate();
        }
        let detections = match &self.cfar {
            Some(detector) => detector.detect(&map, &self.axes)?,
            None => Vec::new(),
        };
        self.metrics.record_processed();

        let frame = RangeDopplerFrame {
            info,
            image,
            axes: self.axes.clone(),
            detections,
        };
        Ok(ProcessedCpi { map, frame })
    }

    /// Moves framing and processing onto a worker thread.
    ///
    /// Frames are published in framing order on a channel holding at most
    /// `queue_depth` frames; a slow subscriber loses the oldest ones. The
    /// returned subscriber exists before the first frame is sent.
    pub fn spawn(
        self,
        framer: SampleFramer,
        recorder: Option<FrameRecorder>,
    ) -> (PipelineHandle, FrameSubscriber) {
        let (sender, receiver) = broadcast::channel(self.queue_depth.max(1));
        let metrics = self.metrics.clone();
        let template = receiver.resubscribe();
        let worker = thread::spawn(move || self.run(framer, recorder, sender));
        let handle = PipelineHandle {
            worker,
            template,
            metrics: metrics.clone(),
        };
        (handle, FrameSubscriber { receiver, metrics })
    }

    fn run(
        self,
        mut framer: SampleFramer,
        mut recorder: Option<FrameRecorder>,
        sender: broadcast::Sender<Arc<RangeDopplerFrame>>,
    ) -> ProcessingResult<PipelineSummary> {
        let outcome = self.drain(&mut framer, recorder.as_mut(), &sender);
        let recording = recorder.map(FrameRecorder::finish);

        let stopped_by = match outcome {
            Ok(stopped_by) => stopped_by,
            Err(err) => {
                self.metrics.record_error();
                if let Some(Err(finish_err)) = recording {
                    self.logger
                        .warn(&format!("recording left incomplete: {}", finish_err));
                }
                return Err(err);
            }
        };
        self.logger.record(&format!("stream ended: {}", stopped_by));
        Ok(PipelineSummary {
            metrics: self.metrics.snapshot(),
            recording: recording.transpose()?,
            stopped_by,
        })
    }

    /// Frames, processes, records and publishes until framing stops. Returns
    /// the framing error that ended the stream.
    fn drain(
        &self,
        framer: &mut SampleFramer,
        mut recorder: Option<&mut FrameRecorder>,
        sender: &broadcast::Sender<Arc<RangeDopplerFrame>>,
    ) -> ProcessingResult<ProcessingError> {
        loop {
            let pulses = match framer.next_cpi() {
                Ok(pulses) => pulses,
                Err(err @ ProcessingError::InsufficientSamples { .. }) => return Ok(err),
                Err(err) => return Err(err),
            };
            let processed = self.process(pulses)?;
            if let Some(recorder) = recorder.as_mut() {
                recorder.record(&processed.map, &self.axes)?;
            }
            let sequence = processed.frame.info.sequence;
            if sender.send(Arc::new(processed.frame)).is_err() {
                self.logger
                    .detail(&format!("CPI {} had no subscribers", sequence));
            }
        }
    }
}

/// Final accounting for a streaming run.
#[derive(Debug)]
pub struct PipelineSummary {
    pub metrics: MetricsSnapshot,
    pub recording: Option<RecordingManifest>,
    /// The condition that ended framing, normally `InsufficientSamples`.
    pub stopped_by: ProcessingError,
}

pub struct PipelineHandle {
    worker: JoinHandle<ProcessingResult<PipelineSummary>>,
    template: broadcast::Receiver<Arc<RangeDopplerFrame>>,
    metrics: Arc<MetricsRecorder>,
}

impl PipelineHandle {
    /// Subscribes from the next published frame on.
    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber {
            receiver: self.template.resubscribe(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    /// Waits for the worker to drain the stream.
    pub fn join(self) -> ProcessingResult<PipelineSummary> {
        self.worker.join().map_err(|_| {
            ProcessingError::InvalidInput("pipeline worker panicked".into())
        })?
    }
}

/// Receiving end for display or recording sinks.
pub struct FrameSubscriber {
    receiver: broadcast::Receiver<Arc<RangeDopplerFrame>>,
    metrics: Arc<MetricsRecorder>,
}

impl FrameSubscriber {
    fn note_lag(&self, skipped: u64) {
        self.metrics.record_dropped(skipped);
        log::warn!("display fell behind, dropped {} oldest frames", skipped);
    }

    /// Blocks for the next frame; `None` once the pipeline has finished.
    /// Must not be called from inside an async runtime.
    pub fn next_blocking(&mut self) -> Option<Arc<RangeDopplerFrame>> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub async fn next(&mut self) -> Option<Arc<RangeDopplerFrame>> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::CpiInfo;
    use crate::io::recorder::manifest_path;
    use crate::io::stream::{sample_channel, SampleStream};
    use ndarray::Array2;
    use crate::processing::cfar::CfarConfig;
    use crate::processing::framer::FramerConfig;
    use crate::waveform::{LinearFmWaveform, Waveform};
    use rustfft::num_traits::Zero;
    use std::f32::consts::PI;
    use tempfile::tempdir;

    fn small_config(queue_depth: usize) -> RadarConfig {
        RadarConfig {
            sample_rate: 1e6,
            carrier_freq: 1e9,
            prf: 1e4,
            pulses_per_cpi: 8,
            dynamic_range_db: -60.0,
            queue_depth,
            frame_timeout_ms: 50,
            ..Default::default()
        }
    }

    /// Echoes of `pulse` at `delay` samples with a per-pulse Doppler phase step.
    fn echo_stream(config: &RadarConfig, pulse: &[Sample], delay: usize, cpis: usize) -> Vec<Sample> {
        let pri = config.range_bins_per_pulse();
        let pulses = config.pulses_per_cpi * cpis;
        let mut samples = vec![Sample::zero(); pri * pulses];
        for p in 0..pulses {
            let phase = Sample::from_polar(1.0, 2.0 * PI * 0.25 * p as f32);
            for (i, s) in pulse.iter().enumerate() {
                samples[p * pri + delay + i] = *s * phase;
            }
        }
        samples
    }

    #[test]
    fn impulse_scenario_spreads_evenly_across_doppler() {
        let config = RadarConfig {
            sample_rate: 16.0,
            prf: 1.0,
            pulses_per_cpi: 4,
            ..small_config(1)
        };
        let mut kernel = vec![Sample::zero(); 5];
        kernel[0] = Sample::new(1.0, 0.0);
        let pipeline = Pipeline::new(&config, kernel, 0).unwrap();

        let mut samples = vec![Sample::zero(); 64];
        samples[10] = Sample::new(1.0, 0.0);
        let framer_config = FramerConfig::from_radar(&config);
        let pulses = SampleFramer::frame_slice(&framer_config, &samples, 0).unwrap();

        let processed = pipeline.process(pulses).unwrap();
        assert_eq!(processed.map.rows(), 16 + 5 - 1);
        for col in 0..4 {
            assert!((processed.map.data()[[10, col]].norm() - 1.0).abs() < 1e-6);
            assert_eq!(processed.frame.image.db[[10, col]], 0.0);
        }
        assert_eq!(processed.frame.axes.range_m.len(), 20);
        assert_eq!(processed.frame.axes.velocity_mps.len(), 4);
    }

    #[test]
    fn lfm_echo_peaks_at_delay_and_doppler_bin() {
        let config = small_config(1);
        let waveform = LinearFmWaveform::new(5e5, 20e-6, config.sample_rate, config.prf).unwrap();
        let pipeline = Pipeline::new(&config, waveform.matched_filter(), 0)
            .unwrap()
            .with_cfar(
                CfarDetector::new(CfarConfig {
                    guard_cells: [2, 1],
                    training_cells: [6, 2],
                    pfa: 1e-4,
                })
                .unwrap(),
            )
            .unwrap();
        let samples = echo_stream(&config, &waveform.pulse(), 30, 1);
        let pulses =
            SampleFramer::frame_slice(&FramerConfig::from_radar(&config), &samples, 0).unwrap();

        let processed = pipeline.process(pulses).unwrap();
        let image = &processed.frame.image;
        let (peak, _) = image
            .db
            .indexed_iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        // Full-convolution peak sits at delay + L - 1; a quarter-cycle phase step is bin N/2 + N/4.
        assert_eq!(peak, (30 + 20 - 1, 6));
        assert!(processed
            .frame
            .detections
            .iter()
            .any(|d| d.range_bin == 49 && d.doppler_bin == 6));
    }

    #[test]
    fn streaming_run_delivers_frames_in_order_and_records() {
        let config = small_config(2);
        let waveform = LinearFmWaveform::new(5e5, 20e-6, config.sample_rate, config.prf).unwrap();
        let samples = echo_stream(&config, &waveform.pulse(), 12, 3);
        let framer = SampleFramer::new(
            FramerConfig::from_radar(&config),
            SampleStream::from_samples(samples),
        )
        .unwrap();
        let dir = tempdir().unwrap();
        let recorder = FrameRecorder::create(dir.path().join("rdm.dat")).unwrap();

        let pipeline = Pipeline::new(&config, waveform.matched_filter(), 0).unwrap();
        let (handle, mut subscriber) = pipeline.spawn(framer, Some(recorder));

        let mut sequences = Vec::new();
        while let Some(frame) = subscriber.next_blocking() {
            sequences.push(frame.info.sequence);
        }
        let summary = handle.join().unwrap();

        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(summary.metrics.processed, 3);
        assert_eq!(
            sequences.len() as u64 + summary.metrics.dropped,
            summary.metrics.processed
        );
        assert!(matches!(
            summary.stopped_by,
            ProcessingError::InsufficientSamples { .. }
        ));
        assert_eq!(summary.recording.unwrap().frames, 3);
    }

    #[test]
    fn slow_subscriber_loses_oldest_frames() {
        let config = small_config(1);
        let samples = vec![Sample::new(1.0, 0.0); config.samples_per_cpi() * 5];
        let framer = SampleFramer::new(
            FramerConfig::from_radar(&config),
            SampleStream::from_samples(samples),
        )
        .unwrap();
        let pipeline = Pipeline::new(&config, vec![Sample::new(1.0, 0.0)], 0).unwrap();
        let (handle, mut subscriber) = pipeline.spawn(framer, None);
        let metrics = handle.metrics();
        handle.join().unwrap();

        let mut received = Vec::new();
        while let Some(frame) = subscriber.next_blocking() {
            received.push(frame.info.sequence);
        }
        assert_eq!(received.last(), Some(&4));
        assert_eq!(received.len() as u64 + metrics.snapshot().dropped, 5);
        assert!(metrics.snapshot().dropped >= 1);
    }

    #[test]
    fn zero_input_is_degenerate_but_not_fatal() {
        let config = small_config(1);
        let shared = Arc::new(MetricsRecorder::new());
        let pipeline = Pipeline::new(&config, vec![Sample::new(1.0, 0.0)], 0)
            .unwrap()
            .with_metrics(shared.clone());
        let samples = vec![Sample::zero(); config.samples_per_cpi()];
        let pulses =
            SampleFramer::frame_slice(&FramerConfig::from_radar(&config), &samples, 0).unwrap();
        let processed = pipeline.process(pulses).unwrap();
        assert!(processed.frame.image.degenerate);
        assert_eq!(shared.snapshot().degenerate, 1);
        assert_eq!(shared.snapshot().processed, 1);
    }

    #[test]
    fn cfar_window_wider_than_cpi_is_rejected_at_build() {
        // Eight pulses cannot hold the default 13-cell Doppler window.
        let config = small_config(1);
        let pipeline = Pipeline::new(&config, vec![Sample::new(1.0, 0.0)], 0).unwrap();
        let result = pipeline.with_cfar(CfarDetector::new(CfarConfig::default()).unwrap());
        assert!(matches!(result, Err(ProcessingError::InvalidConfig(_))));
    }

    #[test]
    fn recording_failure_is_counted_and_leaves_a_manifest() {
        let config = small_config(1);
        let dir = tempdir().unwrap();
        let path = dir.path().join("rdm.dat");
        let mut recorder = FrameRecorder::create(&path).unwrap();
        let stale = RangeDopplerMatrix::from_array(
            Array2::from_elem((3, 2), Sample::new(1.0, 0.0)),
            CpiInfo::default(),
        );
        let stale_axes = AxisSet {
            range_m: vec![0.0; 3],
            velocity_mps: vec![0.0; 2],
        };
        recorder.record(&stale, &stale_axes).unwrap();
        assert_eq!(recorder.frames(), 1);

        let samples = vec![Sample::new(1.0, 0.0); config.samples_per_cpi()];
        let framer = SampleFramer::new(
            FramerConfig::from_radar(&config),
            SampleStream::from_samples(samples),
        )
        .unwrap();
        let pipeline = Pipeline::new(&config, vec![Sample::new(1.0, 0.0)], 0).unwrap();
        let (handle, _subscriber) = pipeline.spawn(framer, Some(recorder));
        let metrics = handle.metrics();

        assert!(matches!(
            handle.join(),
            Err(ProcessingError::InvalidInput(_))
        ));
        assert_eq!(metrics.snapshot().errors, 1);
        let manifest: RecordingManifest =
            serde_json::from_str(&std::fs::read_to_string(manifest_path(&path)).unwrap())
                .unwrap();
        assert_eq!(manifest.frames, 1);
        assert_eq!((manifest.rows, manifest.cols), (3, 2));
    }

    #[tokio::test]
    async fn late_subscriber_receives_frames_asynchronously() {
        let config = RadarConfig {
            frame_timeout_ms: 5_000,
            ..small_config(2)
        };
        let (writer, stream) = sample_channel(4);
        let framer = SampleFramer::new(FramerConfig::from_radar(&config), stream).unwrap();
        assert_eq!(framer.config().samples_per_cpi(), config.samples_per_cpi());
        let pipeline = Pipeline::new(&config, vec![Sample::new(1.0, 0.0)], 0).unwrap();
        let (handle, _first) = pipeline.spawn(framer, None);

        let mut late = handle.subscribe();
        for _ in 0..2 {
            writer
                .push(vec![Sample::new(1.0, 0.0); config.samples_per_cpi()])
                .unwrap();
        }
        drop(writer);

        let mut sequences = Vec::new();
        while let Some(frame) = late.next().await {
            sequences.push(frame.info.sequence);
        }
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(handle.join().unwrap().metrics.processed, 2);
    }
}
