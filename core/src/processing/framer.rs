use crate::interface::{CpiInfo, PulseMatrix};
use crate::io::stream::SampleStream;
use crate::prelude::{ProcessingError, ProcessingResult, RadarConfig, Sample};
use crate::telemetry::log::LogManager;
use std::time::{Duration, Instant};

/// Geometry of one CPI and how far consecutive frames advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    pub range_bins: usize,
    pub pulses: usize,
    /// Samples between frame starts; equal to the CPI length for disjoint frames.
    pub stride_samples: usize,
    pub timeout: Duration,
}

impl FramerConfig {
    pub fn from_radar(config: &RadarConfig) -> Self {
        Self {
            range_bins: config.range_bins_per_pulse(),
            pulses: config.pulses_per_cpi,
            stride_samples: config.stride_samples(),
            timeout: Duration::from_millis(config.frame_timeout_ms),
        }
    }

    pub fn samples_per_cpi(&self) -> usize {
        self.range_bins * self.pulses
    }

    fn validate(&self) -> ProcessingResult<()> {
        if self.samples_per_cpi() == 0 {
            return Err(ProcessingError::InvalidConfig("empty CPI geometry".into()));
        }
        if self.stride_samples == 0 || self.stride_samples > self.samples_per_cpi() {
            return Err(ProcessingError::InvalidConfig(format!(
                "stride of {} samples must be within 1..={}",
                self.stride_samples,
                self.samples_per_cpi()
            )));
        }
        Ok(())
    }
}

/// Slices a sample stream into pulse matrices, one CPI at a time.
pub struct SampleFramer {
    config: FramerConfig,
    stream: SampleStream,
    buffer: Vec<Sample>,
    next_start: u64,
    sequence: u64,
    logger: LogManager,
}

impl SampleFramer {
    pub fn new(config: FramerConfig, stream: SampleStream) -> ProcessingResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stream,
            buffer: Vec::with_capacity(config.samples_per_cpi()),
            next_start: 0,
            sequence: 0,
            logger: LogManager::new("framer"),
        })
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Frames the CPI starting at `offset` of an in-memory sample slice.
    pub fn frame_slice(
        config: &FramerConfig,
        samples: &[Sample],
        offset: usize,
    ) -> ProcessingResult<PulseMatrix> {
        let required = config.samples_per_cpi();
        let available = samples.len().saturating_sub(offset);
        if available < required {
            return Err(ProcessingError::InsufficientSamples {
                required,
                available,
            });
        }
        PulseMatrix::from_column_major(
            config.range_bins,
            config.pulses,
            samples[offset..offset + required].to_vec(),
            CpiInfo {
                sequence: 0,
                start_sample: offset as u64,
            },
        )
    }

    /// Waits up to the configured timeout for one more CPI of samples.
    ///
    /// Fails with `InsufficientSamples` when the stream ends or the wait
    /// times out first; buffered samples are kept for a later call.
    pub fn next_cpi(&mut self) -> ProcessingResult<PulseMatrix> {
        let required = self.config.samples_per_cpi();
        let deadline = Instant::now() + self.config.timeout;
        while self.buffer.len() < required {
            match self.stream.next_chunk(deadline) {
                Some(chunk) => self.buffer.extend(chunk),
                None => {
                    return Err(ProcessingError::InsufficientSamples {
                        required,
                        available: self.buffer.len(),
                    })
                }
            }
        }

        let info = CpiInfo {
            sequence: self.sequence,
            start_sample: self.next_start,
        };
        let samples = self.buffer[..required].to_vec();
        self.buffer.drain(..self.config.stride_samples);
        self.next_start += self.config.stride_samples as u64;
        self.sequence += 1;

        self.logger.detail(&format!(
            "framed CPI {} starting at sample {}",
            info.sequence, info.start_sample
        ));
        PulseMatrix::from_column_major(self.config.range_bins, self.config.pulses, samples, info)
    }
}

impl Iterator for SampleFramer {
    type Item = PulseMatrix;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_cpi() {
            Ok(matrix) => Some(matrix),
            Err(err) => {
                self.logger.record(&format!("framing stopped: {}", err));
                None
            }
        }
    }
}
