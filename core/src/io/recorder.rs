use crate::interface::{AxisSet, RangeDopplerMatrix};
use crate::io::samples::write_complex64;
use crate::prelude::{ProcessingError, ProcessingResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sidecar written next to a recording so offline tools can reshape it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub data_file: PathBuf,
    pub sample_format: String,
    pub order: String,
    pub rows: usize,
    pub cols: usize,
    pub frames: u64,
    pub first_sequence: Option<u64>,
    pub axes: Option<AxisSet>,
}

/// Appends complex range-Doppler matrices to a flat complex64 file.
pub struct FrameRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    shape: Option<(usize, usize)>,
    frames: u64,
    first_sequence: Option<u64>,
    axes: Option<AxisSet>,
}

impl FrameRecorder {
    pub fn create<P: AsRef<Path>>(path: P) -> ProcessingResult<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            shape: None,
            frames: 0,
            first_sequence: None,
            axes: None,
        })
    }

    pub fn record(&mut self, map: &RangeDopplerMatrix, axes: &AxisSet) -> ProcessingResult<()> {
        let shape = (map.rows(), map.cols());
        match self.shape {
            Some(expected) if expected != shape => {
                return Err(ProcessingError::InvalidInput(format!(
                    "frame shape {:?} differs from recording shape {:?}",
                    shape, expected
                )));
            }
            Some(_) => {}
            None => {
                self.shape = Some(shape);
                self.first_sequence = Some(map.info().sequence);
                self.axes = Some(axes.clone());
            }
        }
        write_complex64(&mut self.writer, &map.to_column_major())?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flushes the data and writes `<data file>.json`.
    pub fn finish(mut self) -> ProcessingResult<RecordingManifest> {
        self.writer.flush()?;
        let (rows, cols) = self.shape.unwrap_or((0, 0));
        let manifest = RecordingManifest {
            data_file: self.path.clone(),
            sample_format: "complex64_le".into(),
            order: "column_major".into(),
            rows,
            cols,
            frames: self.frames,
            first_sequence: self.first_sequence,
            axes: self.axes.take(),
        };
        let manifest_path = manifest_path(&self.path);
        let file = BufWriter::new(File::create(&manifest_path)?);
        serde_json::to_writer_pretty(file, &manifest)?;
        info!(
            "recorded {} frames to {} ({}x{})",
            manifest.frames,
            self.path.display(),
            rows,
            cols
        );
        Ok(manifest)
    }
}

pub fn manifest_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}
