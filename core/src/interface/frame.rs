use crate::interface::detection::DetectionRecord;
use crate::interface::matrix::CpiInfo;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Physical axes paired with every image: one range per row, one velocity per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSet {
    /// Metres, one entry per range-compressed row.
    pub range_m: Vec<f64>,
    /// Metres per second, one entry per Doppler bin.
    pub velocity_mps: Vec<f64>,
}

/// Decibel magnitudes relative to the frame peak, clamped to `[floor_db, 0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeDopplerImage {
    pub db: Array2<f32>,
    pub floor_db: f32,
    /// Linear peak magnitude that 0 dB refers to.
    pub peak_magnitude: f32,
    /// Set when the frame had no energy and was replaced by the floor.
    pub degenerate: bool,
}

impl RangeDopplerImage {
    pub fn shape(&self) -> (usize, usize) {
        self.db.dim()
    }
}

/// Everything delivered downstream for one CPI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeDopplerFrame {
    pub info: CpiInfo,
    pub image: RangeDopplerImage,
    pub axes: AxisSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<DetectionRecord>,
}
