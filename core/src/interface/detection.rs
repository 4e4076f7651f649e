use serde::{Deserialize, Serialize};

/// Detection emitted by the CFAR stage for one range-Doppler cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub sequence: u64,
    pub range_bin: usize,
    pub doppler_bin: usize,
    pub range_m: f64,
    pub velocity_mps: f64,
    /// Cell power over the local noise estimate.
    pub snr_db: f32,
}

impl DetectionRecord {
    pub fn new(
        sequence: u64,
        range_bin: usize,
        doppler_bin: usize,
        range_m: f64,
        velocity_mps: f64,
        snr_db: f32,
    ) -> Self {
        Self {
            sequence,
            range_bin,
            doppler_bin,
            range_m,
            velocity_mps,
            snr_db,
        }
    }
}
