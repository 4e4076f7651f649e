use rdcore::interface::RangeDopplerFrame;
use rdcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// Bridge status served on `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayStatus {
    pub message: String,
    pub frames_published: u64,
    pub last_sequence: Option<u64>,
    pub detections: usize,
    pub metrics: Option<MetricsSnapshot>,
}

/// Latest state handed to the external display. Holding one frame makes the
/// display's queue depth one: a newer frame replaces an unread one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayModel {
    pub frame: Option<RangeDopplerFrame>,
    pub status: DisplayStatus,
}

impl DisplayModel {
    pub fn replace_frame(&mut self, frame: &RangeDopplerFrame) {
        self.status.frames_published += 1;
        self.status.last_sequence = Some(frame.info.sequence);
        self.status.detections = frame.detections.len();
        self.frame = Some(frame.clone());
    }
}
