use log::{debug, info, warn};

/// Tags log lines with the stage that produced them.
#[derive(Debug, Clone)]
pub struct LogManager {
    stage: &'static str,
}

impl LogManager {
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.stage, message);
    }

    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.stage, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.stage, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("rdcore")
    }
}
