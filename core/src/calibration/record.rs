use crate::prelude::{ProcessingError, ProcessingResult};
use crate::telemetry::log::LogManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const RATE_TOLERANCE: f64 = 1e-9;

fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() <= RATE_TOLERANCE * a.abs().max(b.abs())
}

/// Hardware configuration a delay measurement is valid for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareKey {
    pub radio: String,
    pub carrier_freq: f64,
    pub sample_rate: f64,
}

impl HardwareKey {
    pub fn new(radio: impl Into<String>, carrier_freq: f64, sample_rate: f64) -> Self {
        Self {
            radio: radio.into(),
            carrier_freq,
            sample_rate,
        }
    }
}

/// One persisted loop-delay measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub carrier_freq: f64,
    pub sample_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_clock_rate: Option<f64>,
    pub delay_samples: i64,
    /// Absent when the capture left no off-peak lags to measure a floor from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_to_noise_db: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl CalibrationRecord {
    pub fn matches(&self, key: &HardwareKey) -> bool {
        same_rate(self.carrier_freq, key.carrier_freq)
            && same_rate(self.sample_rate, key.sample_rate)
    }
}

/// What live processing does when no stored record fits the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPolicy {
    /// Log the mismatch and run with a zero delay.
    #[default]
    Warn,
    /// Refuse to start.
    Refuse,
}

/// Calibration file contents: records grouped by radio identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationStore {
    radios: BTreeMap<String, Vec<CalibrationRecord>>,
}

impl CalibrationStore {
    pub fn load<P: AsRef<Path>>(path: P) -> ProcessingResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Like [`CalibrationStore::load`] but treats a missing file as empty.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> ProcessingResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> ProcessingResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.radios.values().all(Vec::is_empty)
    }

    pub fn records(&self, radio: &str) -> &[CalibrationRecord] {
        self.radios.get(radio).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Inserts `record`, replacing any entry for the same carrier and rate.
    pub fn upsert(&mut self, radio: &str, record: CalibrationRecord) {
        let key = HardwareKey::new(radio, record.carrier_freq, record.sample_rate);
        let entries = self.radios.entry(radio.to_string()).or_default();
        match entries.iter_mut().find(|existing| existing.matches(&key)) {
            Some(existing) => *existing = record,
            None => entries.push(record),
        }
    }

    pub fn lookup(&self, key: &HardwareKey) -> ProcessingResult<&CalibrationRecord> {
        let entries = self.records(&key.radio);
        entries.iter().find(|r| r.matches(key)).ok_or_else(|| {
            let stored = entries
                .iter()
                .map(|r| format!("{:.6e} Hz @ {:.6e} S/s", r.carrier_freq, r.sample_rate))
                .collect::<Vec<_>>();
            ProcessingError::ConfigMismatch(format!(
                "no delay for radio '{}' at {:.6e} Hz, {:.6e} S/s (stored: [{}])",
                key.radio,
                key.carrier_freq,
                key.sample_rate,
                stored.join(", ")
            ))
        })
    }

    /// Delay to apply at startup under `policy`.
    pub fn resolve_delay(
        &self,
        key: &HardwareKey,
        policy: CalibrationPolicy,
    ) -> ProcessingResult<i64> {
        let logger = LogManager::new("calibration");
        match (self.lookup(key), policy) {
            (Ok(record), _) => {
                logger.record(&format!(
                    "using loop delay of {} samples measured {}",
                    record.delay_samples, record.timestamp
                ));
                Ok(record.delay_samples)
            }
            (Err(err), CalibrationPolicy::Warn) => {
                logger.warn(&format!("{}; range axis is uncalibrated", err));
                Ok(0)
            }
            (Err(err), CalibrationPolicy::Refuse) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(carrier_freq: f64, sample_rate: f64, delay_samples: i64) -> CalibrationRecord {
        CalibrationRecord {
            carrier_freq,
            sample_rate,
            master_clock_rate: None,
            delay_samples,
            peak_to_noise_db: Some(30.0),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_matching_entry_and_keeps_others() {
        let mut store = CalibrationStore::default();
        store.upsert("b210", record(5e9, 50e6, 40));
        store.upsert("b210", record(5e9, 25e6, 22));
        store.upsert("b210", record(5e9, 50e6, 41));
        store.upsert("x310", record(5e9, 50e6, 90));

        assert_eq!(store.records("b210").len(), 2);
        let key = HardwareKey::new("b210", 5e9, 50e6);
        assert_eq!(store.lookup(&key).unwrap().delay_samples, 41);
        assert_eq!(
            store.lookup(&HardwareKey::new("x310", 5e9, 50e6)).unwrap().delay_samples,
            90
        );
    }

    #[test]
    fn save_merges_with_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("delay.json");

        let mut first = CalibrationStore::load_or_default(&path).unwrap();
        assert!(first.is_empty());
        first.upsert("b210", record(3e9, 10e6, 12));
        first.save(&path).unwrap();

        let mut second = CalibrationStore::load(&path).unwrap();
        second.upsert("b210", record(5e9, 10e6, 14));
        second.save(&path).unwrap();

        let reloaded = CalibrationStore::load(&path).unwrap();
        assert_eq!(reloaded.records("b210").len(), 2);
        assert_eq!(reloaded, second);
    }

    #[test]
    fn mismatch_follows_policy() {
        let mut store = CalibrationStore::default();
        store.upsert("b210", record(5e9, 50e6, 40));
        let other_rate = HardwareKey::new("b210", 5e9, 20e6);

        assert!(matches!(
            store.lookup(&other_rate),
            Err(ProcessingError::ConfigMismatch(_))
        ));
        assert_eq!(store.resolve_delay(&other_rate, CalibrationPolicy::Warn).unwrap(), 0);
        assert!(matches!(
            store.resolve_delay(&other_rate, CalibrationPolicy::Refuse),
            Err(ProcessingError::ConfigMismatch(_))
        ));
        let exact = HardwareKey::new("b210", 5e9, 50e6);
        assert_eq!(store.resolve_delay(&exact, CalibrationPolicy::Refuse).unwrap(), 40);
    }
}
