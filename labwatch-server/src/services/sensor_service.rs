use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use labwatch_api::SensorId;

use crate::errors::SensorError;

/// Temperature probes addressed by id
pub trait SensorSource: Send + Sync {
    /// Ids of the probes currently attached
    fn discover(&self) -> Vec<SensorId>;

    /// One result per requested id; a failed probe never hides the others
    fn read_all(&self, sensor_ids: &[SensorId]) -> BTreeMap<SensorId, Result<f64, SensorError>>;
}

/// DS18B20 probes exposed by the 1-Wire sysfs driver
pub struct W1SensorSource {
    base_dir: PathBuf,
}

impl W1SensorSource {
    const FAMILY_PREFIX: &'static str = "28";
    const SLAVE_FILE: &'static str = "w1_slave";

    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn read(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let content = fs::read_to_string(self.base_dir.join(sensor_id).join(Self::SLAVE_FILE))?;
        parse_w1_slave(&content)
    }
}

impl SensorSource for W1SensorSource {
    fn discover(&self) -> Vec<SensorId> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot list sensors in {:?}: {}", self.base_dir, e);
                return Vec::new();
            }
        };

        let mut sensor_ids: Vec<SensorId> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(Self::FAMILY_PREFIX))
            .collect();
        sensor_ids.sort();

        sensor_ids
    }

    fn read_all(&self, sensor_ids: &[SensorId]) -> BTreeMap<SensorId, Result<f64, SensorError>> {
        sensor_ids
            .iter()
            .map(|sensor_id| (sensor_id.clone(), self.read(sensor_id)))
            .collect()
    }
}

/// Parses the two-line `w1_slave` payload into degrees Celsius, rounded to 2 decimals.
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(content: &str) -> Result<f64, SensorError> {
    let mut lines = content.lines();

    let crc_line = lines.next().ok_or(SensorError::CrcMismatch)?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch);
    }

    let data_line = lines.next().ok_or(SensorError::MissingTemperature)?;
    let (_, raw) = data_line
        .split_once("t=")
        .ok_or(SensorError::MissingTemperature)?;

    let millidegrees: f64 = raw
        .trim()
        .parse()
        .map_err(|_| SensorError::InvalidValue(raw.trim().to_string()))?;

    Ok((millidegrees / 1000.0 * 100.0).round() / 100.0)
}
