use serde::{Deserialize, Serialize};

pub type SensorId = String;

/// Per-sensor entry of the alarm document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Display name
    pub name: String,
    /// Alarm trigger temperature in Celsius
    pub trigger: f64,
}

impl SensorConfig {
    /// Trigger applied to sensors registered by discovery
    pub const DEFAULT_TRIGGER: f64 = 30.0;

    pub fn discovered(sensor_id: &str) -> Self {
        Self {
            name: sensor_id.to_string(),
            trigger: Self::DEFAULT_TRIGGER,
        }
    }
}

/// One temperature sample taken during a monitor tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: SensorId,
    /// Temperature in Celsius, meaningless when `read_ok` is false
    pub temperature: f64,
    pub read_ok: bool,
}

impl SensorReading {
    pub fn ok(sensor_id: impl Into<SensorId>, temperature: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            temperature,
            read_ok: true,
        }
    }

    pub fn failed(sensor_id: impl Into<SensorId>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            temperature: 0.0,
            read_ok: false,
        }
    }
}
