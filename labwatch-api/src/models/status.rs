use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Contact, SensorId, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Main,
    Backup,
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerSource::Main => write!(f, "Main"),
            PowerSource::Backup => write!(f, "Backup"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "2G")]
    G2,
    #[serde(rename = "3G")]
    G3,
    #[serde(rename = "4G")]
    G4,
    #[serde(rename = "5G")]
    G5,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkType::None => "NONE",
            NetworkType::G2 => "2G",
            NetworkType::G3 => "3G",
            NetworkType::G4 => "4G",
            NetworkType::G5 => "5G",
            NetworkType::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Link quality as last observed by the modem loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemSession {
    /// Signal bucket, 0 (none) to 4 (excellent)
    pub signal_quality: u8,
    pub network_type: NetworkType,
    pub last_signal_refresh: Option<OffsetDateTime>,
}

impl ModemSession {
    pub fn degraded() -> Self {
        Self {
            signal_quality: 0,
            network_type: NetworkType::None,
            last_signal_refresh: None,
        }
    }
}

impl Default for ModemSession {
    fn default() -> Self {
        Self::degraded()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Normal,
    Above,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    pub status: ThresholdStatus,
    pub last_known_value: f64,
}

/// State published by the monitor loop after every tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub readings: Vec<SensorReading>,
    /// Sensors currently above their trigger
    pub above: BTreeMap<SensorId, ThresholdState>,
    pub armed: bool,
    pub alert_already_sent: bool,
    pub power_source: Option<PowerSource>,
    pub battery_percent: Option<u8>,
    pub low_battery_latched: bool,
    pub last_alert_time: Option<OffsetDateTime>,
    pub last_power_event_time: Option<OffsetDateTime>,
    pub next_daily_report: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

impl MonitorStatus {
    pub fn temperature_of(&self, sensor_id: &str) -> Option<f64> {
        self.readings
            .iter()
            .find(|reading| reading.read_ok && reading.sensor_id == sensor_id)
            .map(|reading| reading.temperature)
    }
}

/// Row of the dashboard sensor table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRow {
    pub sensor_id: SensorId,
    pub name: String,
    pub trigger: f64,
    pub temperature: f64,
    pub above: bool,
}

/// Everything a presentation layer needs to render the current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub high_temperature: bool,
    pub location: String,
    pub hysteresis: f64,
    /// Alert interval in minutes
    pub alert_interval: u64,
    pub daily_report_time: String,
    pub armed: bool,
    pub send_daily_report: bool,
    pub repeat_alerts: bool,
    pub signal_quality: u8,
    pub network_type: NetworkType,
    pub device_time: String,
    pub contacts: Vec<Contact>,
    pub power_source: Option<PowerSource>,
    pub battery_percent: Option<u8>,
    pub sensors: Vec<SensorRow>,
}
