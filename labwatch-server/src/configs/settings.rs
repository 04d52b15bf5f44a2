use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::configs::normalize_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modem {
    pub port_path: String,
    pub baud_rate: u32,
    /// Reply deadline for ordinary AT commands
    pub command_timeout_ms: u64,
    /// Reply deadline when waiting for the provider to confirm a segment
    pub send_timeout_ms: u64,
    /// Pause between writing a command and reading the reply
    pub settle_ms: u64,
    pub signal_refresh_secs: u64,
    pub send_retries: u32,
    pub reset_retries: u32,
    /// Pause after a failed health check
    pub recovery_backoff_ms: u64,
    /// Pause between two loop iterations
    pub idle_ms: u64,
}

impl Modem {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn signal_refresh(&self) -> Duration {
        Duration::from_secs(self.signal_refresh_secs)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

impl Default for Modem {
    fn default() -> Self {
        Self {
            port_path: "/dev/ttyAMA0".to_string(),
            baud_rate: 115_200,
            command_timeout_ms: 4_000,
            send_timeout_ms: 10_000,
            settle_ms: 1_000,
            signal_refresh_secs: 60,
            send_retries: 3,
            reset_retries: 3,
            recovery_backoff_ms: 1_000,
            idle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub check_interval_ms: u64,
    /// Battery percentage at or below which the low-battery alert fires
    pub low_battery_threshold: u8,
    pub sensor_base_dir: String,
}

impl Monitor {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            check_interval_ms: 5_000,
            low_battery_threshold: 20,
            sensor_base_dir: "/sys/bus/w1/devices".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub config_path: String,
    pub history_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Power {
    pub supply_dir: String,
    /// Name of the mains adapter node under `supply_dir`
    pub mains: String,
    /// Name of the battery node under `supply_dir`
    pub battery: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub modem: Modem,
    pub monitor: Monitor,
    pub storage: Storage,
    pub power: Option<Power>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        let mut settings: Settings = Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("LABWATCH").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.storage = Storage {
            config_path: Self::resolve(&settings.storage.config_path)?,
            history_path: Self::resolve(&settings.storage.history_path)?,
        };

        Ok(settings)
    }

    fn resolve(path: &str) -> Result<String, ConfigError> {
        Ok(normalize_path(path)
            .map_err(|e| ConfigError::Message(e.to_string()))?
            .to_string_lossy()
            .to_string())
    }
}
