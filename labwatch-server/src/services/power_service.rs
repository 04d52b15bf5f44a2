use std::fs;
use std::path::{Path, PathBuf};

use labwatch_api::PowerSource;

use crate::configs::Power;
use crate::errors::PowerError;

/// Mains/battery state of the host; `None` means unknown for this tick
pub trait PowerSupply: Send + Sync {
    fn status(&self) -> Option<PowerSource>;

    fn battery_percent(&self) -> Option<u8>;
}

/// Reads the kernel `power_supply` class
pub struct SysfsPowerSupply {
    mains: PathBuf,
    battery: PathBuf,
}

impl SysfsPowerSupply {
    pub fn new(power: &Power) -> Self {
        let supply_dir = Path::new(&power.supply_dir);

        Self {
            mains: supply_dir.join(&power.mains).join("online"),
            battery: supply_dir.join(&power.battery).join("capacity"),
        }
    }

    fn read_status(&self) -> Result<PowerSource, PowerError> {
        match read_value(&self.mains)?.as_str() {
            "1" => Ok(PowerSource::Main),
            "0" => Ok(PowerSource::Backup),
            other => Err(PowerError::InvalidValue(other.to_string())),
        }
    }

    fn read_battery(&self) -> Result<u8, PowerError> {
        let value = read_value(&self.battery)?;
        let percent: u8 = value
            .parse()
            .map_err(|_| PowerError::InvalidValue(value.clone()))?;

        Ok(percent.min(100))
    }
}

impl PowerSupply for SysfsPowerSupply {
    fn status(&self) -> Option<PowerSource> {
        self.read_status()
            .map_err(|e| tracing::debug!("Power status unknown: {}", e))
            .ok()
    }

    fn battery_percent(&self) -> Option<u8> {
        self.read_battery()
            .map_err(|e| tracing::debug!("Battery level unknown: {}", e))
            .ok()
    }
}

fn read_value(path: &Path) -> Result<String, PowerError> {
    let value = fs::read_to_string(path)?.trim().to_string();
    if value.is_empty() {
        return Err(PowerError::Unavailable);
    }

    Ok(value)
}

/// For hosts without a readable power supply
pub struct NoPowerSupply;

impl PowerSupply for NoPowerSupply {
    fn status(&self) -> Option<PowerSource> {
        None
    }

    fn battery_percent(&self) -> Option<u8> {
        None
    }
}
