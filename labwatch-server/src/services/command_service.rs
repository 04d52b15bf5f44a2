use std::sync::Arc;

use labwatch_api::{
    normalize_phone_number, AlarmConfig, AlarmUpdate, ModemSession, MonitorStatus,
};
use tokio::sync::watch;

use crate::clock::{readable_time, Clock};
use crate::configs::{ConfigCache, History};
use crate::services::modem::InboundHandler;

const ADMIN_HELP: &str =
    "1. status\n2. time\n3. set repeat-alerts (on/off)\n4. set alert-interval (value in minutes)";
const NORMAL_HELP: &str = "1. status\n2. time";
const INVALID_REPLY: &str = "Invalid command. Send 'help' for more details.";
const UPDATE_FAILED_REPLY: &str = "Failed to update settings, try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Time,
    Help,
    SetRepeatAlerts(bool),
    /// Minutes
    SetAlertInterval(u64),
    Invalid,
}

impl Command {
    /// Parses trimmed, case-insensitive text; `set` commands are only recognised for admins
    pub fn parse(text: &str, is_admin: bool) -> Self {
        let text = text.trim().to_lowercase();

        match text.as_str() {
            "status" => return Command::Status,
            "time" => return Command::Time,
            "help" => return Command::Help,
            _ => {}
        }

        if !is_admin {
            return Command::Invalid;
        }

        match text.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["set", "repeat-alerts", "on"] => Command::SetRepeatAlerts(true),
            ["set", "repeat-alerts", "off"] => Command::SetRepeatAlerts(false),
            ["set", "alert-interval", minutes] => match minutes.parse::<u64>() {
                Ok(minutes) if minutes > 0 => Command::SetAlertInterval(minutes),
                _ => Command::Invalid,
            },
            _ => Command::Invalid,
        }
    }
}

/// Answers SMS commands from known contacts
pub struct CommandRouter {
    cache: ConfigCache,
    history: Arc<dyn History>,
    clock: Arc<dyn Clock>,
    session: watch::Receiver<ModemSession>,
    status: watch::Receiver<MonitorStatus>,
}

impl CommandRouter {
    pub fn new(
        cache: ConfigCache,
        history: Arc<dyn History>,
        clock: Arc<dyn Clock>,
        session: watch::Receiver<ModemSession>,
        status: watch::Receiver<MonitorStatus>,
    ) -> Self {
        Self {
            cache,
            history,
            clock,
            session,
            status,
        }
    }

    fn status_reply(&self, config: &AlarmConfig) -> String {
        let session = *self.session.borrow();
        let status = self.status.borrow().clone();

        let armed = if config.armed { "Armed" } else { "Disarmed" };
        let power = status
            .power_source
            .map_or("Unknown".to_string(), |source| source.to_string());
        let sensors = config
            .sensors
            .iter()
            .map(|(sensor_id, sensor)| match status.temperature_of(sensor_id) {
                Some(temperature) => format!("{}: {} C", sensor.name, temperature),
                None => format!("{}: N/A", sensor.name),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let repeat = if config.repeat_alerts {
            format!("Alert Interval: {} minutes", config.alert_interval_seconds / 60)
        } else {
            "Repeat Alerts: off".to_string()
        };

        format!(
            "Arm/Disarm: {}\nSignal Strength: {} (0-4)\nNetwork: {}\nPower: {}\n{}\n{}",
            armed, session.signal_quality, session.network_type, power, sensors, repeat
        )
    }

    fn apply(&self, update: AlarmUpdate, reply: String, event: String) -> (String, String) {
        match self.cache.update(&update) {
            Ok(_) => (reply, event),
            Err(e) => {
                tracing::error!("Failed to apply {:?}: {}", update, e);
                (UPDATE_FAILED_REPLY.to_string(), format!("Failed update, {event}"))
            }
        }
    }
}

impl InboundHandler for CommandRouter {
    fn handle(&self, sender: &str, text: &str) -> Option<String> {
        let config = self.cache.current();
        let Some(contact) = config
            .find_contact(sender)
            .or_else(|| config.find_contact(&normalize_phone_number(sender)))
        else {
            tracing::warn!("Ignoring SMS from unknown number {}", sender);
            return None;
        };

        let name = &contact.name;
        let command = Command::parse(text, contact.is_admin);
        tracing::info!("{:?} from {}", command, name);

        let (reply, event) = match command {
            Command::Status => (self.status_reply(&config), format!("Status request by {name}")),
            Command::Time => (
                format!("Time: {}", readable_time(self.clock.now())),
                format!("Time request by {name}"),
            ),
            Command::Help => {
                let help = if contact.is_admin { ADMIN_HELP } else { NORMAL_HELP };
                (help.to_string(), format!("Help request by {name}"))
            }
            Command::SetRepeatAlerts(enabled) => {
                let state = if enabled { "on" } else { "off" };
                self.apply(
                    AlarmUpdate {
                        repeat_alerts: Some(enabled),
                        ..Default::default()
                    },
                    format!("Repeat-Alerts set to '{state}'."),
                    format!("Repeat-Alerts set to '{state}' by {name}"),
                )
            }
            Command::SetAlertInterval(minutes) => self.apply(
                AlarmUpdate {
                    alert_interval_seconds: Some(minutes.saturating_mul(60)),
                    ..Default::default()
                },
                format!("Alert interval set to {minutes} minutes"),
                format!("Alert interval set to {minutes} minutes by {name}"),
            ),
            Command::Invalid => (
                INVALID_REPLY.to_string(),
                format!("Invalid command sent by {name}"),
            ),
        };

        if let Err(e) = self.history.append(&event, self.clock.now()) {
            tracing::error!("Failed to write history: {}", e);
        }

        Some(reply)
    }
}
