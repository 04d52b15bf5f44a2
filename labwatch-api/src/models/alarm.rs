use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Contact, SensorConfig, SensorId};

/// Runtime alarm document, read and rewritten as a whole by the config store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Whether thresholds are evaluated and alerts emitted
    pub armed: bool,
    /// Dead-band below the trigger, in Celsius
    pub hysteresis: f64,
    /// Minimum gap between repeated alerts
    pub alert_interval_seconds: u64,
    /// Repeat alerts while an excursion persists
    pub repeat_alerts: bool,
    /// Wall-clock time of the daily report, `HH:MM`
    pub daily_report_time: String,
    pub send_daily_report: bool,
    /// Free text appended to every alert
    pub location: String,
    pub sensors: BTreeMap<SensorId, SensorConfig>,
    pub contacts: Vec<Contact>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            armed: true,
            hysteresis: 1.0,
            alert_interval_seconds: 15 * 60,
            repeat_alerts: false,
            daily_report_time: "08:00".to_string(),
            send_daily_report: false,
            location: String::new(),
            sensors: BTreeMap::new(),
            contacts: Vec::new(),
        }
    }
}

impl AlarmConfig {
    pub fn find_contact(&self, phone_number: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|contact| contact.phone_number == phone_number)
    }

    /// Every contact receives alerts
    pub fn alert_recipients(&self) -> Vec<String> {
        self.contacts
            .iter()
            .map(|contact| contact.phone_number.clone())
            .collect()
    }

    /// Subscribed contacts ordered by display name
    pub fn daily_report_recipients(&self) -> Vec<String> {
        let mut subscribers = self
            .contacts
            .iter()
            .filter(|contact| contact.wants_daily_report)
            .collect::<Vec<_>>();
        subscribers.sort_by(|a, b| a.name.cmp(&b.name));

        subscribers
            .into_iter()
            .map(|contact| contact.phone_number.clone())
            .collect()
    }

    /// Overwrites every field that is set in `update`
    pub fn apply(&mut self, update: &AlarmUpdate) {
        if let Some(armed) = update.armed {
            self.armed = armed;
        }
        if let Some(hysteresis) = update.hysteresis {
            self.hysteresis = hysteresis;
        }
        if let Some(interval) = update.alert_interval_seconds {
            self.alert_interval_seconds = interval;
        }
        if let Some(repeat_alerts) = update.repeat_alerts {
            self.repeat_alerts = repeat_alerts;
        }
        if let Some(report_time) = &update.daily_report_time {
            self.daily_report_time = report_time.clone();
        }
        if let Some(send_daily_report) = update.send_daily_report {
            self.send_daily_report = send_daily_report;
        }
        if let Some(location) = &update.location {
            self.location = location.clone();
        }
    }
}

/// Partial update of the scalar fields of [`AlarmConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmUpdate {
    pub armed: Option<bool>,
    pub hysteresis: Option<f64>,
    pub alert_interval_seconds: Option<u64>,
    pub repeat_alerts: Option<bool>,
    pub daily_report_time: Option<String>,
    pub send_daily_report: Option<bool>,
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_only_touches_set_fields() {
        let mut config = AlarmConfig {
            location: "Server room".to_string(),
            ..Default::default()
        };

        config.apply(&AlarmUpdate {
            repeat_alerts: Some(true),
            alert_interval_seconds: Some(600),
            ..Default::default()
        });

        assert!(config.repeat_alerts);
        assert_eq!(config.alert_interval_seconds, 600);
        assert_eq!(config.location, "Server room");
        assert!(config.armed);
    }

    #[test]
    fn test_recipients() {
        let config = AlarmConfig {
            contacts: vec![
                Contact::new("+14155550102", "Linus").with_daily_report(true),
                Contact::new("+14155550101", "Grace"),
                Contact::new("+14155550100", "Ada").with_daily_report(true),
            ],
            ..Default::default()
        };

        assert_eq!(config.alert_recipients().len(), 3);
        assert_eq!(
            config.daily_report_recipients(),
            vec!["+14155550100", "+14155550102"]
        );
        assert_eq!(config.find_contact("+14155550101").map(|c| c.name.as_str()), Some("Grace"));
        assert!(config.find_contact("+19999999999").is_none());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: AlarmConfig = serde_json::from_str(r#"{"location": "Lab 3"}"#).unwrap();

        assert_eq!(config.location, "Lab 3");
        assert_eq!(config.alert_interval_seconds, 900);
        assert!(config.contacts.is_empty());
    }
}
