use serde::{Deserialize, Serialize};

/// Roster entry allowed to receive alerts and send commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Number in international format, e.g. `+14155550100`
    pub phone_number: String,
    /// Display name used in history records
    pub name: String,
    /// Whether the daily status report is sent to this contact
    #[serde(default)]
    pub wants_daily_report: bool,
    /// Whether admin commands are accepted from this contact
    #[serde(default)]
    pub is_admin: bool,
}

impl Contact {
    pub fn new(phone_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            phone_number: normalize_phone_number(&phone_number.into()),
            name: name.into(),
            wants_daily_report: false,
            is_admin: false,
        }
    }

    pub fn with_daily_report(mut self, wants_daily_report: bool) -> Self {
        self.wants_daily_report = wants_daily_report;
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// Normalizes North American numbers to `+1XXXXXXXXXX`.
///
/// Ten digits get a `+1` prefix, eleven digits starting with `1` get a `+`.
/// Anything else is returned trimmed but otherwise untouched.
pub fn normalize_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => format!("+1{digits}"),
        11 if digits.starts_with('1') => format!("+{digits}"),
        _ => raw.trim().to_string(),
    }
}
