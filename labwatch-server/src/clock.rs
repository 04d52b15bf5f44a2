use time::macros::format_description;
use time::{OffsetDateTime, Time, UtcOffset};

/// Source of wall-clock time for the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// System time shifted to a fixed offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    /// Captures the local offset, falling back to UTC.
    ///
    /// Must run before the runtime spawns worker threads, `time` refuses to
    /// read the offset from a multi-threaded process on Unix.
    pub fn local() -> Self {
        Self {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Formats as `02:07 PM, Mar 05, 2024`
pub fn readable_time(timestamp: OffsetDateTime) -> String {
    let format =
        format_description!("[hour repr:12]:[minute] [period], [month repr:short] [day], [year]");

    timestamp
        .format(format)
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Parses `HH:MM` wall-clock times
pub fn parse_time_of_day(value: &str) -> Option<Time> {
    let (hour, minute) = value.trim().split_once(':')?;
    Time::from_hms(hour.parse().ok()?, minute.parse().ok()?, 0).ok()
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, time};

    use super::*;

    #[test]
    fn test_readable_time() {
        assert_eq!(
            readable_time(datetime!(2024-11-30 0:05 UTC)),
            "12:05 AM, Nov 30, 2024"
        );
        assert_eq!(
            readable_time(datetime!(2024-07-04 13:45 UTC)),
            "01:45 PM, Jul 04, 2024"
        );
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("08:30"), Some(time!(8:30)));
        assert_eq!(parse_time_of_day(" 7:05 "), Some(time!(7:05)));
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("noon"), None);
    }
}
