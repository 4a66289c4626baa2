use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike as _};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day `{0}` (expected HH:MM)")]
pub struct InvalidTimeOfDay(pub String);

/// Wall-clock time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    /// Wraps values past one day.
    pub fn from_minutes(minutes: u16) -> Self {
        let minutes = minutes % Self::MINUTES_PER_DAY;
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() {
            return Err(invalid());
        }

        let hour = hour.trim().parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.trim().parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Measurement scheduling policy: cadence plus the time-of-day window in
/// which measurements may be requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub interval_ms: u32,
    pub active_window_start: TimeOfDay,
    pub active_window_end: TimeOfDay,
    pub timezone_offset_hours: f32,
    pub source_is_remote: bool,
}

impl ScheduleConfig {
    pub const MIN_INTERVAL_MS: u32 = 15_000;
    pub const MAX_INTERVAL_MS: u32 = 14_400_000;
    pub const MIN_TIMEZONE_OFFSET: f32 = -12.0;
    pub const MAX_TIMEZONE_OFFSET: f32 = 14.0;

    pub const DEFAULT_INTERVAL_MS: u32 = 900_000;
    pub const DEFAULT_WINDOW_START: TimeOfDay = TimeOfDay { hour: 2, minute: 0 };
    pub const DEFAULT_WINDOW_END: TimeOfDay = TimeOfDay { hour: 22, minute: 0 };
    pub const DEFAULT_TIMEZONE_OFFSET: f32 = 0.0;

    pub fn interval_in_range(interval_ms: u32) -> bool {
        (Self::MIN_INTERVAL_MS..=Self::MAX_INTERVAL_MS).contains(&interval_ms)
    }

    pub fn timezone_in_range(offset_hours: f32) -> bool {
        offset_hours.is_finite()
            && (Self::MIN_TIMEZONE_OFFSET..=Self::MAX_TIMEZONE_OFFSET).contains(&offset_hours)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::DEFAULT_INTERVAL_MS,
            active_window_start: Self::DEFAULT_WINDOW_START,
            active_window_end: Self::DEFAULT_WINDOW_END,
            timezone_offset_hours: Self::DEFAULT_TIMEZONE_OFFSET,
            source_is_remote: false,
        }
    }
}

impl fmt::Display for ScheduleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Interval: {} ms ({} min)",
            self.interval_ms,
            self.interval_ms / 60_000
        )?;
        writeln!(
            f,
            "Active window: {} - {}",
            self.active_window_start, self.active_window_end
        )?;
        writeln!(f, "Timezone offset: {:+.1} h", self.timezone_offset_hours)?;
        write!(
            f,
            "Source: {}",
            if self.source_is_remote { "remote" } else { "built-in" }
        )
    }
}
