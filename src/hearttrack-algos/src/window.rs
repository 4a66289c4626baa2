use chrono::NaiveTime;
use hearttrack_types::{ScheduleConfig, TimeOfDay};

/// Daily time-of-day window in which measurements may be requested.
/// A window whose end precedes its start crosses midnight; start == end
/// means always active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl ActiveWindow {
    pub const OPEN_BUFFER_MINUTES: u32 = 1;
    pub const MAX_WAIT_MINUTES: u32 = 12 * 60;

    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, now: TimeOfDay) -> bool {
        let (start, end) = (self.start, self.end);
        if start < end {
            start <= now && now < end
        } else if start > end {
            now >= start || now < end
        } else {
            true
        }
    }

    /// Fails open: without a valid local time the window is considered
    /// active.
    pub fn contains_local(&self, now: Option<NaiveTime>) -> bool {
        now.is_none_or(|time| self.contains(time.into()))
    }

    /// Minutes until the window next opens, wrapping past midnight.
    pub fn minutes_until_open(&self, now: TimeOfDay) -> u32 {
        let start = u32::from(self.start.minutes_since_midnight());
        let now = u32::from(now.minutes_since_midnight());
        if now < start {
            start - now
        } else {
            start + u32::from(TimeOfDay::MINUTES_PER_DAY) - now
        }
    }

    /// Delay before re-evaluating a closed window: time until open plus a
    /// one minute buffer, capped at twelve hours.
    pub fn wait_until_open_ms(&self, now: TimeOfDay) -> u64 {
        let minutes = (self.minutes_until_open(now) + Self::OPEN_BUFFER_MINUTES)
            .min(Self::MAX_WAIT_MINUTES);
        u64::from(minutes) * 60_000
    }
}

impl From<&ScheduleConfig> for ActiveWindow {
    fn from(config: &ScheduleConfig) -> Self {
        Self::new(config.active_window_start, config.active_window_end)
    }
}
