use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use hearttrack_types::Timestamp;

/// Time source of the device: a monotonic tick counter for timeouts plus a
/// wall clock that only becomes valid once synchronised.
pub trait Clock {
    fn monotonic_ms(&self) -> u64;

    /// `None` until the wall clock has been synchronised.
    fn utc(&self) -> Option<DateTime<Utc>>;

    fn zone_offset_hours(&self) -> f32;

    fn apply_zone(&mut self, offset_hours: f32);

    fn local(&self) -> Option<NaiveDateTime> {
        let utc = self.utc()?;
        let seconds = (f64::from(self.zone_offset_hours()) * 3600.0).round() as i32;
        let zone = FixedOffset::east_opt(seconds)?;
        Some(utc.with_timezone(&zone).naive_local())
    }

    fn unix_seconds(&self) -> Option<Timestamp> {
        self.utc()
            .and_then(|now| Timestamp::try_from(now.timestamp()).ok())
            .filter(|&seconds| seconds > 0)
    }

    /// Wall-clock seconds, or seconds of uptime before synchronisation.
    /// Never zero, which marks an empty queue slot.
    fn timestamp_or_uptime(&self) -> Timestamp {
        self.unix_seconds().unwrap_or_else(|| {
            Timestamp::try_from(self.monotonic_ms() / 1000)
                .unwrap_or(Timestamp::MAX)
                .max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, base_time};
    use chrono::Timelike as _;

    #[test]
    fn local_time_applies_zone() {
        let mut clock = FakeClock::synced(base_time());
        clock.apply_zone(-7.0);
        assert_eq!(clock.local().map(|t| t.hour()), Some(5));

        clock.apply_zone(5.5);
        let local = clock.local().unwrap();
        assert_eq!((local.hour(), local.minute()), (17, 30));
    }

    #[test]
    fn unsynced_clock_has_no_wall_time() {
        let clock = FakeClock::unsynced();
        assert_eq!(clock.local(), None);
        assert_eq!(clock.unix_seconds(), None);
        assert_eq!(clock.timestamp_or_uptime(), 1);

        clock.advance(42_500);
        assert_eq!(clock.timestamp_or_uptime(), 42);
    }

    #[test]
    fn synced_timestamp_is_unix_seconds() {
        let clock = FakeClock::synced(base_time());
        assert_eq!(
            clock.timestamp_or_uptime(),
            base_time().timestamp() as Timestamp
        );
    }
}
