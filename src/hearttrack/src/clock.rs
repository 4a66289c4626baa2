use std::time::Instant;

use chrono::{DateTime, Utc};
use hearttrack_device::Clock;
use hearttrack_types::WALL_CLOCK_EPOCH;

/// Host clock. The wall clock counts as synchronised once it reads later
/// than [`WALL_CLOCK_EPOCH`].
pub struct SystemClock {
    started: Instant,
    zone_offset_hours: f32,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            zone_offset_hours: 0.0,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn utc(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now()).filter(|now| now.timestamp() > i64::from(WALL_CLOCK_EPOCH))
    }

    fn zone_offset_hours(&self) -> f32 {
        self.zone_offset_hours
    }

    fn apply_zone(&mut self, offset_hours: f32) {
        self.zone_offset_hours = offset_hours;
    }
}
