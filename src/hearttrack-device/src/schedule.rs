use chrono::NaiveTime;
use hearttrack_algos::ActiveWindow;
use hearttrack_codec::{ConfigRecord, layout::CONFIG_REGION_OFFSET};
use hearttrack_types::ScheduleConfig;

use crate::{Storage, StorageError};

/// Next-fire bookkeeping on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    next_fire_ms: u64,
}

impl Scheduler {
    pub fn new(next_fire_ms: u64) -> Self {
        Self { next_fire_ms }
    }

    pub fn next_fire_ms(&self) -> u64 {
        self.next_fire_ms
    }

    pub fn due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_fire_ms
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.next_fire_ms.saturating_sub(now_ms)
    }

    pub fn schedule_next(&mut self, now_ms: u64, config: &ScheduleConfig) {
        self.next_fire_ms = now_ms + u64::from(config.interval_ms);
    }

    /// Brings the next measurement forward when a shorter interval makes it
    /// due sooner. Never postpones one already scheduled.
    pub fn apply_interval(&mut self, now_ms: u64, config: &ScheduleConfig) {
        self.next_fire_ms = self
            .next_fire_ms
            .min(now_ms + u64::from(config.interval_ms));
    }

    /// Waits for the active window to open. Without a valid local time this
    /// falls back to the normal interval.
    pub fn schedule_for_window_open(
        &mut self,
        now_ms: u64,
        config: &ScheduleConfig,
        local: Option<NaiveTime>,
    ) {
        match local {
            Some(time) => {
                let wait = ActiveWindow::from(config).wait_until_open_ms(time.into());
                self.next_fire_ms = now_ms + wait;
                info!(
                    "Outside active window {} - {}, next check in {} min",
                    config.active_window_start,
                    config.active_window_end,
                    wait / 60_000
                );
            }
            None => self.schedule_next(now_ms, config),
        }
    }
}

/// Persisted copy of the [`ScheduleConfig`].
pub struct ConfigStore;

impl ConfigStore {
    pub fn load<S: Storage>(storage: &S) -> Result<ScheduleConfig, StorageError> {
        let mut record = [0; ConfigRecord::LEN];
        storage.read(CONFIG_REGION_OFFSET, &mut record)?;

        let load = ConfigRecord::decode(&record);
        if !load.marker_valid {
            info!("No stored configuration, using defaults");
        }
        for field in &load.reset_fields {
            warn!("Stored {} out of range, using default", field);
        }
        Ok(load.config)
    }

    pub fn save<S: Storage>(storage: &mut S, config: &ScheduleConfig) -> Result<(), StorageError> {
        storage.write(CONFIG_REGION_OFFSET, &ConfigRecord::encode(config))
    }
}
