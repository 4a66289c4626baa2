//! Persisted image layout.
//!
//! Two independent regions share one byte-addressed image:
//!
//! ```text
//! offset 0   config record  marker u16 | interval_ms u32 | start h,m u8 | end h,m u8
//!                           | timezone f32 | source_is_remote u8
//! offset 64  queue region   cursor u32 | live_count u32 | N x entry
//!                           entry = heart_rate f32 | spo2 f32 | taken_at u32 | delivered u8
//! ```
//!
//! All integers and floats are little-endian. Decoding never fails: fields
//! that are out of range are replaced with their defaults, and a damaged
//! region never affects the other one.

use hearttrack_types::{QueuedResult, ScheduleConfig, TimeOfDay};

use crate::helpers::BufferReader;

pub const CONFIG_REGION_OFFSET: usize = 0;
pub const CONFIG_MARKER: u16 = 0xABCD;
pub const QUEUE_REGION_OFFSET: usize = 64;

pub struct ConfigRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLoad {
    pub config: ScheduleConfig,
    pub marker_valid: bool,
    /// Fields that were out of range and fell back to defaults.
    pub reset_fields: Vec<&'static str>,
}

impl ConfigRecord {
    pub const LEN: usize = 2 + 4 + 4 + 4 + 1;

    pub fn encode(config: &ScheduleConfig) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&CONFIG_MARKER.to_le_bytes());
        out.extend_from_slice(&config.interval_ms.to_le_bytes());
        out.push(config.active_window_start.hour());
        out.push(config.active_window_start.minute());
        out.push(config.active_window_end.hour());
        out.push(config.active_window_end.minute());
        out.extend_from_slice(&config.timezone_offset_hours.to_le_bytes());
        out.push(u8::from(config.source_is_remote));
        out
    }

    pub fn decode(mut bytes: &[u8]) -> ConfigLoad {
        let defaults = ScheduleConfig::default();
        let invalid = ConfigLoad {
            config: defaults,
            marker_valid: false,
            reset_fields: Vec::new(),
        };

        let Ok(marker) = bytes.read_u16_le() else {
            return invalid;
        };
        if marker != CONFIG_MARKER || bytes.len() < Self::LEN - 2 {
            return invalid;
        }

        let mut reset_fields = Vec::new();
        let mut config = defaults;

        let interval_ms = bytes.read_u32_le().unwrap_or_default();
        if ScheduleConfig::interval_in_range(interval_ms) {
            config.interval_ms = interval_ms;
        } else {
            reset_fields.push("interval_ms");
        }

        let [start_hour, start_minute, end_hour, end_minute] =
            bytes.read::<4>().unwrap_or_default();
        match TimeOfDay::new(start_hour, start_minute) {
            Some(start) => config.active_window_start = start,
            None => reset_fields.push("active_window_start"),
        }
        match TimeOfDay::new(end_hour, end_minute) {
            Some(end) => config.active_window_end = end,
            None => reset_fields.push("active_window_end"),
        }

        let timezone = bytes.read_f32_le().unwrap_or(f32::NAN);
        if ScheduleConfig::timezone_in_range(timezone) {
            config.timezone_offset_hours = timezone;
        } else {
            reset_fields.push("timezone_offset_hours");
        }

        match bytes.read_u8() {
            Ok(0) => config.source_is_remote = false,
            Ok(1) => config.source_is_remote = true,
            _ => reset_fields.push("source_is_remote"),
        }

        ConfigLoad {
            config,
            marker_valid: true,
            reset_fields,
        }
    }
}

/// In-memory mirror of the persisted queue region.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueImage {
    pub cursor: u32,
    pub live_count: u32,
    pub entries: Vec<QueuedResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueLoad {
    /// Image with a validated cursor and a live count recomputed from the slots.
    pub image: QueueImage,
    pub stored_live_count: u32,
    pub cursor_reset: bool,
    pub repaired_slots: usize,
}

impl QueueImage {
    const HEADER_LEN: usize = 4 + 4;
    pub const ENTRY_LEN: usize = 4 + 4 + 4 + 1;

    pub fn empty(capacity: usize) -> Self {
        Self {
            cursor: 0,
            live_count: 0,
            entries: vec![QueuedResult::EMPTY; capacity],
        }
    }

    pub fn region_len(capacity: usize) -> usize {
        Self::HEADER_LEN + capacity * Self::ENTRY_LEN
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::region_len(self.entries.len()));
        out.extend_from_slice(&self.cursor.to_le_bytes());
        out.extend_from_slice(&self.live_count.to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.heart_rate.to_le_bytes());
            out.extend_from_slice(&entry.spo2.to_le_bytes());
            out.extend_from_slice(&entry.taken_at.to_le_bytes());
            out.push(u8::from(entry.delivered));
        }
        out
    }

    pub fn decode(mut bytes: &[u8], capacity: usize) -> QueueLoad {
        let cursor = bytes.read_u32_le().unwrap_or_default();
        let stored_live_count = bytes.read_u32_le().unwrap_or_default();
        let cursor_reset = cursor as usize >= capacity;

        let mut repaired_slots = 0;
        let entries = (0..capacity)
            .map(|_| match Self::decode_entry(&mut bytes) {
                Some(entry) => entry,
                None => {
                    repaired_slots += 1;
                    QueuedResult::EMPTY
                }
            })
            .collect::<Vec<_>>();

        let live_count = entries.iter().filter(|e| e.is_pending()).count() as u32;

        QueueLoad {
            image: QueueImage {
                cursor: if cursor_reset { 0 } else { cursor },
                live_count,
                entries,
            },
            stored_live_count,
            cursor_reset,
            repaired_slots,
        }
    }

    /// `None` when the slot is damaged or missing.
    fn decode_entry(bytes: &mut &[u8]) -> Option<QueuedResult> {
        let heart_rate = bytes.read_f32_le().ok()?;
        let spo2 = bytes.read_f32_le().ok()?;
        let taken_at = bytes.read_u32_le().ok()?;
        let delivered = match bytes.read_u8().ok()? {
            0 => false,
            1 => true,
            _ => return None,
        };

        if taken_at == 0 {
            return Some(QueuedResult::EMPTY);
        }
        if !heart_rate.is_finite() || !spo2.is_finite() {
            return None;
        }

        Some(QueuedResult {
            heart_rate,
            spo2,
            taken_at,
            delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary_config() -> ScheduleConfig {
        ScheduleConfig {
            interval_ms: ScheduleConfig::MAX_INTERVAL_MS,
            active_window_start: TimeOfDay::new(0, 0).unwrap(),
            active_window_end: TimeOfDay::new(23, 59).unwrap(),
            timezone_offset_hours: ScheduleConfig::MIN_TIMEZONE_OFFSET,
            source_is_remote: true,
        }
    }

    #[test]
    fn config_boundaries_survive_reload() {
        let config = boundary_config();
        let load = ConfigRecord::decode(&ConfigRecord::encode(&config));
        assert!(load.marker_valid);
        assert!(load.reset_fields.is_empty());
        assert_eq!(load.config, config);

        let config = ScheduleConfig {
            interval_ms: ScheduleConfig::MIN_INTERVAL_MS,
            timezone_offset_hours: ScheduleConfig::MAX_TIMEZONE_OFFSET,
            ..boundary_config()
        };
        let load = ConfigRecord::decode(&ConfigRecord::encode(&config));
        assert_eq!(load.config, config);
    }

    #[test]
    fn config_one_unit_outside_reloads_as_default() {
        let config = ScheduleConfig {
            interval_ms: ScheduleConfig::MAX_INTERVAL_MS + 1,
            timezone_offset_hours: ScheduleConfig::MAX_TIMEZONE_OFFSET + 1.0,
            ..boundary_config()
        };
        let load = ConfigRecord::decode(&ConfigRecord::encode(&config));
        assert_eq!(load.config.interval_ms, ScheduleConfig::DEFAULT_INTERVAL_MS);
        assert_eq!(
            load.config.timezone_offset_hours,
            ScheduleConfig::DEFAULT_TIMEZONE_OFFSET
        );
        assert_eq!(load.config.active_window_end, TimeOfDay::new(23, 59).unwrap());
        assert_eq!(load.reset_fields, vec!["interval_ms", "timezone_offset_hours"]);

        let config = ScheduleConfig {
            interval_ms: ScheduleConfig::MIN_INTERVAL_MS - 1,
            timezone_offset_hours: ScheduleConfig::MIN_TIMEZONE_OFFSET - 1.0,
            ..boundary_config()
        };
        let load = ConfigRecord::decode(&ConfigRecord::encode(&config));
        assert_eq!(load.config.interval_ms, ScheduleConfig::DEFAULT_INTERVAL_MS);
        assert_eq!(
            load.config.timezone_offset_hours,
            ScheduleConfig::DEFAULT_TIMEZONE_OFFSET
        );
    }

    #[test]
    fn config_bad_window_resets_only_that_field() {
        let mut bytes = ConfigRecord::encode(&boundary_config());
        // start hour
        bytes[6] = 24;
        let load = ConfigRecord::decode(&bytes);
        assert_eq!(
            load.config.active_window_start,
            ScheduleConfig::DEFAULT_WINDOW_START
        );
        assert_eq!(load.config.active_window_end, TimeOfDay::new(23, 59).unwrap());
        assert_eq!(load.config.interval_ms, ScheduleConfig::MAX_INTERVAL_MS);
    }

    #[test]
    fn config_without_marker_is_default() {
        let load = ConfigRecord::decode(&[0u8; ConfigRecord::LEN]);
        assert!(!load.marker_valid);
        assert_eq!(load.config, ScheduleConfig::default());

        let load = ConfigRecord::decode(&[0xCD]);
        assert!(!load.marker_valid);
    }

    #[test]
    fn zeroed_queue_region_is_empty() {
        let bytes = vec![0u8; QueueImage::region_len(4)];
        let load = QueueImage::decode(&bytes, 4);
        assert_eq!(load.image, QueueImage::empty(4));
        assert_eq!(load.repaired_slots, 0);
        assert!(!load.cursor_reset);
    }

    #[test]
    fn queue_round_trip_recomputes_live_count() {
        let mut image = QueueImage::empty(3);
        image.cursor = 2;
        image.live_count = 3;
        image.entries[0] = QueuedResult {
            heart_rate: 71.5,
            spo2: 97.0,
            taken_at: 1_700_000_000,
            delivered: false,
        };
        image.entries[1] = QueuedResult {
            heart_rate: 64.0,
            spo2: 99.0,
            taken_at: 1_700_000_900,
            delivered: true,
        };

        let bytes = image.encode();
        assert_eq!(bytes.len(), QueueImage::region_len(3));

        let load = QueueImage::decode(&bytes, 3);
        assert_eq!(load.stored_live_count, 3);
        assert_eq!(load.image.live_count, 1);
        assert_eq!(load.image.cursor, 2);
        assert_eq!(load.image.entries, image.entries);
    }

    #[test]
    fn damaged_slots_and_cursor_are_repaired() {
        let mut image = QueueImage::empty(2);
        image.cursor = 7;
        image.entries[0] = QueuedResult {
            heart_rate: f32::NAN,
            spo2: 97.0,
            taken_at: 1_700_000_000,
            delivered: false,
        };
        image.entries[1] = QueuedResult {
            heart_rate: 80.0,
            spo2: 96.0,
            taken_at: 1_700_000_060,
            delivered: false,
        };
        let mut bytes = image.encode();

        let load = QueueImage::decode(&bytes, 2);
        assert!(load.cursor_reset);
        assert_eq!(load.image.cursor, 0);
        assert_eq!(load.repaired_slots, 1);
        assert_eq!(load.image.entries[0], QueuedResult::EMPTY);
        assert_eq!(load.image.entries[1], image.entries[1]);

        // delivered flag of the second slot
        let last = bytes.len() - 1;
        bytes[last] = 9;
        let load = QueueImage::decode(&bytes, 2);
        assert_eq!(load.repaired_slots, 2);
        assert_eq!(load.image.live_count, 0);
    }

    #[test]
    fn truncated_queue_region_fills_with_empty_slots() {
        let load = QueueImage::decode(&[1, 0, 0, 0], 3);
        assert_eq!(load.image.entries.len(), 3);
        assert_eq!(load.image.cursor, 1);
        assert_eq!(load.repaired_slots, 3);
    }

    #[test]
    fn regions_do_not_overlap() {
        assert!(CONFIG_REGION_OFFSET + ConfigRecord::LEN <= QUEUE_REGION_OFFSET);
    }
}
