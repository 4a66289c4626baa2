use chrono::{DateTime, SecondsFormat};
use hearttrack_types::{MeasurementResult, QueuedResult, Timestamp};

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Poor,
}

/// Body of `POST /measurements`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementPayload<'a> {
    pub device_id: &'a str,
    pub heart_rate: f32,
    #[serde(rename = "spO2")]
    pub spo2: f32,
    pub timestamp: String,
    pub quality: Quality,
    pub confidence: f32,
}

impl<'a> MeasurementPayload<'a> {
    /// Replayed entries do not persist their confidence.
    pub const REPLAY_CONFIDENCE: f32 = 0.95;

    pub fn from_result(device_id: &'a str, result: &MeasurementResult) -> Self {
        Self {
            device_id,
            heart_rate: round_to(result.heart_rate, 10.0),
            spo2: round_to(result.spo2, 10.0),
            timestamp: iso8601(result.taken_at),
            quality: if result.accepted && !result.partial {
                Quality::Good
            } else {
                Quality::Poor
            },
            confidence: round_to(result.confidence, 100.0),
        }
    }

    pub fn replay(device_id: &'a str, entry: &QueuedResult) -> Self {
        Self {
            device_id,
            heart_rate: round_to(entry.heart_rate, 10.0),
            spo2: round_to(entry.spo2, 10.0),
            timestamp: iso8601(entry.taken_at),
            quality: Quality::Good,
            confidence: Self::REPLAY_CONFIDENCE,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    UserTimeout,
}

/// Body of `POST /notifications`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload<'a> {
    pub device_id: &'a str,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: String,
}

impl<'a> NotificationPayload<'a> {
    pub fn user_timeout(device_id: &'a str, at: Timestamp) -> Self {
        Self {
            device_id,
            kind: NotificationKind::UserTimeout,
            message: "No finger detected before the measurement request timed out".to_string(),
            timestamp: iso8601(at),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Formats a Unix timestamp as `2025-01-01T00:00:00Z`.
pub fn iso8601(timestamp: Timestamp) -> String {
    DateTime::from_timestamp(i64::from(timestamp), 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn round_to(value: f32, scale: f32) -> f32 {
    (value * scale).round() / scale
}
