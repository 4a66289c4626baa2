use serde_json::{Map, Value};

use crate::error::CodecError;

/// Fields of a `GET /devices/{id}/config` response. Every field is
/// independently optional; a field of the wrong JSON type is treated as
/// absent and recorded in `malformed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteConfig {
    pub frequency_seconds: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timezone_offset: Option<f64>,
    pub malformed: Vec<&'static str>,
}

impl RemoteConfig {
    const FREQUENCY: &'static str = "measurementFrequency";
    const START: &'static str = "activeStartTime";
    const END: &'static str = "activeEndTime";
    const TIMEZONE: &'static str = "timezoneOffset";

    pub fn parse(body: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(&value)
    }

    /// Accepts either the bare config object or the server envelope
    /// `{ "data": { "config": { .. } } }`.
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let object = value
            .pointer("/data/config")
            .or_else(|| value.get("config"))
            .unwrap_or(value)
            .as_object()
            .ok_or(CodecError::NotAnObject)?;

        let mut config = Self::default();
        config.frequency_seconds = config.field(object, Self::FREQUENCY, integer);
        config.start_time = config.field(object, Self::START, text);
        config.end_time = config.field(object, Self::END, text);
        config.timezone_offset = config.field(object, Self::TIMEZONE, Value::as_f64);
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.frequency_seconds.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.timezone_offset.is_none()
    }

    fn field<T>(
        &mut self,
        object: &Map<String, Value>,
        key: &'static str,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> Option<T> {
        match object.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let extracted = extract(value);
                if extracted.is_none() && !is_blank_text(value) {
                    self.malformed.push(key);
                }
                extracted
            }
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Empty strings count as absent.
fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn is_blank_text(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.trim().is_empty())
}
