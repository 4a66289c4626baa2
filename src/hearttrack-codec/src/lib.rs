#[macro_use]
extern crate serde;

mod error;
pub use error::CodecError;

mod helpers;
pub use helpers::{BufferReader, BufferTooShort};

pub mod layout;
pub use layout::{ConfigLoad, ConfigRecord, QueueImage, QueueLoad};

mod payload;
pub use payload::{MeasurementPayload, NotificationKind, NotificationPayload, Quality, iso8601};

mod remote_config;
pub use remote_config::RemoteConfig;
