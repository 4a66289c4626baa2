#[macro_use]
extern crate serde;

mod state;
pub use state::{DeviceState, StatusPattern};

mod schedule;
pub use schedule::{InvalidTimeOfDay, ScheduleConfig, TimeOfDay};

mod measurement;
pub use measurement::{
    CandidateSample, MeasurementResult, QueuedResult, RawReading, Timestamp, WALL_CLOCK_EPOCH,
    is_wall_clock,
};
