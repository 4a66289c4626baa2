#[macro_use]
extern crate log;

mod api;
pub use api::HttpTransport;

mod clock;
pub use clock::SystemClock;

mod sensor;
pub use sensor::SimulatedSensor;

mod storage;
pub use storage::FileStorage;
