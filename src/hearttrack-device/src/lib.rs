#[macro_use]
extern crate log;

mod error;
pub use error::{BootError, StorageError, TransportError};

mod options;
pub use options::ControllerOptions;

mod clock;
pub use clock::Clock;

mod acquisition;
pub use acquisition::Acquisition;

mod storage;
pub use storage::{MemoryStorage, Storage};

mod transport;
pub use transport::{Reply, Request, RequestId, Response, Transport};

mod events;
pub use events::DeviceEvent;

mod queue;
pub use queue::{DurableQueue, Enqueued};

mod schedule;
pub use schedule::{ConfigStore, Scheduler};

mod pipeline;
pub use pipeline::{TransmissionPipeline, TransmitOutcome};

mod machine;
pub use machine::{Action, StateMachine};

mod controller;
pub use controller::Controller;

#[cfg(test)]
pub(crate) mod testing;
