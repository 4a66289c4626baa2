pub(crate) mod acceptor;
pub use acceptor::{Acceptance, SampleAcceptor, SessionFailure, SessionOutcome};

pub(crate) mod window;
pub use window::ActiveWindow;

pub mod helpers;
