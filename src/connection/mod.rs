// Connection lifecycle: state tracking, client events and the controller that ties them together

pub mod controller;
pub mod events;
pub mod state;

pub use controller::{ConnectionController, EventOutcome, LifecycleError};
pub use events::{ClientEvent, ClientEventKind, EventSink, Generation};
pub use state::{ConnectionState, StateTracker};
