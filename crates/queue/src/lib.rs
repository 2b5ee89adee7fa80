//! `queue` crate — the concurrency primitives behind the Result Service
//! and Scheduler: the status-event queue, the ready queue, and the
//! process-wide dispatch registry.

pub mod channels;
pub mod events;
pub mod registry;
pub mod status;

pub use channels::{ReadyQueue, ReadyQueueReceiver, StatusQueue, StatusQueueReceiver};
pub use events::{ReadySignal, StatusEvent};
pub use registry::{DispatchRegistry, RegistryError};
pub use status::NodeStatus;
