//! Event types flowing through the dispatcher's single-consumer queues:
//! the status-event queue and the ready queue.

use crate::status::NodeStatus;

/// Published by the Result Service after every `update_node_result` call,
/// consumed exactly once by the Scheduler.
#[derive(Debug, Clone, Copy)]
pub struct StatusEvent {
    pub node_id: i64,
    pub status: NodeStatus,
}

/// An item on the Scheduler's ready queue. `Stop` is the loop-exit
/// sentinel, kept as a distinct variant rather than a magic number.
#[derive(Debug, Clone, Copy)]
pub enum ReadySignal {
    Node(i64),
    Stop,
}
