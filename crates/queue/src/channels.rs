//! Thin wrappers around `tokio::sync::mpsc` giving the Scheduler's two
//! queues distinct types instead of raw channel handles.

use tokio::sync::mpsc;

use crate::events::{ReadySignal, StatusEvent};

/// Single-consumer multi-producer channel of `(node_id, status)` events.
/// Producers are the task continuations spawned by the Task Runner; the
/// sole consumer is the Scheduler loop for one workflow.
#[derive(Debug)]
pub struct StatusQueue {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

pub struct StatusQueueReceiver {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusQueue {
    pub fn new() -> (Self, StatusQueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, StatusQueueReceiver { rx })
    }

    /// Publish a status event. Guaranteed exactly once per call by virtue
    /// of the unbounded channel never dropping sends while the receiver
    /// lives.
    pub fn publish(&self, event: StatusEvent) {
        // The receiver is only dropped after the scheduler loop exits,
        // by which point no further task continuations are in flight.
        let _ = self.tx.send(event);
    }
}

impl Clone for StatusQueue {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl StatusQueueReceiver {
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }
}

/// SPSC-in-practice queue of node ids ready to dispatch, driven solely by
/// the Scheduler.
#[derive(Debug)]
pub struct ReadyQueue {
    tx: mpsc::UnboundedSender<ReadySignal>,
}

pub struct ReadyQueueReceiver {
    rx: mpsc::UnboundedReceiver<ReadySignal>,
}

impl ReadyQueue {
    pub fn new() -> (Self, ReadyQueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ReadyQueueReceiver { rx })
    }

    pub fn push(&self, signal: ReadySignal) {
        let _ = self.tx.send(signal);
    }
}

impl Clone for ReadyQueue {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl ReadyQueueReceiver {
    pub async fn recv(&mut self) -> Option<ReadySignal> {
        self.rx.recv().await
    }
}
