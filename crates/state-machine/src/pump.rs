//! The single event pump draining chain events across all components.

use std::future::Future;

use pisa_chain::BlockEvent;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::driver::BlockEventListener;

/// Builder collecting listeners for the event pump task.
pub struct EventPumpBuilder {
    events_rx: mpsc::Receiver<BlockEvent>,
    listeners: Vec<Box<dyn BlockEventListener>>,
}

impl std::fmt::Debug for EventPumpBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPumpBuilder")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl EventPumpBuilder {
    /// Creates a builder over the processor's event channel.
    pub fn new(events_rx: mpsc::Receiver<BlockEvent>) -> Self {
        Self {
            events_rx,
            listeners: Vec::new(),
        }
    }

    /// Registers a component driver. Listeners observe every event in
    /// registration order.
    pub fn register(mut self, listener: Box<dyn BlockEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Builds the pump task.
    pub fn build(self) -> impl Future<Output = ()> {
        event_pump_task(self.events_rx, self.listeners)
    }
}

/// Drains block events serially: every listener finishes one event before
/// any listener sees the next, so components never observe out-of-order
/// reductions and effector I/O completes before the next head.
async fn event_pump_task(
    mut events_rx: mpsc::Receiver<BlockEvent>,
    mut listeners: Vec<Box<dyn BlockEventListener>>,
) {
    while let Some(event) = events_rx.recv().await {
        for listener in &mut listeners {
            if let Err(err) = listener.process_event(&event).await {
                // Store failures abort this listener's transition; staged
                // actions replay on a later head.
                error!(%err, "listener failed to process block event");
            }
        }
    }
    debug!("block event stream closed; event pump exiting");
}
