//! Ready-made event listeners for logging and capture.

use std::sync::Arc;

use parking_lot::Mutex;

use super::bus::{BusError, EventListener};
use super::types::SimulationEvent;

/// Logs every delivered event through `tracing` at info level.
///
/// The default listener attached by the CLI; external visualizers register
/// their own listener instead.
#[derive(Debug, Default)]
pub struct TracingListener;

impl TracingListener {
    pub fn new() -> Self {
        Self
    }
}

impl EventListener for TracingListener {
    fn on_event(&self, event: Arc<SimulationEvent>) -> Result<(), BusError> {
        tracing::info!(target: "lockstep::events", "{event}");
        Ok(())
    }
}

/// Captures every delivered event into a shared, thread-safe list.
///
/// Cloning the listener shares the underlying capture, so tests can register
/// one clone with the bus and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct CollectingListener {
    events: Arc<Mutex<Vec<Arc<SimulationEvent>>>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in delivery order.
    pub fn events(&self) -> Vec<Arc<SimulationEvent>> {
        self.events.lock().clone()
    }

    /// Number of events delivered so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventListener for CollectingListener {
    fn on_event(&self, event: Arc<SimulationEvent>) -> Result<(), BusError> {
        self.events.lock().push(event);
        Ok(())
    }
}
