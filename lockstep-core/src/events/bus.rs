//! Ordered multi-producer event distribution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::SimulationEvent;

/// Error surfaced by an event listener during dispatch.
///
/// Listener faults are isolated per listener: the dispatch task logs them and
/// continues delivering to the remaining listeners.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Listener failed: {reason}")]
    ListenerFailed { reason: String },
}

/// Receives events in strict publish order.
///
/// `on_event` is invoked synchronously by the single dispatch task, so a slow
/// listener delays delivery to everyone behind it. Returning an error never
/// aborts dispatch; the error is logged and delivery continues.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: Arc<SimulationEvent>) -> Result<(), BusError>;
}

/// Opaque handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum BusMessage {
    Event(Arc<SimulationEvent>),
    Shutdown,
}

/// Ordered, multi-producer event channel with a single dispatch task and
/// replayable history.
///
/// The bus is an explicitly constructed context object: create one, share it
/// as `Arc<EventBus>` with every simulation, and tear it down with
/// [`EventBus::shutdown`]. The unbounded ingress queue is the single
/// serialization point, so delivery order is a global total order matching
/// publish order regardless of how many actors publish concurrently.
pub struct EventBus {
    sender: mpsc::UnboundedSender<BusMessage>,
    listeners: Arc<RwLock<Vec<(ListenerId, Box<dyn EventListener>)>>>,
    history: Arc<Mutex<Vec<Arc<SimulationEvent>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    next_listener_id: AtomicU64,
}

impl EventBus {
    /// Creates the bus and spawns its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listeners: Arc<RwLock<Vec<(ListenerId, Box<dyn EventListener>)>>> =
            Arc::new(RwLock::new(Vec::new()));
        let history = Arc::new(Mutex::new(Vec::new()));

        let dispatcher = tokio::spawn(run_dispatch_loop(
            receiver,
            Arc::clone(&listeners),
            Arc::clone(&history),
        ));

        Self {
            sender,
            listeners,
            history,
            dispatcher: Mutex::new(Some(dispatcher)),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Enqueues an event for ordered delivery.
    ///
    /// Never blocks the caller beyond queue insertion and is safe to call
    /// concurrently from any task. Publishing after shutdown is a silent
    /// no-op.
    pub fn publish(&self, event: SimulationEvent) {
        let _ = self.sender.send(BusMessage::Event(Arc::new(event)));
    }

    /// Registers a listener for subsequently dispatched events.
    ///
    /// For a single event, listeners are invoked in registration order.
    pub fn add_listener(&self, listener: Box<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    ///
    /// Takes effect for subsequently dispatched events; an event already being
    /// dispatched is delivered to the listener set it started with.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Returns a snapshot of all events delivered since the last
    /// [`EventBus::clear_history`].
    ///
    /// History is appended by the dispatch task at delivery time, so the
    /// snapshot order is exactly the delivery order.
    pub fn history(&self) -> Vec<Arc<SimulationEvent>> {
        self.history.lock().clone()
    }

    /// Empties the history list. Called by simulations at the start of each
    /// run.
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Stops the dispatch task after it drains already-queued events.
    ///
    /// Idempotent; subsequent calls return immediately.
    pub async fn shutdown(&self) {
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            let _ = self.sender.send(BusMessage::Shutdown);
            if handle.await.is_err() {
                tracing::warn!("event bus dispatch task panicked during shutdown");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains the ingress queue strictly FIFO and delivers each event to every
/// registered listener in sequence.
async fn run_dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<BusMessage>,
    listeners: Arc<RwLock<Vec<(ListenerId, Box<dyn EventListener>)>>>,
    history: Arc<Mutex<Vec<Arc<SimulationEvent>>>>,
) {
    tracing::debug!("Event bus dispatch task started");

    while let Some(message) = receiver.recv().await {
        match message {
            BusMessage::Event(event) => {
                history.lock().push(Arc::clone(&event));
                for (id, listener) in listeners.read().iter() {
                    if let Err(error) = listener.on_event(Arc::clone(&event)) {
                        tracing::warn!(listener = id.0, %error, "listener failed during dispatch");
                    }
                }
            }
            BusMessage::Shutdown => break,
        }
    }

    tracing::debug!("Event bus dispatch task stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::{CollectingListener, EventType};

    fn execution_event(actor: &str, message: &str) -> SimulationEvent {
        SimulationEvent::new(actor, EventType::Execution, None, message)
    }

    async fn drain(bus: &EventBus, expected: usize) {
        for _ in 0..200 {
            if bus.history().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("bus did not deliver {expected} events in time");
    }

    #[tokio::test]
    async fn test_publish_delivers_to_listener_in_order() {
        let bus = EventBus::new();
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));

        for i in 0..10 {
            bus.publish(execution_event("actor-0", &format!("step {i}")));
        }
        drain(&bus, 10).await;

        let seen = listener.events();
        assert_eq!(seen.len(), 10);
        for (i, event) in seen.iter().enumerate() {
            assert_eq!(event.message, format!("step {i}"));
        }

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_history_snapshot_and_clear() {
        let bus = EventBus::new();
        bus.publish(execution_event("actor-0", "one"));
        bus.publish(execution_event("actor-1", "two"));
        drain(&bus, 2).await;

        let snapshot = bus.history();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "one");

        bus.clear_history();
        assert!(bus.history().is_empty());
        // The earlier snapshot is unaffected by the clear.
        assert_eq!(snapshot.len(), 2);

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_listener_stops_delivery() {
        let bus = EventBus::new();
        let listener = CollectingListener::new();
        let id = bus.add_listener(Box::new(listener.clone()));

        bus.publish(execution_event("actor-0", "before"));
        drain(&bus, 1).await;

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));

        bus.publish(execution_event("actor-0", "after"));
        drain(&bus, 2).await;

        let seen = listener.events();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "before");

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_fault_does_not_abort_dispatch() {
        struct FailingListener;

        impl EventListener for FailingListener {
            fn on_event(&self, _event: Arc<SimulationEvent>) -> Result<(), BusError> {
                Err(BusError::ListenerFailed {
                    reason: "intentional test failure".to_string(),
                })
            }
        }

        let bus = EventBus::new();
        let healthy = CollectingListener::new();
        bus.add_listener(Box::new(FailingListener));
        bus.add_listener(Box::new(healthy.clone()));

        bus.publish(execution_event("actor-0", "first"));
        bus.publish(execution_event("actor-0", "second"));
        drain(&bus, 2).await;

        // The failing listener neither blocked the healthy one nor killed the
        // dispatch task.
        assert_eq!(healthy.events().len(), 2);

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_stops_delivery() {
        let bus = EventBus::new();
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));

        bus.publish(execution_event("actor-0", "delivered"));
        drain(&bus, 1).await;

        bus.shutdown().await;
        bus.shutdown().await;

        bus.publish(execution_event("actor-0", "dropped"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(listener.events().len(), 1);
        assert_eq!(bus.history().len(), 1);
    }
}
