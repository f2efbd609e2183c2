//! Shared helpers for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::events::{CollectingListener, EventBus};

/// Bus with a collecting listener attached, the standard test harness.
pub fn observed_bus() -> (Arc<EventBus>, CollectingListener) {
    let bus = Arc::new(EventBus::new());
    let listener = CollectingListener::new();
    bus.add_listener(Box::new(listener.clone()));
    (bus, listener)
}

/// Polls `condition` every few milliseconds until it holds or the deadline
/// expires.
pub async fn wait_for(condition: impl Fn() -> bool, deadline: Duration, what: &str) {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out after {deadline:?} waiting for {what}");
}
