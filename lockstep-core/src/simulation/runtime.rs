//! Shared lifecycle mechanics reused by every simulation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::TimingConfig;
use crate::events::{EventBus, EventType, SimulationEvent};

/// Lifecycle state and timing helpers owned by each concrete simulation.
///
/// This is deliberately a helper invoked by the simulations rather than a
/// base type they inherit from: the runtime owns the running/paused flags,
/// the worker handle set, and the event-publishing plumbing, while each
/// protocol keeps its own resources and worker loops.
pub struct SimulationRuntime {
    name: String,
    bus: Arc<EventBus>,
    timing: TimingConfig,
    running: AtomicBool,
    paused: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulationRuntime {
    pub fn new(name: impl Into<String>, bus: Arc<EventBus>, timing: TimingConfig) -> Self {
        Self {
            name: name.into(),
            bus,
            timing,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Attempts the stopped → running transition.
    ///
    /// Returns false if the simulation was already running. On success the
    /// bus history is cleared so the new run starts with an empty record.
    pub fn try_start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.bus.clear_history();
        tracing::debug!(simulation = %self.name, "simulation starting");
        true
    }

    /// Registers a spawned worker so `stop` can cancel and await it.
    pub fn register_worker(&self, handle: JoinHandle<()>) {
        self.workers.lock().push(handle);
    }

    /// Requests a cooperative pause. Has no effect unless running.
    pub fn pause(&self) {
        if self.is_running() && !self.paused.swap(true, Ordering::SeqCst) {
            self.publish(&self.name, EventType::Execution, None, "Simulation paused");
        }
    }

    /// Lifts a pause. Has no effect unless running and paused.
    pub fn resume(&self) {
        if self.is_running() && self.paused.swap(false, Ordering::SeqCst) {
            self.publish(&self.name, EventType::Execution, None, "Simulation resumed");
        }
    }

    /// Performs the running → stopped transition.
    ///
    /// Cancels every worker, waits up to the grace period for them to unwind
    /// their cleanup, and publishes exactly one "stopped" event per run
    /// whether or not the grace period elapsed cleanly.
    pub async fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.paused.store(false, Ordering::SeqCst);

        let workers: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };
        for handle in &workers {
            handle.abort();
        }
        if timeout(self.timing.stop_grace, join_all(workers)).await.is_err() {
            tracing::warn!(
                simulation = %self.name,
                grace = ?self.timing.stop_grace,
                "workers did not quiesce within the grace period"
            );
        }

        self.publish(&self.name, EventType::Execution, None, "Simulation stopped");
        tracing::debug!(simulation = %self.name, "simulation stopped");
    }

    /// Publishes an event observed by `actor_id`.
    pub fn publish(
        &self,
        actor_id: &str,
        event_type: EventType,
        resource_id: Option<&str>,
        message: impl Into<String>,
    ) {
        self.bus.publish(SimulationEvent::new(
            actor_id,
            event_type,
            resource_id.map(str::to_string),
            message,
        ));
    }

    /// Publishes the ThreadCreated/ThreadStarted pair at worker entry.
    pub fn announce_worker(&self, actor_id: &str, role: &str) {
        self.publish(
            actor_id,
            EventType::ThreadCreated,
            Some(actor_id),
            format!("{role} created"),
        );
        self.publish(
            actor_id,
            EventType::ThreadStarted,
            Some(actor_id),
            format!("{role} started"),
        );
    }

    /// Blocks the calling worker for `base * speed_factor`.
    pub async fn simulate_work(&self, base: Duration) {
        tokio::time::sleep(base.mul_f64(self.timing.speed_factor)).await;
    }

    /// Fixed backoff before retrying a failed non-blocking acquisition.
    pub async fn backoff(&self) {
        tokio::time::sleep(self.timing.backoff).await;
    }

    /// Cooperative pause point.
    ///
    /// Suspends in a bounded poll loop while the simulation is paused and
    /// still running. Workers call this only while holding no resource.
    pub async fn pause_point(&self) {
        while self.is_paused() && self.is_running() {
            tokio::time::sleep(self.timing.pause_poll).await;
        }
    }
}

/// Publishes ThreadTerminated when dropped.
///
/// Workers create one right after announcing themselves; since cancellation
/// unwinds the task by dropping its locals, the terminated event is published
/// on every exit path including forced cancellation.
pub(crate) struct WorkerTerminator {
    bus: Arc<EventBus>,
    actor_id: String,
    role: &'static str,
}

impl WorkerTerminator {
    pub(crate) fn new(bus: Arc<EventBus>, actor_id: String, role: &'static str) -> Self {
        Self {
            bus,
            actor_id,
            role,
        }
    }
}

impl Drop for WorkerTerminator {
    fn drop(&mut self) {
        self.bus.publish(SimulationEvent::new(
            self.actor_id.clone(),
            EventType::ThreadTerminated,
            Some(self.actor_id.clone()),
            format!("{} terminated", self.role),
        ));
    }
}

/// Increments an activity counter on creation and decrements it on drop.
///
/// Declared after the lock guard it describes, so a cancelled worker
/// decrements the counter before the lock is released.
pub(crate) struct ActiveGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl ActiveGuard {
    /// Increments the counter and returns the guard with the new value.
    pub(crate) fn acquire(counter: &Arc<AtomicUsize>) -> (Self, usize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (
            Self {
                counter: Arc::clone(counter),
                armed: true,
            },
            now,
        )
    }

    /// Explicitly decrements and returns the new value.
    pub(crate) fn release(mut self) -> usize {
        self.armed = false;
        self.counter.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingListener;

    fn test_runtime(bus: Arc<EventBus>) -> SimulationRuntime {
        SimulationRuntime::new("Test", bus, TimingConfig::for_testing())
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let runtime = test_runtime(Arc::clone(&bus));

        assert!(runtime.try_start());
        assert!(runtime.is_running());
        assert!(!runtime.try_start());

        runtime.stop().await;
        assert!(!runtime.is_running());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_before_start_has_no_observable_effect() {
        let bus = Arc::new(EventBus::new());
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));
        let runtime = test_runtime(Arc::clone(&bus));

        runtime.pause();
        runtime.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!runtime.is_paused());
        assert!(listener.is_empty());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_resume_publish_transition_events_once() {
        let bus = Arc::new(EventBus::new());
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));
        let runtime = test_runtime(Arc::clone(&bus));

        runtime.try_start();
        runtime.pause();
        runtime.pause();
        runtime.resume();
        runtime.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let messages: Vec<_> = listener
            .events()
            .iter()
            .map(|event| event.message.clone())
            .collect();
        assert_eq!(messages, vec!["Simulation paused", "Simulation resumed"]);

        runtime.stop().await;
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_workers_and_publishes_once() {
        let bus = Arc::new(EventBus::new());
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));
        let runtime = Arc::new(test_runtime(Arc::clone(&bus)));

        runtime.try_start();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        runtime.register_worker(handle);

        runtime.stop().await;
        runtime.stop().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stopped: Vec<_> = listener
            .events()
            .into_iter()
            .filter(|event| event.message == "Simulation stopped")
            .collect();
        assert_eq!(stopped.len(), 1);
        assert!(!runtime.is_running());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_terminator_publishes_on_cancellation() {
        let bus = Arc::new(EventBus::new());
        let listener = CollectingListener::new();
        bus.add_listener(Box::new(listener.clone()));

        let handle = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let _terminator = WorkerTerminator::new(bus, "worker-0".to_string(), "Worker");
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let events = listener.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ThreadTerminated);
        assert_eq!(events[0].actor_id, "worker-0");
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_simulate_work_applies_speed_factor() {
        let bus = Arc::new(EventBus::new());
        let mut timing = TimingConfig::for_testing();
        timing.speed_factor = 3.0;
        let runtime = SimulationRuntime::new("Test", Arc::clone(&bus), timing);

        let started = tokio::time::Instant::now();
        runtime.simulate_work(Duration::from_millis(20)).await;
        assert!(started.elapsed() >= Duration::from_millis(60));
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_active_guard_decrements_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (guard, now) = ActiveGuard::acquire(&counter);
        assert_eq!(now, 1);
        drop(guard);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let (guard, _) = ActiveGuard::acquire(&counter);
        assert_eq!(guard.release(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
