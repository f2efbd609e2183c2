//! Lifecycle idempotence and worker accounting across simulations.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::config::LockstepConfig;
use lockstep_core::events::{EventBus, EventType};
use lockstep_core::simulation::{ProducerConsumerSimulation, Simulation};

use crate::common::{observed_bus, wait_for};

fn testing_simulation(bus: Arc<EventBus>) -> ProducerConsumerSimulation {
    let config = LockstepConfig::for_testing();
    ProducerConsumerSimulation::new(bus, config.producer_consumer, config.timing)
}

/// Calling `stop` twice produces exactly one "stopped" event and leaves the
/// simulation not running both times.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_stop_publishes_single_stopped_event() {
    let (bus, listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));

    simulation.start().await;
    wait_for(
        || simulation.produced() >= 1,
        Duration::from_secs(5),
        "initial progress",
    )
    .await;

    simulation.stop().await;
    assert!(!simulation.is_running());
    simulation.stop().await;
    assert!(!simulation.is_running());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped = listener
        .events()
        .iter()
        .filter(|event| event.message == "Simulation stopped")
        .count();
    assert_eq!(stopped, 1);

    bus.shutdown().await;
}

/// Every worker that announced itself publishes a termination event on stop,
/// including workers cancelled while blocked.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_worker_terminates_on_stop() {
    let (bus, listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));
    let workers = simulation.producers() + simulation.consumers();

    simulation.start().await;
    wait_for(
        || {
            listener
                .events()
                .iter()
                .filter(|event| event.event_type == EventType::ThreadStarted)
                .count()
                == workers
        },
        Duration::from_secs(5),
        "all workers to start",
    )
    .await;

    simulation.stop().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = listener.events();
    let created = events
        .iter()
        .filter(|event| event.event_type == EventType::ThreadCreated)
        .count();
    let terminated = events
        .iter()
        .filter(|event| event.event_type == EventType::ThreadTerminated)
        .count();
    assert_eq!(created, workers);
    assert_eq!(terminated, workers);

    bus.shutdown().await;
}

/// Starting again after a stop clears the bus history and spawns a fresh
/// worker pool.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_clears_history_and_respawns_workers() {
    let (bus, _listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));

    simulation.start().await;
    wait_for(
        || simulation.produced() >= 1,
        Duration::from_secs(5),
        "first run progress",
    )
    .await;
    simulation.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!bus.history().is_empty());

    simulation.start().await;
    let history = bus.history();
    assert!(
        !history
            .iter()
            .any(|event| event.message == "Simulation stopped"),
        "history from the previous run survived the restart"
    );

    let produced_before = simulation.produced();
    wait_for(
        || simulation.produced() > produced_before,
        Duration::from_secs(5),
        "second run progress",
    )
    .await;

    simulation.stop().await;
    bus.shutdown().await;
}

/// Start on a running simulation is a silent no-op: no second wave of
/// ThreadCreated events appears.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_start_spawns_no_extra_workers() {
    let (bus, listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));
    let workers = simulation.producers() + simulation.consumers();

    simulation.start().await;
    simulation.start().await;
    wait_for(
        || {
            listener
                .events()
                .iter()
                .filter(|event| event.event_type == EventType::ThreadStarted)
                .count()
                >= workers
        },
        Duration::from_secs(5),
        "workers to start",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let created = listener
        .events()
        .iter()
        .filter(|event| event.event_type == EventType::ThreadCreated)
        .count();
    assert_eq!(created, workers);

    simulation.stop().await;
    bus.shutdown().await;
}
