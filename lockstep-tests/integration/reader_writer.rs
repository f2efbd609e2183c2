//! Reader-writer mutual exclusion and priority properties.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::config::{LockstepConfig, ReaderWriterConfig, TimingConfig};
use lockstep_core::events::{EventType, SimulationEvent};
use lockstep_core::simulation::{ReaderWriterSimulation, Simulation};

use crate::common::{observed_bus, wait_for};

fn testing_simulation(
    bus: Arc<lockstep_core::events::EventBus>,
    writer_priority: bool,
) -> ReaderWriterSimulation {
    let mut config = LockstepConfig::for_testing().reader_writer;
    config.writer_priority = writer_priority;
    ReaderWriterSimulation::new(bus, config, TimingConfig::for_testing())
}

/// Replays lock events and asserts readers and writers were never inside the
/// critical section together.
///
/// Acquired events are published after the lock is held and released events
/// before it is dropped, so the reconstructed windows are contained in the
/// real ones.
fn assert_mutual_exclusion(history: &[Arc<SimulationEvent>]) {
    let mut readers_inside = 0i64;
    let mut writer_inside = false;

    for event in history {
        if event.resource_id.as_deref() != Some("resource") {
            continue;
        }
        let is_reader = event.actor_id.starts_with("reader-");
        match event.event_type {
            EventType::LockAcquired if is_reader => {
                assert!(!writer_inside, "reader admitted while a writer held the lock");
                readers_inside += 1;
            }
            EventType::LockReleased if is_reader => readers_inside -= 1,
            EventType::LockAcquired => {
                assert!(!writer_inside, "two writers inside the critical section");
                assert_eq!(
                    readers_inside, 0,
                    "writer admitted while readers held the lock"
                );
                writer_inside = true;
            }
            EventType::LockReleased => writer_inside = false,
            _ => {}
        }
    }
}

async fn run_and_check_exclusion(writer_priority: bool) {
    let (bus, _listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus), writer_priority);

    simulation.start().await;

    // Sample the live counters while the run is hot.
    let sampling_deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while tokio::time::Instant::now() < sampling_deadline {
        let readers = simulation.active_readers();
        let writers = simulation.active_writers();
        assert!(
            !(readers > 0 && writers > 0),
            "readers ({readers}) and writers ({writers}) active together"
        );
        assert!(writers <= 1, "{writers} writers active at once");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    wait_for(
        || simulation.total_reads() >= 2 && simulation.total_writes() >= 1,
        Duration::from_secs(10),
        "both roles to make progress",
    )
    .await;
    simulation.stop().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_mutual_exclusion(&bus.history());

    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutual_exclusion_without_priority() {
    run_and_check_exclusion(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutual_exclusion_with_writer_priority() {
    run_and_check_exclusion(true).await;
}

/// With writer priority enabled, writers are not starved even when readers
/// heavily outnumber them and re-acquire aggressively.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_writer_priority_prevents_writer_starvation() {
    let (bus, _listener) = observed_bus();
    let config = ReaderWriterConfig {
        readers: 6,
        writers: 1,
        read_delay: Duration::from_millis(20),
        write_delay: Duration::from_millis(10),
        writer_priority: true,
        inter_read_pause: Duration::from_millis(1),
        inter_write_pause: Duration::from_millis(1),
    };
    let simulation =
        ReaderWriterSimulation::new(Arc::clone(&bus), config, TimingConfig::for_testing());

    simulation.start().await;
    wait_for(
        || simulation.total_writes() >= 5,
        Duration::from_secs(10),
        "the writer to keep acquiring the lock",
    )
    .await;
    simulation.stop().await;
    bus.shutdown().await;
}
