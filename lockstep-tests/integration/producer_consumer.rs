//! Producer/consumer occupancy and counter properties.

use std::sync::Arc;
use std::time::Duration;

use lockstep_core::config::{LockstepConfig, ProducerConsumerConfig, TimingConfig};
use lockstep_core::events::EventBus;
use lockstep_core::simulation::{ProducerConsumerSimulation, Simulation};

use crate::common::{observed_bus, wait_for};

fn testing_simulation(bus: Arc<EventBus>) -> ProducerConsumerSimulation {
    let config = LockstepConfig::for_testing();
    ProducerConsumerSimulation::new(bus, config.producer_consumer, config.timing)
}

/// At every sampled instant `0 <= occupancy <= K`, and after stop the
/// conservation law `produced - consumed == occupancy` holds.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_occupancy_bounded_and_conserved() {
    let (bus, _listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));
    let capacity = simulation.capacity();

    simulation.start().await;

    let sampling_deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while tokio::time::Instant::now() < sampling_deadline {
        let occupancy = simulation.occupancy();
        assert!(occupancy <= capacity, "occupancy {occupancy} exceeds capacity");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(simulation.produced() > 0, "producers made no progress");

    simulation.stop().await;
    assert_eq!(
        simulation.produced() - simulation.consumed(),
        simulation.occupancy() as u64
    );

    bus.shutdown().await;
}

/// One producer, one consumer, capacity one: after three full production
/// cycles and a graceful stop, both counters read exactly three.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_three_cycle_scenario() {
    let (bus, _listener) = observed_bus();
    // Production is slow and consumption fast, so the consumer keeps up and
    // the stop lands while the fourth item is still being produced.
    let config = ProducerConsumerConfig {
        producers: 1,
        consumers: 1,
        capacity: 1,
        production_delay: Duration::from_millis(300),
        consumption_delay: Duration::from_millis(1),
    };
    let simulation =
        ProducerConsumerSimulation::new(Arc::clone(&bus), config, TimingConfig::for_testing());

    simulation.start().await;
    wait_for(
        || simulation.consumed() >= 3,
        Duration::from_secs(15),
        "three items to be consumed",
    )
    .await;
    simulation.stop().await;

    assert_eq!(simulation.produced(), 3);
    assert_eq!(simulation.consumed(), 3);
    assert_eq!(simulation.occupancy(), 0);

    bus.shutdown().await;
}

/// Pausing freezes both counters within a settle window; resuming restores
/// progress within one poll interval.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_freezes_progress_and_resume_restores_it() {
    let (bus, _listener) = observed_bus();
    let simulation = testing_simulation(Arc::clone(&bus));

    simulation.start().await;
    wait_for(
        || simulation.consumed() >= 1,
        Duration::from_secs(5),
        "initial progress",
    )
    .await;

    simulation.pause();
    assert!(simulation.is_paused());
    // Let workers that were mid-cycle reach their pause point.
    tokio::time::sleep(Duration::from_millis(250)).await;

    let produced = simulation.produced();
    let consumed = simulation.consumed();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(simulation.produced(), produced, "producers ran while paused");
    assert_eq!(simulation.consumed(), consumed, "consumers ran while paused");

    simulation.resume();
    assert!(!simulation.is_paused());
    wait_for(
        || simulation.consumed() > consumed,
        Duration::from_secs(5),
        "progress after resume",
    )
    .await;

    simulation.stop().await;
    bus.shutdown().await;
}
