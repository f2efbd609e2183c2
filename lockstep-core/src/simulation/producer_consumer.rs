//! Bounded-buffer producer/consumer simulation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::runtime::{SimulationRuntime, WorkerTerminator};
use super::{Simulation, SimulationError};
use crate::config::{ProducerConsumerConfig, TimingConfig};
use crate::events::{EventBus, EventType};
use crate::sync::BoundedBuffer;

/// Producers add items to a bounded FIFO buffer while consumers drain it.
///
/// Producers block when the buffer is at capacity, consumers block when it is
/// empty. The monotonic `produced`/`consumed` counters and the buffer itself
/// persist across restarts, so `produced - consumed` always equals the
/// current occupancy.
pub struct ProducerConsumerSimulation {
    runtime: Arc<SimulationRuntime>,
    config: Mutex<ProducerConsumerConfig>,
    buffer: Mutex<Arc<BoundedBuffer<u64>>>,
    next_item: Arc<AtomicU64>,
    produced: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
}

impl ProducerConsumerSimulation {
    /// Zero worker counts or a zero capacity in the constructor config are
    /// clamped to one; the setters reject such values instead.
    pub fn new(
        bus: Arc<EventBus>,
        mut config: ProducerConsumerConfig,
        timing: TimingConfig,
    ) -> Self {
        config.producers = config.producers.max(1);
        config.consumers = config.consumers.max(1);
        config.capacity = config.capacity.max(1);
        let buffer = Arc::new(BoundedBuffer::new(config.capacity));
        Self {
            runtime: Arc::new(SimulationRuntime::new("Producer-Consumer", bus, timing)),
            config: Mutex::new(config),
            buffer: Mutex::new(buffer),
            next_item: Arc::new(AtomicU64::new(0)),
            produced: Arc::new(AtomicU64::new(0)),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Items successfully placed into the buffer so far.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    /// Items successfully taken from the buffer so far.
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Current buffer occupancy.
    pub fn occupancy(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn producers(&self) -> usize {
        self.config.lock().producers
    }

    pub fn consumers(&self) -> usize {
        self.config.lock().consumers
    }

    pub fn capacity(&self) -> usize {
        self.config.lock().capacity
    }

    pub fn set_producers(&self, producers: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        Self::ensure_at_least_one("producers", producers)?;
        self.config.lock().producers = producers;
        Ok(())
    }

    pub fn set_consumers(&self, consumers: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        Self::ensure_at_least_one("consumers", consumers)?;
        self.config.lock().consumers = consumers;
        Ok(())
    }

    /// Replaces the buffer with a fresh one of the given capacity.
    ///
    /// Any undrained items from a previous run are discarded, so the
    /// produced/consumed counters are reset with it.
    pub fn set_capacity(&self, capacity: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        Self::ensure_at_least_one("capacity", capacity)?;
        self.config.lock().capacity = capacity;
        *self.buffer.lock() = Arc::new(BoundedBuffer::new(capacity));
        self.produced.store(0, Ordering::SeqCst);
        self.consumed.store(0, Ordering::SeqCst);
        self.next_item.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_production_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().production_delay = delay;
        Ok(())
    }

    pub fn set_consumption_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().consumption_delay = delay;
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<(), SimulationError> {
        if self.runtime.is_running() {
            return Err(SimulationError::ConfigurationLocked {
                name: self.runtime.name().to_string(),
            });
        }
        Ok(())
    }

    fn ensure_at_least_one(what: &str, value: usize) -> Result<(), SimulationError> {
        if value == 0 {
            return Err(SimulationError::InvalidParameter {
                reason: format!("{what} must be at least 1"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Simulation for ProducerConsumerSimulation {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    async fn start(&self) {
        if !self.runtime.try_start() {
            return;
        }

        let config = self.config.lock().clone();
        let buffer = Arc::clone(&self.buffer.lock());

        for id in 0..config.producers {
            let worker = run_producer(
                Arc::clone(&self.runtime),
                Arc::clone(&buffer),
                Arc::clone(&self.next_item),
                Arc::clone(&self.produced),
                id,
                config.production_delay,
            );
            self.runtime.register_worker(tokio::spawn(worker));
        }
        for id in 0..config.consumers {
            let worker = run_consumer(
                Arc::clone(&self.runtime),
                Arc::clone(&buffer),
                Arc::clone(&self.consumed),
                id,
                config.consumption_delay,
            );
            self.runtime.register_worker(tokio::spawn(worker));
        }
    }

    fn pause(&self) {
        self.runtime.pause();
    }

    fn resume(&self) {
        self.runtime.resume();
    }

    async fn stop(&self) {
        self.runtime.stop().await;
    }

    fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    fn is_paused(&self) -> bool {
        self.runtime.is_paused()
    }
}

async fn run_producer(
    runtime: Arc<SimulationRuntime>,
    buffer: Arc<BoundedBuffer<u64>>,
    next_item: Arc<AtomicU64>,
    produced: Arc<AtomicU64>,
    id: usize,
    production_delay: Duration,
) {
    let actor = format!("producer-{id}");
    runtime.announce_worker(&actor, "Producer");
    let _terminator = WorkerTerminator::new(Arc::clone(runtime.bus()), actor.clone(), "Producer");

    while runtime.is_running() {
        runtime.pause_point().await;

        runtime.publish(&actor, EventType::Execution, Some(&actor), "Producing item");
        runtime.simulate_work(production_delay).await;

        let item = next_item.fetch_add(1, Ordering::SeqCst) + 1;
        runtime.publish(
            &actor,
            EventType::LockWaiting,
            Some("buffer"),
            format!(
                "Waiting to add item {item} to buffer ({}/{})",
                buffer.len(),
                buffer.capacity()
            ),
        );

        buffer.put(item).await;
        // No suspension point between the put completing and the counter
        // bump, so cancellation cannot split them.
        produced.fetch_add(1, Ordering::SeqCst);

        runtime.publish(
            &actor,
            EventType::LockAcquired,
            Some("buffer"),
            format!(
                "Added item {item} to buffer ({}/{})",
                buffer.len(),
                buffer.capacity()
            ),
        );
        runtime.publish(
            &actor,
            EventType::LockReleased,
            Some("buffer"),
            "Released buffer after adding item",
        );
    }
}

async fn run_consumer(
    runtime: Arc<SimulationRuntime>,
    buffer: Arc<BoundedBuffer<u64>>,
    consumed: Arc<AtomicU64>,
    id: usize,
    consumption_delay: Duration,
) {
    let actor = format!("consumer-{id}");
    runtime.announce_worker(&actor, "Consumer");
    let _terminator = WorkerTerminator::new(Arc::clone(runtime.bus()), actor.clone(), "Consumer");

    while runtime.is_running() {
        runtime.pause_point().await;

        runtime.publish(
            &actor,
            EventType::LockWaiting,
            Some("buffer"),
            format!(
                "Waiting to take item from buffer ({}/{})",
                buffer.len(),
                buffer.capacity()
            ),
        );

        let item = buffer.take().await;
        consumed.fetch_add(1, Ordering::SeqCst);

        runtime.publish(
            &actor,
            EventType::LockAcquired,
            Some("buffer"),
            format!(
                "Took item {item} from buffer ({}/{})",
                buffer.len(),
                buffer.capacity()
            ),
        );
        runtime.publish(
            &actor,
            EventType::LockReleased,
            Some("buffer"),
            "Released buffer after consuming item",
        );

        runtime.publish(
            &actor,
            EventType::Execution,
            Some(&actor),
            format!("Consuming item {item}"),
        );
        runtime.simulate_work(consumption_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockstepConfig;

    fn test_simulation(bus: Arc<EventBus>) -> ProducerConsumerSimulation {
        let config = LockstepConfig::for_testing();
        ProducerConsumerSimulation::new(bus, config.producer_consumer, config.timing)
    }

    #[tokio::test]
    async fn test_setters_rejected_while_running() {
        let bus = Arc::new(EventBus::new());
        let simulation = test_simulation(Arc::clone(&bus));

        simulation.start().await;
        assert!(matches!(
            simulation.set_producers(4),
            Err(SimulationError::ConfigurationLocked { .. })
        ));
        assert!(matches!(
            simulation.set_capacity(8),
            Err(SimulationError::ConfigurationLocked { .. })
        ));

        simulation.stop().await;
        simulation.set_producers(4).unwrap();
        simulation.set_capacity(8).unwrap();
        assert_eq!(simulation.producers(), 4);
        assert_eq!(simulation.capacity(), 8);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_constructor_clamps_zero_parameters() {
        let bus = Arc::new(EventBus::new());
        let config = ProducerConsumerConfig {
            producers: 0,
            consumers: 0,
            capacity: 0,
            ..LockstepConfig::for_testing().producer_consumer
        };
        let simulation =
            ProducerConsumerSimulation::new(Arc::clone(&bus), config, TimingConfig::for_testing());

        assert_eq!(simulation.producers(), 1);
        assert_eq!(simulation.consumers(), 1);
        assert_eq!(simulation.capacity(), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_counts_are_rejected() {
        let bus = Arc::new(EventBus::new());
        let simulation = test_simulation(Arc::clone(&bus));

        assert!(matches!(
            simulation.set_consumers(0),
            Err(SimulationError::InvalidParameter { .. })
        ));
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counters_balance_while_running() {
        let bus = Arc::new(EventBus::new());
        let simulation = test_simulation(Arc::clone(&bus));

        simulation.start().await;
        for _ in 0..400 {
            let produced = simulation.produced();
            let consumed = simulation.consumed();
            assert!(consumed <= produced);
            assert!(simulation.occupancy() <= simulation.capacity());
            if consumed >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(simulation.consumed() >= 3);

        simulation.stop().await;
        assert_eq!(
            simulation.produced() - simulation.consumed(),
            simulation.occupancy() as u64
        );
        bus.shutdown().await;
    }
}
