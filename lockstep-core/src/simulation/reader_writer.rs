//! Reader-writer simulation with prioritizable access.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::runtime::{ActiveGuard, SimulationRuntime, WorkerTerminator};
use super::{Simulation, SimulationError};
use crate::config::{ReaderWriterConfig, TimingConfig};
use crate::events::{EventBus, EventType};
use crate::sync::PolicyRwLock;

/// Readers share a resource while writers require exclusive access.
///
/// The shared resource is a [`PolicyRwLock`]; flipping `writer_priority`
/// (only while stopped) replaces the lock with one of the other policy.
pub struct ReaderWriterSimulation {
    runtime: Arc<SimulationRuntime>,
    config: Mutex<ReaderWriterConfig>,
    lock: Mutex<Arc<PolicyRwLock>>,
    active_readers: Arc<AtomicUsize>,
    active_writers: Arc<AtomicUsize>,
    total_reads: Arc<AtomicU64>,
    total_writes: Arc<AtomicU64>,
}

impl ReaderWriterSimulation {
    /// Zero role counts in the constructor config are clamped to one; the
    /// setters reject such values instead.
    pub fn new(bus: Arc<EventBus>, mut config: ReaderWriterConfig, timing: TimingConfig) -> Self {
        config.readers = config.readers.max(1);
        config.writers = config.writers.max(1);
        let lock = Arc::new(PolicyRwLock::new(config.writer_priority));
        Self {
            runtime: Arc::new(SimulationRuntime::new("Reader-Writer", bus, timing)),
            config: Mutex::new(config),
            lock: Mutex::new(lock),
            active_readers: Arc::new(AtomicUsize::new(0)),
            active_writers: Arc::new(AtomicUsize::new(0)),
            total_reads: Arc::new(AtomicU64::new(0)),
            total_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Readers currently inside the shared section.
    pub fn active_readers(&self) -> usize {
        self.active_readers.load(Ordering::SeqCst)
    }

    /// Writers currently inside the exclusive section (0 or 1).
    pub fn active_writers(&self) -> usize {
        self.active_writers.load(Ordering::SeqCst)
    }

    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::SeqCst)
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::SeqCst)
    }

    pub fn readers(&self) -> usize {
        self.config.lock().readers
    }

    pub fn writers(&self) -> usize {
        self.config.lock().writers
    }

    pub fn writer_priority(&self) -> bool {
        self.config.lock().writer_priority
    }

    pub fn set_readers(&self, readers: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        Self::ensure_at_least_one("readers", readers)?;
        self.config.lock().readers = readers;
        Ok(())
    }

    pub fn set_writers(&self, writers: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        Self::ensure_at_least_one("writers", writers)?;
        self.config.lock().writers = writers;
        Ok(())
    }

    pub fn set_read_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().read_delay = delay;
        Ok(())
    }

    pub fn set_write_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().write_delay = delay;
        Ok(())
    }

    /// Switches the admission policy by replacing the lock.
    pub fn set_writer_priority(&self, enabled: bool) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().writer_priority = enabled;
        *self.lock.lock() = Arc::new(PolicyRwLock::new(enabled));
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
impl Simulation for ReaderWriterSimulation {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    async fn start(&self) {
        if !self.runtime.try_start() {
            return;
        }

        let config = self.config.lock().clone();
        let lock = Arc::clone(&self.lock.lock());

        for id in 0..config.readers {
            let worker = run_reader(
                Arc::clone(&self.runtime),
                Arc::clone(&lock),
                Arc::clone(&self.active_readers),
                Arc::clone(&self.total_reads),
                id,
                config.clone(),
            );
            self.runtime.register_worker(tokio::spawn(worker));
        }
        for id in 0..config.writers {
            let worker = run_writer(
                Arc::clone(&self.runtime),
                Arc::clone(&lock),
                Arc::clone(&self.active_writers),
                Arc::clone(&self.total_writes),
                id,
                config.clone(),
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

async fn run_reader(
    runtime: Arc<SimulationRuntime>,
    lock: Arc<PolicyRwLock>,
    active_readers: Arc<AtomicUsize>,
    total_reads: Arc<AtomicU64>,
    id: usize,
    config: ReaderWriterConfig,
) {
    let actor = format!("reader-{id}");
    runtime.announce_worker(&actor, "Reader");
    let _terminator = WorkerTerminator::new(Arc::clone(runtime.bus()), actor.clone(), "Reader");

    while runtime.is_running() {
        runtime.pause_point().await;

        runtime.publish(
            &actor,
            EventType::LockWaiting,
            Some("resource"),
            "Waiting for read access",
        );

        let guard = lock.read().await;
        let (hold, reader_count) = ActiveGuard::acquire(&active_readers);
        runtime.publish(
            &actor,
            EventType::LockAcquired,
            Some("resource"),
            format!("Acquired read lock (active readers: {reader_count})"),
        );

        runtime.publish(&actor, EventType::Execution, Some(&actor), "Reading resource");
        runtime.simulate_work(config.read_delay).await;
        total_reads.fetch_add(1, Ordering::SeqCst);

        let reader_count = hold.release();
        runtime.publish(
            &actor,
            EventType::LockReleased,
            Some("resource"),
            format!("Released read lock (active readers: {reader_count})"),
        );
        drop(guard);

        runtime.simulate_work(config.inter_read_pause).await;
    }
}

async fn run_writer(
    runtime: Arc<SimulationRuntime>,
    lock: Arc<PolicyRwLock>,
    active_writers: Arc<AtomicUsize>,
    total_writes: Arc<AtomicU64>,
    id: usize,
    config: ReaderWriterConfig,
) {
    let actor = format!("writer-{id}");
    runtime.announce_worker(&actor, "Writer");
    let _terminator = WorkerTerminator::new(Arc::clone(runtime.bus()), actor.clone(), "Writer");

    while runtime.is_running() {
        runtime.pause_point().await;

        runtime.publish(
            &actor,
            EventType::LockWaiting,
            Some("resource"),
            "Waiting for write access",
        );

        let guard = lock.write().await;
        let (hold, _) = ActiveGuard::acquire(&active_writers);
        runtime.publish(
            &actor,
            EventType::LockAcquired,
            Some("resource"),
            "Acquired write lock (exclusive access)",
        );

        runtime.publish(
            &actor,
            EventType::Execution,
            Some(&actor),
            "Writing to resource",
        );
        runtime.simulate_work(config.write_delay).await;
        total_writes.fetch_add(1, Ordering::SeqCst);

        hold.release();
        runtime.publish(
            &actor,
            EventType::LockReleased,
            Some("resource"),
            "Released write lock",
        );
        drop(guard);

        runtime.simulate_work(config.inter_write_pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockstepConfig;

    fn test_simulation(bus: Arc<EventBus>) -> ReaderWriterSimulation {
        let config = LockstepConfig::for_testing();
        ReaderWriterSimulation::new(bus, config.reader_writer, config.timing)
    }

    #[tokio::test]
    async fn test_zero_role_counts_clamped_and_rejected() {
        let bus = Arc::new(EventBus::new());
        let config = ReaderWriterConfig {
            readers: 0,
            writers: 0,
            ..LockstepConfig::for_testing().reader_writer
        };
        let simulation =
            ReaderWriterSimulation::new(Arc::clone(&bus), config, TimingConfig::for_testing());

        assert_eq!(simulation.readers(), 1);
        assert_eq!(simulation.writers(), 1);
        assert!(matches!(
            simulation.set_readers(0),
            Err(SimulationError::InvalidParameter { .. })
        ));
        assert!(matches!(
            simulation.set_writers(0),
            Err(SimulationError::InvalidParameter { .. })
        ));
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_priority_flip_rejected_while_running() {
        let bus = Arc::new(EventBus::new());
        let simulation = test_simulation(Arc::clone(&bus));

        simulation.start().await;
        assert!(matches!(
            simulation.set_writer_priority(true),
            Err(SimulationError::ConfigurationLocked { .. })
        ));
        simulation.stop().await;

        simulation.set_writer_priority(true).unwrap();
        assert!(simulation.writer_priority());
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_and_writers_make_progress() {
        let bus = Arc::new(EventBus::new());
        let simulation = test_simulation(Arc::clone(&bus));

        simulation.start().await;
        for _ in 0..400 {
            if simulation.total_reads() >= 2 && simulation.total_writes() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(simulation.total_reads() >= 2);
        assert!(simulation.total_writes() >= 2);

        simulation.stop().await;
        assert_eq!(simulation.active_readers(), 0);
        assert_eq!(simulation.active_writers(), 0);
        bus.shutdown().await;
    }
}
