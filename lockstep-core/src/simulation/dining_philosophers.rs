//! Dining philosophers simulation with optional deadlock avoidance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as ForkLock;

use super::runtime::{SimulationRuntime, WorkerTerminator};
use super::{Simulation, SimulationError};
use crate::config::{DiningPhilosophersConfig, TimingConfig};
use crate::events::{EventBus, EventType};

/// Fixed size of the fork arena.
///
/// Forks are allocated once at construction and reused across restarts;
/// changing the philosopher count only changes how many of them are in play.
pub const FORK_ARENA_CAPACITY: usize = 32;

/// N philosophers cycle between thinking and eating, sharing N forks arranged
/// in a ring; philosopher `i` needs forks `i` and `(i + 1) % n`.
///
/// Fork acquisition is non-blocking with a fixed backoff: a philosopher never
/// holds one fork while waiting indefinitely for the other, which is the
/// protocol's deadlock-avoidance property (not starvation-freedom or
/// fairness). With `deadlock_avoidance` enabled, odd philosophers also
/// reverse their acquisition order, breaking the circular wait entirely.
pub struct DiningPhilosophersSimulation {
    runtime: Arc<SimulationRuntime>,
    config: Mutex<DiningPhilosophersConfig>,
    forks: Vec<Arc<ForkLock<()>>>,
}

impl DiningPhilosophersSimulation {
    /// A constructor-supplied philosopher count outside
    /// `2..=FORK_ARENA_CAPACITY` is clamped into range; `set_philosophers`
    /// rejects such values instead.
    pub fn new(
        bus: Arc<EventBus>,
        mut config: DiningPhilosophersConfig,
        timing: TimingConfig,
    ) -> Self {
        config.philosophers = config.philosophers.clamp(2, FORK_ARENA_CAPACITY);
        let forks = (0..FORK_ARENA_CAPACITY)
            .map(|_| Arc::new(ForkLock::new(())))
            .collect();
        Self {
            runtime: Arc::new(SimulationRuntime::new("Dining Philosophers", bus, timing)),
            config: Mutex::new(config),
            forks,
        }
    }

    pub fn philosophers(&self) -> usize {
        self.config.lock().philosophers
    }

    pub fn deadlock_avoidance(&self) -> bool {
        self.config.lock().deadlock_avoidance
    }

    pub fn set_philosophers(&self, philosophers: usize) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        if philosophers < 2 || philosophers > FORK_ARENA_CAPACITY {
            return Err(SimulationError::InvalidParameter {
                reason: format!(
                    "philosophers must be between 2 and {FORK_ARENA_CAPACITY}, got {philosophers}"
                ),
            });
        }
        self.config.lock().philosophers = philosophers;
        Ok(())
    }

    pub fn set_thinking_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().thinking_delay = delay;
        Ok(())
    }

    pub fn set_eating_delay(&self, delay: Duration) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().eating_delay = delay;
        Ok(())
    }

    pub fn set_deadlock_avoidance(&self, enabled: bool) -> Result<(), SimulationError> {
        self.ensure_stopped()?;
        self.config.lock().deadlock_avoidance = enabled;
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
}

#[async_trait]
impl Simulation for DiningPhilosophersSimulation {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    async fn start(&self) {
        if !self.runtime.try_start() {
            return;
        }

        let config = self.config.lock().clone();
        let forks: Vec<Arc<ForkLock<()>>> = self.forks[..config.philosophers]
            .iter()
            .map(Arc::clone)
            .collect();

        for id in 0..config.philosophers {
            let worker = run_philosopher(
                Arc::clone(&self.runtime),
                forks.clone(),
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

/// Fork indices philosopher `id` acquires, in order.
///
/// The base order is (id, (id + 1) % n). With avoidance enabled, odd
/// philosophers swap the pair so that at least two neighbors contend for the
/// same first fork, which removes the cyclic-wait condition.
fn acquisition_order(id: usize, philosophers: usize, deadlock_avoidance: bool) -> (usize, usize) {
    let first = id;
    let second = (id + 1) % philosophers;
    if deadlock_avoidance && id % 2 == 1 {
        (second, first)
    } else {
        (first, second)
    }
}

async fn run_philosopher(
    runtime: Arc<SimulationRuntime>,
    forks: Vec<Arc<ForkLock<()>>>,
    id: usize,
    config: DiningPhilosophersConfig,
) {
    let actor = format!("philosopher-{id}");
    runtime.announce_worker(&actor, "Philosopher");
    let _terminator =
        WorkerTerminator::new(Arc::clone(runtime.bus()), actor.clone(), "Philosopher");

    while runtime.is_running() {
        runtime.pause_point().await;

        runtime.publish(
            &actor,
            EventType::Execution,
            Some(&actor),
            "Philosopher thinking",
        );
        runtime.simulate_work(config.thinking_delay).await;

        // Keep attempting to eat until it works; each failed attempt backs
        // off and restarts from the order computation.
        'hungry: while runtime.is_running() {
            runtime.pause_point().await;

            let (first, second) =
                acquisition_order(id, config.philosophers, config.deadlock_avoidance);

            let first_resource = format!("fork-{first}");
            runtime.publish(
                &actor,
                EventType::LockWaiting,
                Some(&first_resource),
                format!("Waiting for fork {first}"),
            );

            // Single non-blocking attempt per fork per step.
            let Ok(first_guard) = Arc::clone(&forks[first]).try_lock_owned() else {
                runtime.publish(
                    &actor,
                    EventType::Execution,
                    Some(&actor),
                    format!("Could not get fork {first}, will try again"),
                );
                runtime.backoff().await;
                continue 'hungry;
            };
            runtime.publish(
                &actor,
                EventType::LockAcquired,
                Some(&first_resource),
                format!("Acquired fork {first}"),
            );

            let second_resource = format!("fork-{second}");
            runtime.publish(
                &actor,
                EventType::LockWaiting,
                Some(&second_resource),
                format!("Waiting for fork {second}"),
            );

            let Ok(second_guard) = Arc::clone(&forks[second]).try_lock_owned() else {
                runtime.publish(
                    &actor,
                    EventType::LockReleased,
                    Some(&first_resource),
                    format!("Could not get fork {second}, releasing fork {first}"),
                );
                drop(first_guard);
                runtime.backoff().await;
                continue 'hungry;
            };
            runtime.publish(
                &actor,
                EventType::LockAcquired,
                Some(&second_resource),
                format!("Acquired fork {second}"),
            );

            runtime.publish(
                &actor,
                EventType::Execution,
                Some(&actor),
                "Philosopher eating",
            );
            runtime.simulate_work(config.eating_delay).await;

            // Release in reverse order of acquisition.
            runtime.publish(
                &actor,
                EventType::LockReleased,
                Some(&second_resource),
                format!("Releasing fork {second}"),
            );
            drop(second_guard);
            runtime.publish(
                &actor,
                EventType::LockReleased,
                Some(&first_resource),
                format!("Releasing fork {first}"),
            );
            drop(first_guard);
            break 'hungry;
        }
    }
}
