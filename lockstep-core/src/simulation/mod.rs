//! Simulation lifecycle and the concrete coordination protocols.
//!
//! Every simulation implements the small [`Simulation`] capability trait and
//! owns a [`SimulationRuntime`] for the shared lifecycle mechanics: atomic
//! start/stop flags, cooperative pausing, speed-scaled work delays, and
//! forced cancellation with a bounded grace period.

mod dining_philosophers;
mod producer_consumer;
mod reader_writer;
mod runtime;

pub use dining_philosophers::{DiningPhilosophersSimulation, FORK_ARENA_CAPACITY};
pub use producer_consumer::ProducerConsumerSimulation;
pub use reader_writer::ReaderWriterSimulation;
pub use runtime::SimulationRuntime;

use async_trait::async_trait;

/// Errors surfaced by the simulation control surface.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Parameters are mutable only between `stop` and the next `start`.
    #[error("Cannot reconfigure '{name}' while it is running")]
    ConfigurationLocked { name: String },

    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },
}

/// Control surface shared by every simulation.
///
/// Lifecycle: created → running ⇄ paused → stopped → (running again on
/// restart). `start` on a running simulation and `stop` on a stopped one are
/// silent no-ops; `pause`/`resume` before any `start` have no observable
/// effect.
#[async_trait]
pub trait Simulation: Send + Sync {
    /// Human-readable simulation name.
    fn name(&self) -> &str;

    /// Clears bus history, builds a fresh worker pool, and spawns the
    /// protocol's workers. No-op if already running.
    async fn start(&self);

    /// Requests a cooperative pause. Workers block at their next pause-safe
    /// point, never while holding a resource.
    fn pause(&self);

    /// Lifts a pause; takes effect within one poll interval.
    fn resume(&self);

    /// Cancels all workers, waits up to the configured grace period for them
    /// to unwind, and publishes a single "stopped" event. No-op if not
    /// running.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    fn is_paused(&self) -> bool;
}
