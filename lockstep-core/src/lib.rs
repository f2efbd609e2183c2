//! Lockstep Core - Concurrency simulation engine
//!
//! This crate provides live, observable simulations of classic concurrency
//! coordination patterns: a shared lifecycle for concurrent worker pools,
//! concrete simulations of the bounded-buffer producer/consumer, dining
//! philosophers, and reader-writer problems, and an ordered event bus that
//! serializes observations of concurrent state changes for downstream
//! consumers such as visualizers and log views.

pub mod config;
pub mod events;
pub mod simulation;
pub mod sync;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::LockstepConfig;
pub use events::{BusError, EventBus, EventListener, EventType, SimulationEvent};
pub use simulation::{Simulation, SimulationError};

/// Core errors that can bubble up from any Lockstep subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LockstepError {
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

pub type Result<T> = std::result::Result<T, LockstepError>;
