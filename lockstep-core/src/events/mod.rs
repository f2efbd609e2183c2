//! Event model and ordered event distribution.
//!
//! Simulations describe every observed state transition as an immutable
//! [`SimulationEvent`] and hand it to the [`EventBus`], which delivers events
//! to all registered listeners in strict publish order.

mod bus;
mod listeners;
mod types;

pub use bus::{BusError, EventBus, EventListener, ListenerId};
pub use listeners::{CollectingListener, TracingListener};
pub use types::{EventType, SimulationEvent};
