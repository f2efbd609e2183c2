//! Synchronization primitives backing the simulations.
//!
//! Both primitives keep their internal mutex strictly outside await points:
//! state is inspected under a short-lived `parking_lot` lock and blocking is
//! done on a `tokio::sync::Notify`, so worker tasks stay cancellable at every
//! suspension point and cancellation unwinds through guard destructors.

mod bounded_buffer;
mod rw_lock;

pub use bounded_buffer::BoundedBuffer;
pub use rw_lock::{PolicyRwLock, ReadGuard, WriteGuard};
