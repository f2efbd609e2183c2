//! Integration tests for Lockstep
//!
//! These tests exercise whole simulations end to end against the event bus
//! and verify the coordination properties each protocol is supposed to
//! demonstrate: ordering, occupancy bounds, deadlock avoidance, mutual
//! exclusion, and lifecycle idempotence.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/dining_philosophers.rs"]
mod dining_philosophers;
#[path = "integration/event_bus.rs"]
mod event_bus;
#[path = "integration/lifecycle.rs"]
mod lifecycle;
#[path = "integration/producer_consumer.rs"]
mod producer_consumer;
#[path = "integration/reader_writer.rs"]
mod reader_writer;
