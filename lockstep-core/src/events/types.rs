//! Immutable event values describing observed state transitions.

use serde::{Deserialize, Serialize};

/// Category of a state transition observed inside a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A worker task has been created.
    ThreadCreated,
    /// A worker task has entered its main loop.
    ThreadStarted,
    /// A worker task has exited, on any path including cancellation.
    ThreadTerminated,
    /// An actor is waiting to acquire a mutual-exclusion resource.
    LockWaiting,
    /// An actor acquired a mutual-exclusion resource.
    LockAcquired,
    /// An actor released a mutual-exclusion resource.
    LockReleased,
    /// An actor is blocked on a condition (full buffer, gated admission).
    ConditionWaiting,
    /// A condition an actor was blocked on has been signaled.
    ConditionSignaled,
    /// Plain execution progress (thinking, producing, lifecycle transitions).
    Execution,
    /// A deadlock was detected among actors.
    DeadlockDetected,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::ThreadCreated => "THREAD_CREATED",
            EventType::ThreadStarted => "THREAD_STARTED",
            EventType::ThreadTerminated => "THREAD_TERMINATED",
            EventType::LockWaiting => "LOCK_WAITING",
            EventType::LockAcquired => "LOCK_ACQUIRED",
            EventType::LockReleased => "LOCK_RELEASED",
            EventType::ConditionWaiting => "CONDITION_WAITING",
            EventType::ConditionSignaled => "CONDITION_SIGNALED",
            EventType::Execution => "EXECUTION",
            EventType::DeadlockDetected => "DEADLOCK_DETECTED",
        };
        write!(f, "{name}")
    }
}

/// One observed state transition, immutable once constructed.
///
/// Events are shared read-only between the bus history and every listener
/// that receives them. Arrival order at the bus is the only ordering signal;
/// no timestamp is embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Identifier of the actor that observed the transition.
    pub actor_id: String,
    /// Category of the transition.
    pub event_type: EventType,
    /// Resource involved, if any (fork, buffer, read-write lock).
    pub resource_id: Option<String>,
    /// Human-readable description of the transition.
    pub message: String,
}

impl SimulationEvent {
    /// Creates a new event for the given actor and transition.
    pub fn new(
        actor_id: impl Into<String>,
        event_type: EventType,
        resource_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            event_type,
            resource_id,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SimulationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.resource_id {
            Some(resource) => write!(
                f,
                "[{}] {} ({}): {}",
                self.event_type, self.actor_id, resource, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.event_type, self.actor_id, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display_includes_resource() {
        let event = SimulationEvent::new(
            "philosopher-2",
            EventType::LockAcquired,
            Some("fork-3".to_string()),
            "Acquired fork 3",
        );
        assert_eq!(
            event.to_string(),
            "[LOCK_ACQUIRED] philosopher-2 (fork-3): Acquired fork 3"
        );
    }

    #[test]
    fn test_event_display_without_resource() {
        let event = SimulationEvent::new("producer-0", EventType::Execution, None, "Producing item");
        assert_eq!(event.to_string(), "[EXECUTION] producer-0: Producing item");
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = SimulationEvent::new(
            "writer-1",
            EventType::LockWaiting,
            Some("resource".to_string()),
            "Waiting for write access",
        );
        let json = serde_json::to_string(&event).unwrap();
        let decoded: SimulationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
