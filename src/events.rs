use crate::coordinator::CoordinatorStatus;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Transitions published by the coordinator lifecycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Classified status changed
    StatusChanged {
        from: CoordinatorStatus,
        to: CoordinatorStatus,
        timestamp: SystemTime,
    },
    /// A wake request is being sent
    WakeRequested { timestamp: SystemTime },
    /// The control plane accepted the wake and the coordinator is starting
    WakeAccepted { estimated_ready_seconds: u64 },
    /// The wake request failed
    WakeFailed { error: String },
    /// Coordinator is online and its application reports ready
    CoordinatorReady { timestamp: SystemTime },
    /// The poll ceiling passed without the coordinator becoming ready
    PollTimedOut { waited_seconds: u64 },
    /// A status probe failed
    ProbeFailed { error: String },
    /// Polling was cancelled without reaching a result
    PollingStopped,
}

impl LifecycleEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::StatusChanged { from, to, .. } => {
                format!("Coordinator status {} -> {}", from, to)
            }
            LifecycleEvent::WakeRequested { .. } => "Wake requested".to_string(),
            LifecycleEvent::WakeAccepted {
                estimated_ready_seconds,
            } => format!(
                "Coordinator starting, ready in about {} seconds",
                estimated_ready_seconds
            ),
            LifecycleEvent::WakeFailed { error } => format!("Wake failed: {}", error),
            LifecycleEvent::CoordinatorReady { .. } => "Coordinator ready".to_string(),
            LifecycleEvent::PollTimedOut { waited_seconds } => {
                format!("Coordinator not ready after {} seconds", waited_seconds)
            }
            LifecycleEvent::ProbeFailed { error } => format!("Status probe failed: {}", error),
            LifecycleEvent::PollingStopped => "Polling stopped".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::StatusChanged { .. } => "status_changed",
            LifecycleEvent::WakeRequested { .. } => "wake_requested",
            LifecycleEvent::WakeAccepted { .. } => "wake_accepted",
            LifecycleEvent::WakeFailed { .. } => "wake_failed",
            LifecycleEvent::CoordinatorReady { .. } => "coordinator_ready",
            LifecycleEvent::PollTimedOut { .. } => "poll_timed_out",
            LifecycleEvent::ProbeFailed { .. } => "probe_failed",
            LifecycleEvent::PollingStopped => "polling_stopped",
        }
    }

    /// Whether this event ends a wake attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::CoordinatorReady { .. }
                | LifecycleEvent::PollTimedOut { .. }
                | LifecycleEvent::WakeFailed { .. }
                | LifecycleEvent::PollingStopped
        )
    }
}

/// Broadcast bus for lifecycle events
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it.
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        match &event {
            LifecycleEvent::StatusChanged { from, to, .. } => {
                info!("Coordinator status changed: {} -> {}", from, to);
            }
            LifecycleEvent::CoordinatorReady { .. } => info!("Coordinator ready"),
            LifecycleEvent::WakeFailed { error } => warn!("Wake failed: {}", error),
            LifecycleEvent::PollTimedOut { waited_seconds } => {
                warn!("Coordinator not ready after {} seconds", waited_seconds);
            }
            LifecycleEvent::ProbeFailed { error } => warn!("Status probe failed: {}", error),
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(LifecycleEvent::PollingStopped), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(LifecycleEvent::WakeAccepted {
            estimated_ready_seconds: 75,
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "wake_accepted");
        assert_eq!(
            event.description(),
            "Coordinator starting, ready in about 75 seconds"
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_events() {
        assert!(LifecycleEvent::PollTimedOut { waited_seconds: 120 }.is_terminal());
        assert!(LifecycleEvent::WakeFailed {
            error: "boom".to_string()
        }
        .is_terminal());
        assert!(!LifecycleEvent::ProbeFailed {
            error: "boom".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(LifecycleEvent::ProbeFailed {
            error: "Bad Gateway".to_string(),
        })
        .unwrap();

        assert_eq!(json["type"], "probe_failed");
        assert_eq!(json["error"], "Bad Gateway");
    }
}
