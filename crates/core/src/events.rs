use crate::types::{ExecutionId, StepId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A lifecycle event emitted while an execution runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl ExecutionEvent {
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId, event_type: EventType) -> Self {
        Self {
            execution_id,
            workflow_id,
            timestamp: Utc::now(),
            event_type,
        }
    }

    /// Whether this event ends its execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            EventType::ExecutionCompleted { .. }
                | EventType::ExecutionFailed { .. }
                | EventType::ExecutionCancelled { .. }
        )
    }
}

/// Types of events that can occur during an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    // Execution lifecycle events
    ExecutionStarted {
        workflow_name: String,
    },
    ExecutionCompleted {
        duration_secs: f64,
    },
    ExecutionFailed {
        error: String,
        duration_secs: f64,
    },
    ExecutionCancelled {
        reason: String,
    },

    // Step lifecycle events
    StepStarted {
        step_id: StepId,
    },
    StepCompleted {
        step_id: StepId,
        duration_secs: f64,
        next_step: Option<StepId>,
    },
    StepFailed {
        step_id: StepId,
        error: String,
    },
}

/// Fan-out channel for execution events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; dropped silently when nobody is listening
    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let execution_id = ExecutionId::new();
        bus.publish(ExecutionEvent::new(
            execution_id,
            WorkflowId::new(),
            EventType::StepStarted {
                step_id: StepId::new("upload"),
            },
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_id, execution_id);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(1);
        bus.publish(ExecutionEvent::new(
            ExecutionId::new(),
            WorkflowId::new(),
            EventType::ExecutionCancelled {
                reason: "test".to_string(),
            },
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ExecutionEvent::new(
            ExecutionId::new(),
            WorkflowId::new(),
            EventType::ExecutionCompleted { duration_secs: 1.5 },
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"]["type"], "execution_completed");
        assert!(event.is_terminal());
    }
}
