use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Parameters, QueueAction, QueueStatus, TaskError, TaskStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskCreated,
    TaskStarted,
    TaskPaused,
    TaskResumed,
    TaskCompleted,
    TaskFailed,
    TaskStopped,
    IterationCompleted,
    NewBestFound,
    QueueStarted,
    QueuePaused,
    QueueResumed,
    QueueStopped,
    QueueDrained,
    Error,
}

impl EventType {
    /// Lifecycle event for a status change.
    pub fn for_transition(from: Option<TaskStatus>, to: TaskStatus) -> Self {
        match to {
            TaskStatus::Pending => EventType::TaskCreated,
            TaskStatus::Running if from == Some(TaskStatus::Paused) => EventType::TaskResumed,
            TaskStatus::Running => EventType::TaskStarted,
            TaskStatus::Paused => EventType::TaskPaused,
            TaskStatus::Completed => EventType::TaskCompleted,
            TaskStatus::Failed => EventType::TaskFailed,
            TaskStatus::Stopped => EventType::TaskStopped,
        }
    }

    pub fn for_queue_action(action: QueueAction) -> Self {
        match action {
            QueueAction::Start => EventType::QueueStarted,
            QueueAction::Pause => EventType::QueuePaused,
            QueueAction::Resume => EventType::QueueResumed,
            QueueAction::Stop => EventType::QueueStopped,
        }
    }

    pub fn is_task_lifecycle(self) -> bool {
        matches!(
            self,
            EventType::TaskCreated
                | EventType::TaskStarted
                | EventType::TaskPaused
                | EventType::TaskResumed
                | EventType::TaskCompleted
                | EventType::TaskFailed
                | EventType::TaskStopped
        )
    }
}

/// Event-specific data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EventPayload {
    Iteration {
        iteration: usize,
        evaluated_value: f64,
        best_value: f64,
        parameters: Parameters,
    },
    NewBest {
        iteration: usize,
        best_value: f64,
        best_parameters: Parameters,
    },
    StatusChanged {
        from_status: Option<TaskStatus>,
        to_status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<TaskError>,
    },
    Queue(QueueStatus),
    Error {
        message: String,
    },
}

/// A record published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, task_id: Option<String>, payload: EventPayload) -> Self {
        Self {
            event_type,
            task_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn status_changed(
        task_id: impl Into<String>,
        from: Option<TaskStatus>,
        to: TaskStatus,
        error: Option<TaskError>,
    ) -> Self {
        Self::new(
            EventType::for_transition(from, to),
            Some(task_id.into()),
            EventPayload::StatusChanged {
                from_status: from,
                to_status: to,
                error,
            },
        )
    }

    pub fn iteration(
        task_id: impl Into<String>,
        iteration: usize,
        evaluated_value: f64,
        best_value: f64,
        parameters: Parameters,
    ) -> Self {
        Self::new(
            EventType::IterationCompleted,
            Some(task_id.into()),
            EventPayload::Iteration {
                iteration,
                evaluated_value,
                best_value,
                parameters,
            },
        )
    }

    pub fn new_best(
        task_id: impl Into<String>,
        iteration: usize,
        best_value: f64,
        best_parameters: Parameters,
    ) -> Self {
        Self::new(
            EventType::NewBestFound,
            Some(task_id.into()),
            EventPayload::NewBest {
                iteration,
                best_value,
                best_parameters,
            },
        )
    }

    pub fn queue(event_type: EventType, status: QueueStatus) -> Self {
        Self::new(event_type, None, EventPayload::Queue(status))
    }

    pub fn error(task_id: Option<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventType::Error,
            task_id,
            EventPayload::Error {
                message: message.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_is_distinguished_from_start() {
        assert_eq!(
            EventType::for_transition(Some(TaskStatus::Pending), TaskStatus::Running),
            EventType::TaskStarted
        );
        assert_eq!(
            EventType::for_transition(Some(TaskStatus::Paused), TaskStatus::Running),
            EventType::TaskResumed
        );
    }

    #[test]
    fn test_event_wire_shape() {
        let event = Event::status_changed(
            "task-1",
            Some(TaskStatus::Running),
            TaskStatus::Paused,
            None,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "TASK_PAUSED");
        assert_eq!(json["task_id"], "task-1");
        assert_eq!(json["payload"]["from_status"], "running");
        assert_eq!(json["payload"]["to_status"], "paused");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_queue_event_has_no_task_id() {
        let event = Event::queue(EventType::QueueDrained, QueueStatus::default());
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("task_id").is_none());
        assert_eq!(json["payload"]["is_processing"], false);
    }

    #[test]
    fn test_iteration_payload_round_trips_untagged() {
        let event = Event::iteration("t", 3, 1.5, 0.5, Parameters::new());
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
