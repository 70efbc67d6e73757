use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub active_task_id: Option<String>,
    pub task_count: usize,
    pub is_processing: bool,
    pub is_paused: bool,
}

/// Queue-level control action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueAction::Start => "start",
            QueueAction::Pause => "pause",
            QueueAction::Resume => "resume",
            QueueAction::Stop => "stop",
        };
        write!(f, "{s}")
    }
}

impl FromStr for QueueAction {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(QueueAction::Start),
            "pause" => Ok(QueueAction::Pause),
            "resume" => Ok(QueueAction::Resume),
            "stop" => Ok(QueueAction::Stop),
            other => Err(OptimizationError::validation(format!(
                "unknown queue action '{other}'"
            ))),
        }
    }
}
