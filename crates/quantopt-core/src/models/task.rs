//! Task status machine and serialisable task views.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::TaskConfig;
use super::parameter::Parameters;
use crate::error::{OptimizationError, Result};

/// Lifecycle status of an optimization task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    /// Completed, failed and stopped tasks never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Paused)
    }

    /// Status reached by applying a user command, if the command is allowed.
    pub fn apply(self, command: TaskCommand) -> Result<TaskStatus> {
        let next = match (self, command) {
            (TaskStatus::Pending, TaskCommand::Start) => TaskStatus::Running,
            (TaskStatus::Running, TaskCommand::Pause) => TaskStatus::Paused,
            (TaskStatus::Paused, TaskCommand::Resume) => TaskStatus::Running,
            (TaskStatus::Running | TaskStatus::Paused, TaskCommand::Stop) => TaskStatus::Stopped,
            (from, command) => {
                return Err(OptimizationError::InvalidTransition { from, command });
            }
        };
        Ok(next)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// User command on a single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskCommand {
    Start,
    Pause,
    Resume,
    Stop,
}

impl TaskCommand {
    pub const ALL: [TaskCommand; 4] = [
        TaskCommand::Start,
        TaskCommand::Pause,
        TaskCommand::Resume,
        TaskCommand::Stop,
    ];
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskCommand::Start => "start",
            TaskCommand::Pause => "pause",
            TaskCommand::Resume => "resume",
            TaskCommand::Stop => "stop",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskCommand {
    type Err = OptimizationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(TaskCommand::Start),
            "pause" => Ok(TaskCommand::Pause),
            "resume" => Ok(TaskCommand::Resume),
            "stop" => Ok(TaskCommand::Stop),
            other => Err(OptimizationError::validation(format!(
                "unknown task action '{other}'"
            ))),
        }
    }
}

/// One successful evaluation in a task's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEntry {
    /// Zero-based, contiguous across pause/resume.
    pub iteration: usize,
    pub evaluated_value: f64,
    pub best_value_so_far: f64,
    pub parameters: Parameters,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskErrorKind {
    /// An evaluation kept failing after all retries.
    Evaluation,
    /// The task ran past `timeout_seconds`.
    Timeout,
    /// The optimizer could not propose candidates.
    Optimizer,
}

/// Error recorded on a failed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Full point-in-time copy of a task, trace included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub config: TaskConfig,
    pub trace: Vec<TraceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_parameters: Option<Parameters>,
    pub evaluations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    /// Final result, available once the task has completed.
    pub fn result(&self) -> Option<TaskResult> {
        if self.status != TaskStatus::Completed {
            return None;
        }
        let best_value = self.best_value?;
        let best_parameters = self.best_parameters.clone()?;
        let optimization_time_seconds = match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
        Some(TaskResult {
            best_value,
            best_parameters,
            total_evaluations: self.evaluations,
            optimization_time_seconds,
        })
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            name: self.name.clone(),
            status: self.status,
            config: self.config.clone(),
            best_value: self.best_value,
            best_parameters: self.best_parameters.clone(),
            evaluations: self.evaluations,
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Task view without the trace, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub config: TaskConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_parameters: Option<Parameters>,
    pub evaluations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub best_value: f64,
    pub best_parameters: Parameters,
    pub total_evaluations: usize,
    pub optimization_time_seconds: f64,
}
