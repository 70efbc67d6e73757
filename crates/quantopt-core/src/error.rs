//! Error types for the optimization core

use thiserror::Error;

use crate::models::{TaskCommand, TaskStatus};

/// Errors surfaced to callers of the task, queue and command surface.
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: cannot {command} a {from} task")]
    InvalidTransition {
        from: TaskStatus,
        command: TaskCommand,
    },

    #[error("Evaluation failed after {attempts} attempt(s): {message}")]
    Evaluation { attempts: u32, message: String },

    #[error("Task timed out after {0} seconds")]
    TaskTimeout(f64),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Queue busy: task {0} is already active")]
    QueueBusy(String),
}

impl OptimizationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Faults local to one subscriber's consumption of the event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// The subscriber fell behind and the oldest events were dropped.
    #[error("Subscriber lagged behind, {0} event(s) dropped")]
    Lagged(u64),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, OptimizationError>;
