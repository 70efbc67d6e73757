//! Data model for optimization tasks.

mod config;
mod parameter;
mod queue;
mod task;

pub use config::{Algorithm, ExecutionConfig, OptimizerConfig, TaskConfig};
pub use parameter::{ParameterSpace, ParameterSpec, Parameters, Scale};
pub use queue::{QueueAction, QueueStatus};
pub use task::{
    TaskCommand, TaskError, TaskErrorKind, TaskResult, TaskSnapshot, TaskStatus, TaskSummary,
    TraceEntry,
};
