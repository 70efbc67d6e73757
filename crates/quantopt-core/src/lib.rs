pub mod error;
pub mod events;
pub mod models;
pub mod objective;
pub mod optimizer;
pub mod queue;
pub mod task;

pub use error::{OptimizationError, Result, SubscriberError};
pub use events::{Event, EventBus, EventPayload, EventType, Subscription};
pub use models::*;
pub use objective::{FnObjective, Objective, ObjectiveRegistry, ObjectiveSpec};
pub use queue::TaskQueue;
pub use task::OptimizationTask;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Settings for one [`AppCore`] instance.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub event_buffer_capacity: usize,
    pub allow_command_objectives: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            event_buffer_capacity: events::DEFAULT_BUFFER_CAPACITY,
            allow_command_objectives: false,
        }
    }
}

/// Task creation request as received from remote clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(flatten)]
    pub config: TaskConfig,
    pub objective: ObjectiveSpec,
}

/// Core application state shared by the server
///
/// Owns the process-wide event bus, the task queue and the objectives
/// remote clients may refer to by name.
pub struct AppCore {
    pub bus: EventBus,
    pub queue: Arc<TaskQueue>,
    pub objectives: ObjectiveRegistry,
}

impl AppCore {
    pub fn new(config: CoreConfig) -> Self {
        let bus = EventBus::new(config.event_buffer_capacity);
        let queue = TaskQueue::new(bus.clone());
        let objectives = ObjectiveRegistry::new(config.allow_command_objectives);

        info!(
            buffer = config.event_buffer_capacity,
            command_objectives = config.allow_command_objectives,
            "Initializing QuantOpt core"
        );

        Self {
            bus,
            queue,
            objectives,
        }
    }

    /// Resolve the objective, validate and enqueue.
    pub fn create_task(&self, request: CreateTaskRequest) -> Result<Arc<OptimizationTask>> {
        let objective = self.objectives.resolve(&request.objective)?;
        self.queue.create_task(request.config, objective)
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }
}

impl Default for AppCore {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
