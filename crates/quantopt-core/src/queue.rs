//! Sequential task queue.
//!
//! At most one task is active (running or paused) at a time. When the
//! active task reaches a terminal status the queue starts the next pending
//! task in insertion order, unless the queue is stopped or paused.
//!
//! Lock order is queue state, then task state. `OptimizationTask::stop`
//! re-enters the queue through the terminal hook, so it is never called
//! with the queue lock held.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{OptimizationError, Result};
use crate::events::{Event, EventBus, EventType};
use crate::models::{
    QueueAction, QueueStatus, TaskCommand, TaskConfig, TaskSnapshot, TaskStatus, TaskSummary,
};
use crate::objective::Objective;
use crate::task::OptimizationTask;

#[derive(Default)]
struct QueueState {
    order: Vec<String>,
    tasks: HashMap<String, Arc<OptimizationTask>>,
    active: Option<String>,
    is_processing: bool,
    is_paused: bool,
}

impl QueueState {
    fn status(&self) -> QueueStatus {
        QueueStatus {
            active_task_id: self.active.clone(),
            task_count: self.order.len(),
            is_processing: self.is_processing,
            is_paused: self.is_paused,
        }
    }

    fn active_task(&self) -> Option<Arc<OptimizationTask>> {
        self.active
            .as_ref()
            .and_then(|id| self.tasks.get(id))
            .cloned()
    }

    /// Start the earliest pending task and make it active.
    fn activate_next(&mut self) -> Option<String> {
        let pending: Vec<Arc<OptimizationTask>> = self
            .order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|task| task.status() == TaskStatus::Pending)
            .cloned()
            .collect();
        for task in pending {
            match task.start() {
                Ok(()) => {
                    info!(task_id = %task.id(), "Queue activated task");
                    self.active = Some(task.id().to_string());
                    return self.active.clone();
                }
                Err(err) => warn!(task_id = %task.id(), error = %err, "Skipping task"),
            }
        }
        None
    }
}

pub struct TaskQueue {
    bus: EventBus,
    state: Mutex<QueueState>,
    weak_self: Weak<TaskQueue>,
}

impl TaskQueue {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            bus,
            state: Mutex::new(QueueState::default()),
            weak_self: weak_self.clone(),
        })
    }

    /// Validate, create and enqueue a task.
    pub fn create_task(
        &self,
        config: TaskConfig,
        objective: Arc<dyn Objective>,
    ) -> Result<Arc<OptimizationTask>> {
        let task = OptimizationTask::new(config, objective, self.bus.clone())?;
        self.enqueue(Arc::clone(&task))?;
        Ok(task)
    }

    /// Append a pending task. Starts it right away if the queue is
    /// processing and idle.
    pub fn enqueue(&self, task: Arc<OptimizationTask>) -> Result<()> {
        let mut state = self.state.lock();
        if state.tasks.contains_key(task.id()) {
            return Err(OptimizationError::validation(format!(
                "task {} is already queued",
                task.id()
            )));
        }

        let queue = self.weak_self.clone();
        task.set_terminal_hook(Box::new(move |task_id, status| {
            if let Some(queue) = queue.upgrade() {
                queue.on_task_terminal(task_id, status);
            }
        }));

        let id = task.id().to_string();
        state.order.push(id.clone());
        state.tasks.insert(id.clone(), Arc::clone(&task));
        debug!(task_id = %id, position = state.order.len(), "Task enqueued");
        task.announce();

        if state.is_processing && !state.is_paused && state.active.is_none() {
            state.activate_next();
        }
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        self.state.lock().status()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, task_id: &str) -> Result<Arc<OptimizationTask>> {
        self.state
            .lock()
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| OptimizationError::TaskNotFound(task_id.to_string()))
    }

    pub fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot> {
        Ok(self.get(task_id)?.snapshot())
    }

    /// Summaries of every task in queue order.
    pub fn list(&self) -> Vec<TaskSummary> {
        let tasks: Vec<Arc<OptimizationTask>> = {
            let state = self.state.lock();
            state
                .order
                .iter()
                .filter_map(|id| state.tasks.get(id).cloned())
                .collect()
        };
        tasks.iter().map(|task| task.summary()).collect()
    }

    /// Queue-level control. Repeating an action already in effect is a no-op.
    pub fn control(&self, action: QueueAction) -> QueueStatus {
        let mut state = self.state.lock();
        let mut advance = false;
        let changed = match action {
            QueueAction::Start => {
                let changed = !state.is_processing;
                state.is_processing = true;
                if state.active.is_none() && !state.is_paused {
                    state.activate_next();
                }
                changed
            }
            QueueAction::Pause => {
                let changed = !state.is_paused;
                state.is_paused = true;
                if let Some(task) = state.active_task()
                    && task.status() == TaskStatus::Running
                    && let Err(err) = task.pause()
                {
                    warn!(task_id = %task.id(), error = %err, "Could not pause active task");
                }
                changed
            }
            QueueAction::Resume => {
                let changed = state.is_paused;
                state.is_paused = false;
                match state.active_task() {
                    Some(task) if task.status() == TaskStatus::Paused => {
                        if let Err(err) = task.resume() {
                            warn!(task_id = %task.id(), error = %err, "Could not resume active task");
                        }
                    }
                    Some(_) => {}
                    None if state.is_processing => advance = true,
                    None => {}
                }
                changed
            }
            QueueAction::Stop => {
                let changed = state.is_processing || state.is_paused || state.active.is_some();
                state.is_processing = false;
                state.is_paused = false;
                let active = state.active_task();
                let status = state.status();
                drop(state);
                if let Some(task) = active
                    && task.status().is_active()
                    && let Err(err) = task.stop()
                {
                    warn!(task_id = %task.id(), error = %err, "Could not stop active task");
                }
                if changed {
                    info!(%action, "Queue control");
                    self.bus
                        .publish(Event::queue(EventType::QueueStopped, self.status()));
                }
                return if changed { self.status() } else { status };
            }
        };

        if changed {
            info!(%action, "Queue control");
            self.bus
                .publish(Event::queue(EventType::for_queue_action(action), state.status()));
        }
        if advance {
            self.advance(&mut state);
        }
        state.status()
    }

    /// Run a command against one task.
    ///
    /// Starting is only allowed while no other task is active; the started
    /// task becomes the active one.
    pub fn control_task(&self, task_id: &str, command: TaskCommand) -> Result<TaskSummary> {
        let task = self.get(task_id)?;
        match command {
            TaskCommand::Start => {
                let mut state = self.state.lock();
                if let Some(active) = &state.active
                    && active != task_id
                {
                    return Err(OptimizationError::QueueBusy(active.clone()));
                }
                task.start()?;
                state.active = Some(task_id.to_string());
            }
            TaskCommand::Pause => task.pause()?,
            TaskCommand::Resume => task.resume()?,
            TaskCommand::Stop => task.stop()?,
        }
        Ok(task.summary())
    }

    fn on_task_terminal(&self, task_id: &str, status: TaskStatus) {
        let mut state = self.state.lock();
        if state.active.as_deref() != Some(task_id) {
            return;
        }
        state.active = None;
        debug!(task_id, %status, "Active task finished");

        if !state.is_processing || state.is_paused {
            return;
        }
        self.advance(&mut state);
    }

    /// Activate the next pending task, or stop processing and publish
    /// QUEUE_DRAINED when none is left.
    fn advance(&self, state: &mut QueueState) {
        if state.activate_next().is_none() {
            state.is_processing = false;
            info!("Queue drained");
            self.bus
                .publish(Event::queue(EventType::QueueDrained, state.status()));
        }
    }
}
