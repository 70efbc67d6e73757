//! A single optimization run and its lifecycle.
//!
//! Status changes made by commands take effect immediately; the evaluation
//! loop (see `runner`) observes them at its next iteration boundary.

mod runner;

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{OptimizationError, Result};
use crate::events::{Event, EventBus};
use crate::models::{
    ParameterSpace, Parameters, TaskCommand, TaskConfig, TaskError, TaskSnapshot, TaskStatus,
    TaskSummary, TraceEntry,
};
use crate::objective::Objective;
use crate::optimizer;

type TerminalHook = Box<dyn Fn(&str, TaskStatus) + Send + Sync>;

struct TaskState {
    status: TaskStatus,
    trace: Vec<TraceEntry>,
    best_value: Option<f64>,
    best_parameters: Option<Parameters>,
    error: Option<TaskError>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

pub struct OptimizationTask {
    id: String,
    config: TaskConfig,
    space: ParameterSpace,
    objective: Arc<dyn Objective>,
    bus: EventBus,
    state: Mutex<TaskState>,
    status_tx: watch::Sender<TaskStatus>,
    on_terminal: OnceLock<TerminalHook>,
}

impl OptimizationTask {
    /// Validate `config` against `objective` and create a pending task.
    pub fn new(
        config: TaskConfig,
        objective: Arc<dyn Objective>,
        bus: EventBus,
    ) -> Result<Arc<Self>> {
        let space = config.validate()?;
        if let Some(expected) = objective.parameter_names() {
            let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
            let configured: BTreeSet<&str> = space.names().iter().map(String::as_str).collect();
            if expected != configured {
                return Err(OptimizationError::validation(format!(
                    "parameter names {configured:?} do not match objective signature {expected:?}"
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        let (status_tx, _) = watch::channel(TaskStatus::Pending);
        let task = Arc::new(Self {
            id,
            config,
            space,
            objective,
            bus,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                trace: Vec::new(),
                best_value: None,
                best_parameters: None,
                error: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            }),
            status_tx,
            on_terminal: OnceLock::new(),
        });

        info!(task_id = %task.id, name = %task.config.name, "Task created");
        Ok(task)
    }

    /// Publish TASK_CREATED. Called once the task is visible to readers.
    pub(crate) fn announce(&self) {
        self.bus
            .publish(Event::status_changed(&self.id, None, TaskStatus::Pending, None));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn evaluations(&self) -> usize {
        self.state.lock().trace.len()
    }

    pub fn best_value(&self) -> Option<f64> {
        self.state.lock().best_value
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.state.lock().trace.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        TaskSnapshot {
            task_id: self.id.clone(),
            name: self.config.name.clone(),
            status: state.status,
            config: self.config.clone(),
            trace: state.trace.clone(),
            best_value: state.best_value,
            best_parameters: state.best_parameters.clone(),
            evaluations: state.trace.len(),
            error: state.error.clone(),
            created_at: state.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    pub fn summary(&self) -> TaskSummary {
        let state = self.state.lock();
        TaskSummary {
            task_id: self.id.clone(),
            name: self.config.name.clone(),
            status: state.status,
            config: self.config.clone(),
            best_value: state.best_value,
            best_parameters: state.best_parameters.clone(),
            evaluations: state.trace.len(),
            error: state.error.clone(),
            created_at: state.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Watch channel carrying every status change.
    pub fn watch_status(&self) -> watch::Receiver<TaskStatus> {
        self.status_tx.subscribe()
    }

    /// Resolve once the task is completed, failed or stopped.
    pub async fn wait(&self) -> TaskSnapshot {
        let mut status = self.status_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once terminal.
        let _ = status.wait_for(|s| s.is_terminal()).await;
        self.snapshot()
    }

    /// Register the callback run after the task reaches a terminal status.
    /// Only the first registration takes effect.
    pub(crate) fn set_terminal_hook(&self, hook: TerminalHook) {
        let _ = self.on_terminal.set(hook);
    }

    pub fn control(self: &Arc<Self>, command: TaskCommand) -> Result<()> {
        match command {
            TaskCommand::Start => self.start(),
            TaskCommand::Pause => self.pause(),
            TaskCommand::Resume => self.resume(),
            TaskCommand::Stop => self.stop(),
        }
    }

    /// Move to running and spawn the evaluation loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            let next = state.status.apply(TaskCommand::Start)?;
            state.started_at = Some(Utc::now());
            self.set_status(&mut state, next, None);
        }
        let optimizer = optimizer::build(&self.config.optimizer_config, &self.space);
        tokio::spawn(runner::run(Arc::clone(self), optimizer));
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.command(TaskCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.command(TaskCommand::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.command(TaskCommand::Stop)
    }

    fn command(&self, command: TaskCommand) -> Result<()> {
        let next = {
            let mut state = self.state.lock();
            let next = state.status.apply(command)?;
            self.set_status(&mut state, next, None);
            next
        };
        if next.is_terminal() {
            self.run_terminal_hook(next);
        }
        Ok(())
    }

    /// Internal transition to completed. No-op if already terminal.
    fn complete(&self) -> bool {
        self.finish(TaskStatus::Completed, None)
    }

    /// Internal transition to failed. No-op if already terminal.
    fn fail(&self, error: TaskError) -> bool {
        self.finish(TaskStatus::Failed, Some(error))
    }

    fn finish(&self, to: TaskStatus, error: Option<TaskError>) -> bool {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            self.set_status(&mut state, to, error);
        }
        self.run_terminal_hook(to);
        true
    }

    /// Apply a status change. Events are published while the state lock is
    /// held so that each subscriber sees this task's events in order.
    fn set_status(&self, state: &mut TaskState, to: TaskStatus, error: Option<TaskError>) {
        let from = state.status;
        state.status = to;
        if to.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        if let Some(error) = &error {
            error!(task_id = %self.id, kind = ?error.kind, "Task failed: {}", error.message);
            self.bus
                .publish(Event::error(Some(self.id.clone()), error.message.clone()));
        } else {
            info!(task_id = %self.id, %from, %to, "Task status changed");
        }
        state.error = error.clone();
        self.status_tx.send_replace(to);
        self.bus
            .publish(Event::status_changed(&self.id, Some(from), to, error));
    }

    fn run_terminal_hook(&self, status: TaskStatus) {
        if let Some(hook) = self.on_terminal.get() {
            hook(&self.id, status);
        }
    }

    /// Append a successful evaluation. Returns false once the task is
    /// terminal, in which case the result is discarded.
    fn record(&self, parameters: Parameters, value: f64) -> bool {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        let iteration = state.trace.len();
        let improved = state.best_value.is_none_or(|best| value < best);
        if improved {
            state.best_value = Some(value);
            state.best_parameters = Some(parameters.clone());
        }
        let best_value = state.best_value.unwrap_or(value);
        state.trace.push(TraceEntry {
            iteration,
            evaluated_value: value,
            best_value_so_far: best_value,
            parameters: parameters.clone(),
            timestamp: Utc::now(),
        });
        debug!(task_id = %self.id, iteration, value, best_value, "Iteration completed");

        self.bus.publish(Event::iteration(
            &self.id,
            iteration,
            value,
            best_value,
            parameters.clone(),
        ));
        if improved {
            self.bus
                .publish(Event::new_best(&self.id, iteration, value, parameters));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParameterSpec;
    use crate::objective::{FnObjective, QubitPulse};

    fn square() -> Arc<dyn Objective> {
        Arc::new(FnObjective::new(|p| p["x"] * p["x"]))
    }

    fn config() -> TaskConfig {
        TaskConfig::new("unit").with_parameter("x", ParameterSpec::linear(-5.0, 5.0))
    }

    #[tokio::test]
    async fn test_new_task_is_pending_until_announced() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let task = OptimizationTask::new(config(), square(), bus).unwrap();

        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(events.try_recv().is_none());

        task.announce();
        let event = events.recv().await.unwrap().unwrap();
        assert_eq!(event.task_id.as_deref(), Some(task.id()));
        assert_eq!(event.event_type, crate::events::EventType::TaskCreated);
    }

    #[tokio::test]
    async fn test_signature_mismatch_is_rejected() {
        let result = OptimizationTask::new(
            config(),
            Arc::new(QubitPulse::default()),
            EventBus::default(),
        );
        assert!(matches!(result, Err(OptimizationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invalid_command_leaves_state_unchanged() {
        let task = OptimizationTask::new(config(), square(), EventBus::default()).unwrap();
        assert!(matches!(
            task.pause(),
            Err(OptimizationError::InvalidTransition { .. })
        ));
        assert!(task.resume().is_err());
        assert!(task.stop().is_err());
        assert_eq!(task.status(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_record_tracks_incumbent() {
        let task = OptimizationTask::new(config(), square(), EventBus::default()).unwrap();
        for value in [3.0, 1.0, 2.0, 1.0, 0.5] {
            let params = Parameters::from([("x".to_string(), value)]);
            assert!(task.record(params, value));
        }
        let snapshot = task.snapshot();
        assert_eq!(snapshot.best_value, Some(0.5));
        let best: Vec<f64> = snapshot.trace.iter().map(|t| t.best_value_so_far).collect();
        assert_eq!(best, vec![3.0, 1.0, 1.0, 1.0, 0.5]);
        let iterations: Vec<usize> = snapshot.trace.iter().map(|t| t.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_terminal_task_discards_results() {
        let task = OptimizationTask::new(config(), square(), EventBus::default()).unwrap();
        assert!(task.fail(TaskError::new(
            crate::models::TaskErrorKind::Optimizer,
            "no candidates"
        )));
        assert!(!task.record(Parameters::new(), 1.0));
        assert!(!task.complete());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.snapshot().error.is_some());
    }
}
