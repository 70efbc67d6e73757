//! The evaluation loop driving one task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::OptimizationTask;
use crate::error::OptimizationError;
use crate::models::{Parameters, TaskError, TaskErrorKind, TaskStatus};
use crate::objective::{Objective, evaluate_guarded};
use crate::optimizer::{Candidate, Optimizer};

/// Fallback deadline when `timeout_seconds` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

enum BatchOutcome {
    Completed,
    Stopped,
    Failed(OptimizationError),
}

type Evaluated = (Candidate, Parameters, Result<f64, OptimizationError>);

pub(super) async fn run(task: Arc<OptimizationTask>, mut optimizer: Box<dyn Optimizer>) {
    let execution = &task.config.execution_config;
    let timeout = Duration::try_from_secs_f64(execution.timeout_seconds).unwrap_or(FAR_FUTURE);
    let started = Instant::now();
    let deadline = started
        .checked_add(timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let budget = task.config.optimizer_config.budget;
    let workers = task.config.optimizer_config.num_workers;
    let mut status_rx = task.watch_status();

    debug!(task_id = %task.id, budget, workers, "Evaluation loop started");

    loop {
        let status = *status_rx.borrow_and_update();
        if status.is_terminal() {
            break;
        }
        if Instant::now() >= deadline {
            task.fail(TaskError::new(
                TaskErrorKind::Timeout,
                OptimizationError::TaskTimeout(execution.timeout_seconds).to_string(),
            ));
            break;
        }
        if status == TaskStatus::Paused {
            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
            continue;
        }

        let remaining = budget.saturating_sub(task.evaluations());
        if remaining == 0 {
            task.complete();
            break;
        }

        let batch = optimizer.propose(workers.min(remaining));
        if batch.is_empty() {
            task.fail(TaskError::new(
                TaskErrorKind::Optimizer,
                "optimizer proposed no candidates",
            ));
            break;
        }

        match run_batch(&task, optimizer.as_mut(), batch, &mut status_rx).await {
            BatchOutcome::Completed => {}
            BatchOutcome::Stopped => break,
            BatchOutcome::Failed(err) => {
                task.fail(TaskError::new(TaskErrorKind::Evaluation, err.to_string()));
                break;
            }
        }
    }

    debug!(task_id = %task.id, "Evaluation loop finished");
}

/// Evaluate one batch concurrently and wait for all of it.
///
/// A failed evaluation does not cancel its siblings: their scores are still
/// recorded before the failure is returned. On stop, the remaining
/// evaluations are left to finish on their own and their results dropped.
async fn run_batch(
    task: &Arc<OptimizationTask>,
    optimizer: &mut dyn Optimizer,
    batch: Vec<Candidate>,
    status_rx: &mut watch::Receiver<TaskStatus>,
) -> BatchOutcome {
    let execution = &task.config.execution_config;
    let eval_timeout = execution
        .evaluation_timeout_seconds
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    let mut in_flight: JoinSet<Evaluated> = JoinSet::new();
    for candidate in batch {
        let parameters = task.space.decode(&candidate.point);
        let objective = Arc::clone(&task.objective);
        let task_id = task.id.clone();
        let max_retries = execution.max_retries;
        in_flight.spawn(async move {
            let result =
                evaluate_with_retries(&task_id, objective, &parameters, max_retries, eval_timeout)
                    .await;
            (candidate, parameters, result)
        });
    }

    let mut failure: Option<OptimizationError> = None;
    loop {
        tokio::select! {
            joined = in_flight.join_next() => match joined {
                None => break,
                Some(Ok((candidate, parameters, Ok(value)))) => {
                    if !task.record(parameters, value) {
                        in_flight.detach_all();
                        return BatchOutcome::Stopped;
                    }
                    optimizer.tell(&candidate, value);
                }
                Some(Ok((_, _, Err(err)))) => {
                    failure.get_or_insert(err);
                }
                Some(Err(join_error)) => {
                    failure.get_or_insert(OptimizationError::Evaluation {
                        attempts: 1,
                        message: join_error.to_string(),
                    });
                }
            },
            changed = status_rx.changed() => {
                let terminal = changed.is_err() || status_rx.borrow_and_update().is_terminal();
                if terminal {
                    in_flight.detach_all();
                    return BatchOutcome::Stopped;
                }
            }
        }
    }

    match failure {
        Some(err) => BatchOutcome::Failed(err),
        None => BatchOutcome::Completed,
    }
}

async fn evaluate_with_retries(
    task_id: &str,
    objective: Arc<dyn Objective>,
    parameters: &Parameters,
    max_retries: u32,
    timeout: Option<Duration>,
) -> Result<f64, OptimizationError> {
    let attempts = max_retries.saturating_add(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match evaluate_guarded(objective.as_ref(), parameters, timeout).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(task_id, attempt, max_attempts = attempts, error = %err, "Evaluation failed");
                last_error = format!("{err:#}");
            }
        }
    }
    Err(OptimizationError::Evaluation {
        attempts,
        message: last_error,
    })
}
