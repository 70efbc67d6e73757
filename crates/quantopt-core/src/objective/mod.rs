//! Objective functions and the boundary through which they are evaluated.

mod builtin;
mod command;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

pub use builtin::{Ackley, QubitPulse, Rastrigin, Rosenbrock, Sphere};
pub use command::CommandObjective;

use crate::error::{OptimizationError, Result};
use crate::models::Parameters;

/// A scalar function to minimise.
#[async_trait]
pub trait Objective: Send + Sync {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64>;

    /// Exact parameter names this objective expects, if it is picky.
    fn parameter_names(&self) -> Option<Vec<String>> {
        None
    }
}

type ObjectiveFn = dyn Fn(&Parameters) -> anyhow::Result<f64> + Send + Sync;

/// Objective backed by a plain closure, run on the blocking pool.
pub struct FnObjective {
    func: Arc<ObjectiveFn>,
    names: Option<Vec<String>>,
}

impl FnObjective {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Parameters) -> f64 + Send + Sync + 'static,
    {
        Self::fallible(move |params| Ok(func(params)))
    }

    pub fn fallible<F>(func: F) -> Self
    where
        F: Fn(&Parameters) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            names: None,
        }
    }

    pub fn with_parameter_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl Objective for FnObjective {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        let func = Arc::clone(&self.func);
        let params = params.clone();
        tokio::task::spawn_blocking(move || func(&params))
            .await
            .map_err(|e| anyhow!("objective task aborted: {e}"))?
    }

    fn parameter_names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }
}

/// Evaluate once, turning panics, timeouts and non-finite scores into errors.
pub async fn evaluate_guarded(
    objective: &dyn Objective,
    params: &Parameters,
    timeout: Option<Duration>,
) -> anyhow::Result<f64> {
    let call = AssertUnwindSafe(objective.evaluate(params)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| anyhow!("evaluation timed out after {:.3}s", limit.as_secs_f64()))?,
        None => call.await,
    };
    let value = match outcome {
        Ok(result) => result?,
        Err(panic) => bail!("objective panicked: {}", panic_message(panic.as_ref())),
    };
    if !value.is_finite() {
        bail!("objective returned non-finite value {value}");
    }
    Ok(value)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How a client names the objective of a new task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectiveSpec {
    Builtin {
        name: String,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Named objectives available to remote clients.
pub struct ObjectiveRegistry {
    builtins: BTreeMap<String, Arc<dyn Objective>>,
    allow_command: bool,
}

impl ObjectiveRegistry {
    pub fn new(allow_command: bool) -> Self {
        let mut builtins: BTreeMap<String, Arc<dyn Objective>> = BTreeMap::new();
        builtins.insert("sphere".into(), Arc::new(Sphere));
        builtins.insert("rosenbrock".into(), Arc::new(Rosenbrock));
        builtins.insert("rastrigin".into(), Arc::new(Rastrigin));
        builtins.insert("ackley".into(), Arc::new(Ackley));
        builtins.insert("qubit_pulse".into(), Arc::new(QubitPulse::default()));
        Self {
            builtins,
            allow_command,
        }
    }

    /// Add or replace a named objective.
    pub fn register(&mut self, name: impl Into<String>, objective: Arc<dyn Objective>) {
        self.builtins.insert(name.into(), objective);
    }

    pub fn names(&self) -> Vec<String> {
        self.builtins.keys().cloned().collect()
    }

    pub fn allows_command(&self) -> bool {
        self.allow_command
    }

    pub fn resolve(&self, spec: &ObjectiveSpec) -> Result<Arc<dyn Objective>> {
        match spec {
            ObjectiveSpec::Builtin { name } => self.builtins.get(name).cloned().ok_or_else(|| {
                OptimizationError::validation(format!(
                    "unknown objective '{name}', expected one of: {}",
                    self.names().join(", ")
                ))
            }),
            ObjectiveSpec::Command { program, args } => {
                if !self.allow_command {
                    return Err(OptimizationError::validation(
                        "command objectives are disabled on this server",
                    ));
                }
                if program.trim().is_empty() {
                    return Err(OptimizationError::validation(
                        "command objective requires a program",
                    ));
                }
                Ok(Arc::new(CommandObjective::new(program.clone(), args.clone())))
            }
        }
    }
}

impl Default for ObjectiveRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}
