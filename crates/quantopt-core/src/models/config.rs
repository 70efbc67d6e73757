//! Task configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::parameter::{ParameterSpace, ParameterSpec};
use crate::error::{OptimizationError, Result};

/// Optimizer strategy, selected once at task creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    #[serde(alias = "OnePlusOne")]
    OnePlusOne,
    #[serde(alias = "CMA", alias = "cma_es")]
    Cma,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerConfig {
    #[serde(default, alias = "optimizer_type", alias = "algorithm_id")]
    pub algorithm: Algorithm,
    /// Total number of objective evaluations.
    #[serde(default = "default_budget", alias = "evaluation_budget")]
    pub budget: usize,
    /// Maximum evaluations in flight at once.
    #[serde(default = "default_num_workers", alias = "worker_count")]
    pub num_workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_budget() -> usize {
    100
}

fn default_num_workers() -> usize {
    1
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            budget: default_budget(),
            num_workers: default_num_workers(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Retries per evaluation after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wall-clock limit for the whole task, measured from the first start.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Per-evaluation limit. Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_timeout_seconds: Option<f64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> f64 {
    3600.0
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            evaluation_timeout_seconds: None,
        }
    }
}

/// Everything needed to build a task, apart from its objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub name: String,
    pub parameter_config: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub optimizer_config: OptimizerConfig,
    #[serde(default)]
    pub execution_config: ExecutionConfig,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_config: BTreeMap::new(),
            optimizer_config: OptimizerConfig::default(),
            execution_config: ExecutionConfig::default(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameter_config.insert(name.into(), spec);
        self
    }

    pub fn with_optimizer(mut self, optimizer_config: OptimizerConfig) -> Self {
        self.optimizer_config = optimizer_config;
        self
    }

    pub fn with_execution(mut self, execution_config: ExecutionConfig) -> Self {
        self.execution_config = execution_config;
        self
    }

    /// Validate the configuration and build its search space.
    pub fn validate(&self) -> Result<ParameterSpace> {
        if self.name.trim().is_empty() {
            return Err(OptimizationError::validation("task name must not be empty"));
        }
        let optimizer = &self.optimizer_config;
        if optimizer.budget == 0 {
            return Err(OptimizationError::validation("budget must be at least 1"));
        }
        if optimizer.num_workers == 0 {
            return Err(OptimizationError::validation("num_workers must be at least 1"));
        }
        let execution = &self.execution_config;
        if !(execution.timeout_seconds.is_finite() && execution.timeout_seconds > 0.0) {
            return Err(OptimizationError::validation(
                "timeout_seconds must be a positive number",
            ));
        }
        if let Some(limit) = execution.evaluation_timeout_seconds
            && !(limit.is_finite() && limit > 0.0)
        {
            return Err(OptimizationError::validation(
                "evaluation_timeout_seconds must be a positive number",
            ));
        }
        ParameterSpace::new(&self.parameter_config)
    }
}
