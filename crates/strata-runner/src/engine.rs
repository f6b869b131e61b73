//! Step interpreter.
//!
//! A run moves from idle through `Running(index)` to completed or failed.
//! Steps execute strictly one at a time against a context window owned by
//! the run, so no locking happens inside a run.

use crate::error::ExecutionError;
use crate::plan::{Control, ExecutionPlan, OnError, PlanStep};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_core::interpolation::{Resolver, TemplateError};
use strata_core::{ContextLimits, ContextWindow, Error};
use strata_plugins::{PluginCall, PluginOutput, PluginRegistry};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Iteration ceiling: total steps executed per run, jumps included.
    pub max_steps: usize,
    pub run_timeout: Option<Duration>,
    pub context_limits: ContextLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            run_timeout: None,
            context_limits: ContextLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_context_limits(mut self, limits: ContextLimits) -> Self {
        self.context_limits = limits;
        self
    }
}

/// Consulted at every step boundary. Running steps are never preempted.
#[async_trait]
pub trait CancelProbe: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// Probe for runs nobody can cancel.
pub struct NeverCancel;

#[async_trait]
impl CancelProbe for NeverCancel {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

/// A completed run.
#[derive(Debug)]
pub struct RunReport {
    pub context: ContextWindow,
    pub steps_executed: usize,
}

/// A failed run, with the context accumulated before the failing step.
#[derive(Debug)]
pub struct RunFailure {
    pub context: ContextWindow,
    pub error: ExecutionError,
    pub steps_executed: usize,
}

pub type RunOutcome = std::result::Result<RunReport, RunFailure>;

/// Interprets execution plans against the plugin registry.
pub struct ExecutionEngine {
    registry: Arc<PluginRegistry>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<PluginRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a plan that cannot be cancelled.
    pub async fn execute(&self, plan: &ExecutionPlan, params: &HashMap<String, Value>) -> RunOutcome {
        self.run(plan, params, &NeverCancel).await
    }

    /// Run a plan from its first step.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        params: &HashMap<String, Value>,
        cancel: &dyn CancelProbe,
    ) -> RunOutcome {
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);
        let mut context = ContextWindow::new(self.config.context_limits);
        let mut executed = 0;
        let mut index = 0;

        info!(pipeline = %plan.name(), steps = plan.len(), "Starting pipeline run");

        while let Some(step) = plan.step(index) {
            let next = self
                .advance(plan, step, index, &mut context, params, cancel, deadline, &mut executed)
                .await;
            match next {
                Ok(next) => index = next,
                Err(error) => {
                    error!(
                        pipeline = %plan.name(),
                        step = %error.step(),
                        index = error.index(),
                        error = %error,
                        "Pipeline run failed"
                    );
                    return Err(RunFailure {
                        context,
                        error,
                        steps_executed: executed,
                    });
                }
            }
        }

        info!(
            pipeline = %plan.name(),
            steps_executed = executed,
            context_keys = context.len(),
            "Pipeline run completed"
        );
        Ok(RunReport {
            context,
            steps_executed: executed,
        })
    }

    /// Execute the step at `index` and return the index of the next one.
    #[allow(clippy::too_many_arguments)]
    async fn advance(
        &self,
        plan: &ExecutionPlan,
        step: &PlanStep,
        index: usize,
        context: &mut ContextWindow,
        params: &HashMap<String, Value>,
        cancel: &dyn CancelProbe,
        deadline: Option<Instant>,
        executed: &mut usize,
    ) -> Result<usize, ExecutionError> {
        if cancel.is_cancelled().await {
            return Err(ExecutionError::Cancelled {
                step: step.name.clone(),
                index,
            });
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ExecutionError::TimedOut {
                step: step.name.clone(),
                index,
            });
        }
        if *executed >= self.config.max_steps {
            return Err(ExecutionError::BoundedLoopExceeded {
                step: step.name.clone(),
                index,
                limit: self.config.max_steps,
            });
        }
        *executed += 1;

        debug!(step = %step.name, index, plugin = %step.plugin, "Executing step");

        match self.execute_step(step, index, context, params, deadline).await {
            Ok(output) => {
                store(step, index, context, output.value)?;
                match output.jump {
                    Some(target) => plan.index_of(&target).ok_or_else(|| {
                        ExecutionError::JumpTargetUnknown {
                            step: step.name.clone(),
                            index,
                            target,
                        }
                    }),
                    None => follow_control(step, index, context, params),
                }
            }
            Err(err) if err.is_recoverable() && step.on_error != OnError::Abort => {
                warn!(step = %step.name, index, error = %err, "Step failed, continuing per on_error");
                store(step, index, context, json!({ "error": err.cause() }))?;
                Ok(match step.on_error {
                    OnError::Jump(target) => target,
                    _ => index + 1,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        index: usize,
        context: &ContextWindow,
        params: &HashMap<String, Value>,
        deadline: Option<Instant>,
    ) -> Result<PluginOutput, ExecutionError> {
        let config_invalid = |reason: String| ExecutionError::ConfigInvalid {
            step: step.name.clone(),
            index,
            reason,
        };

        let plugin = self
            .registry
            .get(&step.plugin)
            .ok_or_else(|| ExecutionError::PluginNotFound {
                step: step.name.clone(),
                index,
                plugin: step.plugin.to_string(),
            })?;

        let config = resolve_config(
            &Resolver::new(context, params),
            &step.config,
            plugin.raw_config_fields(),
        )
        .map_err(|e| config_invalid(e.to_string()))?;
        plugin
            .validate_config(&config)
            .map_err(|e| config_invalid(config_reason(e)))?;

        let call = PluginCall {
            step_name: &step.name,
            output_key: &step.output,
            config: &config,
            context,
            params,
        };
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, plugin.execute(call))
                .await
                .map_err(|_| ExecutionError::TimedOut {
                    step: step.name.clone(),
                    index,
                })?,
            None => plugin.execute(call).await,
        };

        result.map_err(|e| match e {
            Error::ConfigInvalid { reason, .. } => config_invalid(reason),
            other => ExecutionError::StepFailed {
                step: step.name.clone(),
                index,
                cause: other.to_string(),
            },
        })
    }
}

fn resolve_config(
    resolver: &Resolver<'_>,
    config: &Value,
    raw_fields: &[&str],
) -> Result<Value, TemplateError> {
    let Value::Object(map) = config else {
        return resolver.resolve_value(config);
    };
    let mut resolved = serde_json::Map::with_capacity(map.len());
    for (k, v) in map {
        let v = if raw_fields.contains(&k.as_str()) {
            v.clone()
        } else {
            resolver.resolve_value(v)?
        };
        resolved.insert(k.clone(), v);
    }
    Ok(Value::Object(resolved))
}

fn config_reason(err: Error) -> String {
    match err {
        Error::ConfigInvalid { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn store(
    step: &PlanStep,
    index: usize,
    context: &mut ContextWindow,
    value: Value,
) -> Result<(), ExecutionError> {
    context
        .insert(step.output.as_str(), value)
        .map(|_| ())
        .map_err(|e| ExecutionError::ContextLimit {
            step: step.name.clone(),
            index,
            reason: e.to_string(),
        })
}

fn follow_control(
    step: &PlanStep,
    index: usize,
    context: &ContextWindow,
    params: &HashMap<String, Value>,
) -> Result<usize, ExecutionError> {
    match &step.control {
        None => Ok(index + 1),
        Some(Control::Goto(target)) => Ok(*target),
        Some(Control::Branch {
            condition,
            then,
            otherwise,
        }) => {
            let taken = Resolver::new(context, params)
                .evaluate_condition(condition)
                .map_err(|e| ExecutionError::ConfigInvalid {
                    step: step.name.clone(),
                    index,
                    reason: format!("control condition: {e}"),
                })?;
            debug!(step = %step.name, index, taken, "Evaluated control condition");
            let target = if taken { then } else { otherwise };
            Ok(target.unwrap_or(index + 1))
        }
    }
}
