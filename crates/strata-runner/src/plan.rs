//! Executable pipeline plans.
//!
//! Steps live in an ordered arena and every jump target is an index into it,
//! so loops never form reference cycles.

use serde_json::Value;
use std::collections::HashMap;
use strata_core::pipeline::{
    ControlSource, ON_ERROR_CONTINUE, PipelineSource, PipelineType, StepSource,
};
use strata_plugins::PluginKey;

/// Control directive evaluated after a step succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Goto(usize),
    /// A missing branch falls through to the next step.
    Branch {
        condition: String,
        then: Option<usize>,
        otherwise: Option<usize>,
    },
}

/// What the engine does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    #[default]
    Abort,
    Continue,
    Jump(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub name: String,
    pub plugin: PluginKey,
    pub config: Value,
    /// Context key the step result is written to.
    pub output: String,
    pub control: Option<Control>,
    pub on_error: OnError,
}

/// An immutable, parsed pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub(crate) version: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) pipeline_type: PipelineType,
    pub(crate) steps: Vec<PlanStep>,
    pub(crate) index: HashMap<String, usize>,
}

impl ExecutionPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Arena index of a step by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Convert back to the source document form.
    pub fn to_source(&self) -> PipelineSource {
        let name_at = |i: usize| self.steps[i].name.clone();
        let steps = self
            .steps
            .iter()
            .map(|step| StepSource {
                name: step.name.clone(),
                plugin: step.plugin.to_string(),
                config: step.config.clone(),
                output: (step.output != step.name).then(|| step.output.clone()),
                control: step.control.as_ref().map(|control| match control {
                    Control::Goto(target) => ControlSource {
                        goto: Some(name_at(*target)),
                        if_expr: None,
                        then: None,
                        else_target: None,
                    },
                    Control::Branch {
                        condition,
                        then,
                        otherwise,
                    } => ControlSource {
                        goto: None,
                        if_expr: Some(condition.clone()),
                        then: then.map(name_at),
                        else_target: otherwise.map(name_at),
                    },
                }),
                on_error: match step.on_error {
                    OnError::Abort => None,
                    OnError::Continue => Some(ON_ERROR_CONTINUE.to_string()),
                    OnError::Jump(target) => Some(name_at(target)),
                },
            })
            .collect();

        PipelineSource {
            version: self.version.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            pipeline_type: Some(self.pipeline_type),
            steps,
        }
    }

    /// Render the plan as YAML source text.
    pub fn to_yaml(&self) -> strata_core::Result<String> {
        serde_yaml::to_string(&self.to_source())
            .map_err(|e| strata_core::Error::Serialization(e.to_string()))
    }
}

