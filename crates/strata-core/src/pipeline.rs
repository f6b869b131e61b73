//! Pipeline source types.
//!
//! These types mirror the user-authored pipeline document (YAML or JSON).
//! They are the serialized form only; the executable plan with resolved
//! jump indices lives in the runner crate.

use crate::ids::{PipelineId, ProjectId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declared pipeline category. Exactly one per definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineType {
    Ingestion,
    Processing,
    Output,
}

impl std::fmt::Display for PipelineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineType::Ingestion => "ingestion",
            PipelineType::Processing => "processing",
            PipelineType::Output => "output",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineSource {
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional only so that a missing type can be reported precisely.
    #[serde(rename = "type", default)]
    pub pipeline_type: Option<PipelineType>,
    #[serde(default)]
    pub steps: Vec<StepSource>,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepSource {
    pub name: String,
    /// Plugin reference in `type/name` form, e.g. `http/fetch`.
    pub plugin: String,
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
    /// Context key the step result is stored under. Defaults to the step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Control directive evaluated after a step succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ControlSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub if_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub else_target: Option<String>,
}

/// Error policy keywords accepted by `on_error`. Any other value names a step.
pub const ON_ERROR_ABORT: &str = "abort";
pub const ON_ERROR_CONTINUE: &str = "continue";

/// A pipeline source as held by the pipeline store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    pub name: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
