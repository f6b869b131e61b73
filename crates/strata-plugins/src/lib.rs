//! Plugin contract and registry for Strata pipelines.
//!
//! Every pipeline step dispatches into a [`Plugin`] looked up by its
//! `(type, name)` key. Builtin plugins and user-supplied plugins implement
//! the same trait and are registered explicitly at process start.

pub mod builtin;
pub mod registry;

pub use registry::PluginRegistry;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use strata_core::{ContextWindow, Error, Result};

/// Registry key of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub plugin_type: String,
    pub name: String,
}

impl PluginKey {
    pub fn new(plugin_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            name: name.into(),
        }
    }

    /// Parse a plugin reference (e.g., "http/fetch").
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((t, n)) if !t.trim().is_empty() && !n.trim().is_empty() && !n.contains('/') => {
                Ok(Self::new(t.trim(), n.trim()))
            }
            _ => Err(Error::Parse(format!(
                "invalid plugin reference '{s}', expected 'type/name'"
            ))),
        }
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_type, self.name)
    }
}

/// Everything a plugin sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct PluginCall<'a> {
    pub step_name: &'a str,
    /// Context key the result will be stored under.
    pub output_key: &'a str,
    /// Step config with templates already resolved.
    pub config: &'a Value,
    /// Read-only view of the run's context window.
    pub context: &'a ContextWindow,
    pub params: &'a HashMap<String, Value>,
}

/// Result of a plugin execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginOutput {
    /// Stored under the step's output key.
    pub value: Value,
    /// Step name to continue at instead of the next step.
    pub jump: Option<String>,
}

impl PluginOutput {
    pub fn value(value: Value) -> Self {
        Self { value, jump: None }
    }

    pub fn jump_to(value: Value, target: impl Into<String>) -> Self {
        Self {
            value,
            jump: Some(target.into()),
        }
    }
}

/// The capability set every plugin implements.
///
/// Execution is treated as a side-effecting black box: it may do network
/// I/O, sleep, or return different output on every call.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin type, the first half of the registry key.
    fn plugin_type(&self) -> &str;

    /// Plugin name, the second half of the registry key.
    fn name(&self) -> &str;

    fn key(&self) -> PluginKey {
        PluginKey::new(self.plugin_type(), self.name())
    }

    /// Top-level config fields the engine passes through without
    /// template resolution.
    fn raw_config_fields(&self) -> &[&str] {
        &[]
    }

    /// Reject a config before execution. Errors should be `ConfigInvalid`.
    fn validate_config(&self, config: &Value) -> Result<()>;

    /// Execute the plugin.
    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput>;
}

/// Build a `ConfigInvalid` error for a plugin.
pub fn config_error(plugin: &dyn Plugin, reason: impl Into<String>) -> Error {
    Error::ConfigInvalid {
        plugin: plugin.key().to_string(),
        reason: reason.into(),
    }
}

/// Fetch a required string field from a config object.
pub fn require_str<'c>(plugin: &dyn Plugin, config: &'c Value, field: &str) -> Result<&'c str> {
    config
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| config_error(plugin, format!("missing string field '{field}'")))
}

/// Reject anything but a JSON object.
pub fn require_object(plugin: &dyn Plugin, config: &Value) -> Result<()> {
    if config.is_object() {
        Ok(())
    } else {
        Err(config_error(plugin, "config must be an object"))
    }
}
