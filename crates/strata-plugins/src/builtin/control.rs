//! Control-flow primitives.
//!
//! Jumps requested here are resolved against step names by the engine at
//! run time.

use crate::{Plugin, PluginCall, PluginOutput, config_error, require_str};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use strata_core::Result;
use strata_core::interpolation::Resolver;

/// Longest delay `control/sleep` accepts.
pub const MAX_SLEEP_MS: u64 = 3_600_000;

fn evaluate(plugin: &dyn Plugin, call: &PluginCall<'_>) -> Result<bool> {
    match call.config.get("condition") {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(expr)) => Resolver::new(call.context, call.params)
            .evaluate_condition(expr)
            .map_err(|e| config_error(plugin, e.to_string())),
        _ => Err(config_error(plugin, "'condition' must be a string or boolean")),
    }
}

fn require_condition(plugin: &dyn Plugin, config: &Value) -> Result<()> {
    match config.get("condition") {
        Some(Value::Bool(_) | Value::String(_)) => Ok(()),
        _ => Err(config_error(plugin, "'condition' must be a string or boolean")),
    }
}

/// `control/condition`: stores the boolean result of `config.condition`.
pub struct ConditionPlugin;

#[async_trait]
impl Plugin for ConditionPlugin {
    fn plugin_type(&self) -> &str {
        "control"
    }

    fn name(&self) -> &str {
        "condition"
    }

    fn raw_config_fields(&self) -> &[&str] {
        &["condition"]
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_condition(self, config)
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        evaluate(self, &call).map(|b| PluginOutput::value(Value::Bool(b)))
    }
}

/// `control/goto`: jumps to `config.target`.
pub struct GotoPlugin;

#[async_trait]
impl Plugin for GotoPlugin {
    fn plugin_type(&self) -> &str {
        "control"
    }

    fn name(&self) -> &str {
        "goto"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_str(self, config, "target").map(|_| ())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let target = require_str(self, call.config, "target")?;
        Ok(PluginOutput::jump_to(json!({ "target": target }), target))
    }
}

/// `control/branch`: jumps to `config.then` or `config.else`.
///
/// A missing branch falls through to the next step.
pub struct BranchPlugin;

#[async_trait]
impl Plugin for BranchPlugin {
    fn plugin_type(&self) -> &str {
        "control"
    }

    fn name(&self) -> &str {
        "branch"
    }

    fn raw_config_fields(&self) -> &[&str] {
        &["condition"]
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_condition(self, config)?;
        for field in ["then", "else"] {
            if config.get(field).is_some_and(|v| !v.is_string()) {
                return Err(config_error(self, format!("'{field}' must be a step name")));
            }
        }
        if config.get("then").is_none() && config.get("else").is_none() {
            return Err(config_error(self, "one of 'then' or 'else' is required"));
        }
        Ok(())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let taken = evaluate(self, &call)?;
        let field = if taken { "then" } else { "else" };
        let value = json!({ "condition": taken });
        Ok(match call.config.get(field).and_then(Value::as_str) {
            Some(target) => PluginOutput::jump_to(value, target),
            None => PluginOutput::value(value),
        })
    }
}

/// `control/counter`: adds `step` (default 1) to a numeric context entry.
///
/// The entry is read from `config.key`, falling back to the step's own
/// output key, and starts at `config.start` (default 0) when absent.
pub struct CounterPlugin;

#[async_trait]
impl Plugin for CounterPlugin {
    fn plugin_type(&self) -> &str {
        "control"
    }

    fn name(&self) -> &str {
        "counter"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        for field in ["start", "step"] {
            if config.get(field).is_some_and(|v| !v.is_i64()) {
                return Err(config_error(self, format!("'{field}' must be an integer")));
            }
        }
        if config.get("key").is_some_and(|v| !v.is_string()) {
            return Err(config_error(self, "'key' must be a string"));
        }
        Ok(())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let key = call
            .config
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or(call.output_key);
        let start = call.config.get("start").and_then(Value::as_i64).unwrap_or(0);
        let step = call.config.get("step").and_then(Value::as_i64).unwrap_or(1);

        let current = match call.context.get(key) {
            None => start,
            Some(v) => v.as_i64().ok_or_else(|| {
                strata_core::Error::PluginFailed(format!("context entry '{key}' is not an integer"))
            })?,
        };
        Ok(PluginOutput::value(json!(current.saturating_add(step))))
    }
}

/// `control/sleep`: waits `config.ms` milliseconds.
pub struct SleepPlugin;

#[async_trait]
impl Plugin for SleepPlugin {
    fn plugin_type(&self) -> &str {
        "control"
    }

    fn name(&self) -> &str {
        "sleep"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        match config.get("ms").and_then(Value::as_u64) {
            Some(ms) if ms <= MAX_SLEEP_MS => Ok(()),
            Some(_) => Err(config_error(self, format!("'ms' exceeds {MAX_SLEEP_MS}"))),
            None => Err(config_error(self, "missing non-negative integer field 'ms'")),
        }
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let ms = call.config.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(PluginOutput::value(json!({ "slept_ms": ms })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::run;
    use strata_core::ContextWindow;

    #[tokio::test]
    async fn test_condition_reads_context() {
        let mut ctx = ContextWindow::default();
        ctx.insert("count", json!(3)).unwrap();

        let out = run(&ConditionPlugin, json!({"condition": "${{ count }} >= 3"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.value, json!(true));
        assert!(out.jump.is_none());
    }

    #[tokio::test]
    async fn test_goto_requests_jump() {
        let ctx = ContextWindow::default();
        let out = run(&GotoPlugin, json!({"target": "start"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.jump.as_deref(), Some("start"));
    }

    #[tokio::test]
    async fn test_branch_picks_target() {
        let mut ctx = ContextWindow::default();
        ctx.insert("mode", json!("full")).unwrap();

        let cfg = json!({"condition": "${{ mode }} == full", "then": "load", "else": "skip"});
        let out = run(&BranchPlugin, cfg, &ctx).await.unwrap();
        assert_eq!(out.jump.as_deref(), Some("load"));

        let cfg = json!({"condition": "${{ mode }} == delta", "then": "load"});
        let out = run(&BranchPlugin, cfg, &ctx).await.unwrap();
        assert_eq!(out.jump, None);
        assert_eq!(out.value, json!({"condition": false}));

        assert!(BranchPlugin.validate_config(&json!({"condition": true})).is_err());
    }

    #[tokio::test]
    async fn test_counter_increments_own_entry() {
        let mut ctx = ContextWindow::default();
        let out = run(&CounterPlugin, json!({}), &ctx).await.unwrap();
        assert_eq!(out.value, json!(1));

        ctx.insert("out", out.value).unwrap();
        let out = run(&CounterPlugin, json!({"step": 5}), &ctx).await.unwrap();
        assert_eq!(out.value, json!(6));

        ctx.insert("name", json!("x")).unwrap();
        assert!(run(&CounterPlugin, json!({"key": "name"}), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_sleep_waits() {
        let ctx = ContextWindow::default();
        let before = tokio::time::Instant::now();
        run(&SleepPlugin, json!({"ms": 20}), &ctx).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(20));

        assert!(SleepPlugin.validate_config(&json!({"ms": -1})).is_err());
    }
}
