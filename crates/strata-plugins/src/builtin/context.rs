//! Context window primitives.
//!
//! Steps may only write their own output key, so these plugins read from the
//! window and return the value to be stored.

use crate::{Plugin, PluginCall, PluginOutput, config_error, require_object, require_str};
use async_trait::async_trait;
use serde_json::Value;
use strata_core::Result;
use strata_core::interpolation::Resolver;

/// `context/set`: stores `config.value`.
pub struct ContextSetPlugin;

#[async_trait]
impl Plugin for ContextSetPlugin {
    fn plugin_type(&self) -> &str {
        "context"
    }

    fn name(&self) -> &str {
        "set"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_object(self, config)?;
        if config.get("value").is_none() {
            return Err(config_error(self, "missing field 'value'"));
        }
        Ok(())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        Ok(PluginOutput::value(
            call.config.get("value").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// `context/get`: copies the value at `config.path`, or `config.default`.
pub struct ContextGetPlugin;

#[async_trait]
impl Plugin for ContextGetPlugin {
    fn plugin_type(&self) -> &str {
        "context"
    }

    fn name(&self) -> &str {
        "get"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_object(self, config)?;
        require_str(self, config, "path").map(|_| ())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let path = require_str(self, call.config, "path")?;
        let found = Resolver::new(call.context, call.params)
            .lookup(path)
            .map_err(|e| config_error(self, e.to_string()))?;

        match found.or_else(|| call.config.get("default").cloned()) {
            Some(value) => Ok(PluginOutput::value(value)),
            None => Err(strata_core::Error::PluginFailed(format!(
                "context path '{path}' is not set and no default was given"
            ))),
        }
    }
}

/// `context/merge`: shallow-merges `config.objects`, later objects winning.
pub struct ContextMergePlugin;

#[async_trait]
impl Plugin for ContextMergePlugin {
    fn plugin_type(&self) -> &str {
        "context"
    }

    fn name(&self) -> &str {
        "merge"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        let objects = config
            .get("objects")
            .and_then(Value::as_array)
            .ok_or_else(|| config_error(self, "missing array field 'objects'"))?;
        if objects.iter().any(|o| !o.is_object()) {
            return Err(config_error(self, "every entry of 'objects' must be an object"));
        }
        Ok(())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let mut merged = serde_json::Map::new();
        for object in call
            .config
            .get("objects")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
        {
            for (k, v) in object {
                merged.insert(k.clone(), v.clone());
            }
        }
        Ok(PluginOutput::value(Value::Object(merged)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::run;
    use serde_json::json;
    use strata_core::{ContextWindow, Error};

    #[tokio::test]
    async fn test_set_requires_value() {
        let ctx = ContextWindow::default();
        assert!(matches!(
            run(&ContextSetPlugin, json!({}), &ctx).await,
            Err(Error::ConfigInvalid { .. })
        ));
        let out = run(&ContextSetPlugin, json!({"value": [1, 2]}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.value, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_get_reads_path_or_default() {
        let mut ctx = ContextWindow::default();
        ctx.insert("user", json!({"name": "ada"})).unwrap();

        let out = run(&ContextGetPlugin, json!({"path": "user.name"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.value, json!("ada"));

        let out = run(
            &ContextGetPlugin,
            json!({"path": "user.age", "default": 0}),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(out.value, json!(0));

        assert!(matches!(
            run(&ContextGetPlugin, json!({"path": "nobody"}), &ctx).await,
            Err(Error::PluginFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_later_objects_win() {
        let ctx = ContextWindow::default();
        let out = run(
            &ContextMergePlugin,
            json!({"objects": [{"a": 1, "b": 1}, {"b": 2}]}),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(out.value, json!({"a": 1, "b": 2}));

        assert!(
            run(&ContextMergePlugin, json!({"objects": [1]}), &ctx)
                .await
                .is_err()
        );
    }
}
