//! JSON parsing primitive.

use crate::{Plugin, PluginCall, PluginOutput, config_error};
use async_trait::async_trait;
use serde_json::Value;
use strata_core::{Error, Result};

/// `json/parse`: parses `config.input`. Non-string input is passed through.
pub struct JsonParsePlugin;

#[async_trait]
impl Plugin for JsonParsePlugin {
    fn plugin_type(&self) -> &str {
        "json"
    }

    fn name(&self) -> &str {
        "parse"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        match config.get("input") {
            Some(_) => Ok(()),
            None => Err(config_error(self, "missing field 'input'")),
        }
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        match call.config.get("input") {
            Some(Value::String(text)) => serde_json::from_str(text)
                .map(PluginOutput::value)
                .map_err(|e| Error::PluginFailed(format!("invalid JSON input: {e}"))),
            Some(other) => Ok(PluginOutput::value(other.clone())),
            None => Err(config_error(self, "missing field 'input'")),
        }
    }
}
