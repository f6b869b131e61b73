//! Builtin plugins.

pub mod context;
pub mod control;
pub mod http;
pub mod json;

pub use context::{ContextGetPlugin, ContextMergePlugin, ContextSetPlugin};
pub use control::{BranchPlugin, ConditionPlugin, CounterPlugin, GotoPlugin, SleepPlugin};
pub use http::{HttpFetchPlugin, HttpPluginConfig};
pub use json::JsonParsePlugin;

use crate::{Plugin, PluginRegistry};
use std::sync::Arc;
use strata_core::Result;

/// Register every builtin plugin.
pub fn register_all(registry: &PluginRegistry, http: HttpPluginConfig) -> Result<()> {
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(ContextSetPlugin),
        Arc::new(ContextGetPlugin),
        Arc::new(ContextMergePlugin),
        Arc::new(JsonParsePlugin),
        Arc::new(HttpFetchPlugin::new(http)?),
        Arc::new(ConditionPlugin),
        Arc::new(GotoPlugin),
        Arc::new(BranchPlugin),
        Arc::new(CounterPlugin),
        Arc::new(SleepPlugin),
    ];
    for plugin in plugins {
        registry.register(plugin);
    }
    Ok(())
}
