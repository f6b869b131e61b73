//! Plugin registry keyed by `(type, name)`.

use crate::builtin::{self, HttpPluginConfig};
use crate::{Plugin, PluginKey};
use dashmap::DashMap;
use std::sync::Arc;
use strata_core::Result;
use tracing::{debug, warn};

/// Explicit registration map from plugin key to handler.
///
/// Populated at process start; lookups happen once per executed step.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<PluginKey, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            plugins: DashMap::new(),
        }
    }

    /// Create a registry holding every builtin plugin.
    pub fn with_builtins(http: HttpPluginConfig) -> Result<Self> {
        let registry = Self::new();
        builtin::register_all(&registry, http)?;
        Ok(registry)
    }

    /// Register a plugin, replacing any plugin with the same key.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        let key = plugin.key();
        debug!(plugin = %key, "Registering plugin");
        let previous = self.plugins.insert(key.clone(), plugin);
        if previous.is_some() {
            warn!(plugin = %key, "Replaced previously registered plugin");
        }
        previous
    }

    /// Remove a plugin.
    pub fn unregister(&self, key: &PluginKey) -> Option<Arc<dyn Plugin>> {
        self.plugins.remove(key).map(|(_, p)| p)
    }

    /// Look up a plugin.
    pub fn get(&self, key: &PluginKey) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(key).map(|p| Arc::clone(p.value()))
    }

    pub fn contains(&self, key: &PluginKey) -> bool {
        self.plugins.contains_key(key)
    }

    /// Sorted list of registered keys.
    pub fn keys(&self) -> Vec<PluginKey> {
        let mut keys: Vec<_> = self.plugins.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PluginCall, PluginOutput};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use strata_core::Result;

    struct Fixed(&'static str, Value);

    #[async_trait]
    impl Plugin for Fixed {
        fn plugin_type(&self) -> &str {
            "custom"
        }

        fn name(&self) -> &str {
            self.0
        }

        fn validate_config(&self, _config: &Value) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _call: PluginCall<'_>) -> Result<PluginOutput> {
            Ok(PluginOutput::value(self.1.clone()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = PluginRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(Fixed("one", json!(1))));
        let key = PluginKey::new("custom", "one");
        assert!(registry.contains(&key));
        assert!(registry.get(&PluginKey::new("custom", "two")).is_none());
        assert_eq!(registry.get(&key).unwrap().name(), "one");
    }

    #[test]
    fn test_register_replaces_same_key() {
        let registry = PluginRegistry::new();
        assert!(registry.register(Arc::new(Fixed("one", json!(1)))).is_none());
        assert!(registry.register(Arc::new(Fixed("one", json!(2)))).is_some());
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&PluginKey::new("custom", "one")).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = PluginRegistry::with_builtins(HttpPluginConfig::default()).unwrap();
        for key in [
            "context/set",
            "context/get",
            "context/merge",
            "json/parse",
            "http/fetch",
            "control/condition",
            "control/goto",
            "control/branch",
            "control/counter",
            "control/sleep",
        ] {
            assert!(
                registry.contains(&PluginKey::parse(key).unwrap()),
                "missing builtin {key}"
            );
        }
    }
}
