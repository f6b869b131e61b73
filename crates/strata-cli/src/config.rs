//! Server configuration: defaults, then `strata.yaml`, then `STRATA__*` env vars.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_core::ContextLimits;
use strata_plugins::builtin::HttpPluginConfig;
use strata_runner::EngineConfig;
use strata_scheduler::SchedulerConfig;
use strata_worker::WorkerConfig;

const ENV_PREFIX: &str = "STRATA";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub plugins: PluginsSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Without a `url` the server keeps everything in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Longest the coordination loop sleeps without re-checking triggers.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

fn default_max_idle_secs() -> u64 {
    60
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_context_max_entries")]
    pub context_max_entries: usize,
    #[serde(default = "default_context_max_bytes")]
    pub context_max_bytes: usize,
}

fn default_max_steps() -> usize {
    10_000
}

fn default_context_max_entries() -> usize {
    ContextLimits::default().max_entries
}

fn default_context_max_bytes() -> usize {
    ContextLimits::default().max_bytes
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            context_max_entries: default_context_max_entries(),
            context_max_bytes: default_context_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsSection {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl ServerConfig {
    /// Load layered configuration. An explicit `path` must exist; the default
    /// `strata.yaml` is optional. A `.env` file is read first when present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);
        Self::load_from(path, env)
    }

    fn load_from(path: Option<&Path>, env: config::Environment) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("strata").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::default()
            .with_max_steps(self.engine.max_steps)
            .with_context_limits(ContextLimits {
                max_entries: self.engine.context_max_entries,
                max_bytes: self.engine.context_max_bytes,
            });
        match self.worker.run_timeout() {
            Some(timeout) => config.with_run_timeout(timeout),
            None => config,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default().with_max_idle(Duration::from_secs(self.scheduler.max_idle_secs))
    }

    pub fn http_config(&self) -> HttpPluginConfig {
        HttpPluginConfig {
            timeout: Duration::from_secs(self.plugins.http_timeout_secs),
            ..HttpPluginConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn test_defaults_and_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nothing.yaml");
        assert!(ServerConfig::load_from(Some(&missing), env(&[])).is_err());

        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.database.url.is_none());
        assert_eq!(config.engine.max_steps, 10_000);
        assert_eq!(config.engine.context_max_entries, 1024);
        assert_eq!(config.scheduler.max_idle_secs, 60);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "engine:\n  max_steps: 50\nworker:\n  max_workers: 2\n  run_timeout_secs: 9\nlogging:\n  json: true"
        )
        .unwrap();

        let config = ServerConfig::load_from(
            Some(file.path()),
            env(&[
                ("STRATA__ENGINE__MAX_STEPS", "75"),
                ("STRATA__DATABASE__URL", "postgres://localhost/strata"),
            ]),
        )
        .unwrap();

        assert_eq!(config.engine.max_steps, 75);
        assert_eq!(config.worker.max_workers, 2);
        assert!(config.logging.json);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/strata"));

        let engine = config.engine_config();
        assert_eq!(engine.max_steps, 75);
        assert_eq!(engine.run_timeout, Some(Duration::from_secs(9)));
    }
}
