//! Worker configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum tasks running at once in this process.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Delay between claim attempts while the queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Run-level timeout applied to every pipeline run.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Directory result files are written under.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_max_workers() -> u32 {
    4
}

fn default_poll_interval() -> u64 {
    500
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./results")
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            poll_interval_ms: default_poll_interval(),
            run_timeout_secs: None,
            results_dir: default_results_dir(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn with_max_workers(mut self, max_workers: u32) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
