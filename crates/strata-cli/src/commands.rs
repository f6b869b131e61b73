//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler and workers until interrupted
    Serve {
        /// Directory of pipeline sources to register at startup
        #[arg(long)]
        pipelines: Option<PathBuf>,

        /// Project the startup pipelines belong to
        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Parse a pipeline source and report problems
    Validate {
        /// Path to pipeline file
        path: PathBuf,
    },

    /// Print the name declared by a pipeline source
    Name {
        /// Path to pipeline file
        path: PathBuf,
    },

    /// Execute a pipeline locally and print the resulting context
    Run {
        /// Path to pipeline file
        path: PathBuf,

        /// Run parameter as key=value (value parsed as JSON when possible)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// Print the JSON Schema of the pipeline source format
    Schema,
}

pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter '{raw}' has an empty key"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
