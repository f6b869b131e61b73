//! Strata CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;
mod telemetry;

use commands::Commands;
use config::ServerConfig;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about = "Strata pipeline orchestration engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./strata.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;
    telemetry::init(&config.logging);

    match cli.command {
        Commands::Serve { pipelines, project } => {
            handlers::serve(&config, pipelines.as_deref(), &project).await?
        }
        Commands::Validate { path } => handlers::validate(&path)?,
        Commands::Name { path } => handlers::name(&path)?,
        Commands::Run { path, params } => handlers::run(&config, &path, &params).await?,
        Commands::Schema => handlers::schema()?,
    }

    Ok(())
}
