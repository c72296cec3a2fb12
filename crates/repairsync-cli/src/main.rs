//! repairsync CLI - operator tool for the sync engine's local caches
//!
//! Inspect and clear cached collections, replay a remote fixture through the
//! engine, and manage the settings file.

mod cli;
mod commands;
mod error;
mod settings;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::cache::run_cache;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::replay::run_replay;
use crate::error::CliError;
use crate::settings::{resolve_cache_dir, resolve_config_path, Context};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "repairsync=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = Context::load(
        resolve_config_path(cli.config),
        resolve_cache_dir(cli.cache_dir),
        cli.scope.as_deref(),
    )?;

    match cli.command {
        Commands::Cache { command } => run_cache(command, &context)?,
        Commands::Replay {
            fixture,
            kind,
            json,
            follow,
        } => run_replay(&fixture, kind.as_deref(), json, follow, &context).await?,
        Commands::Config { command } => run_config(command, &context)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
