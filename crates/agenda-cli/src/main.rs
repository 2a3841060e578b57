//! agenda CLI - natural-language questions over a contact directory
//!
//! Entry point for the `agenda` binary. Each command lives in its own module
//! under [`commands`].

use agenda_core::{AgendaConfig, QueryOrchestrator};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_config(&cli)?;
    execute_command(cli.command, &config).await
}

fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if cli.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AgendaConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = AgendaConfig::load_from(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides();
            config
        },
        None => AgendaConfig::load()?,
    };

    if let Some(db) = &cli.db {
        config.database.path.clone_from(db);
    }
    if cli.no_semantic_cache {
        config.cache.semantic_enabled = false;
    }
    if let Some(budget) = cli.max_refinements {
        config.pipeline.max_refinements = budget;
    }
    Ok(config)
}

async fn execute_command(command: Commands, config: &AgendaConfig) -> Result<()> {
    match command {
        Commands::Ask { query, json } => {
            let orchestrator = QueryOrchestrator::from_config(config)?;
            commands::ask(&orchestrator, &query.join(" "), json).await?;
        },
        Commands::Chat => {
            let orchestrator = QueryOrchestrator::from_config(config)?;
            commands::chat(&orchestrator, config.pipeline.max_history).await?;
        },
        Commands::Stats { json } => {
            let orchestrator = QueryOrchestrator::for_cache_admin(config)?;
            commands::show_stats(&orchestrator, json).await?;
        },
        Commands::ClearCache { force } => {
            let orchestrator = QueryOrchestrator::for_cache_admin(config)?;
            commands::clear_cache(&orchestrator, force).await?;
        },
        Commands::Warm { file, clear, show } => {
            let orchestrator = QueryOrchestrator::from_config(config)?;
            commands::warm(&orchestrator, file.as_deref(), clear, show).await?;
        },
    }

    Ok(())
}
