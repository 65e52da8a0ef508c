//! stobot CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;
mod commands;
mod config;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so flag env fallbacks can see it.
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            eprintln!("warning: failed to load .env: {error}");
        }
    }

    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    init_logging(log_level)?;

    match cli.command {
        None => commands::run::execute(cli.bot).await,
        Some(Commands::PopulateDb(args)) => commands::populate::execute(args).await,
        Some(Commands::ImportChannels(args)) => commands::import_channels::execute(args).await,
        Some(Commands::ListChannels(args)) => commands::list_channels::execute(args).await,
        Some(Commands::MarkAllPosted(args)) => commands::mark_posted::execute(args).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
