//! trimem - memory orchestration CLI
//!
//! Extracts facts, episodes and graph triples from text, stores them per
//! owner, and answers queries with a ranked context card.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod engine;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `--json` output stays parseable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("trimem=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = config::Config::load()?;

    match cli.command {
        Commands::Write(args) => commands::memory::write(args, &config).await,
        Commands::Search(args) => commands::memory::search(args, &config).await,
        Commands::Forget(args) => commands::memory::forget(args, &config).await,
        Commands::Facts(args) => commands::memory::facts(args, &config).await,
        Commands::Summarize(args) => commands::memory::summarize(args, &config).await,
        Commands::Explain(args) => commands::graph::explain(args, &config).await,
        Commands::Graph(args) => commands::graph::subgraph(args, &config).await,
        Commands::Stats(args) => commands::memory::stats(args, &config).await,
        Commands::Doctor => commands::doctor::execute(&config).await,
        Commands::Version => {
            println!("trimem {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
