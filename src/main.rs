mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => commands::version::run(),
        Commands::Check => commands::check::run().await?,
        Commands::Registry => commands::registry::run(),
        Commands::Reconcile { concurrency, metrics_addr } => {
            commands::reconcile::run(concurrency, &metrics_addr).await?
        }
        Commands::Evaluate { cluster, addon } => commands::evaluate::run(&cluster, &addon).await?,
    }

    Ok(())
}
