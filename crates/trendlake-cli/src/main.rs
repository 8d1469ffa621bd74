//! Trendlake CLI - entry point for the `trendlake` binary.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trendlake_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let context = cli.context()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Status(args) => trendlake_cli::commands::status::execute(&args, &context).await,
            Commands::Backfill(args) => {
                trendlake_cli::commands::backfill::execute(&args, &context).await
            }
            Commands::DropPartitions(args) => {
                trendlake_cli::commands::drop_partitions::execute(&args, &context).await
            }
        }
    })
}
