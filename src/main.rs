//! fxrender CLI - Offline Audio Effect Renderer
//!
//! Command-line interface for the fxrender engine.

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fxrender::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    debug!("fxrender v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli.command).await?;
    Ok(())
}
