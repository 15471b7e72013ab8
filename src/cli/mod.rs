//! CLI Module
//!
//! Command-line interface for fxrender.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;

/// fxrender - offline audio effect renderer
#[derive(Parser, Debug)]
#[command(name = "fxrender")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply an effect to a WAV file
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Effect id (see `effects`)
        effect: String,

        /// Parameter override, `key=value`; repeatable
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Impulse response path or URL
        #[arg(long)]
        ir: Option<String>,

        /// Output file (default `<stem>_<EFFECT>.wav` next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the render report as JSON
        #[arg(long)]
        report: bool,
    },

    /// List the effect catalog
    #[command(name = "effects")]
    Effects {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Print WAV header fields
    #[command(name = "info")]
    Info {
        /// WAV file
        path: PathBuf,
    },
}

/// Dispatch a parsed command
pub async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Render {
            input,
            effect,
            set,
            config,
            ir,
            output,
            report,
        } => {
            let args = commands::RenderArgs {
                input,
                effect,
                overrides: set,
                config,
                impulse_response: ir,
                output,
                print_report: report,
            };
            commands::render(args).await
        }
        Commands::Effects { json } => commands::list_effects(json),
        Commands::Info { path } => commands::show_info(&path),
    }
}
