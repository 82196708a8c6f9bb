// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "scenebridge")]
#[command(about = "Drive a compositing engine through the scenebridge command surface")]
#[command(version = env!("SCENEBRIDGE_VERSION"))]
struct Cli {
    /// Config file (default: <config dir>/scenebridge/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List input types and the devices behind each
    Inputs,

    /// Build a scene, play a media file and stream for a few seconds
    Demo {
        /// Media file to play (a color source is used when absent)
        #[arg(short, long)]
        media: Option<PathBuf>,

        /// Streaming duration in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,
    },

    /// Invoke one method-channel call and print its JSON result
    Call {
        /// Method name, e.g. getInputTypes
        method: String,

        /// JSON argument object
        #[arg(default_value = "{}")]
        args: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=scenebridge=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Inputs => cli::list_inputs(&config),
        Commands::Demo { media, duration } => cli::run_demo(&config, media, duration),
        Commands::Call { method, args } => cli::call(&config, &method, &args),
    }
}
