// SPDX-License-Identifier: GPL-3.0-only

use camrec::{RecordingMode, SourceId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camrec")]
#[command(about = "Multi-camera recording daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record from one or more cameras until Ctrl+C
    Record {
        /// Recording mode: loop, timer or motion
        #[arg(short, long, default_value = "loop")]
        mode: RecordingMode,

        /// Session limit in seconds (timer mode defaults to the camera's timer_length)
        #[arg(short, long)]
        timer: Option<u64>,

        /// Capture speed factor applied to the measured frame rate (loop and timer mode),
        /// e.g. `--mode loop --speed 8` for a time lapse
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Camera index (/dev/videoN), repeatable
        #[arg(short, long = "source", default_value = "0")]
        sources: Vec<SourceId>,

        /// Camera exposed on the preview channel
        #[arg(short, long)]
        preview: Option<SourceId>,

        /// Write the latest preview frame to this JPEG file once per second
        #[arg(long)]
        preview_file: Option<PathBuf>,

        /// Settings file (default: ~/.config/camrec/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show camera settings, creating defaults for the given cameras
    Settings {
        /// Camera index, repeatable
        #[arg(short, long = "source")]
        sources: Vec<SourceId>,

        /// Settings file (default: ~/.config/camrec/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camrec=debug, RUST_LOG=warn
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            mode,
            timer,
            speed,
            sources,
            preview,
            preview_file,
            config,
        } => cli::record(cli::RecordOptions {
            mode,
            timer,
            speed,
            sources,
            preview,
            preview_file,
            config,
        }),
        Commands::Settings { sources, config } => cli::show_settings(&sources, config),
    }
}
