// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "overlay-recorder")]
#[command(about = "Record a camera overlay with microphone audio to MP4")]
#[command(version)]
struct Cli {
    /// Log at info level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture devices and available encoders
    List,

    /// Record the overlay
    Record {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file path (default: ~/Videos/overlay-recorder/recording_TIMESTAMP.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output width in points
        #[arg(long, default_value = "360")]
        width: u32,

        /// Output height in points
        #[arg(long, default_value = "640")]
        height: u32,

        /// Pixels per point
        #[arg(long, default_value = "3")]
        scale: u32,

        /// Present frames through a GPU texture and read them back
        #[arg(long)]
        gpu: bool,

        /// Do not capture the microphone
        #[arg(long)]
        no_audio: bool,

        /// Behave as if microphone access was denied
        #[arg(long)]
        deny_audio: bool,

        /// Behave as if camera access was denied
        #[arg(long)]
        deny_video: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins, e.g. RUST_LOG=overlay_recorder=debug
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::List => cli::list_devices()?,
        Commands::Record {
            duration,
            output,
            width,
            height,
            scale,
            gpu,
            no_audio,
            deny_audio,
            deny_video,
        } => cli::record(cli::RecordArgs {
            duration,
            output,
            width,
            height,
            scale,
            gpu,
            audio: !no_audio,
            deny_audio,
            deny_video,
        })?,
    }
    Ok(())
}
