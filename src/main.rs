// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "booth-capture")]
#[command(about = "Capture filtered clips the way a photo booth does")]
#[command(version = booth_capture::constants::app_info::version())]
struct Cli {
    /// Enable debug logging for the capture pipeline
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceKind {
    /// Synthetic color bars with a sine tone
    Test,
    /// Default camera and microphone
    Camera,
}

#[derive(Subcommand)]
enum Commands {
    /// List filter programs and whether each one can be applied
    Filters,

    /// Show which encoding formats this host supports
    Formats {
        /// Config file (default: ~/.config/booth-capture/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Record a clip
    Record {
        /// Filter id (from 'booth-capture filters')
        #[arg(short, long, default_value = "normal")]
        filter: String,

        /// Maximum recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: f64,

        #[arg(long, default_value = "1280")]
        width: u32,

        #[arg(long, default_value = "720")]
        height: u32,

        #[arg(long, default_value = "30")]
        fps: u32,

        /// Where frames come from
        #[arg(short, long, value_enum, default_value = "test")]
        source: SourceKind,

        /// Record video only
        #[arg(long)]
        no_audio: bool,

        /// Output file path (default: ~/Videos/Booth/capture_TIMESTAMP.webm)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (default: ~/.config/booth-capture/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set RUST_LOG to override, e.g. RUST_LOG=booth_capture=trace
    let default_filter = if cli.verbose {
        "warn,booth_capture=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Filters => cli::list_filters(),
        Commands::Formats { config } => cli::list_formats(config),
        Commands::Record {
            filter,
            duration,
            width,
            height,
            fps,
            source,
            no_audio,
            output,
            config,
        } => cli::record(cli::RecordArgs {
            filter,
            duration,
            width,
            height,
            fps,
            source,
            audio: !no_audio,
            output,
            config,
        }),
    }
}
