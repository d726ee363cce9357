//! vmdisplay CLI
//!
//! Scrape frames from a virtual machine display over DRM dma-buf.
//!
//! # Usage
//!
//! ```bash
//! # Grab one frame with a fresh dumb buffer
//! vmdisplay capture
//!
//! # Follow guest 1, pipe 0 through GVT-g and report 100 frames as JSON
//! vmdisplay capture --strategy scanout --dom 1 --pipe 0 --frames 100 --json
//!
//! # Show the DRM driver and effective configuration
//! vmdisplay info
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// vmdisplay - zero-copy VM display scraping
#[derive(Parser)]
#[command(name = "vmdisplay")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Zero-copy display scraping of virtual machine outputs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire frames and hand them to a dma-buf sink
    #[command(alias = "grab")]
    Capture(commands::CaptureArgs),

    /// Show DRM driver information and the effective configuration
    Info(commands::InfoArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(format!("vmdisplay={}", level).parse()?))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Capture(args) => commands::capture(args).await?,
        Commands::Info(args) => commands::info(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
