//! Info command - show DRM driver information and the effective configuration

use anyhow::Result;
use clap::Args;
use vmdisplay_core::{StrategyKind, VideoFormat, drm::DrmCard, formats::format_name};

use super::capture::DisplayArgs;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    display: DisplayArgs,
}

/// Show driver information and what a capture would use
pub async fn info(args: InfoArgs) -> Result<()> {
    println!("vmdisplay - System Information\n");

    let (config, video) = args.display.resolve()?;

    println!("DRM Device:");
    println!("  Path:      {}", config.device.display());
    match DrmCard::open(&config.device) {
        Ok(card) => match card.driver_version() {
            Ok(version) => {
                println!("  Driver:    {}", version);
                if version.name == "i915" {
                    println!("  GVT-g:     scan-out capture possible (needs a GVT-g enabled kernel)");
                } else {
                    println!("  GVT-g:     not available on this driver; use the dumb strategy");
                }
            }
            Err(e) => println!("  Driver:    unknown ({})", e),
        },
        Err(e) => {
            println!("  [!!] {}", e);
            if let Some(hint) = e.user_hint() {
                println!("       {}", hint);
            }
        }
    }

    println!();

    println!("Effective Configuration:");
    println!("  Guest:     dom {} pipe {}", config.domain, config.pipe);
    println!("  Strategy:  {}", config.strategy);
    println!("  io-mode:   {}", config.io_mode);
    println!("  Format:    {}", video);
    if config.strategy == StrategyKind::Scanout {
        let policy = config.poll_policy();
        println!("  Poll:      every {:?}", policy.interval);
        match policy.timeout {
            Some(timeout) => println!("  Timeout:   {:?}", timeout),
            None => println!("  Timeout:   none (wait until stopped)"),
        }
    }

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    println!();

    println!("Supported Formats:");
    for format in VideoFormat::SUPPORTED {
        println!(
            "  {:<6} {} ({} bytes/pixel)",
            format.name(),
            format_name(format.fourcc()),
            format.bytes_per_pixel()
        );
    }

    Ok(())
}
