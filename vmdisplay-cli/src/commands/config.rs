//! Config command - manage configuration files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use vmdisplay_core::config::{ConfigFile, sample_config};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the current configuration
    Show,

    /// Generate a default config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,

    /// Check the config file and print the resolved settings
    Check,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            println!("{}", path.display());
            if path.exists() {
                println!("(file exists)");
            } else {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            if !path.exists() {
                println!("No configuration file found at: {}", path.display());
                println!();
                println!("Using default settings. Create a config file with:");
                println!("  vmdisplay config init");
                return Ok(());
            }

            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

            println!("Configuration file: {}\n", path.display());
            println!("{}", content);
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).context("Failed to create config directory")?;
                }
            }

            // Write sample config
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
            println!();
            println!("Edit this file to choose the device, guest display and strategy.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
        ConfigCommand::Check => {
            let path = ConfigFile::default_path();
            let file = ConfigFile::load_from(path.clone()).context("Failed to load config file")?;
            let config = file.capture_config().context("Invalid capture settings")?;
            let info = file.video_info().context("Invalid format settings")?;

            println!("Configuration file: {}\n", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Format: {}", info);
            for warning in config.validate() {
                println!("warning: {}", warning);
            }
        }
    }

    Ok(())
}
