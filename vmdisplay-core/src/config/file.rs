//! Configuration file loading and saving
//!
//! Loads user configuration from `~/.config/vmdisplay/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{CaptureConfig, IoMode};
use crate::capture::StrategyKind;
use crate::drm::DEFAULT_DEVICE_PATH;
use crate::error::{Result, VmDisplayError};
use crate::formats::VideoFormat;
use crate::geometry::VideoInfo;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// DRM device settings
    #[serde(default)]
    pub device: DeviceSettings,

    /// Which guest output to scrape
    #[serde(default)]
    pub display: DisplaySettings,

    /// Acquisition settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Negotiated output format
    #[serde(default)]
    pub format: FormatSettings,
}

/// DRM device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Device node path
    #[serde(default = "default_device_path")]
    pub path: String,
}

/// Guest output selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Guest domain (0-4)
    #[serde(default)]
    pub dom: u32,

    /// Display pipe (0-4)
    #[serde(default)]
    pub pipe: u32,
}

/// Acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Strategy: dumb or scanout
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// io-mode: export or import
    #[serde(default = "default_io_mode")]
    pub io_mode: String,

    /// Sleep between scan-out polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Scan-out wait limit in milliseconds (0 = wait forever)
    #[serde(default)]
    pub poll_timeout_ms: u64,
}

/// Output format settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSettings {
    /// Pixel format: BGRx or RGBx
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Framerate as "num/den"
    #[serde(default = "default_framerate")]
    pub framerate: String,
}

// Default value functions
fn default_device_path() -> String {
    DEFAULT_DEVICE_PATH.to_string()
}

fn default_strategy() -> String {
    "dumb".to_string()
}

fn default_io_mode() -> String {
    "export".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_format() -> String {
    "BGRx".to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_framerate() -> String {
    "60/1".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: default_device_path(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            io_mode: default_io_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: 0,
        }
    }
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
        }
    }
}

/// Parse a "num/den" (or plain "num") framerate
pub fn parse_framerate(s: &str) -> Result<(u32, u32)> {
    let bad = || VmDisplayError::config(format!("Invalid framerate: {}", s));
    let (num, den) = match s.split_once('/') {
        Some((num, den)) => (num.trim(), den.trim()),
        None => (s.trim(), "1"),
    };
    let num = num.parse::<u32>().map_err(|_| bad())?;
    let den = den.parse::<u32>().map_err(|_| bad())?;
    if den == 0 {
        return Err(bad());
    }
    Ok((num, den))
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("vmdisplay").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vmdisplay")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/vmdisplay/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| VmDisplayError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| VmDisplayError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VmDisplayError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| VmDisplayError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| VmDisplayError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Build the session configuration described by this file
    pub fn capture_config(&self) -> Result<CaptureConfig> {
        let strategy: StrategyKind = self.capture.strategy.parse().map_err(VmDisplayError::Config)?;
        let io_mode: IoMode = self.capture.io_mode.parse().map_err(VmDisplayError::Config)?;

        let config = CaptureConfig {
            device: PathBuf::from(&self.device.path),
            domain: self.display.dom,
            pipe: self.display.pipe,
            io_mode,
            strategy,
            poll_interval_ms: self.capture.poll_interval_ms,
            poll_timeout_ms: self.capture.poll_timeout_ms,
        };
        config.validate_strict().map_err(VmDisplayError::Config)?;
        Ok(config)
    }

    /// Build the output format described by this file
    ///
    /// Unsupported pixel formats are accepted here and rejected when a frame
    /// is requested.
    pub fn video_info(&self) -> Result<VideoInfo> {
        let format: VideoFormat = self
            .format
            .format
            .parse()
            .map_err(|_| VmDisplayError::config(format!("Unknown pixel format: {}", self.format.format)))?;
        let (fps_n, fps_d) = parse_framerate(&self.format.framerate)?;

        let info = VideoInfo::new(format, self.format.width, self.format.height).with_framerate(fps_n, fps_d);
        info.validate()?;
        Ok(info)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# vmdisplay configuration

[device]
# DRM device node to open
path = "/dev/dri/card0"

[display]
# Guest domain (0-4) and display pipe (0-4) to scrape
dom = 0
pipe = 0

[capture]
# Acquisition strategy:
#   "dumb"    - allocate and export a fresh dumb buffer per frame (default)
#   "scanout" - poll a GVT-g guest pipe for the surface it is displaying
strategy = "dumb"

# io-mode: "export" (default). "import" is accepted but behaves like export.
io_mode = "export"

# Sleep between scan-out polls in milliseconds
poll_interval_ms = 5

# Give up waiting for a new scan-out frame after this long (0 = wait until stopped)
poll_timeout_ms = 0

[format]
# Pixel format: BGRx or RGBx
format = "BGRx"
width = 1920
height = 1080
framerate = "60/1"
"#
    .to_string()
}
