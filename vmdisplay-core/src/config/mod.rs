//! Configuration types for vmdisplay
//!
//! Provides the capture session settings and the on-disk config file.

mod file;

pub use file::{ConfigFile, parse_framerate, sample_config};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::StrategyKind;
use crate::capture::scanout::PollPolicy;
use crate::drm::DEFAULT_DEVICE_PATH;

/// Highest guest domain index that can be selected
pub const MAX_DOMAIN: u32 = 4;

/// Highest display pipe index that can be selected
pub const MAX_PIPE: u32 = 4;

/// How buffers cross the process boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Export a dma-buf from the kernel (the only functional mode)
    #[default]
    Export,
    /// Import a dma-buf from downstream (accepted, behaves like export)
    Import,
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Export => write!(f, "dmabuf-export"),
            Self::Import => write!(f, "dmabuf-import"),
        }
    }
}

impl std::str::FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "export" | "dmabuf-export" => Ok(Self::Export),
            "import" | "dmabuf-import" => Ok(Self::Import),
            _ => Err(format!("Unknown io-mode: {}", s)),
        }
    }
}

/// Full capture session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// DRM device node
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Guest domain to scrape (0-4)
    #[serde(default)]
    pub domain: u32,
    /// Display pipe to scrape (0-4)
    #[serde(default)]
    pub pipe: u32,
    /// Buffer exchange mode
    #[serde(default)]
    pub io_mode: IoMode,
    /// Acquisition strategy
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Sleep between scan-out polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting for a scan-out frame after this many milliseconds (0 = never)
    #[serde(default)]
    pub poll_timeout_ms: u64,
}

fn default_device() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_PATH)
}

fn default_poll_interval_ms() -> u64 {
    5
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            domain: 0,
            pipe: 0,
            io_mode: IoMode::default(),
            strategy: StrategyKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: 0,
        }
    }
}

impl CaptureConfig {
    /// Config scraping `pipe` of guest `domain`
    pub fn guest(domain: u32, pipe: u32) -> Self {
        Self {
            domain,
            pipe,
            ..Self::default()
        }
    }

    /// Set the DRM device node
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = device.into();
        self
    }

    /// Set the acquisition strategy
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the io-mode
    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the poll timeout (`None` waits until stopped)
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    /// Wait policy for the scan-out strategy
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: (self.poll_timeout_ms > 0).then(|| Duration::from_millis(self.poll_timeout_ms)),
        }
    }

    /// Validate the configuration and return any warnings
    ///
    /// An empty list means the configuration looks good.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.io_mode != IoMode::Export {
            warnings.push("dmabuf export is the only supported mode; import behaves like export".to_string());
        }

        if self.strategy == StrategyKind::Scanout && self.poll_interval_ms == 0 {
            warnings.push("A poll interval of 0 ms spins a CPU core while waiting for frames".to_string());
        }

        if self.strategy == StrategyKind::Dumb && self.domain != 0 {
            warnings.push(format!(
                "dom={} is ignored by the dumb-buffer strategy",
                self.domain
            ));
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    pub fn validate_strict(&self) -> Result<(), String> {
        if self.domain > MAX_DOMAIN {
            return Err(format!("dom {} out of range 0-{}", self.domain, MAX_DOMAIN));
        }

        if self.pipe > MAX_PIPE {
            return Err(format!("pipe {} out of range 0-{}", self.pipe, MAX_PIPE));
        }

        if self.device.as_os_str().is_empty() {
            return Err("Device path cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.device, PathBuf::from("/dev/dri/card0"));
        assert_eq!(config.strategy, StrategyKind::Dumb);
        assert_eq!(config.io_mode, IoMode::Export);
        assert_eq!(config.poll_policy().interval, Duration::from_millis(5));
        assert_eq!(config.poll_policy().timeout, None);
    }

    #[test]
    fn test_io_mode_parse() {
        assert_eq!("dmabuf-export".parse::<IoMode>().unwrap(), IoMode::Export);
        assert_eq!("import".parse::<IoMode>().unwrap(), IoMode::Import);
        assert!("mmap".parse::<IoMode>().is_err());
    }
}
