//! Error types for vmdisplay

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using VmDisplayError
pub type Result<T> = std::result::Result<T, VmDisplayError>;

/// Main error type for vmdisplay operations
///
/// Every kernel-backed variant keeps the underlying `io::Error` so the
/// original errno survives up to the caller (see [`VmDisplayError::errno`]).
#[derive(Debug, Error)]
pub enum VmDisplayError {
    /// The DRM device node could not be opened, or no dma-buf allocator is available
    #[error("Failed to open DRM device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Negotiated pixel format is not a supported 32-bit packed RGB layout
    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),

    /// Dumb buffer allocation failed
    #[error("Dumb buffer allocation failed: {0}")]
    Allocation(#[source] io::Error),

    /// Framebuffer object registration failed
    #[error("Framebuffer registration failed: {0}")]
    FramebufferRegistration(#[source] io::Error),

    /// Mapping the buffer into process memory failed
    #[error("Buffer mapping failed: {0}")]
    Mapping(#[source] io::Error),

    /// PRIME export to a dma-buf descriptor failed
    #[error("DMA-BUF export failed: {0}")]
    Export(#[source] io::Error),

    /// Kernel returned a zero GEM handle for a live scan-out buffer
    #[error("Invalid GEM handle for scan-out buffer at 0x{start:08x}")]
    InvalidHandle { start: u32 },

    /// Scan-out buffer query failed
    #[error("Scan-out acquisition failed: {0}")]
    Acquisition(#[source] io::Error),

    /// No new scan-out frame appeared within the configured wait
    #[error("No new frame after {polls} polls ({waited:?})")]
    Timeout { waited: Duration, polls: u64 },

    /// The frame wait was interrupted by a stop request
    #[error("Frame acquisition cancelled")]
    Cancelled,

    /// The frame sink refused to adopt or describe a buffer
    #[error("Frame delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture session not active
    #[error("No active capture session")]
    NoActiveSession,

    /// Session already running
    #[error("Capture session already running")]
    SessionAlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VmDisplayError>,
    },
}

impl VmDisplayError {
    /// Create a device open error
    pub fn device_open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DeviceOpen {
            path: path.into(),
            source,
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &VmDisplayError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Raw errno of the failed kernel call, if this error came from one
    pub fn errno(&self) -> Option<i32> {
        match self.root() {
            Self::DeviceOpen { source, .. }
            | Self::Allocation(source)
            | Self::FramebufferRegistration(source)
            | Self::Mapping(source)
            | Self::Export(source)
            | Self::Acquisition(source)
            | Self::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// A short suggestion for the operator, if one applies
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::DeviceOpen { .. } => Some(
                "Check that the DRM node exists and that you are in the 'video' group (or run as root)",
            ),
            Self::UnsupportedFormat(_) => Some("Only BGRx and RGBx are supported"),
            Self::Acquisition(_) | Self::InvalidHandle { .. } => Some(
                "Scan-out capture needs an i915 kernel with GVT-g and a running guest on the selected dom/pipe",
            ),
            Self::Timeout { .. } => {
                Some("The guest may not be updating its display; raise poll_timeout_ms or set it to 0")
            }
            Self::Config(_) => Some("Check ~/.config/vmdisplay/config.toml or run 'vmdisplay config sample'"),
            Self::NoActiveSession => Some("Start the session before requesting frames"),
            Self::SessionAlreadyRunning => Some("Stop the running session first"),
            _ => None,
        }
    }

    /// Whether the operator can fix this without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::DeviceOpen { .. }
                | Self::UnsupportedFormat(_)
                | Self::Timeout { .. }
                | Self::Config(_)
                | Self::NoActiveSession
                | Self::SessionAlreadyRunning
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
