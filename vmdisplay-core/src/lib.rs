//! vmdisplay Core Library
//!
//! Zero-copy display scraping of virtual machine outputs.
//!
//! This library provides:
//! - DRM device access with interrupted-call safe ioctls
//! - Dumb-buffer and GVT-g scan-out acquisition strategies
//! - dma-buf export and hand-off to a frame sink
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────┐    ┌──────────────┐
//! │ DRM device   │───▶│ Acquisition strategy │───▶│ Frame sink   │
//! │ (/dev/dri)   │    │ (dumb | scanout)     │    │ (dma-buf fd) │
//! └──────────────┘    └──────────────────────┘    └──────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod delivery;
pub mod drm;
pub mod error;
pub mod formats;
pub mod geometry;
pub mod session;
pub mod types;

pub use capture::{StopHandle, StrategyKind};
pub use config::{CaptureConfig, ConfigFile, IoMode};
pub use delivery::{DmaBufFrame, DmaBufSink, FrameSink};
pub use error::{Result, VmDisplayError};
pub use formats::VideoFormat;
pub use geometry::{BufferGeometry, VideoInfo, VideoMeta};
pub use session::{Session, SessionState};
pub use types::SessionId;
