//! Frame acquisition strategies
//!
//! Two ways to turn "whatever is on screen" into a dma-buf:
//!
//! - [`DumbBufferStrategy`] allocates a fresh linear buffer per frame,
//!   registers it as a framebuffer and exports it.
//! - [`ScanOutStrategy`] polls a GVT-g guest pipe for the surface it is
//!   scanning out and exports that surface's handle when it changes.
//!
//! Both implement [`AcquisitionStrategy`]; a session picks one at
//! construction time from [`StrategyKind`].

pub mod dumb;
pub mod scanout;

pub use dumb::DumbBufferStrategy;
pub use scanout::{PollOutcome, ScanOutFrame, ScanOutStrategy};

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::drm::KernelDevice;
use crate::error::Result;
use crate::geometry::{BufferGeometry, VideoInfo, VideoMeta};

/// Which acquisition strategy a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Allocate and export a dumb buffer per frame
    #[default]
    Dumb,
    /// Poll a GVT-g guest pipe for its scan-out surface
    Scanout,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dumb => write!(f, "dumb"),
            Self::Scanout => write!(f, "scanout"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dumb" | "dumb-buffer" => Ok(Self::Dumb),
            "scanout" | "scan-out" | "gvt" => Ok(Self::Scanout),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// Kernel objects backing a delivered dumb buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelBuffer {
    pub handle: u32,
    pub fb_id: u32,
}

/// A frame ready for delivery
#[derive(Debug)]
pub struct AcquiredFrame {
    /// dma-buf descriptor; ownership passes to the sink
    pub fd: OwnedFd,
    /// Geometry of the underlying buffer
    pub geometry: BufferGeometry,
    /// Layout metadata for the sink
    pub meta: VideoMeta,
    /// Bytes the sink should expect behind `fd`
    pub size_hint: usize,
    /// Objects to retire once the sink has adopted `fd`
    pub kernel: Option<KernelBuffer>,
}

/// Cross-thread stop request for an in-progress frame wait
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask any running wait to give up
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Running counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Frames handed to the sink
    pub frames: u64,
    /// Poll iterations that found no new frame
    pub poll_cycles: u64,
    /// Dumb buffers released after delivery
    pub buffers_retired: u64,
    /// Scan-out handles closed when superseded
    pub handles_closed: u64,
}

/// Per-session acquisition state
///
/// Owned by the session and lent to the strategy on every call.
#[derive(Debug)]
pub struct AcquisitionContext {
    /// Guest domain to scrape
    pub domain: u32,
    /// Display pipe to scrape
    pub pipe: u32,
    /// Surface most recently exported by the scan-out strategy
    pub current: Option<ScanOutFrame>,
    pub stats: AcquisitionStats,
    stop: StopHandle,
}

impl AcquisitionContext {
    pub fn new(domain: u32, pipe: u32) -> Self {
        Self {
            domain,
            pipe,
            current: None,
            stats: AcquisitionStats::default(),
            stop: StopHandle::new(),
        }
    }

    /// Handle that cancels waits on this context
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stop_requested()
    }

    pub(crate) fn clear_stop(&self) {
        self.stop.reset();
    }
}

/// One way of obtaining frame buffers from the kernel
pub trait AcquisitionStrategy<D: KernelDevice> {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Produce the next frame
    fn acquire(
        &mut self,
        device: &D,
        info: &VideoInfo,
        ctx: &mut AcquisitionContext,
    ) -> Result<AcquiredFrame>;

    /// Release per-frame kernel objects once the sink owns the descriptor
    fn release(&mut self, device: &D, kernel: KernelBuffer, ctx: &mut AcquisitionContext);

    /// Forget the last frame after the sink failed to adopt it
    ///
    /// The next `acquire` must be able to deliver the same surface again.
    fn undelivered(&mut self, _device: &D, _ctx: &mut AcquisitionContext) {}

    /// Drop any kernel objects still held before the device closes
    fn shutdown(&mut self, device: &D, ctx: &mut AcquisitionContext);
}

/// Build the strategy for `kind`
pub fn strategy_for<D: KernelDevice + 'static>(
    kind: StrategyKind,
    poll: scanout::PollPolicy,
) -> Box<dyn AcquisitionStrategy<D>> {
    match kind {
        StrategyKind::Dumb => Box::new(DumbBufferStrategy::new()),
        StrategyKind::Scanout => Box::new(ScanOutStrategy::new(poll)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("dumb".parse::<StrategyKind>().unwrap(), StrategyKind::Dumb);
        assert_eq!("gvt".parse::<StrategyKind>().unwrap(), StrategyKind::Scanout);
        assert!("mirror".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_stop_handle_shared() {
        let ctx = AcquisitionContext::new(0, 0);
        let handle = ctx.stop_handle();
        assert!(!ctx.is_stop_requested());
        handle.request_stop();
        assert!(ctx.is_stop_requested());
        ctx.clear_stop();
        assert!(!handle.is_stop_requested());
    }
}
