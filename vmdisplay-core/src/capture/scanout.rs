//! Scan-out polling acquisition (GVT-g)
//!
//! Asks the i915 GVT-g extension which surface a guest pipe is currently
//! scanning out. A query-only call is cheap and returns the surface's guest
//! address (`start`); only when that address changes do we ask the kernel
//! for a real GEM handle and export it.
//!
//! At most one exported handle is held at a time. It lives in
//! [`AcquisitionContext::current`] and is closed before the next one is
//! created, or when the session shuts down.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{AcquiredFrame, AcquisitionContext, AcquisitionStrategy, KernelBuffer};
use crate::drm::{KernelDevice, ScanOutRequest};
use crate::error::{Result, VmDisplayError};
use crate::geometry::{BufferGeometry, PAGE_SIZE, Tiling, VideoInfo, VideoMeta, gvt_size_pages};

/// Default sleep between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long and how often to wait for a new frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls
    pub interval: Duration,
    /// Give up after this long; `None` waits until stopped
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// A scan-out surface that has been exported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutFrame {
    /// Guest address the surface was found at
    pub start: u32,
    /// GEM handle we hold for it
    pub handle: u32,
    pub geometry: BufferGeometry,
}

/// Result of a single poll
#[derive(Debug)]
pub enum PollOutcome {
    /// The pipe is not scanning anything out
    NoSurface,
    /// Same surface as last time; nothing was exported
    Unchanged(ScanOutFrame),
    /// A new surface was exported
    NewFrame(AcquiredFrame),
}

/// Polls a guest pipe for its scan-out surface
#[derive(Debug, Default)]
pub struct ScanOutStrategy {
    policy: PollPolicy,
}

impl ScanOutStrategy {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Query the pipe once and export its surface if it changed
    pub fn poll_once<D: KernelDevice>(
        &mut self,
        device: &D,
        info: &VideoInfo,
        ctx: &mut AcquisitionContext,
    ) -> Result<PollOutcome> {
        let format = info.format.ensure_supported()?;

        let query = device
            .scanout_buffer(&ScanOutRequest {
                domain: ctx.domain,
                pipe: ctx.pipe,
                query_only: true,
                size_pages: 0,
            })
            .map_err(VmDisplayError::Acquisition)?;

        if query.start == 0 {
            return Ok(PollOutcome::NoSurface);
        }

        if let Some(current) = ctx.current {
            if current.start == query.start {
                return Ok(PollOutcome::Unchanged(current));
            }
        }

        if i32::try_from(query.stride).is_err() {
            return Err(VmDisplayError::unsupported_format(format!(
                "scan-out stride {} does not fit a stride field",
                query.stride
            )));
        }

        if let Some(previous) = ctx.current.take() {
            close_handle(device, previous.handle, ctx);
        }

        let tiling = Tiling::from_raw(query.tiled);
        let size_pages = gvt_size_pages(query.stride, query.height, tiling);
        trace!(
            "GVT buffer {}x{} bpp={} stride={} fmt=0x{:08x} tiled={} pages={}",
            query.width, query.height, query.bpp, query.stride, query.drm_format, query.tiled, size_pages
        );

        let created = device
            .scanout_buffer(&ScanOutRequest {
                domain: ctx.domain,
                pipe: ctx.pipe,
                query_only: false,
                size_pages,
            })
            .map_err(VmDisplayError::Acquisition)?;

        if created.handle == 0 {
            return Err(VmDisplayError::InvalidHandle { start: query.start });
        }

        let fd = match device.export_handle(created.handle) {
            Ok(fd) => fd,
            Err(e) => {
                close_handle(device, created.handle, ctx);
                return Err(VmDisplayError::Export(e));
            }
        };

        let geometry = BufferGeometry {
            width: query.width,
            height: query.height,
            bpp: query.bpp / 8,
            pitch: query.stride,
            offset: 0,
            tiling,
            size: size_pages as u64 * PAGE_SIZE,
        };

        ctx.current = Some(ScanOutFrame {
            start: query.start,
            handle: created.handle,
            geometry,
        });

        Ok(PollOutcome::NewFrame(AcquiredFrame {
            fd,
            geometry,
            meta: VideoMeta::single_plane(format, query.width, query.height, 0, query.stride),
            size_hint: geometry.frame_bytes() as usize,
            kernel: None,
        }))
    }
}

fn close_handle<D: KernelDevice>(device: &D, handle: u32, ctx: &mut AcquisitionContext) {
    match device.close_handle(handle) {
        Ok(()) => ctx.stats.handles_closed += 1,
        Err(e) => warn!("Failed to close GEM handle {}: {}", handle, e),
    }
}

impl<D: KernelDevice> AcquisitionStrategy<D> for ScanOutStrategy {
    fn name(&self) -> &'static str {
        "scanout"
    }

    /// Block until the pipe shows a surface we have not exported yet
    fn acquire(
        &mut self,
        device: &D,
        info: &VideoInfo,
        ctx: &mut AcquisitionContext,
    ) -> Result<AcquiredFrame> {
        let started = Instant::now();
        let mut polls: u64 = 0;

        loop {
            if ctx.is_stop_requested() {
                return Err(VmDisplayError::Cancelled);
            }

            match self.poll_once(device, info, ctx)? {
                PollOutcome::NewFrame(frame) => {
                    debug!("New scan-out frame after {} polls", polls);
                    return Ok(frame);
                }
                PollOutcome::NoSurface | PollOutcome::Unchanged(_) => {
                    polls += 1;
                    ctx.stats.poll_cycles += 1;
                }
            }

            if let Some(timeout) = self.policy.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(VmDisplayError::Timeout { waited, polls });
                }
            }

            thread::sleep(self.policy.interval);
        }
    }

    fn release(&mut self, _device: &D, _kernel: KernelBuffer, _ctx: &mut AcquisitionContext) {}

    /// Drop the held handle so the unchanged surface counts as new again
    fn undelivered(&mut self, device: &D, ctx: &mut AcquisitionContext) {
        if let Some(current) = ctx.current.take() {
            debug!("Scan-out frame at 0x{:08x} was not delivered, re-exporting on next request", current.start);
            close_handle(device, current.handle, ctx);
        }
    }

    fn shutdown(&mut self, device: &D, ctx: &mut AcquisitionContext) {
        if let Some(current) = ctx.current.take() {
            close_handle(device, current.handle, ctx);
        }
    }
}
