//! Capture session state machine
//!
//! A [`Session`] owns the DRM device between `start` and `stop`, the
//! acquisition strategy picked from its configuration, and the frame sink.
//! Frames are produced only when [`Session::create`] is called.
//!
//! ```text
//!   Idle ──start()──▶ Opened ──stop()──▶ Idle
//!                      │  ▲
//!                      └──┘ create()
//! ```

use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capture::{
    AcquiredFrame, AcquisitionContext, AcquisitionStats, AcquisitionStrategy, StopHandle,
    StrategyKind, strategy_for,
};
use crate::config::CaptureConfig;
use crate::delivery::FrameSink;
use crate::drm::{DrmCard, KernelDevice};
use crate::error::{Result, VmDisplayError};
use crate::geometry::VideoInfo;
use crate::types::SessionId;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device open
    Idle,
    /// Device open, frames can be requested
    Opened,
}

/// A display scraping session
pub struct Session<D: KernelDevice + 'static, S: FrameSink> {
    id: SessionId,
    config: CaptureConfig,
    info: VideoInfo,
    strategy: Box<dyn AcquisitionStrategy<D>>,
    ctx: AcquisitionContext,
    sink: S,
    device: Option<D>,
    state: SessionState,
    started_at: Option<Instant>,
}

impl<D: KernelDevice + 'static, S: FrameSink> Session<D, S> {
    /// Create an idle session
    ///
    /// The strategy is fixed here and cannot change for the session's lifetime.
    pub fn new(config: CaptureConfig, sink: S) -> Result<Self> {
        config.validate_strict().map_err(VmDisplayError::Config)?;
        for warning in config.validate() {
            warn!("{}", warning);
        }

        let strategy = strategy_for(config.strategy, config.poll_policy());
        let ctx = AcquisitionContext::new(config.domain, config.pipe);

        Ok(Self {
            id: SessionId::new(),
            config,
            info: VideoInfo::default(),
            strategy,
            ctx,
            sink,
            device: None,
            state: SessionState::Idle,
            started_at: None,
        })
    }

    /// Set the negotiated output format
    ///
    /// Only ranges are checked; an unsupported pixel format fails at `create`.
    pub fn set_format(&mut self, info: VideoInfo) -> Result<()> {
        info.validate()?;
        debug!("{} format set to {}", self.id, info);
        self.info = info;
        Ok(())
    }

    /// Open the device with `open` and enter `Opened`
    pub fn start_with<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<D>,
    {
        if self.state == SessionState::Opened {
            return Err(VmDisplayError::SessionAlreadyRunning);
        }

        if !self.sink.is_available() {
            return Err(VmDisplayError::device_open(
                &self.config.device,
                io::Error::new(io::ErrorKind::Unsupported, "no dma-buf allocator available"),
            ));
        }

        let device = open(&self.config.device)?;

        self.ctx.clear_stop();
        self.ctx.current = None;
        self.device = Some(device);
        self.state = SessionState::Opened;
        self.started_at = Some(Instant::now());

        info!(
            "{} started on {:?} (dom={} pipe={} strategy={} io-mode={})",
            self.id,
            self.config.device,
            self.config.domain,
            self.config.pipe,
            self.strategy.name(),
            self.config.io_mode
        );
        Ok(())
    }

    /// Produce one frame and hand it to the sink
    pub fn create(&mut self) -> Result<S::Buffer> {
        let device = self.device.as_ref().ok_or(VmDisplayError::NoActiveSession)?;

        let AcquiredFrame {
            fd,
            meta,
            size_hint,
            kernel,
            ..
        } = self.strategy.acquire(device, &self.info, &mut self.ctx)?;

        let delivered = match self.sink.wrap(fd, size_hint) {
            Ok(mut buffer) => self
                .sink
                .attach_geometry(&mut buffer, &meta)
                .map(|()| buffer),
            Err(e) => Err(e),
        };

        if let Some(kernel) = kernel {
            self.strategy.release(device, kernel, &mut self.ctx);
        }

        let buffer = match delivered {
            Ok(buffer) => buffer,
            Err(e) => {
                self.strategy.undelivered(device, &mut self.ctx);
                return Err(e);
            }
        };
        self.ctx.stats.frames += 1;
        debug!(
            "{} frame {} delivered ({}x{} stride {})",
            self.id, self.ctx.stats.frames, meta.width, meta.height, meta.strides[0]
        );
        Ok(buffer)
    }

    /// Release kernel objects and close the device
    ///
    /// Safe to call in any state.
    pub fn stop(&mut self) {
        if let Some(device) = self.device.take() {
            self.strategy.shutdown(&device, &mut self.ctx);
            let stats = self.ctx.stats;
            info!(
                "{} stopped after {:?}: {} frames, {} poll cycles, {} buffers retired, {} handles closed",
                self.id,
                self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
                stats.frames,
                stats.poll_cycles,
                stats.buffers_retired,
                stats.handles_closed
            );
            drop(device);
        }
        self.state = SessionState::Idle;
        self.started_at = None;
    }

    /// Handle another thread can use to cancel a blocking `create`
    pub fn stop_handle(&self) -> StopHandle {
        self.ctx.stop_handle()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Opened
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn video_info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.ctx.stats
    }

    /// The open device, if any
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// The frame sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Capture sources are live; seeking is never possible
    pub fn is_seekable(&self) -> bool {
        false
    }
}

impl<S: FrameSink> Session<DrmCard, S> {
    /// Open the configured DRM node
    pub fn start(&mut self) -> Result<()> {
        self.start_with(DrmCard::open)?;

        if self.config.strategy == StrategyKind::Scanout {
            if let Some(device) = self.device.as_ref() {
                match device.driver_version() {
                    Ok(version) if version.name != "i915" => warn!(
                        "Scan-out capture needs i915 with GVT-g, but {:?} is driven by {}",
                        device.path(),
                        version
                    ),
                    Ok(version) => debug!("DRM driver: {}", version),
                    Err(e) => warn!("Failed to query DRM driver version: {}", e),
                }
            }
        }
        Ok(())
    }
}

impl<D: KernelDevice + 'static, S: FrameSink> Drop for Session<D, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
