//! Capture command - acquire frames from a guest display

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use serde::Serialize;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use vmdisplay_core::{
    CaptureConfig, ConfigFile, DmaBufFrame, DmaBufSink, Session, StopHandle, VideoInfo, VmDisplayError,
    drm::DrmCard,
};

/// Device and format selection shared by commands that open a session
#[derive(Args, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// Configuration file (defaults to ~/.config/vmdisplay/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// DRM device node
    #[arg(short, long)]
    device: Option<String>,

    /// Guest domain (0-4)
    #[arg(long)]
    dom: Option<u32>,

    /// Display pipe (0-4)
    #[arg(long)]
    pipe: Option<u32>,

    /// Acquisition strategy (dumb, scanout)
    #[arg(short, long)]
    strategy: Option<String>,

    /// Buffer exchange mode (export, import)
    #[arg(long)]
    io_mode: Option<String>,

    /// Pixel format (BGRx, RGBx)
    #[arg(short, long)]
    format: Option<String>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Framerate as num/den
    #[arg(long)]
    framerate: Option<String>,

    /// Scan-out poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up waiting for a scan-out frame after this many milliseconds (0 = never)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl DisplayArgs {
    /// Load the configuration file and apply command-line overrides
    pub fn resolve(&self) -> Result<(CaptureConfig, VideoInfo)> {
        let mut file = match &self.config {
            Some(path) => ConfigFile::load_from(path.clone()).context("Failed to load configuration")?,
            None => ConfigFile::load_or_default(),
        };

        if let Some(device) = &self.device {
            file.device.path = device.clone();
        }
        if let Some(dom) = self.dom {
            file.display.dom = dom;
        }
        if let Some(pipe) = self.pipe {
            file.display.pipe = pipe;
        }
        if let Some(strategy) = &self.strategy {
            file.capture.strategy = strategy.clone();
        }
        if let Some(io_mode) = &self.io_mode {
            file.capture.io_mode = io_mode.clone();
        }
        if let Some(interval) = self.poll_interval_ms {
            file.capture.poll_interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            file.capture.poll_timeout_ms = timeout;
        }
        if let Some(format) = &self.format {
            file.format.format = format.clone();
        }
        if let Some(width) = self.width {
            file.format.width = width;
        }
        if let Some(height) = self.height {
            file.format.height = height;
        }
        if let Some(framerate) = &self.framerate {
            file.format.framerate = framerate.clone();
        }

        let config = file.capture_config().map_err(explain)?;
        let info = file.video_info().map_err(explain)?;
        Ok((config, info))
    }
}

/// Arguments for the capture command
#[derive(Args)]
pub struct CaptureArgs {
    #[command(flatten)]
    display: DisplayArgs,

    /// Number of frames to acquire (0 = until Ctrl+C)
    #[arg(short = 'n', long, default_value = "1")]
    frames: u64,

    /// Print one JSON object per frame instead of a summary
    #[arg(long)]
    json: bool,

    /// Write the raw pixels of the first frame to this file
    ///
    /// Skipped with a warning when the kernel picked a row pitch narrower
    /// than the reported stride, since the buffer is then too small to read.
    #[arg(long)]
    dump: Option<PathBuf>,
}

/// What a delivered frame looked like
#[derive(Debug, Serialize)]
struct FrameReport {
    sequence: u64,
    size: usize,
    format: String,
    width: u32,
    height: u32,
    offsets: Vec<usize>,
    strides: Vec<i32>,
}

impl FrameReport {
    fn from_frame(frame: &DmaBufFrame) -> Self {
        let (format, width, height, offsets, strides) = match &frame.meta {
            Some(meta) => (
                meta.format.to_string(),
                meta.width,
                meta.height,
                meta.plane_offsets().to_vec(),
                meta.plane_strides().to_vec(),
            ),
            None => (String::new(), 0, 0, Vec::new(), Vec::new()),
        };
        Self {
            sequence: frame.sequence,
            size: frame.size,
            format,
            width,
            height,
            offsets,
            strides,
        }
    }
}

/// Attach the operator hint to a library error
fn explain(err: VmDisplayError) -> anyhow::Error {
    match err.user_hint() {
        Some(hint) => anyhow!("{}\n  hint: {}", err, hint),
        None => anyhow!(err),
    }
}

/// Run a capture session to completion on the current thread
fn run_session(
    config: CaptureConfig,
    info: VideoInfo,
    args: &CaptureArgs,
    stop_tx: oneshot::Sender<StopHandle>,
) -> Result<u64> {
    let mut session: Session<DrmCard, DmaBufSink> =
        Session::new(config, DmaBufSink::new()).map_err(explain)?;
    session.set_format(info).map_err(explain)?;

    let stop = session.stop_handle();
    // The receiver is gone only if the command is already exiting
    let _ = stop_tx.send(stop.clone());

    session.start().map_err(explain)?;

    let mut delivered = 0u64;
    while args.frames == 0 || delivered < args.frames {
        if stop.is_stop_requested() {
            break;
        }

        let frame = match session.create() {
            Ok(frame) => frame,
            Err(VmDisplayError::Cancelled) => break,
            Err(e) => return Err(explain(e)),
        };

        if delivered == 0 {
            if let Some(path) = &args.dump
                && !frame.plane_fits()
            {
                warn!(
                    "Not dumping to {:?}: layout needs {:?} bytes but the buffer holds {}",
                    path,
                    frame.plane_bytes(),
                    frame.size
                );
            } else if let Some(path) = &args.dump {
                let pixels = frame.read_pixels().map_err(explain)?;
                std::fs::write(path, &pixels)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {} bytes of pixels to {:?}", pixels.len(), path);
            }
        }

        let report = FrameReport::from_frame(&frame);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "frame {:>5}  {}x{} {}  stride {:?}  {} bytes",
                report.sequence, report.width, report.height, report.format, report.strides, report.size
            );
        }
        delivered += 1;
    }

    let stats = session.stats();
    session.stop();

    if !args.json {
        println!();
        println!("Frames delivered: {}", stats.frames);
        if stats.poll_cycles > 0 {
            println!("Poll cycles:      {}", stats.poll_cycles);
        }
    }

    Ok(delivered)
}

/// Acquire frames until the requested count or Ctrl+C
pub async fn capture(args: CaptureArgs) -> Result<()> {
    let (config, info) = args.display.resolve()?;

    if !args.json {
        println!("vmdisplay - Starting Capture\n");
        println!("Configuration:");
        println!("  Device:    {}", config.device.display());
        println!("  Guest:     dom {} pipe {}", config.domain, config.pipe);
        println!("  Strategy:  {}", config.strategy);
        println!("  io-mode:   {}", config.io_mode);
        println!("  Format:    {}", info);
        println!();
    }

    let (stop_tx, stop_rx) = oneshot::channel();
    let mut task = tokio::task::spawn_blocking(move || run_session(config, info, &args, stop_tx));

    let stop = stop_rx.await.ok();

    let delivered = tokio::select! {
        result = &mut task => result.context("Capture thread panicked")??,
        _ = signal::ctrl_c() => {
            warn!("Received interrupt signal, stopping capture");
            if let Some(stop) = &stop {
                stop.request_stop();
            }
            task.await.context("Capture thread panicked")??
        }
    };

    info!("Capture finished after {} frames", delivered);
    Ok(())
}
