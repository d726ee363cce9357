//! Mock infrastructure for testing
//!
//! Provides a scripted [`KernelDevice`] that records every call, so tests can
//! check ioctl ordering and handle lifetimes without a GPU.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use parking_lot::Mutex;
use vmdisplay_core::drm::{DumbAllocation, FramebufferSpec, KernelDevice, ScanOutBuffer, ScanOutRequest};
use vmdisplay_core::formats::fourcc;

/// A recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDumb { width: u32, height: u32, bpp: u32 },
    AddFramebuffer(FramebufferSpec),
    RemoveFramebuffer(u32),
    MapDumb(u32),
    Fill { offset: u64, len: usize, value: u8 },
    DestroyDumb(u32),
    Export(u32),
    CloseHandle(u32),
    QueryScanout { domain: u32, pipe: u32 },
    CreateScanout { domain: u32, pipe: u32, size_pages: u32 },
    /// The device was dropped
    Closed,
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    CreateDumb,
    AddFramebuffer,
    MapDumb,
    Fill,
    Export,
    QueryScanout,
    CreateScanout,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<Call>,
    next_handle: u32,
    next_fb: u32,
    starts: VecDeque<u32>,
    last_start: u32,
    surface: ScanOutBuffer,
    zero_handle: bool,
    failure: Option<(Op, i32)>,
}

/// Scripted DRM device
#[derive(Debug)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

/// Read-only view of a [`MockDevice`] that outlives it
#[derive(Debug, Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

/// Pitch the mock kernel picks for a dumb buffer
pub fn kernel_pitch(width: u32) -> u32 {
    (width * 4).next_multiple_of(64)
}

impl MockDevice {
    /// Create a new mock device with a 1920x1080 linear surface template
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                next_handle: 1,
                next_fb: 100,
                starts: VecDeque::new(),
                last_start: 0,
                surface: ScanOutBuffer {
                    start: 0,
                    width: 1920,
                    height: 1080,
                    stride: 7680,
                    bpp: 32,
                    drm_format: fourcc::XRGB8888,
                    tiled: 0,
                    handle: 0,
                },
                zero_handle: false,
                failure: None,
            })),
        }
    }

    /// Scan-out start addresses returned by successive queries
    ///
    /// Once the script runs out the last value repeats.
    pub fn with_starts(self, starts: &[u32]) -> Self {
        self.state.lock().starts = starts.iter().copied().collect();
        self
    }

    /// Replace the surface template returned by scan-out queries
    pub fn with_surface(self, width: u32, height: u32, stride: u32, tiled: u8) -> Self {
        {
            let mut state = self.state.lock();
            state.surface.width = width;
            state.surface.height = height;
            state.surface.stride = stride;
            state.surface.tiled = tiled;
        }
        self
    }

    /// Make scan-out creation hand back handle 0
    pub fn with_zero_handle(self) -> Self {
        self.state.lock().zero_handle = true;
        self
    }

    /// Make `op` fail with `errno`
    pub fn failing(self, op: Op, errno: i32) -> Self {
        self.state.lock().failure = Some((op, errno));
        self
    }

    /// Get a probe for inspecting calls after the device is moved
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: self.state.clone(),
        }
    }

    fn record(&self, call: Call, op: Option<Op>) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match (op, state.failure) {
            (Some(op), Some((failing, errno))) if op == failing => Err(io::Error::from_raw_os_error(errno)),
            _ => Ok(()),
        }
    }

    fn next_handle(&self) -> u32 {
        let mut state = self.state.lock();
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().calls.push(Call::Closed);
    }
}

impl MockProbe {
    /// All calls so far
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of calls matching `pred`
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Position of the first call equal to `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.state.lock().calls.iter().position(|c| c == call)
    }

    pub fn is_closed(&self) -> bool {
        self.position(&Call::Closed).is_some()
    }
}

fn null_fd() -> io::Result<OwnedFd> {
    Ok(File::open("/dev/null")?.into())
}

impl KernelDevice for MockDevice {
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        self.record(Call::CreateDumb { width, height, bpp }, Some(Op::CreateDumb))?;
        let pitch = kernel_pitch(width);
        Ok(DumbAllocation {
            handle: self.next_handle(),
            pitch,
            size: pitch as u64 * height as u64,
        })
    }

    fn add_framebuffer(&self, spec: &FramebufferSpec) -> io::Result<u32> {
        self.record(Call::AddFramebuffer(*spec), Some(Op::AddFramebuffer))?;
        let mut state = self.state.lock();
        let fb = state.next_fb;
        state.next_fb += 1;
        Ok(fb)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        self.record(Call::RemoveFramebuffer(fb_id), None)
    }

    fn map_dumb(&self, handle: u32) -> io::Result<u64> {
        self.record(Call::MapDumb(handle), Some(Op::MapDumb))?;
        Ok(0x1000_0000 + handle as u64 * 0x1000)
    }

    fn fill_mapping(&self, offset: u64, len: usize, value: u8) -> io::Result<()> {
        self.record(Call::Fill { offset, len, value }, Some(Op::Fill))
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        self.record(Call::DestroyDumb(handle), None)
    }

    fn export_handle(&self, handle: u32) -> io::Result<OwnedFd> {
        self.record(Call::Export(handle), Some(Op::Export))?;
        null_fd()
    }

    fn close_handle(&self, handle: u32) -> io::Result<()> {
        self.record(Call::CloseHandle(handle), None)
    }

    fn scanout_buffer(&self, request: &ScanOutRequest) -> io::Result<ScanOutBuffer> {
        if request.query_only {
            self.record(
                Call::QueryScanout {
                    domain: request.domain,
                    pipe: request.pipe,
                },
                Some(Op::QueryScanout),
            )?;
            let mut state = self.state.lock();
            let start = match state.starts.pop_front() {
                Some(start) => start,
                None => state.last_start,
            };
            state.last_start = start;
            Ok(ScanOutBuffer {
                start,
                ..state.surface
            })
        } else {
            self.record(
                Call::CreateScanout {
                    domain: request.domain,
                    pipe: request.pipe,
                    size_pages: request.size_pages,
                },
                Some(Op::CreateScanout),
            )?;
            let zero = self.state.lock().zero_handle;
            let handle = if zero { 0 } else { self.next_handle() };
            let state = self.state.lock();
            Ok(ScanOutBuffer {
                start: state.last_start,
                handle,
                ..state.surface
            })
        }
    }
}
