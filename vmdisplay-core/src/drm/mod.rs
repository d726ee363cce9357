//! Direct Rendering Manager (DRM) device access
//!
//! [`KernelDevice`] is the seam between the acquisition strategies and the
//! kernel: every buffer operation the strategies need is one method here.
//! [`DrmCard`] implements it with real ioctls on an open `/dev/dri/card*`
//! node; tests substitute a scripted device.
//!
//! Methods return plain `io::Result`s carrying the kernel errno. The
//! strategies decide which [`VmDisplayError`](crate::error::VmDisplayError)
//! kind a failure maps to.

mod card;
mod ioctl;
pub(crate) mod sys;

pub use card::{DriverVersion, DrmCard};
pub use ioctl::retry_interrupted;

use std::io;
use std::os::fd::OwnedFd;

/// Default DRM node to scrape from
pub const DEFAULT_DEVICE_PATH: &str = "/dev/dri/card0";

/// Result of a dumb buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbAllocation {
    /// GEM handle of the new buffer
    pub handle: u32,
    /// Row stride chosen by the kernel
    pub pitch: u32,
    /// Allocation size in bytes
    pub size: u64,
}

/// Parameters for registering a framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSpec {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bpp: u32,
    pub pitch: u32,
    pub handle: u32,
}

/// Which guest surface to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutRequest {
    /// Guest domain id
    pub domain: u32,
    /// Guest display pipe
    pub pipe: u32,
    /// Only report the surface, do not create a handle
    pub query_only: bool,
    /// Size of the mapping to create, in pages (ignored when querying)
    pub size_pages: u32,
}

/// Surface description returned by the GVT buffer ioctl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutBuffer {
    /// Guest graphics address of the surface; 0 when nothing is displayed
    pub start: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub bpp: u32,
    pub drm_format: u32,
    /// Raw tiling field
    pub tiled: u8,
    /// GEM handle; only set when not querying
    pub handle: u32,
}

/// Kernel operations the acquisition engine relies on
pub trait KernelDevice {
    /// Allocate a linear CPU-mappable buffer
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation>;

    /// Bind a GEM handle to a framebuffer object, returning its id
    fn add_framebuffer(&self, spec: &FramebufferSpec) -> io::Result<u32>;

    /// Remove a framebuffer object
    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    /// Prepare a dumb buffer for mmap, returning the fake mmap offset
    fn map_dumb(&self, handle: u32) -> io::Result<u64>;

    /// Map `len` bytes at `offset`, fill them with `value` and unmap
    fn fill_mapping(&self, offset: u64, len: usize, value: u8) -> io::Result<()>;

    /// Destroy a dumb buffer (releases its GEM handle)
    fn destroy_dumb(&self, handle: u32) -> io::Result<()>;

    /// Export a GEM handle as a dma-buf descriptor
    fn export_handle(&self, handle: u32) -> io::Result<OwnedFd>;

    /// Close a GEM handle
    fn close_handle(&self, handle: u32) -> io::Result<()>;

    /// Query or create a handle for a guest's scanned-out surface
    fn scanout_buffer(&self, request: &ScanOutRequest) -> io::Result<ScanOutBuffer>;
}
