//! DRM device node backed by real ioctls
//!
//! # Requirements
//!
//! - Read/write access to the node (root, or membership in the `video` group)
//! - For scan-out capture: an i915 kernel built with GVT-g and a running guest

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr;

use bytemuck::Zeroable;
use tracing::{debug, trace, warn};

use super::ioctl::retry_interrupted;
use super::sys;
use super::{DumbAllocation, FramebufferSpec, KernelDevice, ScanOutBuffer, ScanOutRequest};
use crate::error::{Result, VmDisplayError};

/// Name and version reported by the kernel driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVersion {
    pub name: String,
    pub major: i32,
    pub minor: i32,
    pub patchlevel: i32,
}

impl std::fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}.{}.{}", self.name, self.major, self.minor, self.patchlevel)
    }
}

/// An open DRM device node
///
/// The node is closed when the value is dropped.
#[derive(Debug)]
pub struct DrmCard {
    file: File,
    path: PathBuf,
}

impl DrmCard {
    /// Open a DRM node for read/write
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| VmDisplayError::device_open(path, e))?;

        debug!("Opened DRM device {:?} (fd {})", path, file.as_raw_fd());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path this card was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query the driver name and version
    pub fn driver_version(&self) -> io::Result<DriverVersion> {
        let fd = self.fd();
        let mut version = empty_version();

        // First call reports the name length only.
        retry_interrupted(|| unsafe { sys::drm_get_version(fd, &mut version) })?;

        let mut name = vec![0u8; version.name_len as usize + 1];
        let name_len = version.name_len;
        let mut version = empty_version();
        version.name_len = name_len;
        version.name = name.as_mut_ptr().cast();

        // No more than name_len bytes are written into `name`.
        retry_interrupted(|| unsafe { sys::drm_get_version(fd, &mut version) })?;

        name.truncate(version.name_len as usize);
        Ok(DriverVersion {
            name: String::from_utf8_lossy(&name).into_owned(),
            major: version.version_major,
            minor: version.version_minor,
            patchlevel: version.version_patchlevel,
        })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for DrmCard {
    fn drop(&mut self) {
        debug!("Closing DRM device {:?}", self.path);
    }
}

fn empty_version() -> sys::drm_version {
    sys::drm_version {
        version_major: 0,
        version_minor: 0,
        version_patchlevel: 0,
        name_len: 0,
        name: ptr::null_mut(),
        date_len: 0,
        date: ptr::null_mut(),
        desc_len: 0,
        desc: ptr::null_mut(),
    }
}

/// Unmaps on drop
struct Mapping {
    ptr: *mut libc::c_void,
    len: usize,
}

impl Mapping {
    fn new(fd: RawFd, offset: u64, len: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { ptr, len })
    }

    fn fill(&mut self, value: u8) {
        // Safety: the mapping is `len` bytes, writable and owned by us.
        unsafe { ptr::write_bytes(self.ptr.cast::<u8>(), value, self.len) };
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr, self.len) } != 0 {
            warn!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

impl KernelDevice for DrmCard {
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        let mut creq = sys::drm_mode_create_dumb::zeroed();
        creq.width = width;
        creq.height = height;
        creq.bpp = bpp;

        retry_interrupted(|| unsafe { sys::drm_mode_create_dumb_ioctl(self.fd(), &mut creq) })?;

        trace!(
            "CREATE_DUMB {}x{} -> handle {} pitch {} size {}",
            width, height, creq.handle, creq.pitch, creq.size
        );
        Ok(DumbAllocation {
            handle: creq.handle,
            pitch: creq.pitch,
            size: creq.size,
        })
    }

    fn add_framebuffer(&self, spec: &FramebufferSpec) -> io::Result<u32> {
        let mut cmd = sys::drm_mode_fb_cmd {
            fb_id: 0,
            width: spec.width,
            height: spec.height,
            pitch: spec.pitch,
            bpp: spec.bpp,
            depth: spec.depth,
            handle: spec.handle,
        };

        retry_interrupted(|| unsafe { sys::drm_mode_addfb(self.fd(), &mut cmd) })?;
        Ok(cmd.fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let mut id: libc::c_uint = fb_id;
        retry_interrupted(|| unsafe { sys::drm_mode_rmfb(self.fd(), &mut id) })?;
        Ok(())
    }

    fn map_dumb(&self, handle: u32) -> io::Result<u64> {
        let mut mreq = sys::drm_mode_map_dumb::zeroed();
        mreq.handle = handle;

        retry_interrupted(|| unsafe { sys::drm_mode_map_dumb_ioctl(self.fd(), &mut mreq) })?;
        Ok(mreq.offset)
    }

    fn fill_mapping(&self, offset: u64, len: usize, value: u8) -> io::Result<()> {
        let mut mapping = Mapping::new(self.fd(), offset, len)?;
        mapping.fill(value);
        Ok(())
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        let mut dreq = sys::drm_mode_destroy_dumb { handle };
        retry_interrupted(|| unsafe { sys::drm_mode_destroy_dumb_ioctl(self.fd(), &mut dreq) })?;
        Ok(())
    }

    fn export_handle(&self, handle: u32) -> io::Result<OwnedFd> {
        let mut preq = sys::drm_prime_handle {
            handle,
            flags: sys::DRM_CLOEXEC | sys::DRM_RDWR,
            fd: -1,
        };

        retry_interrupted(|| unsafe { sys::drm_prime_handle_to_fd(self.fd(), &mut preq) })?;

        if preq.fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "kernel returned a negative dma-buf fd",
            ));
        }

        // Safety: the kernel just created this descriptor for us.
        Ok(unsafe { OwnedFd::from_raw_fd(preq.fd) })
    }

    fn close_handle(&self, handle: u32) -> io::Result<()> {
        let req = sys::drm_gem_close { handle, pad: 0 };
        retry_interrupted(|| unsafe { sys::drm_gem_close_ioctl(self.fd(), &req) })?;
        Ok(())
    }

    fn scanout_buffer(&self, request: &ScanOutRequest) -> io::Result<ScanOutBuffer> {
        let mut vcreate = sys::drm_i915_gem_gvtbuffer::zeroed();
        vcreate.id = request.domain;
        vcreate.plane_id = sys::I915_GVT_PLANE_PRIMARY;
        vcreate.phys_pipe_id = u32::MAX;
        vcreate.pipe_id = request.pipe;
        if request.query_only {
            vcreate.flags = sys::I915_GVTBUFFER_QUERY_ONLY;
        } else {
            vcreate.size = request.size_pages;
        }

        retry_interrupted(|| unsafe { sys::drm_i915_gem_gvtbuffer_ioctl(self.fd(), &mut vcreate) })?;

        Ok(ScanOutBuffer {
            start: vcreate.start,
            width: vcreate.width,
            height: vcreate.height,
            stride: vcreate.stride,
            bpp: vcreate.bpp,
            drm_format: vcreate.drm_format,
            tiled: vcreate.tiled,
            handle: vcreate.handle,
        })
    }
}
