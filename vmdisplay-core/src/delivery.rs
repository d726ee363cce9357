//! Frame delivery boundary
//!
//! The acquisition engine hands every frame to a [`FrameSink`]: first the
//! dma-buf descriptor is wrapped into the sink's buffer type, then the layout
//! metadata is attached. The engine never reads the buffer back.
//!
//! [`DmaBufSink`] is the stock sink; it produces self-describing
//! [`DmaBufFrame`] values.

use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr;

use crate::error::{Result, VmDisplayError};
use crate::geometry::VideoMeta;

/// Consumer of exported frames
pub trait FrameSink {
    /// Output buffer type
    type Buffer;

    /// Whether the sink can adopt dma-buf descriptors at all
    fn is_available(&self) -> bool {
        true
    }

    /// Adopt `fd`, which is backed by at least `size` bytes
    fn wrap(&mut self, fd: OwnedFd, size: usize) -> Result<Self::Buffer>;

    /// Describe the buffer layout
    fn attach_geometry(&mut self, buffer: &mut Self::Buffer, meta: &VideoMeta) -> Result<()>;
}

/// A dma-buf backed output buffer
#[derive(Debug)]
pub struct DmaBufFrame {
    /// dma-buf descriptor
    pub fd: OwnedFd,
    /// Size of the buffer in bytes
    pub size: usize,
    /// Layout, once attached
    pub meta: Option<VideoMeta>,
    /// Sequence number within the session
    pub sequence: u64,
}

impl DmaBufFrame {
    /// Bytes plane 0 spans according to the attached layout
    pub fn plane_bytes(&self) -> Option<usize> {
        self.meta
            .as_ref()
            .map(|meta| meta.offsets[0] + meta.strides[0].max(0) as usize * meta.height as usize)
    }

    /// Whether the attached layout of plane 0 lies inside the buffer
    ///
    /// Dumb buffers are described with an aligned stride that can be wider
    /// than the pitch the kernel picked, so this can be false for them.
    pub fn plane_fits(&self) -> bool {
        self.plane_bytes().is_some_and(|bytes| bytes <= self.size)
    }

    /// Copy the pixels of plane 0 into CPU memory
    ///
    /// Maps the dma-buf read-only and private. Intended for debugging dumps;
    /// it defeats the point of zero-copy hand-off.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| VmDisplayError::delivery("frame has no layout metadata"))?;

        let offset = meta.offsets[0];
        let len = meta.strides[0].max(0) as usize * meta.height as usize;
        let map_size = offset + len;
        if !self.plane_fits() {
            return Err(VmDisplayError::delivery(format!(
                "layout needs {} bytes but buffer holds {}",
                map_size, self.size
            )));
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_size,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                self.fd.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(VmDisplayError::Mapping(std::io::Error::last_os_error()));
        }

        let mut buffer = vec![0u8; len];
        // Safety: the mapping covers offset + len readable bytes.
        unsafe {
            ptr::copy_nonoverlapping(ptr.cast::<u8>().add(offset), buffer.as_mut_ptr(), len);
        }

        if unsafe { libc::munmap(ptr, map_size) } != 0 {
            // Log but don't fail - we already have the data
            tracing::warn!("munmap failed: {}", std::io::Error::last_os_error());
        }

        Ok(buffer)
    }
}

/// Sink producing [`DmaBufFrame`]s
#[derive(Debug, Default)]
pub struct DmaBufSink {
    next_sequence: u64,
}

impl DmaBufSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for DmaBufSink {
    type Buffer = DmaBufFrame;

    fn wrap(&mut self, fd: OwnedFd, size: usize) -> Result<DmaBufFrame> {
        if size == 0 {
            return Err(VmDisplayError::delivery("refusing to wrap an empty buffer"));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(DmaBufFrame {
            fd,
            size,
            meta: None,
            sequence,
        })
    }

    fn attach_geometry(&mut self, buffer: &mut DmaBufFrame, meta: &VideoMeta) -> Result<()> {
        if meta.n_planes == 0 || meta.n_planes > meta.offsets.len() {
            return Err(VmDisplayError::delivery(format!(
                "invalid plane count {}",
                meta.n_planes
            )));
        }
        buffer.meta = Some(*meta);
        Ok(())
    }
}
