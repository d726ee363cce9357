//! Dumb-buffer acquisition
//!
//! Every frame gets a brand-new linear buffer: allocate, register as a
//! framebuffer, clear to opaque white, export. The GEM handle and
//! framebuffer id are handed back in [`AcquiredFrame::kernel`] and retired
//! through [`AcquisitionStrategy::release`] once the sink has adopted the
//! dma-buf, which keeps the memory alive on its own.

use std::os::fd::OwnedFd;

use tracing::{debug, warn};

use super::{AcquiredFrame, AcquisitionContext, AcquisitionStrategy, KernelBuffer};
use crate::drm::{FramebufferSpec, KernelDevice};
use crate::error::{Result, VmDisplayError};
use crate::geometry::{BufferGeometry, DUMB_BPP, FB_DEPTH, Tiling, VideoInfo, VideoMeta};

/// Byte written over fresh buffers so no stale memory is exposed
pub const CLEAR_VALUE: u8 = 0xFF;

/// Allocates and exports one dumb buffer per frame
#[derive(Debug, Default)]
pub struct DumbBufferStrategy {
    allocated: u64,
}

impl DumbBufferStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers allocated so far
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    fn clear_and_export<D: KernelDevice>(&self, device: &D, handle: u32, size: u64) -> Result<OwnedFd> {
        let offset = device.map_dumb(handle).map_err(VmDisplayError::Mapping)?;
        device
            .fill_mapping(offset, size as usize, CLEAR_VALUE)
            .map_err(VmDisplayError::Mapping)?;
        device.export_handle(handle).map_err(VmDisplayError::Export)
    }

    fn discard<D: KernelDevice>(device: &D, handle: u32, fb_id: Option<u32>) {
        if let Some(fb_id) = fb_id {
            if let Err(e) = device.remove_framebuffer(fb_id) {
                warn!("Failed to remove framebuffer {}: {}", fb_id, e);
            }
        }
        if let Err(e) = device.destroy_dumb(handle) {
            warn!("Failed to destroy dumb buffer {}: {}", handle, e);
        }
    }
}

impl<D: KernelDevice> AcquisitionStrategy<D> for DumbBufferStrategy {
    fn name(&self) -> &'static str {
        "dumb"
    }

    fn acquire(
        &mut self,
        device: &D,
        info: &VideoInfo,
        _ctx: &mut AcquisitionContext,
    ) -> Result<AcquiredFrame> {
        let format = info.format.ensure_supported()?;
        let stride = info.stride()?;

        let alloc = device
            .create_dumb(info.width, info.height, DUMB_BPP)
            .map_err(VmDisplayError::Allocation)?;
        self.allocated += 1;

        let fb_spec = FramebufferSpec {
            width: info.width,
            height: info.height,
            depth: FB_DEPTH,
            bpp: DUMB_BPP,
            pitch: alloc.pitch,
            handle: alloc.handle,
        };
        let fb_id = match device.add_framebuffer(&fb_spec) {
            Ok(id) => id,
            Err(e) => {
                Self::discard(device, alloc.handle, None);
                return Err(VmDisplayError::FramebufferRegistration(e));
            }
        };

        let fd = match self.clear_and_export(device, alloc.handle, alloc.size) {
            Ok(fd) => fd,
            Err(e) => {
                Self::discard(device, alloc.handle, Some(fb_id));
                return Err(e);
            }
        };

        debug!(
            "Exported dumb buffer handle={} fb={} size=0x{:x} stride={}",
            alloc.handle, fb_id, alloc.size, stride
        );

        Ok(AcquiredFrame {
            fd,
            geometry: BufferGeometry {
                width: info.width,
                height: info.height,
                bpp: DUMB_BPP / 8,
                pitch: stride,
                offset: 0,
                tiling: Tiling::Linear,
                size: alloc.size,
            },
            meta: VideoMeta::single_plane(format, info.width, info.height, 0, stride),
            size_hint: alloc.size as usize,
            kernel: Some(KernelBuffer {
                handle: alloc.handle,
                fb_id,
            }),
        })
    }

    fn release(&mut self, device: &D, kernel: KernelBuffer, ctx: &mut AcquisitionContext) {
        Self::discard(device, kernel.handle, Some(kernel.fb_id));
        ctx.stats.buffers_retired += 1;
    }

    fn shutdown(&mut self, _device: &D, _ctx: &mut AcquisitionContext) {}
}
