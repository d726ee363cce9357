//! Buffer geometry and alignment helpers
//!
//! Shared by both acquisition strategies: the negotiated [`VideoInfo`], the
//! per-frame [`BufferGeometry`] and the [`VideoMeta`] handed to the sink.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VmDisplayError};
use crate::formats::VideoFormat;

/// Row alignment of dumb buffers, in pixels
pub const DUMB_ROW_ALIGN: u32 = 32;

/// Bits per pixel requested for dumb buffers
pub const DUMB_BPP: u32 = 32;

/// Color depth used when registering framebuffers
pub const FB_DEPTH: u32 = 24;

/// Kernel page size assumed for GVT buffer sizing
pub const PAGE_SIZE: u64 = 0x1000;
const PAGE_SHIFT: u32 = 12;

/// Maximum number of planes a [`VideoMeta`] can describe
pub const MAX_PLANES: usize = 4;

/// Round `value` up to the next multiple of `align` (a power of two)
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Row stride in bytes for a 32-bit packed buffer of `width` pixels
///
/// Computed in 64 bits; widths near `i32::MAX` give strides no stride
/// field can hold.
pub const fn aligned_stride(width: u32) -> u64 {
    align_up(width as u64, DUMB_ROW_ALIGN as u64) * 4
}

/// Negotiated output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Pixel format
    pub format: VideoFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Framerate numerator
    pub fps_n: u32,
    /// Framerate denominator
    pub fps_d: u32,
}

impl VideoInfo {
    /// Create a new video info with a 0/1 (variable) framerate
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            fps_n: 0,
            fps_d: 1,
        }
    }

    /// Set the framerate
    pub fn with_framerate(mut self, fps_n: u32, fps_d: u32) -> Self {
        self.fps_n = fps_n;
        self.fps_d = fps_d;
        self
    }

    /// Check the value ranges the source advertises
    ///
    /// Pixel format support is checked separately at acquisition time.
    pub fn validate(&self) -> Result<()> {
        let max = i32::MAX as u32;
        if self.width == 0 || self.width > max || self.height == 0 || self.height > max {
            return Err(VmDisplayError::config(format!(
                "Invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.fps_n > max || self.fps_d == 0 || self.fps_d > max {
            return Err(VmDisplayError::config(format!(
                "Invalid framerate {}/{}",
                self.fps_n, self.fps_d
            )));
        }
        Ok(())
    }

    /// Stride the sink is told about for this format
    ///
    /// Fails when the aligned row does not fit the signed 32-bit stride
    /// field of [`VideoMeta`].
    pub fn stride(&self) -> Result<u32> {
        let stride = aligned_stride(self.width);
        match i32::try_from(stride) {
            Ok(stride) => Ok(stride as u32),
            Err(_) => Err(VmDisplayError::unsupported_format(format!(
                "{} width {} needs a {}-byte row stride",
                self.format, self.width, stride
            ))),
        }
    }
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self::new(VideoFormat::Bgrx, 1920, 1080).with_framerate(60, 1)
    }
}

impl std::fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}/{}",
            self.format, self.width, self.height, self.fps_n, self.fps_d
        )
    }
}

/// Memory layout of a scanned-out surface, as reported by GVT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiling {
    Linear,
    X,
    Y,
    Yf,
    Other(u8),
}

impl Tiling {
    /// Decode the plane control tiling field
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Linear,
            1 => Self::X,
            4 => Self::Y,
            5 => Self::Yf,
            other => Self::Other(other),
        }
    }

    /// Row alignment the GGTT mapping needs for this layout
    pub fn height_alignment(&self) -> u32 {
        match self {
            Self::Y => 32,
            _ => 8,
        }
    }
}

/// Page count needed to map `stride * height` with tile-aligned rows
pub fn gvt_size_pages(stride: u32, height: u32, tiling: Tiling) -> u32 {
    let aligned_height = align_up(height as u64, tiling.height_alignment() as u64);
    let bytes = stride as u64 * aligned_height;
    ((bytes + PAGE_SIZE - 1) >> PAGE_SHIFT) as u32
}

/// Geometry of an acquired buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub bpp: u32,
    /// Row stride in bytes
    pub pitch: u32,
    /// Offset of the first plane
    pub offset: u32,
    /// Layout of the memory
    pub tiling: Tiling,
    /// Size of the backing allocation in bytes
    pub size: u64,
}

impl BufferGeometry {
    /// Bytes covered by `pitch * height`
    pub fn frame_bytes(&self) -> u64 {
        self.pitch as u64 * self.height as u64
    }
}

/// Layout metadata attached to an output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMeta {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub n_planes: usize,
    pub offsets: [usize; MAX_PLANES],
    pub strides: [i32; MAX_PLANES],
}

impl VideoMeta {
    /// Single-plane metadata for a packed RGB buffer
    ///
    /// `stride` must fit an `i32`; see [`VideoInfo::stride`].
    pub fn single_plane(format: VideoFormat, width: u32, height: u32, offset: u32, stride: u32) -> Self {
        let mut offsets = [0; MAX_PLANES];
        let mut strides = [0; MAX_PLANES];
        offsets[0] = offset as usize;
        debug_assert!(i32::try_from(stride).is_ok(), "stride {} overflows i32", stride);
        strides[0] = stride as i32;
        Self {
            format,
            width,
            height,
            n_planes: 1,
            offsets,
            strides,
        }
    }

    /// Offsets of the planes in use
    pub fn plane_offsets(&self) -> &[usize] {
        &self.offsets[..self.n_planes]
    }

    /// Strides of the planes in use
    pub fn plane_strides(&self) -> &[i32] {
        &self.strides[..self.n_planes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(1000, 32), 1024);
        assert_eq!(align_up(1081, 8), 1088);
    }

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(1920), 7680);
        assert_eq!(aligned_stride(1000), 4096);
        assert_eq!(aligned_stride(1), 128);
        assert_eq!(aligned_stride(u32::MAX), (u32::MAX as u64 + 1) * 4);
    }

    #[test]
    fn test_stride_must_fit_i32() {
        let widest = VideoInfo::new(VideoFormat::Bgrx, 536_870_880, 1);
        assert_eq!(widest.stride().unwrap(), 2_147_483_520);

        let too_wide = VideoInfo::new(VideoFormat::Bgrx, i32::MAX as u32, 1);
        assert!(too_wide.validate().is_ok());
        assert!(matches!(too_wide.stride(), Err(VmDisplayError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_tiling_alignment() {
        assert_eq!(Tiling::from_raw(4), Tiling::Y);
        assert_eq!(Tiling::Y.height_alignment(), 32);
        assert_eq!(Tiling::X.height_alignment(), 8);
        assert_eq!(Tiling::from_raw(9).height_alignment(), 8);
    }

    #[test]
    fn test_gvt_size_pages() {
        // 1080 rows Y-tiled pad to 1088
        assert_eq!(gvt_size_pages(7680, 1080, Tiling::Y), (7680 * 1088_u32).div_ceil(4096));
        // linear 1080 is already 8-aligned
        assert_eq!(gvt_size_pages(7680, 1080, Tiling::Linear), 2025);
        assert_eq!(gvt_size_pages(4096, 1, Tiling::Linear), 8);
    }

    #[test]
    fn test_video_info_validate() {
        assert!(VideoInfo::default().validate().is_ok());
        assert!(VideoInfo::new(VideoFormat::Bgrx, 0, 1080).validate().is_err());
        assert!(
            VideoInfo::new(VideoFormat::Bgrx, 640, 480)
                .with_framerate(30, 0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_single_plane_meta() {
        let meta = VideoMeta::single_plane(VideoFormat::Bgrx, 1920, 1080, 0, 7680);
        assert_eq!(meta.plane_offsets(), &[0]);
        assert_eq!(meta.plane_strides(), &[7680]);
    }
}
