//! Pixel format constants and conversions
//!
//! Maps the video format names negotiated with the downstream pipeline onto
//! DRM fourcc codes. Only the two 32-bit packed RGB layouts can be captured;
//! the other names are recognised so they can be rejected with a clear error.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VmDisplayError};

/// DRM format fourcc constants
///
/// See: <https://github.com/torvalds/linux/blob/master/include/uapi/drm/drm_fourcc.h>
pub mod fourcc {
    /// XRGB8888 - bytes B, G, R, X in memory
    pub const XRGB8888: u32 = 0x34325258; // XR24
    /// XBGR8888 - bytes R, G, B, X in memory
    pub const XBGR8888: u32 = 0x34324258; // XB24
    /// ARGB8888 - bytes B, G, R, A in memory
    pub const ARGB8888: u32 = 0x34325241; // AR24
    /// ABGR8888 - bytes R, G, B, A in memory
    pub const ABGR8888: u32 = 0x34324241; // AB24
    /// NV12 - YUV 4:2:0 semi-planar
    pub const NV12: u32 = 0x3231564E; // NV12
    /// YUYV - YUV 4:2:2 packed
    pub const YUYV: u32 = 0x56595559; // YUYV
}

/// Raw video format as negotiated with the downstream pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoFormat {
    /// 32-bit B, G, R, padding
    #[default]
    #[serde(rename = "BGRx")]
    Bgrx,
    /// 32-bit R, G, B, padding
    #[serde(rename = "RGBx")]
    Rgbx,
    #[serde(rename = "BGRA")]
    Bgra,
    #[serde(rename = "RGBA")]
    Rgba,
    #[serde(rename = "NV12")]
    Nv12,
    #[serde(rename = "YUY2")]
    Yuy2,
}

impl VideoFormat {
    /// Formats a capture can be produced in
    pub const SUPPORTED: [VideoFormat; 2] = [VideoFormat::Bgrx, VideoFormat::Rgbx];

    /// Whether frames can be acquired in this format
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    /// Return `self` if supported, otherwise an `UnsupportedFormat` error
    pub fn ensure_supported(self) -> Result<Self> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(VmDisplayError::unsupported_format(format!(
                "{} (expected one of BGRx, RGBx)",
                self
            )))
        }
    }

    /// Matching DRM fourcc
    pub fn fourcc(&self) -> u32 {
        match self {
            Self::Bgrx => fourcc::XRGB8888,
            Self::Rgbx => fourcc::XBGR8888,
            Self::Bgra => fourcc::ARGB8888,
            Self::Rgba => fourcc::ABGR8888,
            Self::Nv12 => fourcc::NV12,
            Self::Yuy2 => fourcc::YUYV,
        }
    }

    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Bgrx | Self::Rgbx | Self::Bgra | Self::Rgba => 4,
            Self::Yuy2 => 2,
            Self::Nv12 => 1,
        }
    }

    /// Caps-style name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bgrx => "BGRx",
            Self::Rgbx => "RGBx",
            Self::Bgra => "BGRA",
            Self::Rgba => "RGBA",
            Self::Nv12 => "NV12",
            Self::Yuy2 => "YUY2",
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = VmDisplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bgrx" | "xrgb8888" => Ok(Self::Bgrx),
            "rgbx" | "xbgr8888" => Ok(Self::Rgbx),
            "bgra" | "argb8888" => Ok(Self::Bgra),
            "rgba" | "abgr8888" => Ok(Self::Rgba),
            "nv12" => Ok(Self::Nv12),
            "yuy2" | "yuyv" => Ok(Self::Yuy2),
            _ => Err(VmDisplayError::unsupported_format(s)),
        }
    }
}

/// Format name for a fourcc, for logging
pub fn format_name(fourcc: u32) -> &'static str {
    use fourcc::*;
    match fourcc {
        XRGB8888 => "XRGB8888",
        XBGR8888 => "XBGR8888",
        ARGB8888 => "ARGB8888",
        ABGR8888 => "ABGR8888",
        NV12 => "NV12",
        YUYV => "YUYV",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        assert!(VideoFormat::Bgrx.is_supported());
        assert!(VideoFormat::Rgbx.is_supported());
        assert!(!VideoFormat::Bgra.is_supported());
        assert!(!VideoFormat::Nv12.is_supported());
    }

    #[test]
    fn test_ensure_supported_rejects_yuv() {
        let err = VideoFormat::Nv12.ensure_supported().unwrap_err();
        assert!(matches!(err, VmDisplayError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_caps_names() {
        assert_eq!("BGRx".parse::<VideoFormat>().unwrap(), VideoFormat::Bgrx);
        assert_eq!("rgbx".parse::<VideoFormat>().unwrap(), VideoFormat::Rgbx);
        assert_eq!("YUY2".parse::<VideoFormat>().unwrap(), VideoFormat::Yuy2);
        assert!("I420".parse::<VideoFormat>().is_err());
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(VideoFormat::Bgrx.fourcc(), fourcc::XRGB8888);
        assert_eq!(format_name(VideoFormat::Rgbx.fourcc()), "XBGR8888");
        assert_eq!(format_name(0xDEADBEEF), "Unknown");
    }
}
