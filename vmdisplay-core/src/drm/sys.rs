//! Kernel ABI for the DRM ioctls used by the acquisition strategies
//!
//! Layouts follow `include/uapi/drm/drm.h`, `drm_mode.h` and the GVT-g
//! `i915_drm.h` extension.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_uint, c_ulong};

use bytemuck::Zeroable;
use nix::{ioctl_readwrite, ioctl_write_ptr};

const DRM_IOCTL_BASE: u8 = b'd';
const DRM_COMMAND_BASE: u8 = 0x40;

const DRM_IOCTL_VERSION: u8 = 0x00;
const DRM_IOCTL_GEM_CLOSE: u8 = 0x09;
const DRM_IOCTL_PRIME_HANDLE_TO_FD: u8 = 0x2d;
const DRM_IOCTL_MODE_ADDFB: u8 = 0xAE;
const DRM_IOCTL_MODE_RMFB: u8 = 0xAF;
const DRM_IOCTL_MODE_CREATE_DUMB: u8 = 0xB2;
const DRM_IOCTL_MODE_MAP_DUMB: u8 = 0xB3;
const DRM_IOCTL_MODE_DESTROY_DUMB: u8 = 0xB4;
const DRM_I915_GEM_GVTBUFFER: u8 = 0x36;

/// `DRM_CLOEXEC` is defined as `O_CLOEXEC`
pub const DRM_CLOEXEC: u32 = libc::O_CLOEXEC as u32;
/// `DRM_RDWR` is defined as `O_RDWR`
pub const DRM_RDWR: u32 = libc::O_RDWR as u32;

pub const I915_GVT_PLANE_PRIMARY: u32 = 1;
pub const I915_GVTBUFFER_QUERY_ONLY: u32 = 1 << 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct drm_version {
    pub version_major: c_int,
    pub version_minor: c_int,
    pub version_patchlevel: c_int,
    pub name_len: c_ulong,
    pub name: *mut c_char,
    pub date_len: c_ulong,
    pub date: *mut c_char,
    pub desc_len: c_ulong,
    pub desc: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_gem_close {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_prime_handle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_mode_fb_cmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_mode_destroy_dumb {
    pub handle: u32,
}

/// GVT-g guest surface query/creation
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct drm_i915_gem_gvtbuffer {
    pub id: u32,
    pub plane_id: u32,
    pub pipe_id: u32,
    pub phys_pipe_id: u32,
    pub enabled: u8,
    pub tiled: u8,
    pub bpp: u32,
    pub hw_format: u32,
    pub drm_format: u32,
    pub start: u32,
    pub x_pos: u32,
    pub y_pos: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub user_ptr: u64,
    pub user_size: u32,
    pub flags: u32,
    pub handle: u32,
}

ioctl_readwrite!(drm_get_version, DRM_IOCTL_BASE, DRM_IOCTL_VERSION, drm_version);
ioctl_write_ptr!(drm_gem_close_ioctl, DRM_IOCTL_BASE, DRM_IOCTL_GEM_CLOSE, drm_gem_close);
ioctl_readwrite!(
    drm_prime_handle_to_fd,
    DRM_IOCTL_BASE,
    DRM_IOCTL_PRIME_HANDLE_TO_FD,
    drm_prime_handle
);
ioctl_readwrite!(drm_mode_addfb, DRM_IOCTL_BASE, DRM_IOCTL_MODE_ADDFB, drm_mode_fb_cmd);
ioctl_readwrite!(drm_mode_rmfb, DRM_IOCTL_BASE, DRM_IOCTL_MODE_RMFB, c_uint);
ioctl_readwrite!(
    drm_mode_create_dumb_ioctl,
    DRM_IOCTL_BASE,
    DRM_IOCTL_MODE_CREATE_DUMB,
    drm_mode_create_dumb
);
ioctl_readwrite!(
    drm_mode_map_dumb_ioctl,
    DRM_IOCTL_BASE,
    DRM_IOCTL_MODE_MAP_DUMB,
    drm_mode_map_dumb
);
ioctl_readwrite!(
    drm_mode_destroy_dumb_ioctl,
    DRM_IOCTL_BASE,
    DRM_IOCTL_MODE_DESTROY_DUMB,
    drm_mode_destroy_dumb
);
ioctl_readwrite!(
    drm_i915_gem_gvtbuffer_ioctl,
    DRM_IOCTL_BASE,
    DRM_COMMAND_BASE + DRM_I915_GEM_GVTBUFFER,
    drm_i915_gem_gvtbuffer
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_match_uapi() {
        assert_eq!(std::mem::size_of::<drm_mode_create_dumb>(), 32);
        assert_eq!(std::mem::size_of::<drm_mode_map_dumb>(), 16);
        assert_eq!(std::mem::size_of::<drm_mode_fb_cmd>(), 28);
        assert_eq!(std::mem::size_of::<drm_prime_handle>(), 12);
        assert_eq!(std::mem::size_of::<drm_gem_close>(), 8);
    }
}
