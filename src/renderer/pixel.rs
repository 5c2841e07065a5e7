//! Packed 32-bit pixel arithmetic
//!
//! Pixels are `u32` values laid out as `0xAARRGGBB`, which on little-endian
//! machines puts the bytes in B, G, R, A order, matching wl_shm's
//! `xrgb8888`/`argb8888` formats.

use crate::config::PixelFormat;

/// Scale every channel of `color` by `level / 255`.
#[inline]
pub fn scale(color: u32, level: u32) -> u32 {
    let level = level.min(255);
    let mut out = 0;
    for shift in [0, 8, 16, 24] {
        let channel = (color >> shift) & 0xff;
        out |= (channel * level / 255) << shift;
    }
    out
}

/// Per-channel maximum of two pixels.
#[inline]
pub fn max_channels(a: u32, b: u32) -> u32 {
    let mut out = 0;
    for shift in [0, 8, 16, 24] {
        let mask = 0xff << shift;
        out |= (a & mask).max(b & mask);
    }
    out
}

/// Force the padding byte to `0xff` in formats without alpha.
#[inline]
pub fn for_format(color: u32, format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Xrgb8888 => color | 0xff00_0000,
        PixelFormat::Argb8888 => color,
    }
}
