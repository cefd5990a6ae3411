//! Luma/chroma transform used by the palette coder.
//!
//! ```text
//! y = (r + 2g + b) / 4      r = 2v + y - 255
//! u = (b + 255 - y) / 2     b = 2u + y - 255
//! v = (r + 255 - y) / 2     g = y - u - v + 255
//! ```
//!
//! The forward transform drops low bits, so the round trip is close
//! but not exact.

/// Pack three channels as `0x00RRGGBB`.
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Split a pixel into `[r, g, b]`, ignoring alpha.
pub const fn channels(c: u32) -> [u8; 3] {
    [(c >> 16) as u8, (c >> 8) as u8, c as u8]
}

/// Forward transform, returns `[y, u, v]`.
pub fn to_yuv(c: u32) -> [u8; 3] {
    let [r, g, b] = channels(c).map(u32::from);
    let y = (r + (g << 1) + b) >> 2;
    let u = (b + (255 - y)) >> 1;
    let v = (r + (255 - y)) >> 1;
    [y as u8, u as u8, v as u8]
}

/// Inverse transform with clamping; alpha is 0.
pub fn from_yuv(y: u8, u: u8, v: u8) -> u32 {
    let (y, u, v) = (y as i32, u as i32, v as i32);
    let r = (2 * v + y - 255).clamp(0, 255);
    let b = (2 * u + y - 255).clamp(0, 255);
    let g = (y - v - u + 255).clamp(0, 255);
    rgb(r as u8, g as u8, b as u8)
}
