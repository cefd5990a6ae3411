//! Pixel buffers shared between capture, codec and display.
//!
//! Pixels are `u32` values laid out as `0xAARRGGBB`. The codec ignores
//! the alpha byte when building palettes but includes it in tile
//! hashes; decoded pixels always carry alpha 0.
//!
//! `stride` is the row pitch in **pixels** and may exceed `width`.

use crate::tycho::color;

// ── ImageView ────────────────────────────────────────────────────

/// Borrowed, read-only view of a pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    width: u32,
    height: u32,
    stride: u32,
    data: &'a [u32],
}

impl<'a> ImageView<'a> {
    /// Wrap `data` as `height` rows of `stride` pixels.
    ///
    /// Returns `None` when `stride < width` or `data` is too short.
    pub fn new(width: u32, height: u32, stride: u32, data: &'a [u32]) -> Option<Self> {
        if stride < width || data.len() < required_len(width, height, stride) {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Pixel at `(x, y)`, or 0 outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[(y * self.stride + x) as usize]
    }
}

// ── ImageViewMut ─────────────────────────────────────────────────

/// Borrowed, writable view of a pixel buffer.
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    width: u32,
    height: u32,
    stride: u32,
    data: &'a mut [u32],
}

impl<'a> ImageViewMut<'a> {
    /// Same contract as [`ImageView::new`].
    pub fn new(width: u32, height: u32, stride: u32, data: &'a mut [u32]) -> Option<Self> {
        if stride < width || data.len() < required_len(width, height, stride) {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill the `w x h` rectangle at `(x, y)` from `pixel(i, j)`,
    /// clipped to the image.
    pub fn paint(&mut self, x: u32, y: u32, w: u32, h: u32, pixel: impl Fn(u32, u32) -> u32) {
        let w = w.min(self.width.saturating_sub(x));
        let h = h.min(self.height.saturating_sub(y));
        for j in 0..h {
            let row = ((y + j) * self.stride + x) as usize;
            for i in 0..w {
                self.data[row + i as usize] = pixel(i, j);
            }
        }
    }
}

fn required_len(width: u32, height: u32, stride: u32) -> usize {
    if height == 0 || width == 0 {
        return 0;
    }
    (height as usize - 1) * stride as usize + width as usize
}

// ── Image ────────────────────────────────────────────────────────

/// An owned pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    width: u32,
    height: u32,
    stride: u32,
    data: Vec<u32>,
}

impl Image {
    /// A black image with `stride == width`.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_stride(width, height, width)
    }

    /// A black image with explicit row pitch; `stride` is raised to
    /// `width` if smaller.
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Self {
        let stride = stride.max(width);
        Self {
            width,
            height,
            stride,
            data: vec![0; stride as usize * height as usize],
        }
    }

    /// An image filled by `f(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u32) -> Self {
        let mut img = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.data[(y * width + x) as usize] = f(x, y);
            }
        }
        img
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Raw pixel storage, `stride * height` entries.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.view().pixel(x, y)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, c: u32) {
        if x < self.width && y < self.height {
            self.data[(y * self.stride + x) as usize] = c;
        }
    }

    /// Fill every pixel with `c`.
    pub fn fill(&mut self, c: u32) {
        self.data.fill(c);
    }

    /// Reallocate to `width x height` if the size differs; content is
    /// cleared when it does.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &self.data,
        }
    }

    pub fn view_mut(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data: &mut self.data,
        }
    }

    /// Visible pixels in row-major order, without row padding.
    pub fn pixels(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| self.pixel(x, y)))
    }

    /// This image after each pixel went through the codec's colour
    /// transform and back: what a full-precision decode yields.
    pub fn reconstructed(&self) -> Image {
        Image::from_fn(self.width, self.height, |x, y| {
            let [y_, u, v] = color::to_yuv(self.pixel(x, y));
            color::from_yuv(y_, u, v)
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_rejects_short_stride() {
        let data = vec![0u32; 64];
        assert!(ImageView::new(8, 8, 7, &data).is_none());
        assert!(ImageView::new(8, 8, 8, &data).is_some());
        assert!(ImageView::new(8, 9, 8, &data).is_none());
    }

    #[test]
    fn padded_rows_are_skipped() {
        let mut img = Image::with_stride(3, 2, 5);
        img.set_pixel(2, 1, 7);
        assert_eq!(img.data()[5 + 2], 7);
        assert_eq!(img.pixels().collect::<Vec<_>>(), vec![0, 0, 0, 0, 0, 7]);
        assert_eq!(img.pixel(4, 0), 0);
    }

    #[test]
    fn paint_clips_to_image() {
        let mut img = Image::new(10, 10);
        img.view_mut().paint(8, 8, 8, 8, |_, _| 1);
        assert_eq!(img.pixels().filter(|&p| p == 1).count(), 4);
    }

    #[test]
    fn resize_reports_change() {
        let mut img = Image::new(4, 4);
        assert!(!img.resize(4, 4));
        assert!(img.resize(5, 4));
        assert_eq!(img.data().len(), 20);
    }
}
