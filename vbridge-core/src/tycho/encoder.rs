//! Encode side: palette extraction, progressive refinement and the
//! per-recipient tile stream.

use crate::buffer::Buffer;
use crate::image::ImageView;
use crate::step::Step;

use super::color;
use super::model::{COUNT_BITS, INDEX_BITS, index_context};
use super::tile::{MAX_COLORS, TILE_PIXELS, TILE_SIZE, Tile, TileGrid};
use super::{Resume, Tycho};

// ── Quality ──────────────────────────────────────────────────────

/// Deepest quantisation: full 8 bits per channel.
pub const MAX_DEPTH: u8 = 8;

/// Bounds on the palette quantisation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality {
    min: u8,
    max: u8,
}

impl Quality {
    /// Both bounds are clamped to `1..=`[`MAX_DEPTH`], `min` to `max`.
    pub fn new(min: u8, max: u8) -> Self {
        let max = max.clamp(1, MAX_DEPTH);
        Self {
            min: min.clamp(1, max),
            max,
        }
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::new(3, 5)
    }
}

// ── Palette extraction ───────────────────────────────────────────

/// Palette and index map of one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub count: u8,
    pub colors: [u8; MAX_COLORS * 3],
    pub index: [u8; TILE_PIXELS],
}

/// Group the 64 pixels by luma/chroma value quantised to `depth` bits
/// per channel, in first-seen order.
///
/// Returns `None` when more than [`MAX_COLORS`] groups are needed.
pub fn build_palette(pixels: &[u32; TILE_PIXELS], depth: u8) -> Option<Palette> {
    let keep = (0xFFu32 >> (8 - depth as u32)) << (8 - depth as u32);
    let mask = keep | keep << 8 | keep << 16;

    // key, pixel count, channel sums
    let mut buckets = [(0u32, 0u32, [0u32; 3]); MAX_COLORS];
    let mut count = 0;
    let mut index = [0u8; TILE_PIXELS];

    for (slot, &c) in index.iter_mut().zip(pixels.iter()) {
        let yuv = color::to_yuv(c);
        let key = color::rgb(yuv[0], yuv[1], yuv[2]) & mask;

        let k = match buckets[..count].iter().position(|b| b.0 == key) {
            Some(k) => k,
            None if count == MAX_COLORS => return None,
            None => {
                buckets[count].0 = key;
                count += 1;
                count - 1
            }
        };

        let bucket = &mut buckets[k];
        bucket.1 += 1;
        for (sum, v) in bucket.2.iter_mut().zip(yuv) {
            *sum += v as u32;
        }
        *slot = k as u8;
    }

    let mut colors = [0u8; MAX_COLORS * 3];
    for (k, (_, n, sums)) in buckets[..count].iter().enumerate() {
        for (ch, sum) in sums.iter().enumerate() {
            colors[k * 3 + ch] = (sum / n) as u8;
        }
    }

    Some(Palette {
        count: count as u8,
        colors,
        index,
    })
}

/// Whether a tile whose content did not change is due for a refinement
/// attempt this frame. Deeper tiles wait longer between attempts.
fn refinement_due(tile: &Tile, quality: Quality) -> bool {
    tile.depth_step as i32 >= tile.depth as i32 - quality.min as i32 + 1
}

/// Re-code `tile` from `pixels` if its content changed or a refinement
/// step is due. Returns whether the tile's palette changed.
fn update_tile(tile: &mut Tile, pixels: &[u32; TILE_PIXELS], quality: Quality) -> bool {
    let hash = pixels
        .iter()
        .fold(0u32, |h, &c| h.wrapping_mul(31).wrapping_add(c))
        | 1;
    let unchanged = hash == tile.hash;

    let mut depth = if unchanged {
        if tile.depth_stop {
            return false;
        }
        if !refinement_due(tile, quality) {
            tile.depth_step += 1;
            return false;
        }
        tile.depth + 1
    } else {
        tile.depth_stop = false;
        quality.min
    };
    depth = depth.clamp(quality.min, quality.max);

    let palette = loop {
        if let Some(p) = build_palette(pixels, depth) {
            break p;
        }
        tile.depth_stop = true;
        if unchanged {
            return false;
        }
        depth -= 1;
    };

    tile.colors = palette.colors;
    if palette.count > 1 {
        tile.index = palette.index;
    }
    if depth == quality.max {
        tile.depth_stop = true;
    }
    tile.depth = depth;
    tile.depth_step = 0;
    tile.hash = hash;
    tile.count = palette.count;
    true
}

// ── CaptureGrid ──────────────────────────────────────────────────

/// Server-wide tile grid fed by the display capture, shared by every
/// recipient's encoder.
#[derive(Debug, Clone, Default)]
pub struct CaptureGrid {
    grid: TileGrid,
    quality: Quality,
}

impl CaptureGrid {
    pub fn new(quality: Quality) -> Self {
        Self {
            grid: TileGrid::default(),
            quality,
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    /// Fold a new capture into the grid; returns how many tiles changed.
    pub fn set_image(&mut self, image: ImageView<'_>) -> usize {
        self.grid.resize(image.width(), image.height());

        let mut changed = 0;
        let mut pixels = [0u32; TILE_PIXELS];

        for n in 0..self.grid.len() {
            let (x0, y0, w, h) = self.grid.extent(n);
            for j in 0..TILE_SIZE {
                for i in 0..TILE_SIZE {
                    pixels[(j * TILE_SIZE + i) as usize] = if i < w && j < h {
                        image.pixel(x0 + i, y0 + j)
                    } else {
                        0
                    };
                }
            }
            if update_tile(self.grid.tile_mut(n), &pixels, self.quality) {
                changed += 1;
            }
        }

        changed
    }
}

// ── Encoding ─────────────────────────────────────────────────────

impl Tycho {
    /// Start a frame for one recipient: what was sent last becomes the
    /// delta reference and the shared grid becomes the frame to send.
    pub fn begin_frame(&mut self, capture: &CaptureGrid) {
        self.setup(capture.width(), capture.height());
        std::mem::swap(&mut self.tiles, &mut self.old);
        self.tiles.copy_from(capture.grid());
    }

    /// Write as much of the frame as fits into `out`.
    pub fn encode(&mut self, out: &mut Buffer) -> Step {
        while self.cursor < self.tiles.len() {
            match self.encode_tile(out, self.cursor) {
                Step::Ready(coded) => self.coded += usize::from(coded),
                Step::Pending => return Step::Pending,
            }
            self.cursor += 1;
        }

        if self.flush {
            if self.coder.finish_encode(out).is_pending() {
                return Step::Pending;
            }
            self.flush = false;
        }

        Step::Ready(())
    }

    /// Code tile `n`; `Ready(false)` when it was skipped as unchanged.
    fn encode_tile(&mut self, out: &mut Buffer, n: usize) -> Step<bool> {
        let tile = *self.tiles.tile(n);

        loop {
            match self.resume {
                Resume::Count => {
                    let skip = n < self.old.len() && tile.same_content(self.old.tile(n));
                    let count = if skip { 0 } else { tile.count };
                    let ctx = self.models.count_ctx;
                    if self
                        .coder
                        .encode(out, &mut self.models.count, count as u32, COUNT_BITS, ctx)
                        .is_pending()
                    {
                        return Step::Pending;
                    }
                    self.models.push_count(count);
                    if count == 0 {
                        return Step::Ready(false);
                    }
                    self.resume = Resume::Palette { count, k: 0 };
                }
                Resume::Palette { count, k } => {
                    if k == count * 3 {
                        if count == 1 {
                            self.resume = Resume::Count;
                            return Step::Ready(true);
                        }
                        self.resume = Resume::Index { count, pos: 1, pmax: 0 };
                        continue;
                    }
                    let ch = (k % 3) as usize;
                    let value = tile.colors[k as usize];
                    let ctx = self.models.color_ctx[ch];
                    if self
                        .coder
                        .encode(out, &mut self.models.color[ch], value as u32, 8, ctx)
                        .is_pending()
                    {
                        return Step::Pending;
                    }
                    self.models.color_ctx[ch] = value as u32;
                    self.resume = Resume::Palette { count, k: k + 1 };
                }
                Resume::Index { count, pos, pmax } => {
                    if pos as usize == TILE_PIXELS {
                        self.resume = Resume::Count;
                        return Step::Ready(true);
                    }
                    let value = tile.index[pos as usize];
                    let ctx = index_context(&tile.index, pos as usize);
                    let bits = INDEX_BITS[pmax as usize];
                    if self
                        .coder
                        .encode(out, &mut self.models.index[pmax as usize], value as u32, bits, ctx)
                        .is_pending()
                    {
                        return Step::Pending;
                    }
                    self.resume = Resume::Index {
                        count,
                        pos: pos + 1,
                        pmax: pmax.max(value),
                    };
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn tile_of(f: impl Fn(usize) -> u32) -> [u32; TILE_PIXELS] {
        std::array::from_fn(f)
    }

    #[test]
    fn quality_is_clamped() {
        let q = Quality::new(9, 12);
        assert_eq!((q.min(), q.max()), (8, 8));
        let q = Quality::new(6, 4);
        assert_eq!((q.min(), q.max()), (4, 4));
        let q = Quality::new(0, 0);
        assert_eq!((q.min(), q.max()), (1, 1));
    }

    #[test]
    fn flat_tile_has_one_color() {
        let p = build_palette(&tile_of(|_| 0x00FF00), 5).unwrap();
        assert_eq!(p.count, 1);
        assert_eq!(&p.colors[..3], &color::to_yuv(0x00FF00));
    }

    #[test]
    fn indices_follow_first_appearance() {
        let p = build_palette(&tile_of(|i| if i % 2 == 0 { 0xFFFFFF } else { 0 }), 8).unwrap();
        assert_eq!(p.count, 2);
        assert_eq!(p.index[0], 0);
        assert_eq!(p.index[1], 1);
        assert_eq!(p.index[2], 0);
    }

    #[test]
    fn too_many_colors_fail_at_full_depth() {
        let pixels = tile_of(|i| (i as u32) * 0x030303);
        assert!(build_palette(&pixels, 8).is_none());
        let coarse = build_palette(&pixels, 1).unwrap();
        assert!(coarse.count as usize <= MAX_COLORS);
    }

    #[test]
    fn coarse_depth_merges_and_averages() {
        // two close greys share a bucket at depth 2
        let pixels = tile_of(|i| if i < 32 { 0x404040 } else { 0x444444 });
        let p = build_palette(&pixels, 2).unwrap();
        assert_eq!(p.count, 1);
        let [ya, ..] = color::to_yuv(0x404040);
        let [yb, ..] = color::to_yuv(0x444444);
        assert_eq!(p.colors[0], ((ya as u32 + yb as u32) / 2) as u8);
    }

    #[test]
    fn static_tile_refines_until_max() {
        let pixels = tile_of(|i| [0x101010, 0x202020, 0x303030][i % 3]);
        let quality = Quality::new(1, 4);
        let mut tile = Tile::default();

        assert!(update_tile(&mut tile, &pixels, quality));
        assert_eq!(tile.depth, 1);

        let mut depths = vec![tile.depth];
        for _ in 0..20 {
            if update_tile(&mut tile, &pixels, quality) {
                depths.push(tile.depth);
            }
        }
        assert_eq!(depths, vec![1, 2, 3, 4]);
        assert!(tile.depth_stop);
    }

    #[test]
    fn changed_tile_restarts_at_min() {
        let quality = Quality::new(2, 8);
        let mut tile = Tile::default();
        assert!(update_tile(&mut tile, &tile_of(|_| 0x112233), quality));
        assert_eq!(tile.depth, 2);
        assert!(update_tile(&mut tile, &tile_of(|_| 0x332211), quality));
        assert_eq!(tile.depth, 2);
        assert_eq!(tile.depth_step, 0);
    }

    #[test]
    fn set_image_counts_changed_tiles() {
        let mut grid = CaptureGrid::new(Quality::new(8, 8));
        let mut img = Image::from_fn(16, 16, |_, _| 0x202020);
        assert_eq!(grid.set_image(img.view()), 4);
        assert_eq!(grid.set_image(img.view()), 0);
        img.set_pixel(9, 1, 0xFFFFFF);
        assert_eq!(grid.set_image(img.view()), 1);
    }
}
