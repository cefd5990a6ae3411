//! Decode side: rebuilds tiles from the stream and paints them.

use crate::buffer::Buffer;
use crate::error::VbError;
use crate::image::ImageViewMut;
use crate::ready;
use crate::step::Step;

use super::color;
use super::model::{COUNT_BITS, INDEX_BITS, index_context};
use super::tile::{MAX_COLORS, TILE_PIXELS, Tile};
use super::{Resume, Tycho};

impl Tycho {
    /// Consume as much of the current frame as `input` holds, painting
    /// finished tiles into `image`.
    ///
    /// `image` must have the size given to [`Tycho::setup`].
    pub fn decode(&mut self, input: &mut Buffer, image: &mut ImageViewMut<'_>) -> Result<Step, VbError> {
        if image.width() != self.tiles.width() || image.height() != self.tiles.height() {
            return Err(VbError::ProtocolViolation("image size does not match frame"));
        }

        if self.flush {
            if self.coder.start_decode(input).is_pending() {
                return Ok(Step::Pending);
            }
            self.flush = false;
        }

        while self.cursor < self.tiles.len() {
            let coded = ready!(self.decode_tile(input, self.cursor)?);
            self.coded += usize::from(coded);

            if coded || self.redraw {
                let (x, y, w, h) = self.tiles.extent(self.cursor);
                draw_tile(self.tiles.tile(self.cursor), image, x, y, w, h);
            }

            self.cursor += 1;
        }

        Ok(Step::Ready(()))
    }

    /// Decode tile `n`; `Ready(false)` when it was skipped as unchanged.
    fn decode_tile(&mut self, input: &mut Buffer, n: usize) -> Result<Step<bool>, VbError> {
        loop {
            match self.resume {
                Resume::Count => {
                    let ctx = self.models.count_ctx;
                    let count = ready!(self.coder.decode(input, &mut self.models.count, COUNT_BITS, ctx)) as u8;
                    if count as usize > MAX_COLORS {
                        return Err(VbError::CorruptStream("palette larger than 12 colours"));
                    }
                    self.models.push_count(count);
                    if count == 0 {
                        return Ok(Step::Ready(false));
                    }
                    let tile = self.tiles.tile_mut(n);
                    tile.count = count;
                    tile.index[0] = 0;
                    self.resume = Resume::Palette { count, k: 0 };
                }
                Resume::Palette { count, k } => {
                    if k == count * 3 {
                        if count == 1 {
                            self.resume = Resume::Count;
                            return Ok(Step::Ready(true));
                        }
                        self.resume = Resume::Index { count, pos: 1, pmax: 0 };
                        continue;
                    }
                    let ch = (k % 3) as usize;
                    let ctx = self.models.color_ctx[ch];
                    let value = ready!(self.coder.decode(input, &mut self.models.color[ch], 8, ctx));
                    self.models.color_ctx[ch] = value;
                    self.tiles.tile_mut(n).colors[k as usize] = value as u8;
                    self.resume = Resume::Palette { count, k: k + 1 };
                }
                Resume::Index { count, pos, pmax } => {
                    if pos as usize == TILE_PIXELS {
                        self.resume = Resume::Count;
                        return Ok(Step::Ready(true));
                    }
                    let ctx = index_context(&self.tiles.tile(n).index, pos as usize);
                    let bits = INDEX_BITS[pmax as usize];
                    let value = ready!(self.coder.decode(input, &mut self.models.index[pmax as usize], bits, ctx)) as u8;
                    if value >= count {
                        return Err(VbError::CorruptStream("palette index out of range"));
                    }
                    self.tiles.tile_mut(n).index[pos as usize] = value;
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

/// Paint the visible `w x h` part of `tile` at `(x, y)`.
fn draw_tile(tile: &Tile, image: &mut ImageViewMut<'_>, x: u32, y: u32, w: u32, h: u32) {
    if tile.count == 0 {
        return;
    }

    let mut rgb = [0u32; MAX_COLORS];
    for (k, c) in rgb.iter_mut().enumerate().take(tile.count as usize) {
        let [y_, u, v] = tile.color(k);
        *c = color::from_yuv(y_, u, v);
    }

    image.paint(x, y, w, h, |i, j| rgb[tile.index_at((j * 8 + i) as usize)]);
}

// ── Tests ────────────────────────────────────────────────────────
